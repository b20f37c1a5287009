use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;

use super::services::build_resolver;
use super::{Command, EXIT_SUCCESS, GlobalOptions, parse_args, render_help, report_error};
use crate::config::Configuration;
use crate::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(about = "Show details of a template")]
struct InfoArgs {
    /// Template name
    template: String,
}

pub struct InfoCommand<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime + 'static> InfoCommand<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    async fn run(&self, args: &InfoArgs, config: &Configuration) -> Result<String> {
        let resolver = build_resolver(config, self.runtime.clone())?;
        let source = resolver.version_index(&args.template, None).await?;
        let index = source.listing.index();

        let cached: Vec<String> = resolver
            .cache()
            .cached_packages()?
            .into_iter()
            .find(|p| p.package_name() == args.template)
            .map(|p| p.to_strings())
            .unwrap_or_default();

        let mut out = format!("Template: {}\n", args.template);
        if let Some(description) = &source.listing.description {
            out.push_str(&format!("Description: {}\n", description));
        }
        if let Some(owner) = &source.listing.owner {
            out.push_str(&format!("Owner: {}\n", owner));
        }
        match &source.repository {
            Some(repository) => out.push_str(&format!("Repository: {}\n", repository.url())),
            None => out.push_str("Repository: (local cache)\n"),
        }
        if index.is_empty() {
            out.push_str("Versions: (none published)\n");
        } else {
            out.push_str(&format!("Versions: {}\n", index.to_strings().join(", ")));
        }
        if let Some(latest) = index.latest() {
            out.push_str(&format!("Latest: {}\n", latest));
        }
        if cached.is_empty() {
            out.push_str("Cached: (none)\n");
        } else {
            out.push_str(&format!("Cached: {}\n", cached.join(", ")));
        }
        Ok(out)
    }
}

#[async_trait]
impl<R: Runtime + 'static> Command for InfoCommand<R> {
    fn name(&self) -> &'static str {
        "info"
    }

    fn description(&self) -> &'static str {
        "Show details of a template"
    }

    fn help(&self, message: Option<&str>) -> String {
        render_help::<InfoArgs>(self.name(), message)
    }

    async fn execute(
        &self,
        args: &[String],
        options: &GlobalOptions,
        config: &Configuration,
    ) -> i32 {
        let args: InfoArgs = match parse_args(self.name(), args) {
            Ok(args) => args,
            Err(code) => return code,
        };
        match self.run(&args, config).await {
            Ok(out) => {
                print!("{}", out);
                EXIT_SUCCESS
            }
            Err(e) => report_error(&e, options),
        }
    }
}

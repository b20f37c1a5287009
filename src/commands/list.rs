use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use clap::Parser;
use log::{debug, warn};

use super::services::{build_cache, build_http_client, build_repositories};
use super::{Command, EXIT_SUCCESS, GlobalOptions, parse_args, render_help, report_error};
use crate::config::Configuration;
use crate::config::settings::OFFLINE;
use crate::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(about = "List available templates")]
struct ListArgs {
    /// Show the templates in the local cache instead of asking repositories
    #[arg(long)]
    cached: bool,
}

pub struct ListCommand<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime + 'static> ListCommand<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    fn list_cached(&self, config: &Configuration) -> Result<()> {
        let cache = build_cache(config, self.runtime.clone())?;
        let packages = cache.cached_packages()?;
        if packages.is_empty() {
            println!("No templates cached in {}", cache.root().display());
            return Ok(());
        }
        for index in packages {
            println!("{}  {}", index.package_name(), index.to_strings().join(", "));
        }
        Ok(())
    }

    /// Print each repository's catalogue. Fails only when no repository
    /// answered.
    async fn list_remote(&self, config: &Configuration) -> Result<()> {
        let http_client = build_http_client(config)?;
        let repositories = build_repositories(config, &http_client, self.runtime.clone())?;

        let mut answered = 0;
        for repository in &repositories {
            debug!("Listing templates of {}", repository.url());
            match repository.list_packages().await {
                Ok(mut names) => {
                    answered += 1;
                    names.sort();
                    println!("{}:", repository.url());
                    if names.is_empty() {
                        println!("  (no templates)");
                    }
                    for name in names {
                        println!("  {}", name);
                    }
                }
                Err(e) => warn!("Failed to list templates of {}: {:#}", repository.url(), e),
            }
        }

        if answered == 0 && !repositories.is_empty() {
            return Err(anyhow!(
                "No repository could be reached; try 'skelly list --cached'"
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Runtime + 'static> Command for ListCommand<R> {
    fn name(&self) -> &'static str {
        "list"
    }

    fn description(&self) -> &'static str {
        "List available templates"
    }

    fn help(&self, message: Option<&str>) -> String {
        render_help::<ListArgs>(self.name(), message)
    }

    async fn execute(
        &self,
        args: &[String],
        options: &GlobalOptions,
        config: &Configuration,
    ) -> i32 {
        let args: ListArgs = match parse_args(self.name(), args) {
            Ok(args) => args,
            Err(code) => return code,
        };

        let offline = config.boolean(OFFLINE).unwrap_or(false);
        let result = if args.cached || offline {
            self.list_cached(config)
        } else {
            self.list_remote(config).await
        };
        match result {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => report_error(&e, options),
        }
    }
}

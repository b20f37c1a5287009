use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use super::services::build_cache;
use super::{Command, EXIT_SUCCESS, GlobalOptions, parse_args, render_help, report_error};
use crate::config::Configuration;
use crate::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(about = "Manage the local template cache")]
struct CacheArgs {
    #[command(subcommand)]
    action: CacheAction,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Remove one template, or everything, from the cache
    Clear { name: Option<String> },
}

pub struct CacheCommand<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime + 'static> CacheCommand<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    fn run(&self, action: &CacheAction, config: &Configuration) -> Result<String> {
        let cache = build_cache(config, self.runtime.clone())?;
        match action {
            CacheAction::Clear { name } => {
                let removed = cache.clear(name.as_deref())?;
                Ok(match (name, removed) {
                    (Some(name), true) => format!("Removed {} from the cache\n", name),
                    (Some(name), false) => format!("{} is not cached\n", name),
                    (None, true) => format!("Cleared {}\n", cache.root().display()),
                    (None, false) => "The cache is already empty\n".to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl<R: Runtime + 'static> Command for CacheCommand<R> {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn description(&self) -> &'static str {
        "Manage the local template cache"
    }

    fn help(&self, message: Option<&str>) -> String {
        render_help::<CacheArgs>(self.name(), message)
    }

    async fn execute(
        &self,
        args: &[String],
        options: &GlobalOptions,
        config: &Configuration,
    ) -> i32 {
        let args: CacheArgs = match parse_args(self.name(), args) {
            Ok(args) => args,
            Err(code) => return code,
        };
        match self.run(&args.action, config) {
            Ok(out) => {
                print!("{}", out);
                EXIT_SUCCESS
            }
            Err(e) => report_error(&e, options),
        }
    }
}

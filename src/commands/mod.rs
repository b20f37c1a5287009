//! CLI sub-commands.
//!
//! Each command parses its own arguments, runs against the explicit
//! [`Configuration`] and returns an exit code. Typed failures are turned into
//! a message and exit code by [`report_error`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use log::debug;

use crate::config::Configuration;
use crate::config::settings::{LOG_LEVEL, OFFLINE};
use crate::error::Error;
use crate::runtime::Runtime;
use crate::script::ShellScriptRunner;

mod cache;
mod config;
mod create;
mod info;
mod list;
pub mod services;

pub use cache::CacheCommand;
pub use config::ConfigCommand;
pub use create::CreateCommand;
pub use info::InfoCommand;
pub use list::ListCommand;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Options accepted before the command name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalOptions {
    pub info: bool,
    pub log_level: Option<String>,
    pub quiet: bool,
    pub stacktrace: bool,
    pub verbose: bool,
    pub home: Option<PathBuf>,
    pub offline: bool,
}

impl GlobalOptions {
    /// Settings implied by the command line. Applied as the last
    /// configuration layer.
    pub fn config_overrides(&self) -> Vec<(String, String)> {
        let mut overrides = Vec::new();
        let level = if let Some(level) = &self.log_level {
            Some(level.as_str())
        } else if self.verbose {
            Some("debug")
        } else if self.info {
            Some("info")
        } else if self.quiet {
            Some("error")
        } else {
            None
        };
        if let Some(level) = level {
            overrides.push((LOG_LEVEL.to_string(), level.to_string()));
        }
        if self.offline {
            overrides.push((OFFLINE.to_string(), "true".to_string()));
        }
        overrides
    }

    /// The level the logger should run at.
    pub fn effective_log_level(&self, config: &Configuration) -> String {
        config
            .text(LOG_LEVEL)
            .ok()
            .flatten()
            .unwrap_or_else(|| "warn".to_string())
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Usage text, optionally preceded by `message`.
    fn help(&self, message: Option<&str>) -> String;

    async fn execute(
        &self,
        args: &[String],
        options: &GlobalOptions,
        config: &Configuration,
    ) -> i32;
}

/// Parse `args` for a command with clap. On failure the error (or help) is
/// printed and the exit code to return is handed back.
pub(crate) fn parse_args<A: Parser>(name: &str, args: &[String]) -> Result<A, i32> {
    let argv = std::iter::once(format!("skelly {}", name)).chain(args.iter().cloned());
    A::try_parse_from(argv).map_err(|e| {
        let _ = e.print();
        if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS }
    })
}

/// Render clap's help for a command's argument parser.
pub(crate) fn render_help<A: clap::CommandFactory>(name: &str, message: Option<&str>) -> String {
    let usage = A::command()
        .bin_name(format!("skelly {}", name))
        .render_help()
        .to_string();
    match message {
        Some(message) => format!("{}\n\n{}", message, usage),
        None => usage,
    }
}

/// Print a failure and pick its exit code.
pub fn report_error(err: &anyhow::Error, options: &GlobalOptions) -> i32 {
    if options.stacktrace {
        eprintln!("Error: {:?}", err);
    } else {
        eprintln!("Error: {:#}", err);
    }
    if let Some(hint) = err.downcast_ref::<Error>().and_then(hint) {
        eprintln!("{}", hint);
    }
    EXIT_FAILURE
}

fn hint(err: &Error) -> Option<&'static str> {
    match err {
        Error::PackageNotFound { version: None, .. } => {
            Some("Run 'skelly list' to see the available templates.")
        }
        Error::PackageNotFound { version: Some(_), .. } => {
            Some("Run 'skelly info <template>' to see the published versions.")
        }
        Error::NoVersionsFound { .. } => {
            Some("The template is registered but has no published versions yet.")
        }
        Error::PackageNotInCache { .. } => Some(
            "Check your network connection and the http.proxy setting, \
             or run without --offline.",
        ),
        Error::UnknownSetting { .. } => {
            Some("Run 'skelly config list' to see the recognized settings.")
        }
        Error::InvalidSetting { .. } => None,
        Error::ScriptExecutionFailed { .. } => {
            Some("The project was unpacked, but its post-install script did not finish.")
        }
        Error::FileAlreadyExists { .. } => {
            Some("Choose a different directory, or empty this one first.")
        }
    }
}

/// Registered commands, dispatched by name.
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// All built-in commands over the given runtime.
    pub fn with_defaults<R: Runtime + 'static>(runtime: Arc<R>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CreateCommand::new(
            runtime.clone(),
            ShellScriptRunner::new(),
        )));
        registry.register(Box::new(ListCommand::new(runtime.clone())));
        registry.register(Box::new(InfoCommand::new(runtime.clone())));
        registry.register(Box::new(ConfigCommand::new(runtime.clone())));
        registry.register(Box::new(CacheCommand::new(runtime)));
        registry
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.insert(command.name(), command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|c| c.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Command> {
        self.commands.values().map(|c| c.as_ref())
    }

    /// One line per command, for the top-level help.
    pub fn summary(&self) -> String {
        let mut summary = String::from("Commands:\n");
        for command in self.iter() {
            summary.push_str(&format!("  {:<8} {}\n", command.name(), command.description()));
        }
        summary
    }

    /// Run the named command. Unknown names are a usage error.
    pub async fn dispatch(
        &self,
        name: &str,
        args: &[String],
        options: &GlobalOptions,
        config: &Configuration,
    ) -> i32 {
        match self.get(name) {
            Some(command) => {
                debug!("Running command '{}' with {:?}", name, args);
                command.execute(args, options, config).await
            }
            None => {
                eprintln!("Error: unknown command '{}'\n\n{}", name, self.summary());
                EXIT_USAGE
            }
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

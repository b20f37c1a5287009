use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use log::debug;

use super::{Command, EXIT_SUCCESS, GlobalOptions, parse_args, render_help, report_error};
use crate::config::loader::default_home;
use crate::config::{ConfigLoader, Configuration};
use crate::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(about = "Inspect and change settings")]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// List every recognized setting with its type and default
    List,
    /// Show the effective value of one setting, or every explicit value
    Show { key: Option<String> },
    /// Set a setting
    Set { key: String, value: String },
    /// Append a value to a list setting
    Add { key: String, value: String },
    /// Remove a setting so its default applies again
    Clear { key: String },
}

pub struct ConfigCommand<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime + 'static> ConfigCommand<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }

    fn home(&self, options: &GlobalOptions) -> Result<PathBuf> {
        match &options.home {
            Some(home) => Ok(home.clone()),
            None => default_home(self.runtime.as_ref()),
        }
    }

    fn run(&self, action: &ConfigAction, options: &GlobalOptions, config: &Configuration) -> Result<String> {
        match action {
            ConfigAction::List => Ok(list(config)),
            ConfigAction::Show { key } => show(config, key.as_deref()),
            ConfigAction::Set { key, value } => {
                self.update(options, config, |store| store.set_raw(key, value))?;
                Ok(format!("{} = {}\n", key, value))
            }
            ConfigAction::Add { key, value } => {
                self.update(options, config, |store| {
                    // Extend what is in effect, not just the managed layer
                    if store.get(key)?.is_none()
                        && let Some(current) = config.get(key)?
                    {
                        store.set(key, current.clone())?;
                    }
                    store.append(key, value)
                })?;
                Ok(format!("Added {} to {}\n", value, key))
            }
            ConfigAction::Clear { key } => {
                let mut removed = false;
                self.update(options, config, |store| {
                    removed = store.clear(key)?;
                    Ok(())
                })?;
                Ok(if removed {
                    format!("Cleared {}\n", key)
                } else {
                    format!("{} was not set by skelly config\n", key)
                })
            }
        }
    }

    /// Apply `change` to the managed layer and save it. Nothing is written if
    /// the change is rejected.
    fn update(
        &self,
        options: &GlobalOptions,
        config: &Configuration,
        change: impl FnOnce(&mut Configuration) -> Result<(), crate::error::Error>,
    ) -> Result<()> {
        let loader = ConfigLoader::new(self.runtime.as_ref(), self.home(options)?);
        let managed = loader.read_managed()?;

        let mut store = Configuration::new(config.descriptors().to_vec());
        store.load(&managed)?;
        change(&mut store)?;

        debug!("Saving managed settings to {}", loader.managed_file().display());
        loader.save_managed(&store.explicit_values())
    }
}

fn list(config: &Configuration) -> String {
    let mut out = String::new();
    for descriptor in config.descriptors() {
        let default = descriptor
            .default
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "(unset)".to_string());
        out.push_str(&format!(
            "{} ({}, default: {})\n    {}\n",
            descriptor.name,
            descriptor.converter.type_name(),
            default,
            descriptor.description
        ));
    }
    out
}

fn show(config: &Configuration, key: Option<&str>) -> Result<String> {
    match key {
        Some(key) => Ok(match config.get_or_default(key)? {
            Some(value) => format!("{}\n", value),
            None => "(unset)\n".to_string(),
        }),
        None => Ok(config
            .explicit_values()
            .iter()
            .map(|(key, value)| format!("{} = {}\n", key, value))
            .collect()),
    }
}

#[async_trait]
impl<R: Runtime + 'static> Command for ConfigCommand<R> {
    fn name(&self) -> &'static str {
        "config"
    }

    fn description(&self) -> &'static str {
        "Inspect and change settings"
    }

    fn help(&self, message: Option<&str>) -> String {
        render_help::<ConfigArgs>(self.name(), message)
    }

    async fn execute(
        &self,
        args: &[String],
        options: &GlobalOptions,
        config: &Configuration,
    ) -> i32 {
        let args: ConfigArgs = match parse_args(self.name(), args) {
            Ok(args) => args,
            Err(code) => return code,
        };
        match self.run(&args.action, options, config) {
            Ok(out) => {
                print!("{}", out);
                EXIT_SUCCESS
            }
            Err(e) => report_error(&e, options),
        }
    }
}

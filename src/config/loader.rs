//! Builds the process configuration from its layers.
//!
//! Layers are applied in order, each as one all-or-nothing load:
//! `<home>/config.toml`, `<home>/managed-config.json`, `SKELLY_*` environment
//! variables and finally overrides from the command line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use super::{Configuration, builtin_settings};
use crate::runtime::Runtime;

pub const HOME_ENV: &str = "SKELLY_HOME";
pub const CONFIG_FILE: &str = "config.toml";
pub const MANAGED_CONFIG_FILE: &str = "managed-config.json";
const ENV_PREFIX: &str = "SKELLY_";

/// `$SKELLY_HOME`, or `~/.skelly`.
#[tracing::instrument(skip(runtime))]
pub fn default_home<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if let Ok(home) = runtime.env_var(HOME_ENV)
        && !home.trim().is_empty()
    {
        return Ok(PathBuf::from(home));
    }
    let home_dir = runtime
        .home_dir()
        .context("Could not find home directory")?;
    Ok(home_dir.join(".skelly"))
}

/// Environment variable consulted for a setting, e.g.
/// `options.offline` -> `SKELLY_OPTIONS_OFFLINE`.
pub fn env_var_name(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.replace('.', "_").to_uppercase())
}

/// Flatten nested TOML tables into dotted keys. Arrays become comma-separated
/// lists.
pub fn flatten_toml(table: &toml::Table) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    flatten_into(&mut flat, "", table);
    flat
}

fn flatten_into(flat: &mut BTreeMap<String, String>, prefix: &str, table: &toml::Table) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::Table(nested) => flatten_into(flat, &name, nested),
            toml::Value::Array(items) => {
                let joined: Vec<String> = items.iter().map(scalar_to_raw).collect();
                flat.insert(name, joined.join(","));
            }
            other => {
                flat.insert(name, scalar_to_raw(other));
            }
        }
    }
}

fn scalar_to_raw(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct ConfigLoader<'a, R: Runtime> {
    runtime: &'a R,
    home: PathBuf,
}

impl<'a, R: Runtime> ConfigLoader<'a, R> {
    pub fn new(runtime: &'a R, home: PathBuf) -> Self {
        Self { runtime, home }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    pub fn managed_file(&self) -> PathBuf {
        self.home.join(MANAGED_CONFIG_FILE)
    }

    /// Load every layer into a fresh store. `overrides` come last and win.
    #[tracing::instrument(skip(self, overrides))]
    pub fn load(&self, overrides: &[(String, String)]) -> Result<Configuration> {
        let mut config = Configuration::new(builtin_settings(&self.home));

        let config_file = self.config_file();
        let file_values = self.read_config_file()?;
        debug!(
            "Loaded {} setting(s) from {}",
            file_values.len(),
            config_file.display()
        );
        config
            .load(&file_values)
            .with_context(|| format!("Invalid configuration in {}", config_file.display()))?;

        let managed_file = self.managed_file();
        let managed_values = self.read_managed()?;
        config
            .load(&managed_values)
            .with_context(|| format!("Invalid configuration in {}", managed_file.display()))?;

        let env_values = self.env_values(&config);
        config
            .load(env_values.iter().map(|(k, _, v)| (k, v)))
            .with_context(|| {
                let vars: Vec<&str> = env_values.iter().map(|(_, var, _)| var.as_str()).collect();
                format!("Invalid configuration in environment ({})", vars.join(", "))
            })?;

        config
            .load(overrides.iter().map(|(k, v)| (k, v)))
            .context("Invalid configuration on the command line")?;

        Ok(config)
    }

    /// Read `config.toml`. A missing file is an empty layer.
    pub fn read_config_file(&self) -> Result<BTreeMap<String, String>> {
        let path = self.config_file();
        if !self.runtime.exists(&path) {
            return Ok(BTreeMap::new());
        }
        let content = self.runtime.read_to_string(&path)?;
        let table: toml::Table = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(flatten_toml(&table))
    }

    /// Read `managed-config.json`. A missing file is an empty layer.
    pub fn read_managed(&self) -> Result<BTreeMap<String, String>> {
        let path = self.managed_file();
        if !self.runtime.exists(&path) {
            return Ok(BTreeMap::new());
        }
        let content = self.runtime.read_to_string(&path)?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Persist the managed overrides, replacing the previous file.
    #[tracing::instrument(skip(self, values))]
    pub fn save_managed(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let path = self.managed_file();
        if !self.runtime.exists(&self.home) {
            self.runtime.create_dir_all(&self.home)?;
        }
        let json = serde_json::to_string_pretty(values)?;
        let tmp_path = path.with_extension("json.tmp");
        self.runtime.write(&tmp_path, json.as_bytes())?;
        self.runtime.rename(&tmp_path, &path)?;
        debug!("Saved {} managed setting(s) to {}", values.len(), path.display());
        Ok(())
    }

    /// `(key, variable, raw)` for every non-wildcard setting set in the
    /// environment.
    fn env_values(&self, config: &Configuration) -> Vec<(String, String, String)> {
        config
            .descriptors()
            .iter()
            .filter(|d| !d.is_wildcard())
            .filter_map(|d| {
                let var = env_var_name(&d.name);
                self.runtime
                    .env_var(&var)
                    .ok()
                    .map(|raw| (d.name.clone(), var, raw))
            })
            .collect()
    }
}

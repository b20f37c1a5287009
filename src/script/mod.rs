//! Post-install customization scripts.
//!
//! A template may ship `.skelly/post-install.sh`. After unpacking, it runs
//! with the new project as working directory and a `SKELLY_*` environment
//! describing the template and the user's properties.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use crate::error::Error;

pub const SCRIPT_DIR: &str = ".skelly";
pub const POST_INSTALL_SCRIPT: &str = "post-install.sh";

/// What a post-install script is told about the project it runs in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptContext {
    pub template: String,
    pub version: Option<String>,
    pub git_name: Option<String>,
    pub git_email: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl ScriptContext {
    /// Environment passed to the script.
    pub fn env(&self, project_dir: &Path) -> Vec<(String, String)> {
        let mut env = vec![
            ("SKELLY_TEMPLATE".to_string(), self.template.clone()),
            (
                "SKELLY_VERSION".to_string(),
                self.version.clone().unwrap_or_default(),
            ),
            (
                "SKELLY_PROJECT_DIR".to_string(),
                project_dir.to_string_lossy().into_owned(),
            ),
        ];
        if let Some(name) = &self.git_name {
            env.push(("SKELLY_GIT_NAME".to_string(), name.clone()));
        }
        if let Some(email) = &self.git_email {
            env.push(("SKELLY_GIT_EMAIL".to_string(), email.clone()));
        }
        for (key, value) in &self.properties {
            env.push((property_var(key), value.clone()));
        }
        env
    }
}

/// `SKELLY_PROP_<KEY>`, with anything but ASCII alphanumerics mapped to `_`.
fn property_var(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("SKELLY_PROP_{}", key)
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run the project's post-install script, if it has one. Returns whether
    /// a script ran.
    async fn run(&self, project_dir: &Path, context: &ScriptContext) -> Result<bool, Error>;
}

/// Runs `.skelly/post-install.sh` with `sh`, then removes `.skelly`.
pub struct ShellScriptRunner {
    shell: PathBuf,
}

impl Default for ShellScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellScriptRunner {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("sh"),
        }
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    async fn execute(&self, script: &Path, project_dir: &Path, context: &ScriptContext) -> Result<()> {
        let status = Command::new(&self.shell)
            .arg(script)
            .current_dir(project_dir)
            .envs(context.env(project_dir))
            .status()
            .await
            .with_context(|| format!("Failed to start {}", self.shell.display()))?;

        if !status.success() {
            anyhow::bail!("{} exited with {}", script.display(), status);
        }
        Ok(())
    }
}

#[async_trait]
impl ScriptRunner for ShellScriptRunner {
    #[tracing::instrument(skip(self, context))]
    async fn run(&self, project_dir: &Path, context: &ScriptContext) -> Result<bool, Error> {
        let script_dir = project_dir.join(SCRIPT_DIR);
        let script = script_dir.join(POST_INSTALL_SCRIPT);
        if !script.is_file() {
            debug!("No post-install script in {}", project_dir.display());
            return Ok(false);
        }

        info!("Running post-install script {}...", script.display());
        self.execute(&script, project_dir, context)
            .await
            .map_err(|source| Error::ScriptExecutionFailed {
                script: script.clone(),
                source,
            })?;

        tokio::fs::remove_dir_all(&script_dir)
            .await
            .map_err(|e| Error::ScriptExecutionFailed {
                script: script.clone(),
                source: anyhow::Error::new(e).context(format!(
                    "Failed to remove {} after the script ran",
                    script_dir.display()
                )),
            })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_script(project: &Path, body: &str) {
        let dir = project.join(SCRIPT_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(POST_INSTALL_SCRIPT), body).unwrap();
    }

    fn context() -> ScriptContext {
        ScriptContext {
            template: "app".into(),
            version: Some("1.2.0".into()),
            git_name: Some("Jane Doe".into()),
            git_email: None,
            properties: BTreeMap::from([("package-name".to_string(), "com.example".to_string())]),
        }
    }

    #[test]
    fn test_env() {
        let env = context().env(Path::new("/work/app"));
        let get = |k: &str| env.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());

        assert_eq!(get("SKELLY_TEMPLATE"), Some("app"));
        assert_eq!(get("SKELLY_VERSION"), Some("1.2.0"));
        assert_eq!(get("SKELLY_PROJECT_DIR"), Some("/work/app"));
        assert_eq!(get("SKELLY_GIT_NAME"), Some("Jane Doe"));
        assert_eq!(get("SKELLY_GIT_EMAIL"), None);
        assert_eq!(get("SKELLY_PROP_PACKAGE_NAME"), Some("com.example"));
    }

    #[tokio::test]
    async fn test_no_script_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let ran = ShellScriptRunner::new()
            .run(dir.path(), &context())
            .await
            .unwrap();
        assert!(!ran);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_runs_in_project_with_env() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "echo \"$SKELLY_TEMPLATE $SKELLY_VERSION $SKELLY_PROP_PACKAGE_NAME\" > generated.txt\n",
        );

        // --- Execute ---
        let ran = ShellScriptRunner::new()
            .run(dir.path(), &context())
            .await
            .unwrap();

        // --- Verify ---
        assert!(ran);
        assert_eq!(
            fs::read_to_string(dir.path().join("generated.txt")).unwrap(),
            "app 1.2.0 com.example\n"
        );
        assert!(!dir.path().join(SCRIPT_DIR).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_script() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "exit 3\n");

        let result = ShellScriptRunner::new().run(dir.path(), &context()).await;

        match result {
            Err(Error::ScriptExecutionFailed { script, source }) => {
                assert!(script.ends_with(".skelly/post-install.sh"));
                assert!(source.to_string().contains("exited with"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // The script stays for inspection
        assert!(dir.path().join(SCRIPT_DIR).exists());
    }

    #[tokio::test]
    async fn test_missing_shell() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "true\n");

        let result = ShellScriptRunner::with_shell("/nonexistent/shell")
            .run(dir.path(), &context())
            .await;

        assert!(matches!(result, Err(Error::ScriptExecutionFailed { .. })));
    }
}

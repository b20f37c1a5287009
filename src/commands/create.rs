use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use log::{debug, info, warn};

use super::services::{build_cache, build_http_client, build_resolver, template_mapping};
use super::{Command, EXIT_SUCCESS, GlobalOptions, parse_args, render_help, report_error};
use crate::archive::ZipExtractor;
use crate::config::Configuration;
use crate::config::settings::{GIT_EMAIL, GIT_NAME};
use crate::error::Error;
use crate::repository::download_url;
use crate::runtime::Runtime;
use crate::script::{ScriptContext, ScriptRunner};

/// Create a new project from a template
#[derive(Parser, Debug)]
#[command(about = "Create a new project from a template")]
struct CreateArgs {
    /// Template name, or an alias from templates.mappings
    template: String,

    /// Exact version to use, then the project directory.
    /// With a single value it is the directory and the latest version is used.
    #[arg(value_name = "[VERSION] DIRECTORY", num_args = 1..=2, required = true)]
    rest: Vec<String>,

    /// Property passed to the post-install script (repeatable)
    #[arg(short = 'P', long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    properties: Vec<(String, String)>,
}

impl CreateArgs {
    fn version(&self) -> Option<&str> {
        match self.rest.as_slice() {
            [version, _] => Some(version),
            _ => None,
        }
    }

    fn directory(&self) -> PathBuf {
        PathBuf::from(self.rest.last().map(String::as_str).unwrap_or("."))
    }
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// A package ready to unpack.
struct Package {
    archive: PathBuf,
    version: Option<String>,
    /// Set when `archive` is a one-off download to remove afterwards.
    scratch: bool,
}

pub struct CreateCommand<R: Runtime, S: ScriptRunner> {
    runtime: Arc<R>,
    script_runner: S,
}

impl<R: Runtime + 'static, S: ScriptRunner> CreateCommand<R, S> {
    pub fn new(runtime: Arc<R>, script_runner: S) -> Self {
        Self {
            runtime,
            script_runner,
        }
    }

    #[tracing::instrument(skip(self, config))]
    async fn run(&self, args: &CreateArgs, config: &Configuration) -> Result<PathBuf> {
        let target = args.directory();
        self.check_target(&target)?;

        let package = self.fetch(args, config).await?;
        let extracted = self
            .runtime
            .create_dir_all(&target)
            .with_context(|| format!("Failed to create {}", target.display()))
            .and_then(|()| ZipExtractor.extract(self.runtime.as_ref(), &package.archive, &target));
        if package.scratch
            && let Err(e) = self.runtime.remove_file(&package.archive)
        {
            warn!("Failed to remove {}: {}", package.archive.display(), e);
        }
        extracted.with_context(|| format!("Failed to unpack {}", args.template))?;

        let context = ScriptContext {
            template: args.template.clone(),
            version: package.version,
            git_name: config.text(GIT_NAME)?,
            git_email: config.text(GIT_EMAIL)?,
            properties: args.properties.iter().cloned().collect::<BTreeMap<_, _>>(),
        };
        if self.script_runner.run(&target, &context).await? {
            info!("Post-install script finished");
        }
        Ok(target)
    }

    /// The target must be missing or an empty directory. It is only created
    /// once a package is in hand.
    fn check_target(&self, target: &Path) -> Result<()> {
        if self.runtime.exists(target)
            && (!self.runtime.is_dir(target) || !self.runtime.read_dir(target)?.is_empty())
        {
            return Err(Error::FileAlreadyExists {
                path: target.to_path_buf(),
            }
            .into());
        }
        Ok(())
    }

    async fn fetch(&self, args: &CreateArgs, config: &Configuration) -> Result<Package> {
        if let Some(url) = template_mapping(config, &args.template) {
            info!("Downloading {} from {}...", args.template, url);
            let cache = build_cache(config, self.runtime.clone())?;
            let archive = cache.scratch_path(&args.template)?;
            let http_client = build_http_client(config)?;
            if let Err(e) = download_url(self.runtime.as_ref(), &http_client, &url, &archive).await {
                let _ = self.runtime.remove_file(&archive);
                return Err(e.context(format!("Failed to download {}", url)));
            }
            return Ok(Package {
                archive,
                version: args.version().map(String::from),
                scratch: true,
            });
        }

        let resolver = build_resolver(config, self.runtime.clone())?;
        let resolved = resolver.resolve(&args.template, args.version()).await?;
        debug!("Unpacking {} from {:?}", resolved.id, resolved.location);
        Ok(Package {
            archive: resolved.location,
            version: resolved.id.version().map(String::from),
            scratch: false,
        })
    }
}

#[async_trait]
impl<R: Runtime + 'static, S: ScriptRunner> Command for CreateCommand<R, S> {
    fn name(&self) -> &'static str {
        "create"
    }

    fn description(&self) -> &'static str {
        "Create a new project from a template"
    }

    fn help(&self, message: Option<&str>) -> String {
        render_help::<CreateArgs>(self.name(), message)
    }

    async fn execute(
        &self,
        args: &[String],
        options: &GlobalOptions,
        config: &Configuration,
    ) -> i32 {
        let args: CreateArgs = match parse_args(self.name(), args) {
            Ok(args) => args,
            Err(code) => return code,
        };
        match self.run(&args, config).await {
            Ok(target) => {
                println!("Created {} in {}", args.template, target.display());
                EXIT_SUCCESS
            }
            Err(e) => report_error(&e, options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::{write_zip, zip_bytes};
    use crate::commands::{EXIT_FAILURE, EXIT_USAGE, test_support};
    use crate::runtime::RealRuntime;
    use crate::script::MockScriptRunner;
    use mockito::Server;
    use std::fs;

    /// A repository on disk publishing `app` 1.0.0 and 1.1.0.
    fn file_repository(root: &Path) -> String {
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(
            root.join("app/versions.json"),
            r#"{"name":"app","versions":["1.0.0","1.1.0"]}"#,
        )
        .unwrap();
        for version in ["1.0.0", "1.1.0"] {
            let readme = format!("app-{}/README.md", version);
            let script = format!("app-{}/.skelly/post-install.sh", version);
            write_zip(
                &root.join(format!("app/app-{}.zip", version)),
                &[(readme.as_str(), version), (script.as_str(), "true\n")],
            )
            .unwrap();
        }
        url::Url::from_directory_path(root).unwrap().to_string()
    }

    fn command(runner: MockScriptRunner) -> CreateCommand<RealRuntime, MockScriptRunner> {
        CreateCommand::new(Arc::new(RealRuntime), runner)
    }

    #[test]
    fn test_args_version_and_directory() {
        let args = CreateArgs::try_parse_from(["create", "app", "1.0.0", "out", "-P", "a=b"]).unwrap();
        assert_eq!(args.version(), Some("1.0.0"));
        assert_eq!(args.directory(), PathBuf::from("out"));
        assert_eq!(args.properties, vec![("a".to_string(), "b".to_string())]);

        let args = CreateArgs::try_parse_from(["create", "app", "out"]).unwrap();
        assert_eq!(args.version(), None);

        assert!(CreateArgs::try_parse_from(["create", "app"]).is_err());
        assert!(CreateArgs::try_parse_from(["create", "app", "out", "-P", "novalue"]).is_err());
    }

    #[tokio::test]
    async fn test_create_latest_and_run_script() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let repo = file_repository(&dir.path().join("repo"));
        let mut config = test_support::config(&dir.path().join("home"), &repo);
        config.set_raw(GIT_NAME, "Jane Doe").unwrap();
        let target = dir.path().join("project");

        let mut runner = MockScriptRunner::new();
        let expected_target = target.clone();
        runner
            .expect_run()
            .withf(move |project, context| {
                project == expected_target
                    && context.template == "app"
                    && context.version.as_deref() == Some("1.1.0")
                    && context.git_name.as_deref() == Some("Jane Doe")
                    && context.properties.get("group").map(String::as_str) == Some("com.example")
            })
            .times(1)
            .returning(|_, _| Ok(true));

        // --- Execute ---
        let args = test_support::args(&["app", target.to_str().unwrap(), "-P", "group=com.example"]);
        let code = command(runner)
            .execute(&args, &GlobalOptions::default(), &config)
            .await;

        // --- Verify ---
        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(fs::read_to_string(target.join("README.md")).unwrap(), "1.1.0");
        assert!(
            dir.path()
                .join("home/templates/app/app-1.1.0.zip")
                .exists()
        );
    }

    #[tokio::test]
    async fn test_create_exact_version() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_repository(&dir.path().join("repo"));
        let config = test_support::config(&dir.path().join("home"), &repo);
        let target = dir.path().join("project");

        let mut runner = MockScriptRunner::new();
        runner.expect_run().returning(|_, _| Ok(false));

        let args = test_support::args(&["app", "1.0.0", target.to_str().unwrap()]);
        let code = command(runner)
            .execute(&args, &GlobalOptions::default(), &config)
            .await;

        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(fs::read_to_string(target.join("README.md")).unwrap(), "1.0.0");
    }

    #[tokio::test]
    async fn test_create_into_non_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_repository(&dir.path().join("repo"));
        let config = test_support::config(&dir.path().join("home"), &repo);
        let target = dir.path().join("project");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("existing.txt"), "keep").unwrap();

        let mut runner = MockScriptRunner::new();
        runner.expect_run().never();

        let parsed = CreateArgs::try_parse_from(["create", "app", target.to_str().unwrap()]).unwrap();
        let result = command(runner).run(&parsed, &config).await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::FileAlreadyExists { path }) if path == &target
        ));
        assert_eq!(fs::read_to_string(target.join("existing.txt")).unwrap(), "keep");
    }

    #[tokio::test]
    async fn test_create_into_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_repository(&dir.path().join("repo"));
        let config = test_support::config(&dir.path().join("home"), &repo);
        let target = dir.path().join("project");
        fs::create_dir_all(&target).unwrap();

        let mut runner = MockScriptRunner::new();
        runner.expect_run().returning(|_, _| Ok(false));

        let args = test_support::args(&["app", target.to_str().unwrap()]);
        let code = command(runner)
            .execute(&args, &GlobalOptions::default(), &config)
            .await;

        assert_eq!(code, EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn test_create_unknown_template() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_repository(&dir.path().join("repo"));
        let config = test_support::config(&dir.path().join("home"), &repo);
        let target = dir.path().join("project");

        let mut runner = MockScriptRunner::new();
        runner.expect_run().never();

        let args = test_support::args(&["nope", target.to_str().unwrap()]);
        let code = command(runner)
            .execute(&args, &GlobalOptions::default(), &config)
            .await;

        assert_eq!(code, EXIT_FAILURE);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_create_missing_version_leaves_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_repository(&dir.path().join("repo"));
        let config = test_support::config(&dir.path().join("home"), &repo);
        let target = dir.path().join("nested/project");

        let mut runner = MockScriptRunner::new();
        runner.expect_run().never();

        let parsed =
            CreateArgs::try_parse_from(["create", "app", "9.9.9", target.to_str().unwrap()]).unwrap();
        let err = command(runner).run(&parsed, &config).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::PackageNotFound { .. })
        ));
        assert!(!dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_create_script_failure() {
        let dir = tempfile::tempdir().unwrap();
        let repo = file_repository(&dir.path().join("repo"));
        let config = test_support::config(&dir.path().join("home"), &repo);
        let target = dir.path().join("project");

        let mut runner = MockScriptRunner::new();
        runner.expect_run().times(1).returning(|project, _| {
            Err(Error::ScriptExecutionFailed {
                script: project.join(".skelly/post-install.sh"),
                source: anyhow::anyhow!("exit status: 3"),
            })
        });

        let parsed = CreateArgs::try_parse_from(["create", "app", target.to_str().unwrap()]).unwrap();
        let err = command(runner).run(&parsed, &config).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ScriptExecutionFailed { .. })
        ));
        // The project is still unpacked
        assert!(target.join("README.md").exists());
    }

    #[tokio::test]
    async fn test_create_from_mapping_bypasses_cache() {
        // --- Setup ---
        let mut server = Server::new_async().await;
        let body = zip_bytes(&[("web/index.html", "<html></html>")]).unwrap();
        let mock = server
            .mock("GET", "/web.zip")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_support::config(&dir.path().join("home"), "https://unused.example");
        config
            .set_raw("templates.mappings.web", &format!("{}/web.zip", server.url()))
            .unwrap();
        let target = dir.path().join("site");

        let mut runner = MockScriptRunner::new();
        runner
            .expect_run()
            .withf(|_, context| context.template == "web" && context.version.is_none())
            .returning(|_, _| Ok(false));

        // --- Execute ---
        let args = test_support::args(&["web", target.to_str().unwrap()]);
        let code = command(runner)
            .execute(&args, &GlobalOptions::default(), &config)
            .await;

        // --- Verify ---
        assert_eq!(code, EXIT_SUCCESS);
        mock.assert_async().await;
        assert!(target.join("index.html").exists());
        let cache = build_cache(&config, Arc::new(RealRuntime)).unwrap();
        assert!(cache.cached_packages().unwrap().is_empty());
        assert_eq!(fs::read_dir(cache.root().join(".tmp")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_create_usage_error() {
        let runner = MockScriptRunner::new();
        let dir = tempfile::tempdir().unwrap();
        let config = test_support::config(dir.path(), "https://repo.example");

        let code = command(runner)
            .execute(&test_support::args(&[]), &GlobalOptions::default(), &config)
            .await;

        assert_eq!(code, EXIT_USAGE);
    }
}

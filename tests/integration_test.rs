use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::Server;
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::tempdir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn create_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Write `<home>/config.toml` pointing the primary repository at `url`.
fn write_config(home: &Path, url: &str) {
    fs::create_dir_all(home).unwrap();
    let mut file = File::create(home.join("config.toml")).unwrap();
    writeln!(file, "[repositories.primary]\nurl = \"{}\"", url).unwrap();
}

/// A repository directory publishing `app` 1.0.0.
fn file_repository(root: &Path) -> String {
    fs::create_dir_all(root.join("app")).unwrap();
    fs::write(
        root.join("index.json"),
        r#"{"packages":["app"]}"#,
    )
    .unwrap();
    fs::write(
        root.join("app/versions.json"),
        r#"{"name":"app","versions":["1.0.0"],"description":"Demo app"}"#,
    )
    .unwrap();
    fs::write(
        root.join("app/app-1.0.0.zip"),
        create_zip(&[("app-1.0.0/README.md", "from file repo")]),
    )
    .unwrap();
    url::Url::from_directory_path(root).unwrap().to_string()
}

fn skelly(home: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("skelly"));
    cmd.env("SKELLY_HOME", home).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_end_to_end_create_over_http() {
    let mut server = Server::new();
    let url = server.url();

    let _mock_versions = server
        .mock("GET", "/app/versions.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"name":"app","versions":["1.0.0","1.2.0","1.10.0"]}"#)
        .create();

    let script = "echo \"$SKELLY_TEMPLATE $SKELLY_VERSION $SKELLY_PROP_GROUP\" > generated.txt\n";
    let mock_download = server
        .mock("GET", "/app/app-1.10.0.zip")
        .with_status(200)
        .with_body(create_zip(&[
            ("app-1.10.0/README.md", "hello"),
            ("app-1.10.0/.skelly/post-install.sh", script),
        ]))
        .expect(1)
        .create();

    let dir = tempdir().unwrap();
    let home = dir.path().join("home");
    write_config(&home, &url);
    let project = dir.path().join("my-app");

    skelly(&home)
        .arg("create")
        .arg("app")
        .arg(&project)
        .args(["-P", "group=com.example"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Created app"));

    mock_download.assert();
    assert_eq!(fs::read_to_string(project.join("README.md")).unwrap(), "hello");
    assert!(home.join("templates/app/app-1.10.0.zip").exists());
    #[cfg(unix)]
    {
        assert_eq!(
            fs::read_to_string(project.join("generated.txt")).unwrap(),
            "app 1.10.0 com.example\n"
        );
        assert!(!project.join(".skelly").exists());
    }

    // A second project of the same version comes from the cache, offline
    let second = dir.path().join("second");
    skelly(&home)
        .args(["--offline", "create", "app", "1.10.0"])
        .arg(&second)
        .assert()
        .success();
    assert!(second.join("README.md").exists());
    mock_download.assert();
}

#[test]
fn test_create_from_file_repository_and_list() {
    let dir = tempdir().unwrap();
    let home = dir.path().join("home");
    let repo = file_repository(&dir.path().join("repo"));
    write_config(&home, &repo);
    let project = dir.path().join("project");

    skelly(&home)
        .arg("create")
        .arg("app")
        .arg(&project)
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(project.join("README.md")).unwrap(),
        "from file repo"
    );

    skelly(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicates::str::contains("app"));

    skelly(&home)
        .args(["list", "--cached"])
        .assert()
        .success()
        .stdout(predicates::str::contains("app  1.0.0"));

    skelly(&home)
        .args(["info", "app"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Description: Demo app"))
        .stdout(predicates::str::contains("Cached: 1.0.0"));

    skelly(&home)
        .args(["cache", "clear", "app"])
        .assert()
        .success();
    assert!(!home.join("templates/app").exists());
}

#[test]
fn test_create_failures() {
    let dir = tempdir().unwrap();
    let home = dir.path().join("home");
    let repo = file_repository(&dir.path().join("repo"));
    write_config(&home, &repo);

    skelly(&home)
        .arg("create")
        .arg("nope")
        .arg(dir.path().join("a"))
        .assert()
        .code(1)
        .stderr(predicates::str::contains("No template found with name 'nope'"));
    assert!(!dir.path().join("a").exists());

    skelly(&home)
        .args(["create", "app", "9.9.9"])
        .arg(dir.path().join("b"))
        .assert()
        .code(1)
        .stderr(predicates::str::contains(
            "No version '9.9.9' of template 'app' found",
        ));

    let occupied = dir.path().join("occupied");
    fs::create_dir_all(&occupied).unwrap();
    fs::write(occupied.join("keep.txt"), "keep").unwrap();
    skelly(&home)
        .arg("create")
        .arg("app")
        .arg(&occupied)
        .assert()
        .code(1)
        .stderr(predicates::str::contains("already exists and is not empty"));
}

#[test]
fn test_offline_without_cache() {
    let dir = tempdir().unwrap();
    let home = dir.path().join("home");
    let repo = file_repository(&dir.path().join("repo"));
    write_config(&home, &repo);

    skelly(&home)
        .args(["--offline", "create", "app"])
        .arg(dir.path().join("project"))
        .assert()
        .code(1)
        .stderr(predicates::str::contains("No template found with name 'app'"));
}

#[test]
fn test_config_set_and_show() {
    let dir = tempdir().unwrap();
    let home = dir.path().join("home");

    skelly(&home)
        .args(["config", "set", "http.timeout", "5"])
        .assert()
        .success();

    skelly(&home)
        .args(["config", "show", "http.timeout"])
        .assert()
        .success()
        .stdout("5\n");

    // Environment wins over the managed file
    skelly(&home)
        .env("SKELLY_HTTP_TIMEOUT", "7")
        .args(["config", "show", "http.timeout"])
        .assert()
        .success()
        .stdout("7\n");

    skelly(&home)
        .args(["config", "set", "repositories.primary.url", "not a url"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains(
            "The value 'not a url' for configuration setting 'repositories.primary.url' is invalid",
        ));

    skelly(&home)
        .args(["config", "set", "logLevel", "debug"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains(
            "The configuration setting 'logLevel' is not recognized",
        ));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let dir = tempdir().unwrap();
    let home = dir.path().join("home");
    fs::create_dir_all(&home).unwrap();
    fs::write(home.join("config.toml"), "[http]\ntimeout = \"soon\"\n").unwrap();

    skelly(&home)
        .args(["config", "list"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("http.timeout"));
}

#[test]
fn test_usage_errors() {
    let dir = tempdir().unwrap();
    let home = dir.path().join("home");

    skelly(&home)
        .assert()
        .code(2)
        .stderr(predicates::str::contains("create"));

    skelly(&home)
        .arg("frobnicate")
        .assert()
        .code(2)
        .stderr(predicates::str::contains("unknown command 'frobnicate'"));

    skelly(&home).args(["create"]).assert().code(2);
}

#[test]
fn test_help_and_version() {
    let dir = tempdir().unwrap();
    let home = dir.path().join("home");

    skelly(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::starts_with("skelly "));

    skelly(&home)
        .args(["help", "create"])
        .assert()
        .success()
        .stdout(predicates::str::contains("KEY=VALUE"));

    skelly(&home)
        .args(["create", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("templates.mappings"));
}

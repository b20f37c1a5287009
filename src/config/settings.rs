//! Built-in setting descriptors.

use std::path::Path;

use url::Url;

use super::converter::{Converter, SettingValue};

pub const PRIMARY_REPOSITORY: &str = "repositories.primary.url";
pub const MIRROR_REPOSITORIES: &str = "repositories.mirrors";
pub const CACHE_DIR: &str = "cache.dir";
pub const OFFLINE: &str = "options.offline";
pub const LOG_LEVEL: &str = "options.logLevel";
pub const HTTP_PROXY: &str = "http.proxy";
pub const HTTP_TIMEOUT: &str = "http.timeout";
pub const GIT_NAME: &str = "git.name";
pub const GIT_EMAIL: &str = "git.email";
pub const TEMPLATE_MAPPINGS: &str = "templates.mappings";

pub const DEFAULT_REPOSITORY_URL: &str =
    "https://raw.githubusercontent.com/skelly-templates/registry/main";
pub const DEFAULT_TIMEOUT_SECS: i64 = 30;
pub const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Binds a setting name (or a `prefix.*` pattern) to its converter and default.
#[derive(Debug, Clone)]
pub struct SettingDescriptor {
    pub name: String,
    pub converter: Converter,
    pub default: Option<SettingValue>,
    pub description: &'static str,
}

impl SettingDescriptor {
    pub fn new(name: impl Into<String>, converter: Converter, description: &'static str) -> Self {
        Self {
            name: name.into(),
            converter,
            default: None,
            description,
        }
    }

    pub fn with_default(mut self, default: SettingValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.name.ends_with(".*")
    }

    /// Whether this descriptor covers `name`.
    pub fn matches(&self, name: &str) -> bool {
        match self.name.strip_suffix('*') {
            Some(prefix) => name
                .strip_prefix(prefix)
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('.')),
            None => self.name == name,
        }
    }
}

/// The settings every configuration starts with. `home` is the skelly home
/// directory that relative defaults hang off.
pub fn builtin_settings(home: &Path) -> Vec<SettingDescriptor> {
    let mut settings = Vec::new();

    let primary = SettingDescriptor::new(
        PRIMARY_REPOSITORY,
        Converter::Url,
        "First template repository searched",
    );
    settings.push(match Url::parse(DEFAULT_REPOSITORY_URL) {
        Ok(url) => primary.with_default(SettingValue::Url(url)),
        Err(_) => primary,
    });

    settings.push(
        SettingDescriptor::new(
            MIRROR_REPOSITORIES,
            Converter::UrlList,
            "Further template repositories, searched in order",
        )
        .with_default(SettingValue::UrlList(Vec::new())),
    );

    settings.push(
        SettingDescriptor::new(CACHE_DIR, Converter::Text, "Template cache directory")
            .with_default(SettingValue::Text(
                home.join("templates").to_string_lossy().into_owned(),
            )),
    );

    settings.push(
        SettingDescriptor::new(
            OFFLINE,
            Converter::Boolean,
            "Resolve from the local cache only",
        )
        .with_default(SettingValue::Boolean(false)),
    );

    settings.push(
        SettingDescriptor::new(LOG_LEVEL, Converter::Choice(LOG_LEVELS), "Log verbosity")
            .with_default(SettingValue::Choice("warn".to_string())),
    );

    settings.push(SettingDescriptor::new(
        HTTP_PROXY,
        Converter::Url,
        "Proxy used for all HTTP requests",
    ));

    settings.push(
        SettingDescriptor::new(
            HTTP_TIMEOUT,
            Converter::Integer { min: 0 },
            "Seconds allowed per network operation (0 = no limit)",
        )
        .with_default(SettingValue::Integer(DEFAULT_TIMEOUT_SECS)),
    );

    settings.push(SettingDescriptor::new(
        GIT_NAME,
        Converter::Text,
        "Author name passed to post-install scripts",
    ));

    settings.push(SettingDescriptor::new(
        GIT_EMAIL,
        Converter::Text,
        "Author email passed to post-install scripts",
    ));

    settings.push(SettingDescriptor::new(
        format!("{}.*", TEMPLATE_MAPPINGS),
        Converter::Url,
        "Alias for a template package hosted at a URL",
    ));

    settings
}

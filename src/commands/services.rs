//! Service factory for building command dependencies.
//!
//! Commands never construct HTTP clients, repositories or caches themselves;
//! they are built here from configuration values.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use reqwest::{Client, Proxy};
use url::Url;

use crate::cache::Cache;
use crate::config::Configuration;
use crate::config::settings::{
    CACHE_DIR, HTTP_PROXY, HTTP_TIMEOUT, MIRROR_REPOSITORIES, OFFLINE, PRIMARY_REPOSITORY,
    TEMPLATE_MAPPINGS,
};
use crate::http::HttpClient;
use crate::repository::{Repository, repository_for};
use crate::resolver::Resolver;
use crate::runtime::Runtime;

/// Build an HTTP client honouring `http.proxy` and `http.timeout`
pub fn build_http_client(config: &Configuration) -> Result<HttpClient> {
    let mut builder = Client::builder().user_agent("skelly-cli");

    if let Some(proxy) = config.url(HTTP_PROXY)? {
        debug!("HTTP client configured with proxy {}", proxy);
        builder = builder
            .proxy(Proxy::all(proxy.as_str()).with_context(|| format!("Invalid proxy {}", proxy))?);
    }

    match config.integer(HTTP_TIMEOUT)? {
        Some(secs) if secs > 0 => {
            builder = builder.timeout(Duration::from_secs(secs as u64));
        }
        _ => debug!("HTTP client configured without timeout"),
    }

    Ok(HttpClient::new(builder.build()?))
}

/// The primary repository followed by the mirrors, without duplicates.
pub fn repository_urls(config: &Configuration) -> Result<Vec<Url>> {
    let mut urls = Vec::new();
    if let Some(primary) = config.url(PRIMARY_REPOSITORY)? {
        urls.push(primary);
    }
    for mirror in config.urls(MIRROR_REPOSITORIES)? {
        if !urls.contains(&mirror) {
            urls.push(mirror);
        }
    }
    Ok(urls)
}

/// Build the configured repositories, in search order
pub fn build_repositories<R: Runtime + 'static>(
    config: &Configuration,
    http_client: &HttpClient,
    runtime: Arc<R>,
) -> Result<Vec<Arc<dyn Repository>>> {
    repository_urls(config)?
        .iter()
        .map(|url| repository_for(url, http_client, runtime.clone()))
        .collect()
}

pub fn cache_dir(config: &Configuration) -> Result<PathBuf> {
    config
        .text(CACHE_DIR)?
        .map(PathBuf::from)
        .with_context(|| format!("Setting '{}' has no value", CACHE_DIR))
}

pub fn build_cache<R: Runtime>(config: &Configuration, runtime: Arc<R>) -> Result<Cache<R>> {
    Ok(Cache::new(runtime, cache_dir(config)?))
}

/// Build a resolver over the configured cache and repositories
pub fn build_resolver<R: Runtime + 'static>(
    config: &Configuration,
    runtime: Arc<R>,
) -> Result<Resolver<R>> {
    let http_client = build_http_client(config)?;
    let repositories = build_repositories(config, &http_client, runtime.clone())?;
    let offline = config.boolean(OFFLINE)?;
    Ok(Resolver::new(
        build_cache(config, runtime)?,
        repositories,
        offline,
    ))
}

/// The direct package URL an alias in `templates.mappings` points at.
pub fn template_mapping(config: &Configuration, alias: &str) -> Option<Url> {
    config
        .sub_settings(TEMPLATE_MAPPINGS)
        .get(alias)
        .and_then(|value| value.as_url().cloned())
}

//! HTTP client with JSON fetches and streamed downloads.
//!
//! Every operation is a single attempt: a failed request is reported to the
//! caller, which decides what the failure means.

use anyhow::{Context, Result};
use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::io::Write;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Performs a GET request and deserializes the JSON response.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_optional(url)
            .await?
            .with_context(|| format!("Not found: {}", url))
    }

    /// Like [`HttpClient::get_json`], but a 404 response yields `None`.
    #[tracing::instrument(skip(self))]
    pub async fn get_json_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!("GET JSON from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("{} returned 404", url);
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .with_context(|| format!("Request to {} failed", url))?;

        let result = response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))?;

        Ok(Some(result))
    }

    /// Downloads a URL into the writer returned by `create_writer`.
    /// The writer is only created once the server has answered successfully.
    #[tracing::instrument(skip(self, create_writer))]
    pub async fn download_file<W, F>(&self, url: &str, create_writer: F) -> Result<u64>
    where
        W: Write,
        F: FnOnce() -> Result<W>,
    {
        debug!("Downloading file from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to start download from {}", url))?;

        let mut response = response
            .error_for_status()
            .with_context(|| format!("Download from {} failed", url))?;

        let mut writer = create_writer()?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().context("Failed to flush download")?;

        debug!(
            "Downloaded {:.2} KB",
            downloaded_bytes as f64 / 1024.0
        );

        Ok(downloaded_bytes)
    }
}

//! HTTP backends speaking JSON to the remote record and config service.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `POST {base}/tables/{table}/scan` with a [`ScanRequest`] body, answered
//!   with a [`ScanPage`];
//! - `GET {base}/configs/{key}` answered with a [`ViewConfigBlob`], or 404
//!   when no blob exists;
//! - `PUT {base}/configs/{key}` with a [`ViewConfigBlob`] body.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use viewgrid_core::{ScanPage, ScanRequest, ViewConfigBlob};

use crate::config::SyncConfig;
use crate::traits::{RecordSource, ViewConfigStore};

fn build_client(config: &SyncConfig) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("failed to create HTTP client")
}

fn parse_base_url(base_url: &str) -> anyhow::Result<Url> {
    let url = Url::parse(base_url).with_context(|| format!("invalid base URL {base_url}"))?;
    if url.cannot_be_a_base() {
        anyhow::bail!("base URL {base_url} cannot carry a path");
    }
    Ok(url)
}

/// Appends `segments` to `base`, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

async fn check_status(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("status {status}: {body}")
}

/// Record source backed by the remote scan endpoint.
pub struct HttpRecordSource {
    client: Client,
    base_url: Url,
}

impl HttpRecordSource {
    /// Creates a source for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be created.
    pub fn new(config: &SyncConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: parse_base_url(&config.base_url)?,
        })
    }

    fn scan_url(&self, table: &str) -> Url {
        endpoint(&self.base_url, &["tables", table, "scan"])
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn scan(&self, table: &str, request: &ScanRequest) -> anyhow::Result<ScanPage> {
        let url = self.scan_url(table);
        tracing::debug!(table, url = %url, start = request.start, "scan request");
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("scan of {table} failed"))?;
        let page = check_status(response)
            .await?
            .json::<ScanPage>()
            .await
            .with_context(|| format!("scan of {table} returned an unreadable page"))?;
        Ok(page)
    }
}

/// View config store backed by the remote config endpoint.
pub struct HttpViewConfigStore {
    client: Client,
    base_url: Url,
}

impl HttpViewConfigStore {
    /// Creates a store for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be created.
    pub fn new(config: &SyncConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: parse_base_url(&config.base_url)?,
        })
    }

    fn config_url(&self, key: &str) -> Url {
        endpoint(&self.base_url, &["configs", key])
    }
}

#[async_trait]
impl ViewConfigStore for HttpViewConfigStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .get(self.config_url(key))
            .send()
            .await
            .with_context(|| format!("loading view config {key} failed"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let blob = check_status(response)
            .await?
            .json::<ViewConfigBlob>()
            .await
            .with_context(|| format!("view config {key} is not a config blob"))?;
        Ok(Some(blob.content))
    }

    async fn store(&self, key: &str, content: &str) -> anyhow::Result<()> {
        let blob = ViewConfigBlob {
            name: key.to_string(),
            content: content.to_string(),
        };
        let response = self
            .client
            .put(self.config_url(key))
            .json(&blob)
            .send()
            .await
            .with_context(|| format!("storing view config {key} failed"))?;
        check_status(response).await?;
        Ok(())
    }
}

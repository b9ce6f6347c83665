//! HTTP transport to the media server's config/control API (spec §4.1,
//! §6.1). The trait exists solely so `PathManager`/`StreamManager` can
//! be unit tested against a mock instead of a live server.

use crate::error::{MediaServerError, Result};
use crate::types::{PathConfiguration, RuntimePath};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// The single constant that names the media server's control-plane API
/// version (spec §6.1): changing it replaces every endpoint at once.
pub const API_VERSION: &str = "v3";

/// The subset of the media server's HTTP API this core depends on.
/// `MediaServerClient` is the production implementation; tests supply
/// a `mockall`-generated mock instead.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaServerTransport: Send + Sync {
    async fn add_path(&self, name: &str, config: &PathConfiguration) -> Result<()>;
    async fn patch_path(&self, name: &str, config: &PathConfiguration) -> Result<()>;
    async fn delete_path(&self, name: &str) -> Result<()>;
    async fn get_path_config(&self, name: &str) -> Result<PathConfiguration>;
    async fn list_path_configs(&self) -> Result<Vec<(String, PathConfiguration)>>;
    async fn get_runtime_path(&self, name: &str) -> Result<RuntimePath>;
    async fn list_runtime_paths(&self) -> Result<Vec<RuntimePath>>;
    /// Implemented as a list-paths GET (spec §4.1): any 2xx, including
    /// an empty array, means the media server is healthy.
    async fn health_check(&self) -> Result<()>;
}

/// `reqwest`-backed implementation talking to the media server's
/// `/v3/config/paths/*` and `/v3/paths/*` endpoints.
#[derive(Debug, Clone)]
pub struct MediaServerClient {
    http: reqwest::Client,
    base_url: String,
}

impl MediaServerClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MediaServerError::Transport {
                status: 0,
                endpoint: "client-init".to_string(),
                method: "N/A".to_string(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{API_VERSION}{}", self.base_url, path)
    }

    async fn send_config(
        &self,
        method: reqwest::Method,
        endpoint: String,
        body: Option<&PathConfiguration>,
    ) -> Result<()> {
        let mut req = self.http.request(method.clone(), &endpoint);
        if let Some(cfg) = body {
            req = req.json(cfg);
        }
        let resp = req.send().await.map_err(|e| MediaServerError::Transport {
            status: 0,
            endpoint: endpoint.clone(),
            method: method.to_string(),
            detail: e.to_string(),
        })?;
        classify_status(resp, &endpoint, method.as_str()).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let resp = self
            .http
            .get(endpoint)
            .send()
            .await
            .map_err(|e| MediaServerError::Transport {
                status: 0,
                endpoint: endpoint.to_string(),
                method: "GET".to_string(),
                detail: e.to_string(),
            })?;
        if !resp.status().is_success() {
            classify_status(resp, endpoint, "GET").await?;
            unreachable!("classify_status returns Err for non-success status");
        }
        resp.json().await.map_err(|e| MediaServerError::Transport {
            status: 0,
            endpoint: endpoint.to_string(),
            method: "GET".to_string(),
            detail: format!("decode error: {e}"),
        })
    }
}

async fn classify_status(resp: reqwest::Response, endpoint: &str, method: &str) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let detail = resp
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    match status {
        StatusCode::NOT_FOUND => Err(MediaServerError::NotFound {
            endpoint: endpoint.to_string(),
            detail,
        }),
        StatusCode::CONFLICT => Err(MediaServerError::AlreadyExists {
            endpoint: endpoint.to_string(),
            detail,
        }),
        _ => Err(MediaServerError::Transport {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            detail,
        }),
    }
}

#[derive(serde::Deserialize)]
struct ConfigListItem {
    name: String,
    #[serde(flatten)]
    config: PathConfiguration,
}

#[derive(serde::Deserialize)]
struct ConfigListResponse {
    items: Vec<ConfigListItem>,
}

#[derive(serde::Deserialize)]
struct RuntimeListResponse {
    items: Vec<RuntimePath>,
}

#[async_trait]
impl MediaServerTransport for MediaServerClient {
    async fn add_path(&self, name: &str, config: &PathConfiguration) -> Result<()> {
        let endpoint = self.endpoint(&format!("/config/paths/add/{name}"));
        self.send_config(reqwest::Method::POST, endpoint, Some(config)).await
    }

    async fn patch_path(&self, name: &str, config: &PathConfiguration) -> Result<()> {
        let endpoint = self.endpoint(&format!("/config/paths/patch/{name}"));
        self.send_config(reqwest::Method::PATCH, endpoint, Some(config)).await
    }

    async fn delete_path(&self, name: &str) -> Result<()> {
        let endpoint = self.endpoint(&format!("/config/paths/delete/{name}"));
        self.send_config(reqwest::Method::DELETE, endpoint, None).await
    }

    async fn get_path_config(&self, name: &str) -> Result<PathConfiguration> {
        let endpoint = self.endpoint(&format!("/config/paths/get/{name}"));
        self.get_json(&endpoint).await
    }

    async fn list_path_configs(&self) -> Result<Vec<(String, PathConfiguration)>> {
        // The media server's list endpoint is paginated; this core only
        // ever queries small device counts, so a single page suffices.
        let endpoint = self.endpoint("/config/paths/list");
        let parsed: ConfigListResponse = self.get_json(&endpoint).await?;
        Ok(parsed.items.into_iter().map(|i| (i.name, i.config)).collect())
    }

    async fn get_runtime_path(&self, name: &str) -> Result<RuntimePath> {
        let endpoint = self.endpoint(&format!("/paths/get/{name}"));
        self.get_json(&endpoint).await
    }

    async fn list_runtime_paths(&self) -> Result<Vec<RuntimePath>> {
        let endpoint = self.endpoint("/paths/list");
        let parsed: RuntimeListResponse = self.get_json(&endpoint).await?;
        Ok(parsed.items)
    }

    async fn health_check(&self) -> Result<()> {
        self.list_runtime_paths().await.map(|_| ())
    }
}

use crate::client::{ClientFactory, EntityClient};
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use extract::EntityKind;
use reqwest::{StatusCode, Url, header};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://yzapi.yazio.com";

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl RequestError {
    /// Transport errors, rate limiting and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            RequestError::Transport(_) => true,
            RequestError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

fn path_segment(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Product => "products",
        EntityKind::Recipe => "recipes",
    }
}

/// Authenticated client for the v9 products/recipes endpoints
pub struct HttpClient {
    base_url: Url,
    token: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(settings: &ApiSettings, token: String) -> Result<Self> {
        let base_url = Url::parse(&settings.base_url)
            .with_context(|| format!("Invalid API base URL: {}", settings.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot carry a path: {}", settings.base_url);
        }

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            token,
            client,
            retry: settings.retry.clone(),
        })
    }

    pub fn entity_url(&self, kind: EntityKind, id: &str) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v9", path_segment(kind), id]);
        }
        url
    }

    async fn get_once(&self, url: &Url) -> Result<String, RequestError> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RequestError::Status { status, body });
        }

        Ok(body)
    }

    async fn get_entity(&self, kind: EntityKind, id: &str) -> Result<String> {
        let url = self.entity_url(kind, id);
        let url = &url;
        let operation = format!("get_{}", kind);

        self.retry
            .retry_when(&operation, || self.get_once(url), RequestError::is_retryable)
            .await
            .with_context(|| format!("Failed to fetch {} {}", kind, id))
    }
}

impl EntityClient for HttpClient {
    async fn get_product(&self, id: &str) -> Result<String> {
        self.get_entity(EntityKind::Product, id).await
    }

    async fn get_recipe(&self, id: &str) -> Result<String> {
        self.get_entity(EntityKind::Recipe, id).await
    }
}

/// Builds a fresh [`HttpClient`] (own connection pool) for every worker
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    settings: ApiSettings,
    token: String,
}

impl HttpClientFactory {
    pub fn new(settings: ApiSettings, token: String) -> Self {
        Self { settings, token }
    }

    /// Reads a bearer token written by the login step
    pub fn from_token_file(path: &Path, settings: ApiSettings) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file: {:?}", path))?;
        let token = raw.trim();
        if token.is_empty() {
            anyhow::bail!("Token file is empty: {:?}", path);
        }
        Ok(Self::new(settings, token.to_string()))
    }
}

impl ClientFactory for HttpClientFactory {
    type Client = HttpClient;

    fn new_client(&self) -> Result<HttpClient> {
        HttpClient::new(&self.settings, self.token.clone())
    }
}

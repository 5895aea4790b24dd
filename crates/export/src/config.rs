use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use yzapi::{ApiSettings, RetryPolicy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    Fast,      // Short timeouts, one retry
    #[default]
    Balanced,  // Default timeouts and retries
    Gentle,    // Long backoff for a rate-limited API
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Concurrent fetches per entity kind
    pub max_workers: usize,
    pub api: ApiConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: yzapi::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 5000,
        }
    }
}

impl ExportConfig {
    /// Short timeouts and a single retry; fails fast on a flaky connection
    pub fn fast_mode() -> Self {
        Self {
            api: ApiConfig {
                request_timeout_secs: 15,
                ..ApiConfig::default()
            },
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 250,
                max_backoff_ms: 1000,
            },
            ..Self::default()
        }
    }

    /// Longer timeouts and backoff, for when the API starts rate limiting
    pub fn gentle_mode() -> Self {
        Self {
            api: ApiConfig {
                request_timeout_secs: 60,
                ..ApiConfig::default()
            },
            retry: RetryConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            ..Self::default()
        }
    }

    pub fn for_mode(mode: ExportMode) -> Self {
        match mode {
            ExportMode::Balanced => Self::default(),
            ExportMode::Fast => Self::fast_mode(),
            ExportMode::Gentle => Self::gentle_mode(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be at least 1");
        }
        if self.api.request_timeout_secs == 0 {
            anyhow::bail!("api.request_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            base_url: self.api.base_url.clone(),
            request_timeout: Duration::from_secs(self.api.request_timeout_secs),
            retry: RetryPolicy::new(
                self.retry.max_retries,
                self.retry.initial_backoff_ms,
                self.retry.max_backoff_ms,
            ),
        }
    }
}

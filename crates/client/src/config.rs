use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const API_URL_ENV: &str = "RESEARCH_API_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub health: HealthConfig,
    pub cache: CacheConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub health_path: String,
    /// Document and query calls; query answering is slow.
    pub request_timeout_secs: u64,
    pub health_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub poll_interval_secs: u64,
    pub stale_secs: u64,
    pub max_attempts: usize,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Zero means every read of the document list revalidates.
    pub documents_stale_secs: u64,
    pub query_stale_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub tick_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api".to_string(),
            health_path: "/health".to_string(),
            request_timeout_secs: 60,
            health_timeout_secs: 5,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            stale_secs: 10,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            documents_stale_secs: 0,
            query_stale_secs: 300,
            max_entries: 1000,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { tick_ms: 1000 }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

impl HealthConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl CacheConfig {
    pub fn documents_stale_after(&self) -> Duration {
        Duration::from_secs(self.documents_stale_secs)
    }

    pub fn query_stale_after(&self) -> Duration {
        Duration::from_secs(self.query_stale_secs)
    }
}

impl ProgressConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into();
        self
    }

    pub fn with_env_overrides(self) -> Self {
        match std::env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => self.with_base_url(url.trim()),
            _ => self,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            bail!("api.base_url must not be empty");
        }
        if self.api.request_timeout_secs == 0 || self.api.health_timeout_secs == 0 {
            bail!("request timeouts must be greater than zero");
        }
        if self.api.health_timeout_secs >= self.api.request_timeout_secs {
            bail!(
                "api.health_timeout_secs ({}) must be shorter than api.request_timeout_secs ({})",
                self.api.health_timeout_secs,
                self.api.request_timeout_secs
            );
        }
        if self.health.max_attempts == 0 {
            bail!("health.max_attempts must be at least 1");
        }
        if self.health.poll_interval_secs == 0 {
            bail!("health.poll_interval_secs must be greater than zero");
        }
        if self.progress.tick_ms == 0 {
            bail!("progress.tick_ms must be greater than zero");
        }
        Ok(())
    }
}

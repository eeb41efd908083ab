// ABOUTME: Run settings built once at startup and passed by reference
// ABOUTME: Merges defaults, an optional TOML file and the process environment

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{CollectorError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.powerbi.com/v1.0/myorg";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Option<Credentials>,
    pub api_base: String,
    pub authority_host: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub exclude_usage_metrics: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials: None,
            api_base: DEFAULT_API_BASE.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            exclude_usage_metrics: true,
        }
    }
}

/// Shape of the optional TOML settings file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base: Option<String>,
    pub authority_host: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub exclude_usage_metrics: Option<bool>,
}

impl FileSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| CollectorError::Config(format!("invalid settings file: {}", e)))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CollectorError::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }
}

impl Settings {
    /// Loads `.env` if present, then layers the TOML file and the environment
    /// over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let file = match path {
            Some(path) => FileSettings::read(path)?,
            None => FileSettings::default(),
        };

        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(file: FileSettings, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        let tenant_id = lookup("TENANT_ID").or(file.tenant_id);
        let client_id = lookup("CLIENT_ID").or(file.client_id);
        let client_secret = lookup("CLIENT_SECRET").or(file.client_secret);

        let credentials = match (tenant_id, client_id, client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Some(Credentials {
                tenant_id,
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let api_base = lookup("PBI_API_URL")
            .or(file.api_base)
            .unwrap_or(defaults.api_base);
        let authority_host = lookup("PBI_AUTHORITY_URL")
            .or(file.authority_host)
            .unwrap_or(defaults.authority_host);

        let connect_timeout = file
            .connect_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);
        let request_timeout = file
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        if connect_timeout.is_zero() || request_timeout.is_zero() {
            return Err(CollectorError::Config(
                "timeouts must be greater than zero seconds".to_string(),
            ));
        }

        Ok(Self {
            credentials,
            api_base: api_base.trim_end_matches('/').to_string(),
            authority_host: authority_host.trim_end_matches('/').to_string(),
            connect_timeout,
            request_timeout,
            exclude_usage_metrics: file
                .exclude_usage_metrics
                .unwrap_or(defaults.exclude_usage_metrics),
        })
    }

    pub fn credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or_else(|| {
            CollectorError::Auth(
                "missing credentials: set TENANT_ID, CLIENT_ID and CLIENT_SECRET (environment, .env or settings file)"
                    .to_string(),
            )
        })
    }
}

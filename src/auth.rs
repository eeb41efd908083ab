// ABOUTME: Bearer token acquisition for the Power BI REST API
// ABOUTME: Client-credentials grant with an in-process cache, plus a fixed-token provider

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{Credentials, Settings};
use crate::error::{CollectorError, Result};

pub const POWERBI_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn acquire_token(&self) -> Result<String>;
}

/// Always hands out the same token. Useful with pre-issued tokens and in tests.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn acquire_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

pub struct ClientCredentialsProvider {
    client: Client,
    token_url: String,
    credentials: Credentials,
    cache: Mutex<Option<CachedToken>>,
}

impl ClientCredentialsProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let credentials = settings.credentials()?.clone();
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| CollectorError::Config(format!("failed to create HTTP client: {}", e)))?;

        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            settings.authority_host, credentials.tenant_id
        );

        Ok(Self {
            client,
            token_url,
            credentials,
            cache: Mutex::new(None),
        })
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", POWERBI_SCOPE),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CollectorError::Auth(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CollectorError::Auth(format!("failed to read token response: {}", e)))?;

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|_| {
            CollectorError::Auth(format!("token endpoint returned {}: {}", status, body))
        })?;

        match parsed.access_token {
            Some(token) if status.is_success() && !token.is_empty() => {
                let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(3600));
                Ok(CachedToken {
                    token,
                    expires_at: Instant::now() + lifetime,
                })
            }
            _ => {
                let reason = parsed
                    .error_description
                    .or(parsed.error)
                    .unwrap_or_else(|| format!("status {}", status));
                Err(CollectorError::Auth(format!("failed to obtain token: {}", reason)))
            }
        }
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn acquire_token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        debug!(url = %self.token_url, "requesting access token");
        let fresh = self.request_token().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

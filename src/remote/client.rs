// ABOUTME: HTTP transport used by every listing and history call
// ABOUTME: One GET per call; non-success statuses surface as upstream errors with the body

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::error::{CollectorError, Result};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues one GET and returns the decoded JSON body of a success response.
    async fn get(&self, url: &str, headers: &HeaderMap, query: &[(&str, &str)]) -> Result<Value>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| CollectorError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, headers: &HeaderMap, query: &[(&str, &str)]) -> Result<Value> {
        let mut request = self.client.get(url).headers(headers.clone());
        if !query.is_empty() {
            request = request.query(query);
        }

        debug!(%url, "GET");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CollectorError::Transport(format!("GET {} timed out: {}", url, e))
            } else {
                CollectorError::Transport(format!("GET {} failed: {}", url, e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Upstream {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| CollectorError::Parse(format!("GET {} returned invalid JSON: {}", url, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::new(&Settings::default()).unwrap()
    }

    #[test]
    fn test_client_creation() {
        assert!(HttpTransport::new(&Settings::default()).is_ok());
    }

    #[tokio::test]
    async fn test_non_success_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PowerBINotAuthorizedException"))
            .mount(&server)
            .await;

        let url = format!("{}/groups", server.uri());
        let err = transport().get(&url, &HeaderMap::new(), &[]).await.unwrap_err();
        match err {
            CollectorError::Upstream { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "PowerBINotAuthorizedException");
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let url = format!("{}/groups", server.uri());
        let err = transport().get(&url, &HeaderMap::new(), &[]).await.unwrap_err();
        assert!(matches!(err, CollectorError::Parse(_)));
    }

    #[tokio::test]
    async fn test_query_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups/g1/datasets"))
            .and(query_param("$filter", "isRefreshable eq true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/groups/g1/datasets", server.uri());
        let body = transport()
            .get(&url, &HeaderMap::new(), &[("$filter", "isRefreshable eq true")])
            .await
            .unwrap();
        assert_eq!(body["value"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/groups", listener.local_addr().unwrap());
        drop(listener);

        let err = transport().get(&url, &HeaderMap::new(), &[]).await.unwrap_err();
        assert!(matches!(err, CollectorError::Transport(_)));
    }
}

// ABOUTME: Resource listers and history fetchers for the Power BI REST API
// ABOUTME: Each call acquires a token, builds headers and delegates to the paginated fetcher

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use std::sync::Arc;
use tracing::debug;

use super::client::Transport;
use super::models::{Dataflow, Dataset, RawRefreshEntry, RawTransactionEntry, Workspace};
use super::pagination::fetch_all_pages;
use crate::auth::TokenProvider;
use crate::config::Settings;
use crate::error::{CollectorError, Result};

const REFRESHABLE_FILTER: (&str, &str) = ("$filter", "isRefreshable eq true");

#[derive(Clone)]
pub struct PowerBiApi {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    api_base: String,
    exclude_usage_metrics: bool,
}

impl PowerBiApi {
    pub fn new(
        settings: &Settings,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            transport,
            tokens,
            api_base: settings.api_base.clone(),
            exclude_usage_metrics: settings.exclude_usage_metrics,
        }
    }

    async fn headers(&self) -> Result<HeaderMap> {
        let token = self.tokens.acquire_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| CollectorError::Auth("token is not a valid header value".to_string()))?,
        );
        Ok(headers)
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let headers = self.headers().await?;
        let url = format!("{}/groups", self.api_base);
        fetch_all_pages(self.transport.as_ref(), &url, &headers, &[]).await
    }

    /// Refreshable datasets of a workspace. Usage-metrics reports are dropped
    /// unless the settings ask to keep them.
    pub async fn list_datasets(&self, workspace_id: &str) -> Result<Vec<Dataset>> {
        let headers = self.headers().await?;
        let url = format!("{}/groups/{}/datasets", self.api_base, workspace_id);
        let datasets: Vec<Dataset> =
            fetch_all_pages(self.transport.as_ref(), &url, &headers, &[REFRESHABLE_FILTER]).await?;

        if !self.exclude_usage_metrics {
            return Ok(datasets);
        }

        let total = datasets.len();
        let kept: Vec<Dataset> = datasets
            .into_iter()
            .filter(|ds| !is_usage_metrics(&ds.name))
            .collect();
        if kept.len() != total {
            debug!(%workspace_id, skipped = total - kept.len(), "skipped usage metrics datasets");
        }
        Ok(kept)
    }

    pub async fn list_dataflows(&self, workspace_id: &str) -> Result<Vec<Dataflow>> {
        let headers = self.headers().await?;
        let url = format!("{}/groups/{}/dataflows", self.api_base, workspace_id);
        fetch_all_pages(self.transport.as_ref(), &url, &headers, &[]).await
    }

    pub async fn list_dataset_refresh_history(
        &self,
        workspace_id: &str,
        dataset_id: &str,
    ) -> Result<Vec<RawRefreshEntry>> {
        let headers = self.headers().await?;
        let url = format!(
            "{}/groups/{}/datasets/{}/refreshes",
            self.api_base, workspace_id, dataset_id
        );
        fetch_all_pages(self.transport.as_ref(), &url, &headers, &[]).await
    }

    pub async fn list_dataflow_transactions(
        &self,
        workspace_id: &str,
        dataflow_id: &str,
    ) -> Result<Vec<RawTransactionEntry>> {
        let headers = self.headers().await?;
        let url = format!(
            "{}/groups/{}/dataflows/{}/transactions",
            self.api_base, workspace_id, dataflow_id
        );
        fetch_all_pages(self.transport.as_ref(), &url, &headers, &[]).await
    }
}

fn is_usage_metrics(name: &str) -> bool {
    name.to_lowercase().contains("usage metrics")
}

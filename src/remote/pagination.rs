// ABOUTME: Walks OData continuation links until the collection is exhausted
// ABOUTME: Query parameters go on the first request only; continuation links carry their own

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::client::Transport;
use super::models::Page;
use crate::error::{CollectorError, Result};

/// Fetches `start_url` and every page linked from it through `@odata.nextLink`,
/// returning the items of all pages in page order.
pub async fn fetch_all_pages<T>(
    transport: &dyn Transport,
    start_url: &str,
    headers: &HeaderMap,
    query: &[(&str, &str)],
) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let mut items = Vec::new();
    let mut next = Some(start_url.to_string());
    let mut query = query;
    let mut pages = 0usize;

    while let Some(url) = next.take() {
        let body = transport.get(&url, headers, query).await?;
        let page: Page<T> = serde_json::from_value(body).map_err(|e| {
            CollectorError::Parse(format!("unexpected page shape from {}: {}", url, e))
        })?;

        pages += 1;
        debug!(%url, page = pages, items = page.value.len(), "fetched page");

        items.extend(page.value);
        next = page.next_link.filter(|link| !link.is_empty());
        query = &[];
    }

    Ok(items)
}

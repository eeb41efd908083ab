// ABOUTME: Checks the concurrency ceiling and result ordering of the scheduler
// ABOUTME: Uses an in-memory transport that records how many calls are in flight

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pbi_refresh_history::auth::{StaticTokenProvider, TokenProvider};
use pbi_refresh_history::config::Settings;
use pbi_refresh_history::error::{CollectorError, Result};
use pbi_refresh_history::normalize::RecordDetail;
use pbi_refresh_history::remote::{PowerBiApi, Transport};
use pbi_refresh_history::scheduler::{FailurePolicy, Scheduler};

const BASE: &str = "http://fake.local/v1.0/myorg";
const WORKSPACES: usize = 3;
const DATASETS: usize = 4;
const DATAFLOWS: usize = 2;

/// Serves a synthetic tenant. Refresh histories span two pages; transactions one.
#[derive(Default)]
struct FakeService {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    history_calls: AtomicUsize,
    fail_dataset: Option<String>,
}

impl FakeService {
    fn failing(dataset_id: &str) -> Self {
        Self {
            fail_dataset: Some(dataset_id.to_string()),
            ..Self::default()
        }
    }

    fn respond(&self, url: &str) -> Result<Value> {
        if url.ends_with("/groups") {
            let value: Vec<Value> = (0..WORKSPACES)
                .map(|w| json!({"id": format!("w{}", w), "name": format!("Workspace {}", w)}))
                .collect();
            return Ok(json!({ "value": value }));
        }
        if url.ends_with("/datasets") {
            let value: Vec<Value> = (0..DATASETS)
                .map(|d| json!({"id": format!("d{}", d), "name": format!("Dataset {}", d)}))
                .collect();
            return Ok(json!({ "value": value }));
        }
        if url.ends_with("/dataflows") {
            let value: Vec<Value> = (0..DATAFLOWS)
                .map(|f| json!({"objectId": format!("f{}", f), "name": format!("Dataflow {}", f)}))
                .collect();
            return Ok(json!({ "value": value }));
        }

        self.history_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(id) = &self.fail_dataset {
            if url.contains(&format!("/datasets/{}/", id)) {
                return Err(CollectorError::Upstream {
                    url: url.to_string(),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
        }

        if url.contains("/refreshes?page=2") {
            return Ok(json!({
                "value": [{"requestId": "r3", "status": "Failed", "refreshType": "Scheduled"}]
            }));
        }
        if url.ends_with("/refreshes") {
            return Ok(json!({
                "value": [
                    {"requestId": "r1", "status": "Completed", "refreshType": "ViaApi"},
                    {"requestId": "r2", "status": "Completed", "refreshType": "OnDemand"}
                ],
                "@odata.nextLink": format!("{}?page=2", url)
            }));
        }
        if url.ends_with("/transactions") {
            return Ok(json!({ "value": [{"id": "t1", "status": "Success"}] }));
        }

        Err(CollectorError::Upstream {
            url: url.to_string(),
            status: 404,
            body: String::new(),
        })
    }
}

#[async_trait]
impl Transport for FakeService {
    async fn get(&self, url: &str, _headers: &HeaderMap, _query: &[(&str, &str)]) -> Result<Value> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let response = self.respond(url);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

/// Issues `grants` tokens, then rejects every later request.
struct ExpiringTokens {
    grants: usize,
    issued: AtomicUsize,
}

#[async_trait]
impl TokenProvider for ExpiringTokens {
    async fn acquire_token(&self) -> Result<String> {
        if self.issued.fetch_add(1, Ordering::SeqCst) < self.grants {
            Ok("tok".to_string())
        } else {
            Err(CollectorError::Auth("grant rejected".to_string()))
        }
    }
}

fn api_over(service: Arc<FakeService>) -> PowerBiApi {
    let settings = Settings {
        api_base: BASE.to_string(),
        ..Settings::default()
    };
    PowerBiApi::new(&settings, service, Arc::new(StaticTokenProvider::new("tok")))
}

#[tokio::test]
async fn in_flight_calls_never_exceed_the_limit() {
    let units = WORKSPACES * (DATASETS + DATAFLOWS);

    for limit in [1usize, 2, 3, 7, 64] {
        let service = Arc::new(FakeService::default());
        let api = api_over(service.clone());
        let max = NonZeroUsize::new(limit).unwrap();

        let collection = Scheduler::new(&api, max, FailurePolicy::FailFast)
            .collect()
            .await
            .unwrap();

        let peak = service.peak.load(Ordering::SeqCst);
        assert!(peak <= limit, "limit {} but saw {} in flight", limit, peak);
        assert_eq!(peak, limit.min(units), "limit {} should be saturated", limit);
        assert_eq!(collection.units, units);
        assert_eq!(
            collection.records.len(),
            WORKSPACES * (DATASETS * 3 + DATAFLOWS)
        );
        assert_eq!(
            service.history_calls.load(Ordering::SeqCst),
            WORKSPACES * (DATASETS * 2 + DATAFLOWS)
        );
    }
}

#[tokio::test]
async fn records_follow_unit_order_then_page_order() {
    let service = Arc::new(FakeService::default());
    let api = api_over(service);

    let collection = Scheduler::new(&api, NonZeroUsize::new(4).unwrap(), FailurePolicy::FailFast)
        .collect()
        .await
        .unwrap();

    let mut expected = Vec::new();
    for w in 0..WORKSPACES {
        for d in 0..DATASETS {
            for request in ["r1", "r2", "r3"] {
                expected.push((format!("Workspace {}", w), format!("Dataset {}", d), request.to_string()));
            }
        }
        for f in 0..DATAFLOWS {
            expected.push((format!("Workspace {}", w), format!("Dataflow {}", f), "t1".to_string()));
        }
    }

    let actual: Vec<(String, String, String)> = collection
        .records
        .iter()
        .map(|r| match &r.detail {
            RecordDetail::Dataset {
                dataset_name,
                request_id,
                ..
            } => (r.workspace.clone(), dataset_name.clone(), request_id.clone()),
            RecordDetail::Dataflow {
                dataflow_name,
                transaction_id,
                ..
            } => (r.workspace.clone(), dataflow_name.clone(), transaction_id.clone()),
        })
        .collect();

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn fail_fast_aborts_on_first_unit_error() {
    let service = Arc::new(FakeService::failing("d2"));
    let api = api_over(service);

    let err = Scheduler::new(&api, NonZeroUsize::new(3).unwrap(), FailurePolicy::FailFast)
        .collect()
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn continue_policy_reports_failed_units() {
    let service = Arc::new(FakeService::failing("d2"));
    let api = api_over(service);

    let collection = Scheduler::new(&api, NonZeroUsize::new(3).unwrap(), FailurePolicy::Continue)
        .collect()
        .await
        .unwrap();

    // d2 fails in every workspace
    assert_eq!(collection.failures.len(), WORKSPACES);
    assert!(collection
        .failures
        .iter()
        .all(|f| f.unit.resource_name() == "Dataset 2" && f.error.status() == Some(500)));
    assert_eq!(
        collection.records.len(),
        WORKSPACES * ((DATASETS - 1) * 3 + DATAFLOWS)
    );
}

#[tokio::test]
async fn continue_policy_still_aborts_on_auth_failure() {
    // one token for the workspace list, two per workspace for its catalog
    let catalog_tokens = 1 + 2 * WORKSPACES;

    for grants in [catalog_tokens, catalog_tokens + 5] {
        let service = Arc::new(FakeService::default());
        let settings = Settings {
            api_base: BASE.to_string(),
            ..Settings::default()
        };
        let tokens = Arc::new(ExpiringTokens {
            grants,
            issued: AtomicUsize::new(0),
        });
        let api = PowerBiApi::new(&settings, service.clone(), tokens);

        let err = Scheduler::new(&api, NonZeroUsize::new(1).unwrap(), FailurePolicy::Continue)
            .collect()
            .await
            .unwrap_err();

        assert!(
            matches!(&err, CollectorError::Auth(msg) if msg == "grant rejected"),
            "grants {}: expected auth error, got {:?}",
            grants,
            err
        );
        if grants == catalog_tokens {
            assert_eq!(service.history_calls.load(Ordering::SeqCst), 0);
        }
    }
}

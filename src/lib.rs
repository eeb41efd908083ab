// ABOUTME: Library entry point for the refresh history collector
// ABOUTME: Wires settings, API client, scheduler, transformer and report writer into runs

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod remote;
pub mod report;
pub mod scheduler;
pub mod transform;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::ClientCredentialsProvider;
use crate::config::Settings;
use crate::remote::{HttpTransport, PowerBiApi, Workspace};
use crate::scheduler::{FailurePolicy, Scheduler, UnitFailure};

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub output: PathBuf,
    pub timezone: String,
    pub max_concurrency: NonZeroUsize,
    pub policy: FailurePolicy,
    pub show_progress: bool,
}

#[derive(Debug)]
pub struct RunSummary {
    pub units: usize,
    pub rows: usize,
    pub failures: Vec<UnitFailure>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// API client backed by HTTPS and the client-credentials grant.
pub fn build_api(settings: &Settings) -> Result<PowerBiApi> {
    let tokens = ClientCredentialsProvider::new(settings).context("Cannot authenticate")?;
    let transport = HttpTransport::new(settings)?;
    Ok(PowerBiApi::new(settings, Arc::new(transport), Arc::new(tokens)))
}

/// Collects every history record reachable through `api`, localizes it and
/// writes the report. Nothing is written unless collection completes (or, with
/// `FailurePolicy::Continue`, unless the catalog listing succeeds).
pub async fn collect_report(api: &PowerBiApi, options: &CollectOptions) -> Result<RunSummary> {
    let tz = transform::parse_timezone(&options.timezone)?;

    let progress = if options.show_progress {
        ProgressBar::new(0)
    } else {
        ProgressBar::hidden()
    };
    let scheduler = Scheduler::new(api, options.max_concurrency, options.policy).with_progress(progress);

    let collection = scheduler
        .collect()
        .await
        .context("Failed to collect refresh history")?;

    let rows = transform::transform(&collection.records, &tz);
    report::write_report(&options.output, &rows)
        .with_context(|| format!("Failed to write {}", options.output.display()))?;

    for failure in &collection.failures {
        warn!(unit = %failure.unit, error = %failure.error, "missing from report");
    }
    info!(
        rows = rows.len(),
        units = collection.units,
        timezone = %tz,
        "refresh history report complete"
    );

    Ok(RunSummary {
        units: collection.units,
        rows: rows.len(),
        failures: collection.failures,
    })
}

pub async fn run_collect(settings: &Settings, options: &CollectOptions) -> Result<RunSummary> {
    // Reject a bad timezone before touching credentials or the network.
    transform::parse_timezone(&options.timezone)?;
    let api = build_api(settings)?;
    collect_report(&api, options).await
}

pub async fn run_list_workspaces(settings: &Settings) -> Result<Vec<Workspace>> {
    let api = build_api(settings)?;
    api.list_workspaces()
        .await
        .context("Failed to list workspaces")
}

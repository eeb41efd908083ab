// ABOUTME: Discovers every dataset/dataflow and fetches their histories with bounded concurrency
// ABOUTME: A semaphore caps in-flight history calls; results come back in scheduling order

use futures::future::{join_all, try_join_all};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::num::NonZeroUsize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::{CollectorError, Result};
use crate::normalize::{normalize, NormalizedRecord};
use crate::remote::models::{Dataflow, Dataset, RawHistoryEntry, Workspace};
use crate::remote::PowerBiApi;

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// What to do when fetching one unit's history fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Abort the whole run on the first failing unit.
    #[default]
    FailFast,
    /// Keep going, report the failed units alongside the collected records.
    /// Authentication failures still abort.
    Continue,
}

/// One history fetch: a dataset's refreshes or a dataflow's transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkUnit {
    Dataset {
        workspace: Workspace,
        dataset: Dataset,
    },
    Dataflow {
        workspace: Workspace,
        dataflow: Dataflow,
    },
}

impl WorkUnit {
    pub fn workspace(&self) -> &Workspace {
        match self {
            WorkUnit::Dataset { workspace, .. } | WorkUnit::Dataflow { workspace, .. } => workspace,
        }
    }

    pub fn resource_name(&self) -> &str {
        match self {
            WorkUnit::Dataset { dataset, .. } => &dataset.name,
            WorkUnit::Dataflow { dataflow, .. } => &dataflow.name,
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WorkUnit::Dataset { workspace, dataset } => {
                write!(f, "dataset '{}' in workspace '{}'", dataset.name, workspace.name)
            }
            WorkUnit::Dataflow {
                workspace,
                dataflow,
            } => write!(
                f,
                "dataflow '{}' in workspace '{}'",
                dataflow.name, workspace.name
            ),
        }
    }
}

#[derive(Debug)]
pub struct UnitFailure {
    pub unit: WorkUnit,
    pub error: CollectorError,
}

#[derive(Debug, Default)]
pub struct Collection {
    pub units: usize,
    pub records: Vec<NormalizedRecord>,
    pub failures: Vec<UnitFailure>,
}

pub struct Scheduler<'a> {
    api: &'a PowerBiApi,
    max_concurrency: NonZeroUsize,
    policy: FailurePolicy,
    progress: ProgressBar,
}

impl<'a> Scheduler<'a> {
    pub fn new(api: &'a PowerBiApi, max_concurrency: NonZeroUsize, policy: FailurePolicy) -> Self {
        Self {
            api,
            max_concurrency,
            policy,
            progress: ProgressBar::hidden(),
        }
    }

    /// Ticks `progress` once per finished unit.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Lists workspaces, then datasets and dataflows workspace by workspace.
    /// Listing failures always abort: without the catalog there is nothing to report.
    pub async fn plan(&self) -> Result<Vec<WorkUnit>> {
        let workspaces = self.api.list_workspaces().await?;
        info!(count = workspaces.len(), "workspaces found");

        let mut units = Vec::new();
        for workspace in workspaces {
            let datasets = self.api.list_datasets(&workspace.id).await?;
            let dataflows = self.api.list_dataflows(&workspace.id).await?;
            debug!(
                workspace = %workspace.name,
                datasets = datasets.len(),
                dataflows = dataflows.len(),
                "workspace catalog"
            );

            units.extend(datasets.into_iter().map(|dataset| WorkUnit::Dataset {
                workspace: workspace.clone(),
                dataset,
            }));
            units.extend(dataflows.into_iter().map(|dataflow| WorkUnit::Dataflow {
                workspace: workspace.clone(),
                dataflow,
            }));
        }

        Ok(units)
    }

    pub async fn collect(&self) -> Result<Collection> {
        let units = self.plan().await?;
        self.run(units).await
    }

    /// Runs every unit, at most `max_concurrency` of them inside a network call
    /// at any time. Records are flattened in unit order, then upstream order.
    pub async fn run(&self, units: Vec<WorkUnit>) -> Result<Collection> {
        let gate = Semaphore::new(self.max_concurrency.get());
        let total = units.len();
        info!(
            units = total,
            max_concurrency = self.max_concurrency.get(),
            policy = ?self.policy,
            "collecting history"
        );

        self.progress.set_length(total as u64);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
            self.progress.set_style(style);
        }

        let tasks = units.iter().map(|unit| self.run_unit(&gate, unit));

        let collection = match self.policy {
            FailurePolicy::FailFast => {
                let batches = try_join_all(tasks).await?;
                Collection {
                    units: total,
                    records: batches.into_iter().flatten().collect(),
                    failures: Vec::new(),
                }
            }
            FailurePolicy::Continue => {
                let outcomes = join_all(tasks).await;
                let mut collection = Collection {
                    units: total,
                    ..Collection::default()
                };
                for (unit, outcome) in units.iter().zip(outcomes) {
                    match outcome {
                        Ok(records) => collection.records.extend(records),
                        // Losing the token fails every later unit the same way.
                        Err(CollectorError::Auth(msg)) => {
                            self.progress.finish_and_clear();
                            error!(%unit, error = %msg, "authentication lost, aborting");
                            return Err(CollectorError::Auth(msg));
                        }
                        Err(error) => collection.failures.push(UnitFailure {
                            unit: unit.clone(),
                            error,
                        }),
                    }
                }
                collection
            }
        };

        self.progress.finish_and_clear();
        info!(
            records = collection.records.len(),
            failed_units = collection.failures.len(),
            "collection finished"
        );
        Ok(collection)
    }

    async fn run_unit(&self, gate: &Semaphore, unit: &WorkUnit) -> Result<Vec<NormalizedRecord>> {
        let fetched = {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| CollectorError::Transport("admission gate closed".to_string()))?;
            self.fetch_history(unit).await
        };
        self.progress.inc(1);

        let entries = fetched.map_err(|e| {
            match self.policy {
                FailurePolicy::FailFast => error!(%unit, error = %e, "history fetch failed"),
                FailurePolicy::Continue => warn!(%unit, error = %e, "history fetch failed, skipping"),
            }
            e
        })?;

        debug!(%unit, entries = entries.len(), "history fetched");
        let workspace = unit.workspace().name.as_str();
        let resource = unit.resource_name();
        Ok(entries
            .into_iter()
            .map(|entry| normalize(workspace, resource, entry))
            .collect())
    }

    async fn fetch_history(&self, unit: &WorkUnit) -> Result<Vec<RawHistoryEntry>> {
        match unit {
            WorkUnit::Dataset { workspace, dataset } => Ok(self
                .api
                .list_dataset_refresh_history(&workspace.id, &dataset.id)
                .await?
                .into_iter()
                .map(RawHistoryEntry::Refresh)
                .collect()),
            WorkUnit::Dataflow {
                workspace,
                dataflow,
            } => Ok(self
                .api
                .list_dataflow_transactions(&workspace.id, &dataflow.object_id)
                .await?
                .into_iter()
                .map(RawHistoryEntry::Transaction)
                .collect()),
        }
    }
}

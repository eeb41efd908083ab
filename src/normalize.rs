// ABOUTME: Maps raw refresh and transaction records into one canonical record shape
// ABOUTME: Pure and infallible: absent upstream fields default to empty values

use serde::Serialize;
use serde_json::Value;

use crate::remote::models::{RawHistoryEntry, RawRefreshEntry, RawTransactionEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    Dataset,
    Dataflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordDetail {
    Dataset {
        dataset_name: String,
        request_id: String,
        refresh_id: String,
        refresh_type: String,
        /// Raw `serviceExceptionJson` of attempt #1; parsed later by the transformer.
        error_message: String,
        attempt_count: usize,
    },
    Dataflow {
        dataflow_name: String,
        transaction_id: String,
        request_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub workspace: String,
    pub status: String,
    pub start_time: String,
    pub end_time: String,
    pub detail: RecordDetail,
}

impl NormalizedRecord {
    pub fn origin(&self) -> Origin {
        match self.detail {
            RecordDetail::Dataset { .. } => Origin::Dataset,
            RecordDetail::Dataflow { .. } => Origin::Dataflow,
        }
    }
}

pub fn normalize(workspace: &str, resource_name: &str, entry: RawHistoryEntry) -> NormalizedRecord {
    match entry {
        RawHistoryEntry::Refresh(entry) => normalize_refresh(workspace, resource_name, entry),
        RawHistoryEntry::Transaction(entry) => {
            normalize_transaction(workspace, resource_name, entry)
        }
    }
}

pub fn normalize_refresh(
    workspace: &str,
    dataset_name: &str,
    entry: RawRefreshEntry,
) -> NormalizedRecord {
    let attempts = entry.refresh_attempts.unwrap_or_default();
    let error_message = attempts
        .iter()
        .find(|attempt| attempt.is_first())
        .and_then(|attempt| attempt.service_exception_json.clone())
        .unwrap_or_default();

    NormalizedRecord {
        workspace: workspace.to_string(),
        status: entry.status.unwrap_or_default(),
        start_time: entry.start_time.unwrap_or_default(),
        end_time: entry.end_time.unwrap_or_default(),
        detail: RecordDetail::Dataset {
            dataset_name: dataset_name.to_string(),
            request_id: entry.request_id.unwrap_or_default(),
            refresh_id: value_to_string(entry.id.as_ref()),
            refresh_type: entry.refresh_type.unwrap_or_default(),
            error_message,
            attempt_count: attempts.len(),
        },
    }
}

pub fn normalize_transaction(
    workspace: &str,
    dataflow_name: &str,
    entry: RawTransactionEntry,
) -> NormalizedRecord {
    let transaction_id = entry.transaction_id.as_ref().or(entry.id.as_ref());

    NormalizedRecord {
        workspace: workspace.to_string(),
        status: entry.status.unwrap_or_default(),
        start_time: entry.start_time.unwrap_or_default(),
        end_time: entry.end_time.unwrap_or_default(),
        detail: RecordDetail::Dataflow {
            dataflow_name: dataflow_name.to_string(),
            transaction_id: value_to_string(transaction_id),
            request_id: entry.request_id.unwrap_or_default(),
        },
    }
}

fn value_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

// ABOUTME: Turns normalized records into the localized, classified report rows
// ABOUTME: Timestamp parsing, local formatting, duration, status and error-text extraction

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CollectorError, Result};
use crate::normalize::{NormalizedRecord, Origin, RecordDetail};

pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";
pub const LOCAL_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Sucesso,
    Falha,
    Cancelado,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshKind {
    #[serde(rename = "API")]
    Api,
    #[serde(rename = "Agendamento")]
    Scheduled,
    #[serde(rename = "Sob Demanda")]
    OnDemand,
}

/// One row of the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origem")]
pub enum TransformedRecord {
    Dataset {
        workspace: String,
        dataset_name: String,
        status: RunStatus,
        #[serde(rename = "tipo_refresh")]
        refresh_kind: RefreshKind,
        #[serde(rename = "data_inicio")]
        started_at: String,
        #[serde(rename = "data_fim")]
        ended_at: String,
        duration_seconds: Option<i64>,
        #[serde(rename = "erro")]
        error: String,
        #[serde(rename = "attemptCount")]
        attempt_count: usize,
    },
    Dataflow {
        workspace: String,
        dataflow_name: String,
        status: RunStatus,
        #[serde(rename = "data_inicio")]
        started_at: String,
        #[serde(rename = "data_fim")]
        ended_at: String,
        duration_seconds: Option<i64>,
    },
}

impl TransformedRecord {
    pub fn origin(&self) -> Origin {
        match self {
            TransformedRecord::Dataset { .. } => Origin::Dataset,
            TransformedRecord::Dataflow { .. } => Origin::Dataflow,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            TransformedRecord::Dataset { status, .. } | TransformedRecord::Dataflow { status, .. } => {
                *status
            }
        }
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        match self {
            TransformedRecord::Dataset {
                duration_seconds, ..
            }
            | TransformedRecord::Dataflow {
                duration_seconds, ..
            } => *duration_seconds,
        }
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| CollectorError::Config(format!("unknown timezone '{}': {}", name, e)))
}

/// Parses an ISO-8601 timestamp. A trailing `Z` means UTC; timestamps without
/// any offset are taken as UTC as well. Date and time may be separated by `T`
/// or a space, and a bare date means midnight UTC. Empty or malformed input
/// gives `None`.
pub fn parse_iso(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let normalized = match raw.strip_suffix('Z').or_else(|| raw.strip_suffix('z')) {
        Some(stripped) => format!("{}+00:00", stripped),
        None => raw.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Some(dt);
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(Utc.from_utc_datetime(&naive).into());
        }
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).into())
}

/// Formats an ISO timestamp as `DD-MM-YYYY HH:MM:SS` civil time in `tz`;
/// empty string when the timestamp does not parse.
pub fn fmt_local(raw: &str, tz: &Tz) -> String {
    parse_iso(raw)
        .map(|dt| dt.with_timezone(tz).format(LOCAL_FORMAT).to_string())
        .unwrap_or_default()
}

/// Whole seconds from `start` to `end`. Negative spans are kept as they are.
pub fn duration_seconds(start: &str, end: &str) -> Option<i64> {
    let start = parse_iso(start)?;
    let end = parse_iso(end)?;
    Some((end - start).num_seconds())
}

pub fn classify_status(raw: &str) -> RunStatus {
    match raw {
        "Cancelled" => RunStatus::Cancelado,
        "Success" | "Completed" => RunStatus::Sucesso,
        _ => RunStatus::Falha,
    }
}

pub fn classify_refresh_type(raw: &str) -> RefreshKind {
    match raw {
        "ViaApi" => RefreshKind::Api,
        "Scheduled" => RefreshKind::Scheduled,
        _ => RefreshKind::OnDemand,
    }
}

/// Pulls the readable part out of a `serviceExceptionJson` payload.
///
/// The payload is usually `{"errorCode": ..., "errorDescription": "Code; text"}`;
/// anything that is not such an object is treated as the description itself.
/// Only the text after the first `;` is kept.
pub fn extract_error_message(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let parsed = serde_json::from_str::<Value>(raw).ok();
    let description = parsed
        .as_ref()
        .and_then(|v| v.get("errorDescription"))
        .and_then(Value::as_str)
        .unwrap_or(raw);

    match description.split_once(';') {
        Some((_, rest)) => rest.trim().to_string(),
        None => description.trim().to_string(),
    }
}

pub fn transform_record(record: &NormalizedRecord, tz: &Tz) -> TransformedRecord {
    let status = classify_status(&record.status);
    let started_at = fmt_local(&record.start_time, tz);
    let ended_at = fmt_local(&record.end_time, tz);
    let duration = duration_seconds(&record.start_time, &record.end_time);

    match &record.detail {
        RecordDetail::Dataset {
            dataset_name,
            refresh_type,
            error_message,
            attempt_count,
            ..
        } => TransformedRecord::Dataset {
            workspace: record.workspace.clone(),
            dataset_name: dataset_name.clone(),
            status,
            refresh_kind: classify_refresh_type(refresh_type),
            started_at,
            ended_at,
            duration_seconds: duration,
            error: extract_error_message(error_message),
            attempt_count: *attempt_count,
        },
        RecordDetail::Dataflow { dataflow_name, .. } => TransformedRecord::Dataflow {
            workspace: record.workspace.clone(),
            dataflow_name: dataflow_name.clone(),
            status,
            started_at,
            ended_at,
            duration_seconds: duration,
        },
    }
}

pub fn transform(records: &[NormalizedRecord], tz: &Tz) -> Vec<TransformedRecord> {
    records.iter().map(|r| transform_record(r, tz)).collect()
}

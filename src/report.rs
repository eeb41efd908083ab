// ABOUTME: Writes the final report as one pretty-printed JSON array
// ABOUTME: Goes through a temp file in the target directory so a failed run leaves no partial file

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{CollectorError, Result};

pub fn write_report<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, rows)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        CollectorError::Io(format!("failed to write report to {}: {}", path.display(), e))
    })?;

    info!(path = %path.display(), rows = rows.len(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_writes_indented_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("history.json");

        write_report(&path, &[json!({"status": "Sucesso"}), json!({"status": "Falha"})]).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n  {"));
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_report_is_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        write_report::<Value>(&path, &[]).unwrap();

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, json!([]));
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "stale").unwrap();

        write_report(&path, &[json!({"n": 1})]).unwrap();

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, json!([{"n": 1}]));
    }
}

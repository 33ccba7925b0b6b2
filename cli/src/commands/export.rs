use anyhow::{Context, Result, bail};
use chrono::Local;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use tinysteps_core::export::export_csv;
use tinysteps_core::service::TrackerService;

use super::helpers::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExportFormat {
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => bail!("Invalid format '{s}'. Must be one of: csv, json"),
        }
    }
}

fn write_export<W: Write>(writer: W, tracker: &TrackerService, format: ExportFormat) -> Result<usize> {
    match format {
        ExportFormat::Csv => export_csv(writer, tracker.entries(), tracker.types(), &Local),
        ExportFormat::Json => {
            let snapshot = tracker.snapshot(now_ms());
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, &snapshot)
                .context("Failed to write JSON export")?;
            writeln!(writer)?;
            writer.flush()?;
            Ok(snapshot.entries.len())
        }
    }
}

pub(crate) fn cmd_export(
    tracker: &TrackerService,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let count = write_export(BufWriter::new(file), tracker, format)?;
            eprintln!("Exported {count} entries to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            write_export(stdout.lock(), tracker, format)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinysteps_core::models::BatchItem;

    fn tracker_with_entries() -> TrackerService {
        let mut tracker = TrackerService::open_in_memory().unwrap();
        tracker
            .log_batch(
                1_700_000_000_000,
                &[
                    BatchItem {
                        type_id: "pee".to_string(),
                        ..BatchItem::default()
                    },
                    BatchItem {
                        type_id: "cup_feed".to_string(),
                        value: Some(90.0),
                        note: Some("first\nbottle".to_string()),
                    },
                ],
            )
            .unwrap();
        tracker
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_csv_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        cmd_export(&tracker_with_entries(), ExportFormat::Csv, Some(&path)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.starts_with("Date,Time,Activity,Value,Unit,Note\n"));
        assert!(contents.contains("Cup Feed,90,ml,first bottle"));
    }

    #[test]
    fn test_json_export_is_snapshot() {
        let mut out = Vec::new();
        let n = write_export(&mut out, &tracker_with_entries(), ExportFormat::Json).unwrap();
        assert_eq!(n, 2);
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["entries"].as_array().unwrap().len(), 2);
        assert_eq!(value["types"].as_array().unwrap().len(), 6);
    }
}

use std::fmt::Display;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::TimeZone;

use crate::insights::UNKNOWN_ACTIVITY;
use crate::models::{ActivityEntry, ActivityType};

pub const CSV_HEADER: [&str; 6] = ["Date", "Time", "Activity", "Value", "Unit", "Note"];

/// Notes, names and units may hold line breaks; keep each entry on a single
/// output line.
fn flatten(note: &str) -> String {
    note.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write every entry as CSV, newest first. Returns the number of rows written.
pub fn export_csv<W: Write, Tz: TimeZone>(
    writer: W,
    entries: &[ActivityEntry],
    types: &[ActivityType],
    tz: &Tz,
) -> Result<usize>
where
    Tz::Offset: Display,
{
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)
        .context("Failed to write CSV header")?;

    let mut sorted: Vec<&ActivityEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    for entry in &sorted {
        let activity_type = types.iter().find(|t| t.id == entry.type_id);
        let (date, time) = match tz.timestamp_millis_opt(entry.timestamp).single() {
            Some(dt) => (
                dt.format("%Y-%m-%d").to_string(),
                dt.format("%H:%M").to_string(),
            ),
            None => (String::new(), String::new()),
        };
        wtr.write_record([
            date,
            time,
            activity_type.map_or_else(|| UNKNOWN_ACTIVITY.to_string(), |t| flatten(&t.name)),
            entry.value.map(|v| v.to_string()).unwrap_or_default(),
            activity_type
                .and_then(|t| t.unit.as_deref())
                .map(flatten)
                .unwrap_or_default(),
            entry.note.as_deref().map(flatten).unwrap_or_default(),
        ])
        .with_context(|| format!("Failed to write entry {}", entry.id))?;
    }

    wtr.flush().context("Failed to flush CSV output")?;
    Ok(sorted.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_activity_types;
    use chrono::Utc;

    fn entry(id: &str, type_id: &str, ts: i64, value: Option<f64>, note: Option<&str>) -> ActivityEntry {
        ActivityEntry {
            id: id.to_string(),
            type_id: type_id.to_string(),
            timestamp: ts,
            value,
            note: note.map(str::to_string),
        }
    }

    fn export(entries: &[ActivityEntry]) -> String {
        let mut out = Vec::new();
        export_csv(&mut out, entries, &default_activity_types(), &Utc).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_export_is_header_only() {
        assert_eq!(export(&[]), "Date,Time,Activity,Value,Unit,Note\n");
    }

    #[test]
    fn test_rows_sorted_newest_first() {
        let entries = vec![
            entry("a", "pee", 0, None, None),
            entry("b", "cup_feed", 3_600_000, Some(120.0), Some("good")),
        ];
        let csv = export(&entries);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1970-01-01,01:00,Cup Feed,120,ml,good");
        assert_eq!(lines[2], "1970-01-01,00:00,Pee,,,");
    }

    #[test]
    fn test_line_count_matches_entries_with_awkward_notes() {
        let entries = vec![
            entry("a", "pee", 1, None, Some("line one\nline two")),
            entry("b", "poop", 2, None, Some("said \"wow\", then slept")),
            entry("c", "sleep", 3, Some(45.0), Some("crlf\r\nnote")),
        ];
        let csv = export(&entries);
        assert_eq!(csv.lines().count(), entries.len() + 1);
        assert!(csv.contains("line one line two"));
        assert!(csv.contains(r#""said ""wow"", then slept""#));
        assert!(csv.contains("crlf note"));
    }

    #[test]
    fn test_line_breaks_in_type_name_and_unit_flattened() {
        let mut types = default_activity_types();
        types.push(ActivityType {
            id: "bath_time_1".to_string(),
            name: "Bath\nTime".to_string(),
            category: crate::models::ActivityCategory::Other,
            icon: "fa-shower".to_string(),
            unit: Some("m\r\nin".to_string()),
            color: "bg-cyan-100 text-cyan-600".to_string(),
        });
        let mut out = Vec::new();
        export_csv(&mut out, &[entry("a", "bath_time_1", 0, Some(10.0), None)], &types, &Utc).unwrap();
        let csv = String::from_utf8(out).unwrap();
        assert_eq!(csv.lines().count(), 2);
        assert_eq!(csv.lines().nth(1), Some("1970-01-01,00:00,Bath Time,10,m in,"));
    }

    #[test]
    fn test_unknown_type_exported() {
        let csv = export(&[entry("a", "removed_123", 0, Some(2.5), None)]);
        assert!(csv.lines().nth(1).unwrap().starts_with("1970-01-01,00:00,Unknown,2.5,,"));
    }

    #[test]
    fn test_export_reports_row_count() {
        let mut out = Vec::new();
        let n = export_csv(
            &mut out,
            &[entry("a", "pee", 0, None, None), entry("b", "pee", 1, None, None)],
            &default_activity_types(),
            &Utc,
        )
        .unwrap();
        assert_eq!(n, 2);
    }
}

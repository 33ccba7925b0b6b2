use anyhow::Result;
use chrono::{DateTime, Local, TimeDelta, TimeZone};
use serde::Serialize;
use std::process;

use tinysteps_core::dashboard::group_by_day;
use tinysteps_core::models::ActivityEntry;
use tinysteps_core::service::TrackerService;

use super::helpers::{EntryView, json_error, print_entry_table};

#[derive(Serialize)]
struct DayGroup {
    date: String,
    entries: Vec<EntryView>,
}

/// Entries from the last `days` days. A window reaching past the calendar
/// range keeps everything.
fn entries_within<Tz: TimeZone>(
    entries: &[ActivityEntry],
    days: Option<u32>,
    now: &DateTime<Tz>,
) -> Vec<ActivityEntry> {
    let cutoff = days
        .and_then(|n| TimeDelta::try_days(i64::from(n)))
        .and_then(|window| now.clone().checked_sub_signed(window))
        .map(|start| start.timestamp_millis());
    match cutoff {
        Some(cutoff) => entries
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect(),
        None => entries.to_vec(),
    }
}

pub(crate) fn cmd_history(tracker: &TrackerService, days: Option<u32>, json: bool) -> Result<()> {
    let entries = entries_within(tracker.entries(), days, &Local::now());

    if entries.is_empty() {
        let message = match days {
            Some(n) => format!("No activities in the last {n} days"),
            None => "No activities logged yet".to_string(),
        };
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    }

    let groups = group_by_day(&entries, &Local);
    let types = tracker.types();

    if json {
        let out: Vec<DayGroup> = groups
            .iter()
            .map(|(date, items)| DayGroup {
                date: date.format("%Y-%m-%d").to_string(),
                entries: items.iter().map(|e| EntryView::new(e, types)).collect(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (i, (date, items)) in groups.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", date.format("%A, %B %-d, %Y"));
        print_entry_table(items, types, "%H:%M");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str, timestamp: i64) -> ActivityEntry {
        ActivityEntry {
            id: id.to_string(),
            type_id: "pee".to_string(),
            timestamp,
            value: None,
            note: None,
        }
    }

    #[test]
    fn test_entries_within_days() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let day_ms = 24 * 60 * 60 * 1000;
        let now_ms = now.timestamp_millis();
        let entries = vec![entry("today", now_ms - 1000), entry("old", now_ms - 3 * day_ms)];

        let ids = |v: Vec<ActivityEntry>| v.into_iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids(entries_within(&entries, Some(1), &now)), vec!["today"]);
        assert_eq!(ids(entries_within(&entries, Some(7), &now)), vec!["today", "old"]);
        assert_eq!(ids(entries_within(&entries, None, &now)), vec!["today", "old"]);
    }

    #[test]
    fn test_huge_day_window_keeps_everything() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let entries = vec![entry("a", i64::MIN), entry("b", 0)];
        assert_eq!(entries_within(&entries, Some(u32::MAX), &now).len(), 2);
    }

    #[test]
    fn test_cmd_history_with_huge_window() {
        let mut tracker = TrackerService::open_in_memory().unwrap();
        tracker.add_entry(entry("a", 1_700_000_000_000)).unwrap();
        cmd_history(&tracker, Some(u32::MAX), true).unwrap();
    }
}

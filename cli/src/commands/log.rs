use anyhow::{Result, bail};
use std::process;

use tinysteps_core::models::BatchItem;
use tinysteps_core::service::TrackerService;

use super::helpers::{
    EntryView, format_local, json_error, parse_activity_arg, parse_note_arg, parse_timestamp,
};

/// Resolve `TYPE[=VALUE]` arguments and per-type notes into batch items.
fn build_items(
    tracker: &TrackerService,
    activities: &[String],
    notes: &[String],
) -> Result<Vec<BatchItem>> {
    let mut items: Vec<BatchItem> = Vec::with_capacity(activities.len());
    for arg in activities {
        let (query, value) = parse_activity_arg(arg)?;
        let type_id = tracker.resolve_type(&query)?.id.clone();
        if items.iter().any(|i| i.type_id == type_id) {
            bail!("Activity '{query}' given more than once");
        }
        items.push(BatchItem {
            type_id,
            value,
            note: None,
        });
    }

    for arg in notes {
        let (query, text) = parse_note_arg(arg)?;
        let type_id = &tracker.resolve_type(&query)?.id;
        let Some(item) = items.iter_mut().find(|i| &i.type_id == type_id) else {
            bail!("Note given for '{query}', which is not being logged");
        };
        item.note = Some(text);
    }

    Ok(items)
}

pub(crate) fn cmd_log(
    tracker: &mut TrackerService,
    activities: &[String],
    notes: &[String],
    at: Option<&str>,
    json: bool,
) -> Result<()> {
    let timestamp = parse_timestamp(at)?;
    let items = build_items(tracker, activities, notes)?;
    let logged = tracker.log_batch(timestamp, &items)?;

    if json {
        let views: Vec<EntryView> = logged
            .iter()
            .map(|e| EntryView::new(e, tracker.types()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        let when = format_local(timestamp, "%Y-%m-%d %H:%M");
        println!("Logged {} activities at {when}", logged.len());
        for e in &logged {
            let view = EntryView::new(e, tracker.types());
            let value = view.value_display();
            let value = if value.is_empty() {
                String::new()
            } else {
                format!(" {value}")
            };
            let note = view
                .note
                .as_deref()
                .map(|n| format!(" ({n})"))
                .unwrap_or_default();
            println!("  [{}] {}{value}{note}", view.id, view.activity);
        }
    }

    Ok(())
}

pub(crate) fn cmd_delete(tracker: &mut TrackerService, entry_id: &str, json: bool) -> Result<()> {
    if !tracker.delete_entry(entry_id)? {
        if json {
            println!("{}", json_error(&format!("Entry {entry_id} not found")));
        } else {
            eprintln!("Entry {entry_id} not found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": entry_id }));
    } else {
        println!("Deleted entry {entry_id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_build_items_resolves_names_and_values() {
        let tracker = TrackerService::open_in_memory().unwrap();
        let items = build_items(
            &tracker,
            &args(&["pee", "Cup Feed=120"]),
            &args(&["cup feed=took it slowly"]),
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].type_id, "pee");
        assert_eq!(items[1].type_id, "cup_feed");
        assert_eq!(items[1].value, Some(120.0));
        assert_eq!(items[1].note.as_deref(), Some("took it slowly"));
    }

    #[test]
    fn test_build_items_rejects_duplicates_and_stray_notes() {
        let tracker = TrackerService::open_in_memory().unwrap();
        assert!(build_items(&tracker, &args(&["pee", "pee"]), &[]).is_err());
        assert!(build_items(&tracker, &args(&["pee"]), &args(&["poop=hmm"])).is_err());
        assert!(build_items(&tracker, &args(&["bath"]), &[]).is_err());
    }

    #[test]
    fn test_cmd_log_persists_batch() {
        let mut tracker = TrackerService::open_in_memory().unwrap();
        cmd_log(
            &mut tracker,
            &args(&["poop", "sleep=45"]),
            &[],
            Some("2024-06-15T10:00:00Z"),
            true,
        )
        .unwrap();
        assert_eq!(tracker.entries().len(), 2);
        assert!(tracker.entries().iter().all(|e| e.timestamp == 1_718_445_600_000));
    }
}

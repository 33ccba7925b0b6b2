use anyhow::{Context, Result, bail};
use std::process;

use tinysteps_core::service::TrackerService;
use tinysteps_core::sync::{
    PullOutcome, PushOutcome, SyncTransport, generate_sync_key, perform_sync, pull_and_merge,
    push_snapshot,
};

use super::helpers::{confirm, format_local, now_ms};

const MAX_KEY_LEN: usize = 64;

fn require_key(tracker: &TrackerService) -> Result<String> {
    tracker.sync_key()?.context(
        "No sync key set. Run 'tinysteps sync key generate' or 'tinysteps sync key set <KEY>'",
    )
}

fn validate_sync_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        bail!("Sync key must be 1-{MAX_KEY_LEN} characters");
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!("Sync key may only contain letters, digits, '_' and '-'");
    }
    Ok(())
}

fn describe_pull(outcome: &PullOutcome) -> String {
    match outcome {
        PullOutcome::Merged {
            entries_before,
            entries_after,
            remote_entries,
            types,
            name_replaced,
        } => {
            let name = if *name_replaced { ", name updated" } else { "" };
            format!(
                "merged {remote_entries} remote entries ({entries_before} -> {entries_after} local, {types} types{name})"
            )
        }
        PullOutcome::Empty => "nothing stored remotely yet".to_string(),
        PullOutcome::Failed { error } => format!("failed: {error}"),
    }
}

fn describe_push(outcome: &PushOutcome) -> String {
    match outcome {
        PushOutcome::Pushed { entries } => format!("uploaded {entries} entries"),
        PushOutcome::Failed { error } => format!("failed: {error}"),
    }
}

pub(crate) async fn cmd_sync_now(
    tracker: &mut TrackerService,
    transport: &dyn SyncTransport,
    json: bool,
) -> Result<()> {
    let key = require_key(tracker)?;
    let report = perform_sync(tracker, transport, &key, now_ms()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pull: {}", describe_pull(&report.pull));
        println!("Push: {}", describe_push(&report.push));
        if report.is_success() {
            println!("Synced at {}", format_local(now_ms(), "%H:%M"));
        }
    }

    if !report.is_success() {
        eprintln!("Sync failed. Local data is safe; try again later.");
        process::exit(1);
    }
    Ok(())
}

pub(crate) async fn cmd_sync_push(
    tracker: &TrackerService,
    transport: &dyn SyncTransport,
    json: bool,
) -> Result<()> {
    let key = require_key(tracker)?;
    let outcome = push_snapshot(tracker, transport, &key, now_ms()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("Push: {}", describe_push(&outcome));
    }
    if !outcome.is_success() {
        process::exit(1);
    }
    Ok(())
}

pub(crate) async fn cmd_sync_pull(
    tracker: &mut TrackerService,
    transport: &dyn SyncTransport,
    yes: bool,
    json: bool,
) -> Result<()> {
    let key = require_key(tracker)?;
    if !yes
        && !confirm(
            "Pull cloud data? Remote activity types and name replace local ones; entries are merged.",
        )?
    {
        eprintln!("Cancelled");
        return Ok(());
    }

    let outcome = pull_and_merge(tracker, transport, &key, now_ms()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("Pull: {}", describe_pull(&outcome));
    }
    if matches!(outcome, PullOutcome::Failed { .. }) {
        process::exit(1);
    }
    Ok(())
}

pub(crate) fn cmd_sync_key_show(tracker: &TrackerService, json: bool) -> Result<()> {
    let key = tracker.sync_key()?;
    let last_sync = tracker.last_sync()?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "sync_key": key, "last_sync": last_sync })
        );
        return Ok(());
    }

    match key {
        Some(key) => {
            println!("Sync key: {key}");
            match last_sync {
                Some(ms) => println!("Last sync: {}", format_local(ms, "%Y-%m-%d %H:%M")),
                None => println!("Last sync: never"),
            }
            println!("Enter this key on another device to share the same log.");
        }
        None => println!("No sync key set. Run 'tinysteps sync key generate' to create one."),
    }
    Ok(())
}

pub(crate) fn cmd_sync_key_set(tracker: &TrackerService, key: &str) -> Result<()> {
    let key = key.trim();
    validate_sync_key(key)?;
    tracker.set_sync_key(key)?;
    println!("Sync key set to {key}. Run 'tinysteps sync now' to fetch shared data.");
    Ok(())
}

pub(crate) fn cmd_sync_key_generate(tracker: &TrackerService, json: bool) -> Result<()> {
    if let Some(old) = tracker.sync_key()? {
        eprintln!("Replacing previous sync key {old}");
    }
    let key = generate_sync_key();
    tracker.set_sync_key(&key)?;

    if json {
        println!("{}", serde_json::json!({ "sync_key": key }));
    } else {
        println!("New sync key: {key}");
        println!("Run 'tinysteps sync now' to upload, then set the same key on other devices.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sync_key() {
        assert!(validate_sync_key("abc123def456").is_ok());
        assert!(validate_sync_key("family-log_2").is_ok());
        assert!(validate_sync_key("").is_err());
        assert!(validate_sync_key("has space").is_err());
        assert!(validate_sync_key("../etc").is_err());
        assert!(validate_sync_key(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_require_key() {
        let tracker = TrackerService::open_in_memory().unwrap();
        assert!(require_key(&tracker).is_err());
        cmd_sync_key_set(&tracker, " abc123 ").unwrap();
        assert_eq!(require_key(&tracker).unwrap(), "abc123");
    }

    #[test]
    fn test_generate_replaces_key() {
        let tracker = TrackerService::open_in_memory().unwrap();
        cmd_sync_key_generate(&tracker, true).unwrap();
        let key = tracker.sync_key().unwrap().unwrap();
        assert_eq!(key.len(), 12);
    }

    #[test]
    fn test_describe_outcomes() {
        let merged = PullOutcome::Merged {
            entries_before: 2,
            entries_after: 3,
            remote_entries: 2,
            types: 6,
            name_replaced: true,
        };
        assert_eq!(
            describe_pull(&merged),
            "merged 2 remote entries (2 -> 3 local, 6 types, name updated)"
        );
        assert_eq!(
            describe_push(&PushOutcome::Failed {
                error: "timeout".to_string()
            }),
            "failed: timeout"
        );
    }
}

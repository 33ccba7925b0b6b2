//! Pull-merge-push reconciliation against a remote key/value store.
//!
//! The remote side is reached through [`SyncTransport`]; the CLI provides an
//! HTTP implementation and tests provide an in-memory one. Nothing here is
//! transactional: a push that fails after a successful pull leaves the local
//! tracker merged while the remote copy stays stale until the next sync.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::models::{ActivityEntry, SyncData};
use crate::service::{MergeSummary, TrackerService, TrackerState};

const SYNC_KEY_LEN: usize = 12;
const SYNC_KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Remote key/value store holding one snapshot per sync key.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Store `data` under `key`.
    async fn push(&self, key: &str, data: &SyncData) -> Result<()>;
    /// Fetch the snapshot stored under `key`, `None` if nothing is stored.
    async fn pull(&self, key: &str) -> Result<Option<SyncData>>;
}

/// Random 12-character `[a-z0-9]` key.
#[must_use]
pub fn generate_sync_key() -> String {
    let mut rng = rand::rng();
    (0..SYNC_KEY_LEN)
        .map(|_| SYNC_KEY_ALPHABET[rng.random_range(0..SYNC_KEY_ALPHABET.len())] as char)
        .collect()
}

/// Merge entries by id. Local entries seed the map, remote entries overwrite
/// on collision; the result keeps first-insertion order before a stable sort
/// by timestamp, newest first.
#[must_use]
pub fn merge_entries(local: &[ActivityEntry], remote: &[ActivityEntry]) -> Vec<ActivityEntry> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(local.len() + remote.len());
    let mut merged: Vec<ActivityEntry> = Vec::with_capacity(local.len() + remote.len());

    for entry in local.iter().chain(remote) {
        if let Some(&pos) = index.get(entry.id.as_str()) {
            merged[pos] = entry.clone();
        } else {
            index.insert(entry.id.as_str(), merged.len());
            merged.push(entry.clone());
        }
    }

    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged
}

/// Types are replaced wholesale, entries merged by id, the name replaced only
/// when the remote one is non-empty.
#[must_use]
pub fn merge_snapshot(local: &TrackerState, remote: SyncData) -> TrackerState {
    let entries = merge_entries(&local.entries, &remote.entries);
    let baby_name = if remote.baby_name.is_empty() {
        local.baby_name.clone()
    } else {
        remote.baby_name
    };
    TrackerState {
        baby_name,
        types: remote.types,
        entries,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullOutcome {
    Merged {
        entries_before: usize,
        entries_after: usize,
        remote_entries: usize,
        /// Activity types after the remote set replaced the local one.
        types: usize,
        name_replaced: bool,
    },
    /// Nothing stored under the key yet.
    Empty,
    Failed { error: String },
}

impl From<MergeSummary> for PullOutcome {
    fn from(summary: MergeSummary) -> Self {
        Self::Merged {
            entries_before: summary.entries_before,
            entries_after: summary.entries_after,
            remote_entries: summary.remote_entries,
            types: summary.types,
            name_replaced: summary.name_replaced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushOutcome {
    Pushed { entries: usize },
    Failed { error: String },
}

impl PushOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Pushed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub key: String,
    pub pull: PullOutcome,
    pub push: PushOutcome,
}

impl SyncReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self.pull, PullOutcome::Failed { .. }) && self.push.is_success()
    }
}

/// Pull the remote snapshot and merge it into the tracker. Transport or
/// parse failures leave local state untouched.
pub async fn pull_and_merge(
    tracker: &mut TrackerService,
    transport: &dyn SyncTransport,
    key: &str,
    now_ms: i64,
) -> Result<PullOutcome> {
    match transport.pull(key).await {
        Ok(Some(remote)) => {
            let summary = tracker.apply_sync_data(remote, now_ms)?;
            info!(
                key,
                before = summary.entries_before,
                after = summary.entries_after,
                "merged remote snapshot"
            );
            Ok(summary.into())
        }
        Ok(None) => {
            info!(key, "no remote snapshot yet");
            Ok(PullOutcome::Empty)
        }
        Err(e) => {
            warn!(key, error = %format!("{e:#}"), "cloud pull failed");
            Ok(PullOutcome::Failed {
                error: format!("{e:#}"),
            })
        }
    }
}

/// Push the tracker's current snapshot. Local state is never touched except
/// for the last-sync stamp on success.
pub async fn push_snapshot(
    tracker: &TrackerService,
    transport: &dyn SyncTransport,
    key: &str,
    now_ms: i64,
) -> Result<PushOutcome> {
    let snapshot = tracker.snapshot(now_ms);
    match transport.push(key, &snapshot).await {
        Ok(()) => {
            tracker.record_sync(now_ms)?;
            info!(key, entries = snapshot.entries.len(), "pushed snapshot");
            Ok(PushOutcome::Pushed {
                entries: snapshot.entries.len(),
            })
        }
        Err(e) => {
            warn!(key, error = %format!("{e:#}"), "cloud push failed");
            Ok(PushOutcome::Failed {
                error: format!("{e:#}"),
            })
        }
    }
}

/// Pull, merge, then push the merged state back.
///
/// Takes the tracker mutably, so a second sync on the same tracker cannot
/// start while one is in flight.
pub async fn perform_sync(
    tracker: &mut TrackerService,
    transport: &dyn SyncTransport,
    key: &str,
    now_ms: i64,
) -> Result<SyncReport> {
    let pull = pull_and_merge(tracker, transport, key, now_ms).await?;
    let push = push_snapshot(tracker, transport, key, now_ms).await?;
    Ok(SyncReport {
        key: key.to_string(),
        pull,
        push,
    })
}

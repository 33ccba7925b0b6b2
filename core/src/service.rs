use std::path::Path;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::db::Database;
use crate::models::{
    ActivityEntry, ActivityType, BatchItem, NewActivityType, SyncData, generate_entry_id,
    is_default_type, normalize_note, normalize_unit, type_id_for, validate_entry_value,
    validate_new_type,
};
use crate::sync::merge_snapshot;

/// In-memory tracker state.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    pub baby_name: String,
    pub types: Vec<ActivityType>,
    pub entries: Vec<ActivityEntry>,
}

/// What a merge changed, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub entries_before: usize,
    pub entries_after: usize,
    pub remote_entries: usize,
    pub types: usize,
    pub name_replaced: bool,
}

fn load_state(db: &Database) -> Result<TrackerState> {
    Ok(TrackerState {
        baby_name: db.load_baby_name()?,
        types: db.load_types()?,
        entries: db.load_entries()?,
    })
}

/// Tracker state mirrored to the local store on every change.
pub struct TrackerService {
    db: Database,
    state: TrackerState,
}

impl TrackerService {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_database(Database::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_database(Database::open_in_memory()?)
    }

    pub fn from_database(db: Database) -> Result<Self> {
        let state = load_state(&db)?;
        debug!(
            types = state.types.len(),
            entries = state.entries.len(),
            "loaded tracker state"
        );
        Ok(Self { db, state })
    }

    /// Re-read state written by other processes sharing the store.
    pub fn reload(&mut self) -> Result<()> {
        self.state = load_state(&self.db)?;
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    #[must_use]
    pub fn baby_name(&self) -> &str {
        &self.state.baby_name
    }

    #[must_use]
    pub fn types(&self) -> &[ActivityType] {
        &self.state.types
    }

    #[must_use]
    pub fn entries(&self) -> &[ActivityEntry] {
        &self.state.entries
    }

    #[must_use]
    pub fn find_type(&self, id: &str) -> Option<&ActivityType> {
        self.state.types.iter().find(|t| t.id == id)
    }

    /// Look a type up by id, falling back to a case-insensitive name match.
    pub fn resolve_type(&self, query: &str) -> Result<&ActivityType> {
        if let Some(t) = self.find_type(query) {
            return Ok(t);
        }
        let lower = query.trim().to_lowercase();
        self.state
            .types
            .iter()
            .find(|t| t.name.to_lowercase() == lower)
            .ok_or_else(|| anyhow::anyhow!("Unknown activity type '{query}'"))
    }

    // --- Profile ---

    pub fn set_baby_name(&mut self, name: &str) -> Result<()> {
        self.state.baby_name = name.trim().to_string();
        self.db.save_baby_name(&self.state.baby_name)
    }

    // --- Activity types ---

    pub fn add_type(&mut self, new_type: NewActivityType, created_ms: i64) -> Result<ActivityType> {
        validate_new_type(&new_type)?;
        let name = new_type.name.trim().to_string();
        let activity_type = ActivityType {
            id: type_id_for(&name, created_ms),
            name,
            category: new_type.category,
            icon: new_type.icon,
            unit: normalize_unit(new_type.unit.as_deref()),
            color: new_type.color,
        };
        self.state.types.push(activity_type.clone());
        self.db.save_types(&self.state.types)?;
        info!(id = %activity_type.id, "added activity type");
        Ok(activity_type)
    }

    /// Remove a user-defined type. Entries that reference it are kept.
    pub fn remove_type(&mut self, id: &str) -> Result<ActivityType> {
        if is_default_type(id) {
            bail!("Cannot remove default activity types.");
        }
        let Some(pos) = self.state.types.iter().position(|t| t.id == id) else {
            bail!("Activity type '{id}' not found");
        };
        let removed = self.state.types.remove(pos);
        self.db.save_types(&self.state.types)?;
        info!(id, "removed activity type");
        Ok(removed)
    }

    // --- Entries ---

    pub fn add_entry(&mut self, entry: ActivityEntry) -> Result<()> {
        self.state.entries.push(entry);
        self.db.save_entries(&self.state.entries)
    }

    /// Log one entry per item, all sharing `timestamp`.
    pub fn log_batch(&mut self, timestamp: i64, items: &[BatchItem]) -> Result<Vec<ActivityEntry>> {
        if items.is_empty() {
            bail!("Select at least one activity to log");
        }
        for item in items {
            if self.find_type(&item.type_id).is_none() {
                bail!("Unknown activity type '{}'", item.type_id);
            }
            validate_entry_value(item.value)?;
        }

        let logged: Vec<ActivityEntry> = items
            .iter()
            .map(|item| ActivityEntry {
                id: generate_entry_id(),
                type_id: item.type_id.clone(),
                timestamp,
                value: item.value,
                note: normalize_note(item.note.as_deref()),
            })
            .collect();

        self.state.entries.extend(logged.iter().cloned());
        self.db.save_entries(&self.state.entries)?;
        debug!(count = logged.len(), timestamp, "logged entries");
        Ok(logged)
    }

    /// Remove every entry carrying `id`. Returns whether anything was removed.
    pub fn delete_entry(&mut self, id: &str) -> Result<bool> {
        let before = self.state.entries.len();
        self.state.entries.retain(|e| e.id != id);
        if self.state.entries.len() == before {
            return Ok(false);
        }
        self.db.save_entries(&self.state.entries)?;
        Ok(true)
    }

    // --- Sync state ---

    #[must_use]
    pub fn snapshot(&self, now_ms: i64) -> SyncData {
        SyncData {
            entries: self.state.entries.clone(),
            types: self.state.types.clone(),
            baby_name: self.state.baby_name.clone(),
            last_updated: now_ms,
        }
    }

    /// Merge a remote snapshot into local state, persist it and stamp the
    /// last-sync time.
    pub fn apply_sync_data(&mut self, remote: SyncData, now_ms: i64) -> Result<MergeSummary> {
        let entries_before = self.state.entries.len();
        let remote_entries = remote.entries.len();
        let name_replaced = !remote.baby_name.is_empty();

        self.state = merge_snapshot(&self.state, remote);

        self.db.save_baby_name(&self.state.baby_name)?;
        self.db.save_types(&self.state.types)?;
        self.db.save_entries(&self.state.entries)?;
        self.db.save_last_sync(now_ms)?;

        Ok(MergeSummary {
            entries_before,
            entries_after: self.state.entries.len(),
            remote_entries,
            types: self.state.types.len(),
            name_replaced,
        })
    }

    pub fn sync_key(&self) -> Result<Option<String>> {
        self.db.load_sync_key()
    }

    pub fn set_sync_key(&self, key: &str) -> Result<()> {
        self.db.save_sync_key(key.trim())
    }

    pub fn last_sync(&self) -> Result<Option<i64>> {
        self.db.load_last_sync()
    }

    pub fn record_sync(&self, now_ms: i64) -> Result<()> {
        self.db.save_last_sync(now_ms)
    }
}

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use serde::Serialize;

use crate::models::{ActivityEntry, ActivityType};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Types summarised in the dashboard's quick-stat widgets.
pub const QUICK_STAT_TYPES: &[&str] = &["breast_feed", "cup_feed", "poop", "pee"];

pub const CHART_DAYS: u32 = 7;
pub const RECENT_ENTRIES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFilter {
    #[default]
    Today,
    Last24h,
    Last7d,
}

impl TimeFilter {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Last24h => "last 24h",
            Self::Last7d => "last 7d",
        }
    }

    /// Epoch millis at which the window opens.
    #[must_use]
    pub fn window_start<Tz: TimeZone>(self, now: &DateTime<Tz>) -> i64 {
        let now_ms = now.timestamp_millis();
        match self {
            Self::Today => start_of_day(&now.timezone(), now.date_naive()).unwrap_or(now_ms - DAY_MS),
            Self::Last24h => now_ms - DAY_MS,
            Self::Last7d => now_ms - 7 * DAY_MS,
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "today" => Ok(Self::Today),
            "last_24h" | "24h" => Ok(Self::Last24h),
            "last_7d" | "7d" => Ok(Self::Last7d),
            _ => bail!("Invalid filter '{s}'. Must be one of: today, last_24h, last_7d"),
        }
    }
}

/// Local midnight in epoch millis; `None` if midnight does not exist there.
fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<i64> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// `"3d ago"`, `"2h 15m ago"` or `"42m ago"`.
#[must_use]
pub fn format_time_since(timestamp: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp);
    let hours = diff.div_euclid(HOUR_MS);
    let mins = diff.rem_euclid(HOUR_MS) / MINUTE_MS;
    if hours > 24 {
        format!("{}d ago", hours / 24)
    } else if hours > 0 {
        format!("{hours}h {mins}m ago")
    } else {
        format!("{}m ago", diff.max(0) / MINUTE_MS)
    }
}

#[must_use]
pub fn type_name<'a>(types: &'a [ActivityType], type_id: &str) -> Option<&'a str> {
    types
        .iter()
        .find(|t| t.id == type_id)
        .map(|t| t.name.as_str())
}

fn selected(selection: &[String], type_id: &str) -> bool {
    selection.is_empty() || selection.iter().any(|s| s == type_id)
}

/// Entries inside the filter window and, when `selection` is non-empty, of a
/// selected type.
#[must_use]
pub fn filter_entries<'a, Tz: TimeZone>(
    entries: &'a [ActivityEntry],
    filter: TimeFilter,
    selection: &[String],
    now: &DateTime<Tz>,
) -> Vec<&'a ActivityEntry> {
    let start = filter.window_start(now);
    entries
        .iter()
        .filter(|e| e.timestamp >= start && selected(selection, &e.type_id))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeStat {
    pub type_id: String,
    pub name: String,
    pub unit: Option<String>,
    /// Entries of this type inside the filter window.
    pub count: usize,
    /// Most recent entry of this type, regardless of the window.
    pub last_entry: Option<ActivityEntry>,
}

#[must_use]
pub fn type_stats<Tz: TimeZone>(
    entries: &[ActivityEntry],
    types: &[ActivityType],
    filter: TimeFilter,
    selection: &[String],
    now: &DateTime<Tz>,
) -> Vec<TypeStat> {
    let filtered = filter_entries(entries, filter, selection, now);
    types
        .iter()
        .map(|t| TypeStat {
            type_id: t.id.clone(),
            name: t.name.clone(),
            unit: t.unit.clone(),
            count: filtered.iter().filter(|e| e.type_id == t.id).count(),
            last_entry: entries
                .iter()
                .filter(|e| e.type_id == t.id)
                .max_by_key(|e| e.timestamp)
                .cloned(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct DayCounts {
    pub date: NaiveDate,
    /// Short weekday name, e.g. `Mon`.
    pub label: String,
    /// `(type name, count)` for every selected type, in registry order.
    pub counts: Vec<(String, usize)>,
}

impl DayCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, c)| c).sum()
    }
}

/// Per-day entry counts for the last `days` days, oldest first, today last.
#[must_use]
pub fn daily_counts<Tz: TimeZone>(
    entries: &[ActivityEntry],
    types: &[ActivityType],
    selection: &[String],
    now: &DateTime<Tz>,
    days: u32,
) -> Vec<DayCounts> {
    let tz = now.timezone();
    let today = now.date_naive();

    (0..days)
        .rev()
        .map(|back| {
            let date = today - Duration::days(i64::from(back));
            let start = start_of_day(&tz, date);
            let end = date.succ_opt().and_then(|next| start_of_day(&tz, next));
            let in_day = |e: &&ActivityEntry| match (start, end) {
                (Some(s), Some(end)) => e.timestamp >= s && e.timestamp < end,
                _ => false,
            };
            let day_entries: Vec<&ActivityEntry> = entries.iter().filter(in_day).collect();
            let counts = types
                .iter()
                .filter(|t| selected(selection, &t.id))
                .map(|t| {
                    let n = day_entries.iter().filter(|e| e.type_id == t.id).count();
                    (t.name.clone(), n)
                })
                .collect();
            DayCounts {
                date,
                label: date.format("%a").to_string(),
                counts,
            }
        })
        .collect()
}

/// The `limit` most recent entries, newest first.
#[must_use]
pub fn recent_entries(entries: &[ActivityEntry], limit: usize) -> Vec<&ActivityEntry> {
    let mut sorted: Vec<&ActivityEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.truncate(limit);
    sorted
}

/// Entries newest first, grouped by local calendar date.
#[must_use]
pub fn group_by_day<'a, Tz: TimeZone>(
    entries: &'a [ActivityEntry],
    tz: &Tz,
) -> Vec<(NaiveDate, Vec<&'a ActivityEntry>)> {
    let mut groups: Vec<(NaiveDate, Vec<&ActivityEntry>)> = Vec::new();
    for entry in recent_entries(entries, entries.len()) {
        let Some(dt) = tz.timestamp_millis_opt(entry.timestamp).single() else {
            continue;
        };
        let date = dt.date_naive();
        match groups.last_mut() {
            Some((d, items)) if *d == date => items.push(entry),
            _ => groups.push((date, vec![entry])),
        }
    }
    groups
}

#[must_use]
pub fn greeting(baby_name: &str) -> String {
    if baby_name.is_empty() {
        "Baby's Dashboard".to_string()
    } else {
        format!("{baby_name}'s Dashboard")
    }
}

/// Badge shown once a sync key is configured.
#[must_use]
pub fn sync_badge<Tz: TimeZone>(has_key: bool, last_sync: Option<i64>, tz: &Tz) -> Option<String>
where
    Tz::Offset: fmt::Display,
{
    if !has_key {
        return None;
    }
    let synced_at = last_sync
        .and_then(|ms| tz.timestamp_millis_opt(ms).single())
        .map(|dt| format!("Synced at {}", dt.format("%H:%M")));
    Some(synced_at.unwrap_or_else(|| "Cloud Ready".to_string()))
}

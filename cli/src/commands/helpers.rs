use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use tinysteps_core::dashboard::type_name;
use tinysteps_core::insights::UNKNOWN_ACTIVITY;
use tinysteps_core::models::{ActivityEntry, ActivityType};

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse a log time in `tz`.
///
/// Accepts `HH:MM` (today), `<date> HH:MM` where `<date>` is `YYYY-MM-DD`,
/// `today` or `yesterday`, or a full RFC 3339 timestamp.
pub(crate) fn parse_timestamp_in<Tz: TimeZone>(s: &str, now: &DateTime<Tz>) -> Result<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }

    let (date_part, time_part) = match s.rsplit_once([' ', 'T']) {
        Some((d, t)) => (Some(d.trim()), t),
        None => (None, s),
    };

    let today = now.date_naive();
    let date = match date_part {
        None | Some("today") => today,
        Some("yesterday") => today - Duration::days(1),
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d").with_context(|| {
            format!("Invalid date '{d}'. Use YYYY-MM-DD, today or yesterday")
        })?,
    };
    let time = NaiveTime::parse_from_str(time_part, "%H:%M")
        .with_context(|| format!("Invalid time '{time_part}'. Use HH:MM"))?;

    let local = now
        .timezone()
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .with_context(|| format!("{date} {time} does not exist in the local timezone"))?;
    Ok(local.timestamp_millis())
}

pub(crate) fn parse_timestamp(s: Option<&str>) -> Result<i64> {
    match s {
        None => Ok(now_ms()),
        Some(s) => parse_timestamp_in(s, &Local::now()),
    }
}

/// Split `TYPE` or `TYPE=VALUE`.
pub(crate) fn parse_activity_arg(s: &str) -> Result<(String, Option<f64>)> {
    match s.split_once('=') {
        None => {
            let name = s.trim();
            if name.is_empty() {
                bail!("Empty activity name");
            }
            Ok((name.to_string(), None))
        }
        Some((name, value)) => {
            let name = name.trim();
            if name.is_empty() {
                bail!("Missing activity name in '{s}'");
            }
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value in '{s}'. Use TYPE=NUMBER"))?;
            Ok((name.to_string(), Some(value)))
        }
    }
}

/// Split `TYPE=TEXT` for per-activity notes.
pub(crate) fn parse_note_arg(s: &str) -> Result<(String, String)> {
    let (name, text) = s
        .split_once('=')
        .with_context(|| format!("Invalid note '{s}'. Use TYPE=TEXT"))?;
    Ok((name.trim().to_string(), text.to_string()))
}

pub(crate) fn confirm(prompt: &str) -> Result<bool> {
    eprint!("{prompt} [y/N]: ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let Some(line) = stdin.lock().lines().next() else {
        return Ok(false);
    };
    let line = line.context("Failed to read answer")?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

/// `"120 ml"`, `"3.5 kg"` or just the number when the type has no unit.
pub(crate) fn format_value(value: f64, unit: Option<&str>) -> String {
    let number = if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    };
    match unit {
        Some(u) => format!("{number} {u}"),
        None => number,
    }
}

pub(crate) fn format_local(timestamp: i64, fmt: &str) -> String {
    Local
        .timestamp_millis_opt(timestamp)
        .single()
        .map_or_else(|| timestamp.to_string(), |dt| dt.format(fmt).to_string())
}

#[derive(Serialize)]
pub(crate) struct EntryView {
    pub id: String,
    pub type_id: String,
    pub activity: String,
    pub timestamp: i64,
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl EntryView {
    pub(crate) fn new(entry: &ActivityEntry, types: &[ActivityType]) -> Self {
        let activity_type = types.iter().find(|t| t.id == entry.type_id);
        Self {
            id: entry.id.clone(),
            type_id: entry.type_id.clone(),
            activity: type_name(types, &entry.type_id)
                .unwrap_or(UNKNOWN_ACTIVITY)
                .to_string(),
            timestamp: entry.timestamp,
            time: format_local(entry.timestamp, "%Y-%m-%d %H:%M"),
            value: entry.value,
            unit: activity_type.and_then(|t| t.unit.clone()),
            note: entry.note.clone(),
        }
    }

    pub(crate) fn value_display(&self) -> String {
        self.value
            .map(|v| format_value(v, self.unit.as_deref()))
            .unwrap_or_default()
    }
}

pub(crate) fn print_entry_table(entries: &[&ActivityEntry], types: &[ActivityType], time_fmt: &str) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Activity")]
        activity: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Note")]
        note: String,
        #[tabled(rename = "ID")]
        id: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| {
            let view = EntryView::new(e, types);
            EntryRow {
                time: format_local(e.timestamp, time_fmt),
                value: view.value_display(),
                note: view.note.as_deref().map(|n| truncate(n, 40)).unwrap_or_default(),
                activity: view.activity,
                id: view.id,
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn ms(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_parse_time_only_is_today() {
        assert_eq!(parse_timestamp_in("08:15", &noon()).unwrap(), ms(2024, 6, 15, 8, 15));
    }

    #[test]
    fn test_parse_date_and_time() {
        assert_eq!(
            parse_timestamp_in("2024-06-01 23:05", &noon()).unwrap(),
            ms(2024, 6, 1, 23, 5)
        );
        assert_eq!(
            parse_timestamp_in("yesterday 22:00", &noon()).unwrap(),
            ms(2024, 6, 14, 22, 0)
        );
        assert_eq!(
            parse_timestamp_in("today 06:30", &noon()).unwrap(),
            ms(2024, 6, 15, 6, 30)
        );
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(
            parse_timestamp_in("2024-06-01T10:00:00+02:00", &noon()).unwrap(),
            ms(2024, 6, 1, 8, 0)
        );
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(parse_timestamp_in("25:00", &noon()).is_err());
        assert!(parse_timestamp_in("someday 10:00", &noon()).is_err());
        assert!(parse_timestamp_in("soon", &noon()).is_err());
    }

    #[test]
    fn test_parse_activity_arg() {
        assert_eq!(parse_activity_arg("pee").unwrap(), ("pee".to_string(), None));
        assert_eq!(
            parse_activity_arg("cup_feed=120").unwrap(),
            ("cup_feed".to_string(), Some(120.0))
        );
        assert!(parse_activity_arg("cup_feed=lots").is_err());
        assert!(parse_activity_arg("=5").is_err());
    }

    #[test]
    fn test_parse_note_arg() {
        assert_eq!(
            parse_note_arg("poop=very green").unwrap(),
            ("poop".to_string(), "very green".to_string())
        );
        assert!(parse_note_arg("no separator").is_err());
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(120.0, Some("ml")), "120 ml");
        assert_eq!(format_value(3.25, Some("kg")), "3.25 kg");
        assert_eq!(format_value(2.0, None), "2");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }

    #[test]
    fn test_json_error_escapes() {
        assert_eq!(json_error("bad \"key\""), r#"{"error":"bad \"key\""}"#);
    }
}

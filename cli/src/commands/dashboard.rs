use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use std::time::Duration;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};
use tracing::debug;

use crate::gemini::GeminiClient;
use tinysteps_core::dashboard::{
    CHART_DAYS, DayCounts, QUICK_STAT_TYPES, RECENT_ENTRIES, TimeFilter, TypeStat, daily_counts,
    format_time_since, greeting, recent_entries, sync_badge, type_stats,
};
use tinysteps_core::insights::MIN_ENTRIES_FOR_INSIGHT;
use tinysteps_core::models::AiInsight;
use tinysteps_core::service::TrackerService;

use super::helpers::{EntryView, print_entry_table};

const REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const BAR_WIDTH: usize = 30;

pub(crate) struct DashboardOptions {
    pub filter: TimeFilter,
    pub selection: Vec<String>,
    pub insights: bool,
    pub watch: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct QuickStat {
    type_id: String,
    name: String,
    count: usize,
    last_logged: Option<i64>,
    since: Option<String>,
}

#[derive(Serialize)]
struct DashboardView {
    greeting: String,
    sync_badge: Option<String>,
    filter: TimeFilter,
    quick_stats: Vec<QuickStat>,
    chart: Vec<DayCounts>,
    recent: Vec<EntryView>,
    insight: Option<AiInsight>,
}

/// Insight cached against the entry count it was generated for.
#[derive(Default)]
struct InsightCache {
    entries: usize,
    insight: Option<AiInsight>,
}

impl InsightCache {
    async fn refresh(
        &mut self,
        tracker: &TrackerService,
        client: Option<&GeminiClient>,
        enabled: bool,
    ) -> Option<AiInsight> {
        let count = tracker.entries().len();
        let Some(client) = client.filter(|_| enabled && count >= MIN_ENTRIES_FOR_INSIGHT) else {
            return None;
        };
        if self.insight.is_none() || self.entries != count {
            debug!(entries = count, "refreshing insight");
            self.insight = client.insight_or_none(tracker.entries(), tracker.types()).await;
            self.entries = count;
        }
        self.insight.clone()
    }
}

fn quick_stats(stats: &[TypeStat], now: i64) -> Vec<QuickStat> {
    QUICK_STAT_TYPES
        .iter()
        .filter_map(|id| stats.iter().find(|s| s.type_id == *id))
        .map(|s| {
            let last = s.last_entry.as_ref().map(|e| e.timestamp);
            QuickStat {
                type_id: s.type_id.clone(),
                name: s.name.clone(),
                count: s.count,
                last_logged: last,
                since: last.map(|ts| format_time_since(ts, now)),
            }
        })
        .collect()
}

fn build_view(
    tracker: &TrackerService,
    options: &DashboardOptions,
    insight: Option<AiInsight>,
) -> Result<DashboardView> {
    let now = Local::now();
    let entries = tracker.entries();
    let types = tracker.types();
    let stats = type_stats(entries, types, options.filter, &options.selection, &now);

    Ok(DashboardView {
        greeting: greeting(tracker.baby_name()),
        sync_badge: sync_badge(tracker.sync_key()?.is_some(), tracker.last_sync()?, &Local),
        filter: options.filter,
        quick_stats: quick_stats(&stats, now.timestamp_millis()),
        chart: daily_counts(entries, types, &options.selection, &now, CHART_DAYS),
        recent: recent_entries(entries, RECENT_ENTRIES)
            .into_iter()
            .map(|e| EntryView::new(e, types))
            .collect(),
        insight,
    })
}

fn print_view(view: &DashboardView, tracker: &TrackerService) {
    #[derive(Tabled)]
    struct StatRow {
        #[tabled(rename = "Activity")]
        name: String,
        #[tabled(rename = "Count")]
        count: usize,
        #[tabled(rename = "Last")]
        since: String,
    }

    #[derive(Tabled)]
    struct ChartRow {
        #[tabled(rename = "Day")]
        label: String,
        #[tabled(rename = "Total")]
        total: usize,
        #[tabled(rename = "")]
        bar: String,
        #[tabled(rename = "Breakdown")]
        breakdown: String,
    }

    match &view.sync_badge {
        Some(badge) => println!("{}  [{badge}]", view.greeting),
        None => println!("{}", view.greeting),
    }
    println!();

    let rows: Vec<StatRow> = view
        .quick_stats
        .iter()
        .map(|s| StatRow {
            name: s.name.clone(),
            count: s.count,
            since: s.since.clone().unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    println!("Quick stats ({})", view.filter);
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}\n");

    let max = view.chart.iter().map(DayCounts::total).max().unwrap_or(0).max(1);
    let chart: Vec<ChartRow> = view
        .chart
        .iter()
        .map(|day| {
            let total = day.total();
            ChartRow {
                label: day.label.clone(),
                total,
                bar: "█".repeat(total * BAR_WIDTH / max),
                breakdown: day
                    .counts
                    .iter()
                    .filter(|(_, n)| *n > 0)
                    .map(|(name, n)| format!("{name} {n}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })
        .collect();
    println!("Last {CHART_DAYS} days");
    let table = Table::new(&chart)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}\n");

    println!("Recent activity");
    if view.recent.is_empty() {
        println!("  Nothing logged yet. Try: tinysteps log pee");
    } else {
        let recent = recent_entries(tracker.entries(), RECENT_ENTRIES);
        print_entry_table(&recent, tracker.types(), "%a %H:%M");
    }

    if let Some(insight) = &view.insight {
        println!("\nInsight");
        println!("  {}", insight.summary);
        for s in &insight.suggestions {
            println!("  - {s}");
        }
    }
}

async fn render_once(
    tracker: &TrackerService,
    client: Option<&GeminiClient>,
    cache: &mut InsightCache,
    options: &DashboardOptions,
) -> Result<()> {
    let insight = cache.refresh(tracker, client, options.insights).await;
    let view = build_view(tracker, options, insight)?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view, tracker);
    }
    Ok(())
}

pub(crate) async fn cmd_dashboard(
    tracker: &mut TrackerService,
    client: Option<&GeminiClient>,
    options: &DashboardOptions,
) -> Result<()> {
    let mut cache = InsightCache::default();

    if !options.watch {
        return render_once(tracker, client, &mut cache, options).await;
    }

    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracker.reload()?;
                if !options.json {
                    // Clear screen, cursor home.
                    print!("\x1b[2J\x1b[H");
                }
                render_once(tracker, client, &mut cache, options).await?;
                if !options.json {
                    let at = Local::now().format("%H:%M");
                    println!("\nUpdated {at}. Refreshing every minute, Ctrl-C to quit.");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    debug!("dashboard watch stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::helpers::now_ms;
    use tinysteps_core::models::ActivityEntry;

    fn options() -> DashboardOptions {
        DashboardOptions {
            filter: TimeFilter::Last7d,
            selection: Vec::new(),
            insights: true,
            watch: false,
            json: true,
        }
    }

    #[test]
    fn test_build_view_without_sync_key() {
        let mut tracker = TrackerService::open_in_memory().unwrap();
        tracker.set_baby_name("Ada").unwrap();
        tracker
            .add_entry(ActivityEntry {
                id: "a".to_string(),
                type_id: "pee".to_string(),
                timestamp: now_ms() - 90 * 60 * 1000,
                value: None,
                note: None,
            })
            .unwrap();

        let view = build_view(&tracker, &options(), None).unwrap();
        assert_eq!(view.greeting, "Ada's Dashboard");
        assert!(view.sync_badge.is_none());
        assert_eq!(view.quick_stats.len(), QUICK_STAT_TYPES.len());
        let pee = view.quick_stats.iter().find(|s| s.type_id == "pee").unwrap();
        assert_eq!(pee.count, 1);
        assert_eq!(pee.since.as_deref(), Some("1h 30m ago"));
        assert_eq!(view.chart.len(), 7);
        assert_eq!(view.recent.len(), 1);
    }

    #[test]
    fn test_build_view_sync_badge() {
        let tracker = TrackerService::open_in_memory().unwrap();
        tracker.set_sync_key("abc123def456").unwrap();
        let view = build_view(&tracker, &options(), None).unwrap();
        assert_eq!(view.sync_badge.as_deref(), Some("Cloud Ready"));
    }

    #[tokio::test]
    async fn test_insight_skipped_without_client_or_history() {
        let tracker = TrackerService::open_in_memory().unwrap();
        let mut cache = InsightCache::default();
        assert!(cache.refresh(&tracker, None, true).await.is_none());
    }
}

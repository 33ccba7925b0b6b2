use anyhow::{Result, bail};
use std::process;

use crate::gemini::GeminiClient;
use tinysteps_core::insights::MIN_ENTRIES_FOR_INSIGHT;
use tinysteps_core::service::TrackerService;

use super::helpers::json_error;

/// Ask for an insight on demand. Unlike the dashboard, failures surface as
/// errors here.
pub(crate) async fn cmd_insights(
    tracker: &TrackerService,
    client: Option<&GeminiClient>,
    json: bool,
) -> Result<()> {
    let Some(client) = client else {
        bail!("No Gemini API key configured. Set GEMINI_API_KEY or insights.api_key in config.toml");
    };

    if tracker.entries().len() < MIN_ENTRIES_FOR_INSIGHT {
        let message = format!(
            "Log at least {MIN_ENTRIES_FOR_INSIGHT} activities before asking for insights"
        );
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    }

    let insight = client.generate(tracker.entries(), tracker.types()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&insight)?);
    } else {
        println!("{}\n", insight.summary);
        for s in &insight.suggestions {
            println!("  - {s}");
        }
    }
    Ok(())
}

use anyhow::{Context, Result};
use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{ActivityEntry, ActivityType, AiInsight};

/// How many of the latest entries are sent for analysis.
pub const INSIGHT_CONTEXT_ENTRIES: usize = 20;

/// The dashboard only asks for an insight once there is this much history.
pub const MIN_ENTRIES_FOR_INSIGHT: usize = 5;

pub const UNKNOWN_ACTIVITY: &str = "Unknown";

/// Human-readable projection of an entry sent as model context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightRecord {
    pub activity: String,
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Project the most recent entries, oldest first.
#[must_use]
pub fn recent_records<Tz: TimeZone>(
    entries: &[ActivityEntry],
    types: &[ActivityType],
    tz: &Tz,
    limit: usize,
) -> Vec<InsightRecord>
where
    Tz::Offset: std::fmt::Display,
{
    let mut recent: Vec<&ActivityEntry> = entries.iter().collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent.truncate(limit);
    recent.reverse();

    recent
        .into_iter()
        .map(|e| InsightRecord {
            activity: types
                .iter()
                .find(|t| t.id == e.type_id)
                .map_or_else(|| UNKNOWN_ACTIVITY.to_string(), |t| t.name.clone()),
            time: tz
                .timestamp_millis_opt(e.timestamp)
                .single()
                .map_or_else(
                    || e.timestamp.to_string(),
                    |dt| dt.format("%Y-%m-%d %H:%M").to_string(),
                ),
            value: e.value,
            note: e.note.clone(),
        })
        .collect()
}

pub fn build_prompt(records: &[InsightRecord]) -> Result<String> {
    let logs = serde_json::to_string(records).context("Failed to serialize activity logs")?;
    Ok(format!(
        "Analyze the following baby activity logs and provide a brief summary of the baby's patterns \
         and 2-3 helpful suggestions for the parents. Keep it supportive and medical-advice-free.\n\n\
         Logs: {logs}"
    ))
}

// --- Gemini generateContent wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

/// Schema forcing `{summary: string, suggestions: string[]}`.
#[must_use]
pub fn insight_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": { "type": "STRING" },
            "suggestions": {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            }
        },
        "required": ["summary", "suggestions"]
    })
}

#[must_use]
pub fn build_request(prompt: String) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part { text: Some(prompt) }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: insight_schema(),
        },
    }
}

/// Pull the structured insight out of the first candidate's text.
pub fn parse_insight(response: GenerateContentResponse) -> Result<AiInsight> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .context("Model returned no candidates")?
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();
    if text.trim().is_empty() {
        anyhow::bail!("Model returned an empty response");
    }
    serde_json::from_str(text.trim()).context("Model response is not a valid insight")
}

use anyhow::{Context, Result, bail};
use chrono::Local;
use tracing::{debug, warn};

use crate::config::InsightsConfig;
use tinysteps_core::insights::{
    GenerateContentResponse, INSIGHT_CONTEXT_ENTRIES, build_prompt, build_request, parse_insight,
    recent_records,
};
use tinysteps_core::models::{ActivityEntry, ActivityType, AiInsight};

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiClient {
    /// `None` when no API key is configured.
    pub fn from_config(config: &InsightsConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .user_agent(format!("tinysteps-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Some(Self {
            client,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }))
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    /// Summarise the most recent entries.
    pub async fn generate(
        &self,
        entries: &[ActivityEntry],
        types: &[ActivityType],
    ) -> Result<AiInsight> {
        let records = recent_records(entries, types, &Local, INSIGHT_CONTEXT_ENTRIES);
        let request = build_request(build_prompt(&records)?);

        debug!(model = %self.model, records = records.len(), "requesting insight");
        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach Gemini API")?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            match status.as_u16() {
                401 | 403 => bail!("Gemini rejected the API key ({status})"),
                429 => bail!("Gemini rate limit reached, try again later"),
                _ => bail!("Gemini API error ({status}): {}", message.trim()),
            }
        }

        let body: GenerateContentResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini response")?;
        parse_insight(body)
    }

    /// Like [`generate`](Self::generate), but failures are logged and yield
    /// no insight.
    pub async fn insight_or_none(
        &self,
        entries: &[ActivityEntry],
        types: &[ActivityType],
    ) -> Option<AiInsight> {
        match self.generate(entries, types).await {
            Ok(insight) => Some(insight),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "insight generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tinysteps_core::models::default_activity_types;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::from_config(&InsightsConfig {
            api_key: Some("test-key".to_string()),
            model: "gemini-test".to_string(),
            endpoint: server.uri(),
            timeout_secs: 5,
        })
        .unwrap()
        .unwrap()
    }

    fn entries() -> Vec<ActivityEntry> {
        (0..6)
            .map(|i| ActivityEntry {
                id: format!("e{i}"),
                type_id: "cup_feed".to_string(),
                timestamp: 1_700_000_000_000 + i * 3_600_000,
                value: Some(90.0),
                note: None,
            })
            .collect()
    }

    fn model_reply(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] }
            }]
        })
    }

    #[test]
    fn test_no_key_means_no_client() {
        let config = InsightsConfig::default();
        assert!(GeminiClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_reply(
                r#"{"summary":"Regular feeds every hour","suggestions":["Track naps too"]}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let insight = client_for(&server)
            .generate(&entries(), &default_activity_types())
            .await
            .unwrap();
        assert_eq!(insight.summary, "Regular feeds every hour");
        assert_eq!(insight.suggestions, vec!["Track naps too"]);
    }

    #[tokio::test]
    async fn test_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .generate(&entries(), &default_activity_types())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn test_insight_or_none_swallows_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(model_reply("not json at all")))
            .mount(&server)
            .await;

        let insight = client_for(&server)
            .insight_or_none(&entries(), &default_activity_types())
            .await;
        assert!(insight.is_none());
    }
}

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::SyncConfig;
use tinysteps_core::models::SyncData;
use tinysteps_core::sync::SyncTransport;

/// Anonymous key/value store reached over HTTP. Each sync key maps to
/// `{endpoint}/{prefix}{key}`: POST stores a snapshot, GET returns it.
pub struct HttpKvStore {
    client: reqwest::Client,
    endpoint: String,
    prefix: String,
    api_key: Option<String>,
}

impl HttpKvStore {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("tinysteps-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            prefix: config.key_prefix.clone(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}{}", self.endpoint, self.prefix, key)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl SyncTransport for HttpKvStore {
    async fn push(&self, key: &str, data: &SyncData) -> Result<()> {
        let url = self.url_for(key);
        debug!(%url, entries = data.entries.len(), "pushing snapshot");
        let resp = self
            .authorize(self.client.post(&url).json(data))
            .send()
            .await
            .context("Failed to reach sync server")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Sync server rejected upload ({status})");
        }
        Ok(())
    }

    async fn pull(&self, key: &str) -> Result<Option<SyncData>> {
        let url = self.url_for(key);
        debug!(%url, "pulling snapshot");
        let resp = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .context("Failed to reach sync server")?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            bail!("Sync server returned {status}");
        }

        let body = resp
            .text()
            .await
            .context("Failed to read sync server response")?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str::<Option<SyncData>>(&body)
            .context("Sync server returned an invalid snapshot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tinysteps_core::models::{ActivityEntry, default_activity_types};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, api_key: Option<&str>) -> HttpKvStore {
        HttpKvStore::new(&SyncConfig {
            endpoint: format!("{}/", server.uri()),
            key_prefix: "tinysteps_v1_".to_string(),
            api_key: api_key.map(str::to_string),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn snapshot() -> SyncData {
        SyncData {
            entries: vec![ActivityEntry {
                id: "abc123xyz".to_string(),
                type_id: "pee".to_string(),
                timestamp: 1_700_000_000_000,
                value: None,
                note: None,
            }],
            types: default_activity_types(),
            baby_name: "Ada".to_string(),
            last_updated: 1_700_000_000_500,
        }
    }

    #[tokio::test]
    async fn test_url_joins_prefix_and_key() {
        let server = MockServer::start().await;
        let store = store_for(&server, None);
        assert_eq!(
            store.url_for("k3y"),
            format!("{}/tinysteps_v1_k3y", server.uri())
        );
    }

    #[tokio::test]
    async fn test_push_posts_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tinysteps_v1_family1"))
            .and(body_partial_json(json!({ "babyName": "Ada", "lastUpdated": 1_700_000_000_500_i64 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server, None)
            .push("family1", &snapshot())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server, Some("s3cret"))
            .push("family1", &snapshot())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = store_for(&server, None)
            .push("family1", &snapshot())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_pull_returns_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tinysteps_v1_family1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&snapshot()))
            .mount(&server)
            .await;

        let pulled = store_for(&server, None).pull("family1").await.unwrap();
        assert_eq!(pulled, Some(snapshot()));
    }

    #[tokio::test]
    async fn test_pull_missing_key_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(store_for(&server, None).pull("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pull_null_body_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        assert!(store_for(&server, None).pull("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pull_server_error_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(store_for(&server, None).pull("family1").await.is_err());
    }

    #[tokio::test]
    async fn test_pull_malformed_snapshot_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"entries\": 7}"))
            .mount(&server)
            .await;

        let err = store_for(&server, None).pull("family1").await.unwrap_err();
        assert!(err.to_string().contains("invalid snapshot"));
    }
}

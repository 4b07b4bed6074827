//! Typed async client for the log-analytics REST API.
//!
//! One async function per endpoint, each returning a tagged success/error
//! result. The trait is the seam the rest of the engine depends on; tests
//! substitute scripted fakes for it.

use crate::error::EngineError;
use crate::models::{
    AlertRule, LogRecord, QueryRequest, RetentionInfo, SavedFilter, SchemaField, ServerInfo,
    StreamInfo, StreamStats,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[async_trait]
pub trait LogApiClient: Send + Sync {
    async fn query(&self, request: QueryRequest) -> Result<Vec<LogRecord>, EngineError>;
    async fn list_streams(&self) -> Result<Vec<StreamInfo>, EngineError>;
    async fn get_schema(&self, stream: &str) -> Result<Vec<SchemaField>, EngineError>;
    async fn get_stream_stats(&self, stream: &str) -> Result<StreamStats, EngineError>;
    async fn get_retention(&self) -> Result<RetentionInfo, EngineError>;
    async fn get_server_info(&self) -> Result<ServerInfo, EngineError>;
    async fn list_saved_filters(&self) -> Result<Vec<SavedFilter>, EngineError>;
    async fn create_saved_filter(&self, filter: SavedFilter) -> Result<SavedFilter, EngineError>;
    async fn delete_saved_filter(&self, id: &str) -> Result<(), EngineError>;
    async fn list_alerts(&self) -> Result<Vec<AlertRule>, EngineError>;
    async fn delete_alert(&self, name: &str) -> Result<(), EngineError>;
    async fn delete_stream(&self, stream: &str) -> Result<(), EngineError>;
}

/// reqwest-backed implementation.
///
/// Auth header construction and TLS setup belong to the collaborator that
/// builds the `reqwest::Client` passed in here.
pub struct HttpLogApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpLogApiClient {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url, timeout }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url).timeout(self.timeout)
    }

    /// Send a request; map non-2xx to `Http`, transport failures to
    /// `Network`, and body decode failures to `Parse`.
    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, EngineError> {
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(code = status.as_u16(), "api request failed");
            return Err(EngineError::Http {
                code: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_no_content(&self, builder: RequestBuilder) -> Result<(), EngineError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EngineError::Http {
                code: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LogApiClient for HttpLogApiClient {
    async fn query(&self, request: QueryRequest) -> Result<Vec<LogRecord>, EngineError> {
        tracing::debug!(query = %request.query, "executing search");
        self.send_json(self.request(Method::POST, "/search").json(&request))
            .await
    }

    async fn list_streams(&self) -> Result<Vec<StreamInfo>, EngineError> {
        self.send_json(self.request(Method::GET, "/streams")).await
    }

    async fn get_schema(&self, stream: &str) -> Result<Vec<SchemaField>, EngineError> {
        self.send_json(self.request(Method::GET, &format!("/streams/{}/schema", stream)))
            .await
    }

    async fn get_stream_stats(&self, stream: &str) -> Result<StreamStats, EngineError> {
        self.send_json(self.request(Method::GET, &format!("/streams/{}/stats", stream)))
            .await
    }

    async fn get_retention(&self) -> Result<RetentionInfo, EngineError> {
        self.send_json(self.request(Method::GET, "/settings/retention"))
            .await
    }

    async fn get_server_info(&self) -> Result<ServerInfo, EngineError> {
        self.send_json(self.request(Method::GET, "/info")).await
    }

    async fn list_saved_filters(&self) -> Result<Vec<SavedFilter>, EngineError> {
        self.send_json(self.request(Method::GET, "/filters")).await
    }

    async fn create_saved_filter(&self, filter: SavedFilter) -> Result<SavedFilter, EngineError> {
        self.send_json(self.request(Method::POST, "/filters").json(&filter))
            .await
    }

    async fn delete_saved_filter(&self, id: &str) -> Result<(), EngineError> {
        self.send_no_content(self.request(Method::DELETE, &format!("/filters/{}", id)))
            .await
    }

    async fn list_alerts(&self) -> Result<Vec<AlertRule>, EngineError> {
        self.send_json(self.request(Method::GET, "/alerts")).await
    }

    async fn delete_alert(&self, name: &str) -> Result<(), EngineError> {
        self.send_no_content(self.request(Method::DELETE, &format!("/alerts/{}", name)))
            .await
    }

    async fn delete_stream(&self, stream: &str) -> Result<(), EngineError> {
        self.send_no_content(self.request(Method::DELETE, &format!("/streams/{}", stream)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = HttpLogApiClient::new(
            Client::new(),
            "http://localhost:5080/api/default/",
            Duration::from_secs(5),
        );
        assert_eq!(client.base_url, "http://localhost:5080/api/default");
    }

    #[test]
    fn test_query_request_serializes() {
        let request = QueryRequest {
            query: "SELECT * FROM \"app\" LIMIT 100".to_string(),
            start_time: "2024-01-01T11:00:00.000000+00:00".to_string(),
            end_time: "2024-01-01T12:00:00.000000+00:00".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("SELECT * FROM"));
        assert!(json.contains("startTime"));
    }
}

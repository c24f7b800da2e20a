//! Query service client
//!
//! A [`Client`] submits request documents and hands back a
//! [`Cursor`](crate::cursor::Cursor) over the matching spans. The wire
//! protocol sits behind the [`Transport`] trait:
//!
//! ```text
//! POST {host}/query                       -> `location` header = query id
//! GET  {host}/query/{id}/spans[?limit=n]  -> {"spans": [...], "cursor": ...}
//! GET  {host}/query/{token}/events        -> {"streams": {...}, "events": [...]}
//!                                            next token in `cursor` header
//! ```

mod error;
mod http;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ApiError, ApiResult, NotFoundKind};
pub use http::HttpTransport;

use crate::config::ClientConfig;
use crate::cursor::Cursor;
use crate::query::{ast_dict, Returning, Select};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::sync::Arc;

/// One matching span as delivered by the service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSpan {
    /// Handle used to page through this span's events
    pub cursor: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// A page of spans
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SpanPage {
    #[serde(default)]
    pub spans: Vec<RawSpan>,
    /// Continuation; absent on the last page
    #[serde(default)]
    pub cursor: Option<String>,
}

/// One event tagged with its originating stream
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawEvent {
    pub stream: String,
    #[serde(default)]
    pub id: String,
    pub ts: String,
    #[serde(default)]
    pub event: Json,
}

/// A page of events
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventPage {
    /// Stream id to stream descriptor
    #[serde(default)]
    pub streams: Map<String, Json>,
    #[serde(default)]
    pub events: Vec<RawEvent>,
    /// Continuation, taken from the `cursor` response header
    #[serde(skip)]
    pub cursor: Option<String>,
}

/// Wire protocol of the query service
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a request document and return the query id
    async fn submit(&self, document: &Json) -> ApiResult<String>;

    /// Fetch a page of spans for a query id or span continuation
    async fn spans_page(&self, cursor: &str, limit: Option<usize>) -> ApiResult<SpanPage>;

    /// Fetch a page of events for a windowed token or event continuation
    async fn events_page(&self, token: &str) -> ApiResult<EventPage>;
}

/// Parse a service timestamp; offset-less values are taken as UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Entry point for running queries
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl Client {
    /// Create a client talking HTTP to `config.host`
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over an arbitrary transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { transport, config }
    }

    /// Get the current configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run a query, optionally with per-stream projections
    pub async fn query(&self, select: &Select, returning: Option<&Returning>) -> ApiResult<Cursor> {
        self.submit_document(&ast_dict(select, returning)).await
    }

    /// Run an already serialized request document
    pub async fn submit_document(&self, document: &Json) -> ApiResult<Cursor> {
        let query_id = self.transport.submit(document).await?;
        tracing::info!(query_id = %query_id, "Submitted query");
        Ok(Cursor::new(self.transport.clone(), query_id, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::ScriptedTransport;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp() {
        let expected = Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2020-01-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2020-01-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-01-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_event_page_shape() {
        let page: EventPage = serde_json::from_value(json!({
            "streams": {"s1": "weather"},
            "events": [{"stream": "s1", "id": "e1", "ts": "2020-01-01T00:00:00Z", "event": {"t": 1}}],
        }))
        .unwrap();
        assert_eq!(page.events[0].event, json!({"t": 1}));
        assert_eq!(page.cursor, None);
    }

    #[tokio::test]
    async fn test_query_submits_document() {
        let transport = Arc::new(ScriptedTransport::new("q-123"));
        let client = Client::with_transport(ClientConfig::default(), transport.clone());

        let cursor = client.query(&Select::new(), None).await.unwrap();
        assert_eq!(cursor.query_id(), "q-123");
        assert_eq!(transport.submitted(), vec![json!({"select": {"expr": "true"}})]);
    }
}

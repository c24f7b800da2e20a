//! In-memory transport for tests and benchmarks
//!
//! Span pages are replayed in order. Event pages are queued per span handle
//! (the part of the token before the first `+`), so concurrent slices each
//! see their own script.

use super::error::{ApiError, ApiResult};
use super::{EventPage, RawEvent, RawSpan, SpanPage, Transport};
use async_trait::async_trait;
use serde_json::{json, Map, Value as Json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Replays queued responses and records every request
#[derive(Default)]
pub struct ScriptedTransport {
    query_id: String,
    span_pages: Mutex<VecDeque<ApiResult<SpanPage>>>,
    event_pages: Mutex<HashMap<String, VecDeque<ApiResult<EventPage>>>>,
    submitted: Mutex<Vec<Json>>,
    requests: Mutex<Vec<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedTransport {
    /// Transport that answers every submission with `query_id`
    pub fn new(query_id: &str) -> Self {
        Self {
            query_id: query_id.to_string(),
            ..Self::default()
        }
    }

    /// Queue a span page result
    pub fn push_spans(&self, page: ApiResult<SpanPage>) -> &Self {
        lock(&self.span_pages).push_back(page);
        self
    }

    /// Queue an event page result for the span with handle `root`
    pub fn push_events(&self, root: &str, page: ApiResult<EventPage>) -> &Self {
        lock(&self.event_pages)
            .entry(root.to_string())
            .or_default()
            .push_back(page);
        self
    }

    /// Documents submitted so far
    pub fn submitted(&self) -> Vec<Json> {
        lock(&self.submitted).clone()
    }

    /// Paths requested so far, e.g. `spans:q1` or `events:s1+...`
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(&self, document: &Json) -> ApiResult<String> {
        lock(&self.submitted).push(document.clone());
        lock(&self.requests).push("submit".to_string());
        Ok(self.query_id.clone())
    }

    async fn spans_page(&self, cursor: &str, _limit: Option<usize>) -> ApiResult<SpanPage> {
        lock(&self.requests).push(format!("spans:{}", cursor));
        lock(&self.span_pages)
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Malformed(format!("no scripted spans for {}", cursor))))
    }

    async fn events_page(&self, token: &str) -> ApiResult<EventPage> {
        lock(&self.requests).push(format!("events:{}", token));
        let root = token.split('+').next().unwrap_or(token);
        lock(&self.event_pages)
            .get_mut(root)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ApiError::Malformed(format!("no scripted events for {}", token))))
    }
}

/// Span descriptor with RFC 3339 bounds
pub fn span(cursor: &str, start: Option<&str>, end: Option<&str>) -> RawSpan {
    RawSpan {
        cursor: cursor.to_string(),
        start: start.map(str::to_string),
        end: end.map(str::to_string),
    }
}

/// Span page with an optional continuation
pub fn span_page(spans: Vec<RawSpan>, next: Option<&str>) -> SpanPage {
    SpanPage {
        spans,
        cursor: next.map(str::to_string),
    }
}

/// Event tagged with stream id `stream`
pub fn event(stream: &str, id: &str, ts: &str, body: Json) -> RawEvent {
    RawEvent {
        stream: stream.to_string(),
        id: id.to_string(),
        ts: ts.to_string(),
        event: body,
    }
}

/// Event page whose stream table names each stream after its id
pub fn event_page(events: Vec<RawEvent>, next: Option<&str>) -> EventPage {
    let mut streams = Map::new();
    for e in &events {
        streams.insert(e.stream.clone(), json!(e.stream));
    }
    EventPage {
        streams,
        events,
        cursor: next.map(str::to_string),
    }
}

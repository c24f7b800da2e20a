//! Execution cursor over a submitted query
//!
//! The cursor pages through the matching spans once (until refreshed) and
//! pages through each span's events on demand. Event pages for different
//! spans are fetched concurrently, at most `min(max_workers, spans)` at a
//! time; the fan-out lives only as long as the call that started it.
//!
//! # Event tokens
//!
//! The first event page of a span is requested with a windowed token
//! `{handle}+{start}Z+{end}Z` (naive ISO-8601 bounds); later pages use the
//! continuation the service returns.

use crate::client::{parse_timestamp, ApiError, ApiResult, RawSpan, Transport};
use crate::config::ClientConfig;
use crate::frame::{Align, FrameGroup};
use crate::query::Delta;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stand-in for an absent span start
pub fn open_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Stand-in for an absent span end
pub fn open_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// One matching span
#[derive(Debug, Clone, PartialEq)]
pub struct SpanInfo {
    /// Handle for paging this span's events
    pub cursor: String,
    /// `None` when the span is open at the start
    pub start: Option<DateTime<Utc>>,
    /// `None` when the span is open at the end
    pub end: Option<DateTime<Utc>>,
}

impl SpanInfo {
    fn from_raw(raw: RawSpan) -> ApiResult<Self> {
        let parse = |s: Option<String>| -> ApiResult<Option<DateTime<Utc>>> {
            match s.filter(|s| !s.is_empty()) {
                None => Ok(None),
                Some(s) => parse_timestamp(&s)
                    .map(Some)
                    .ok_or_else(|| ApiError::Malformed(format!("bad span timestamp {:?}", s))),
            }
        };
        Ok(Self {
            start: parse(raw.start)?,
            end: parse(raw.end)?,
            cursor: raw.cursor,
        })
    }

    /// Length of a closed span
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end? - self.start?)
    }

    /// The span as an interval, open ends replaced by sentinels
    pub fn interval(&self) -> Interval {
        Interval {
            cursor: self.cursor.clone(),
            start: self.start.unwrap_or_else(open_start),
            end: self.end.unwrap_or_else(open_end),
        }
    }
}

/// A stretch of time to fetch events for, and the handle to fetch them with
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub cursor: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Statistics over the lengths of closed spans
#[derive(Debug, Clone, PartialEq)]
pub struct SpanStats {
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub median: Duration,
    pub count: usize,
}

impl SpanStats {
    /// `None` when no span has both ends
    pub fn from_spans(spans: &[SpanInfo]) -> Option<Self> {
        let mut deltas: Vec<Duration> = spans.iter().filter_map(SpanInfo::duration).collect();
        if deltas.is_empty() {
            return None;
        }
        deltas.sort();
        let count = deltas.len();
        let total_ms: i64 = deltas.iter().map(Duration::num_milliseconds).sum();
        Some(Self {
            min: deltas[0],
            max: deltas[count - 1],
            mean: Duration::milliseconds(total_ms / count as i64),
            median: deltas[count / 2],
            count,
        })
    }
}

/// An event with its stream tag removed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: String,
    pub ts: String,
    pub event: Json,
}

/// All events of one stream within a slice, in arrival order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvents {
    #[serde(skip)]
    pub id: String,
    pub stream: Json,
    pub events: Vec<Event>,
}

impl StreamEvents {
    /// Name used for column prefixes: the descriptor itself when it is a
    /// string, its `name` field when it has one, else the stream id
    pub fn name(&self) -> &str {
        self.stream
            .as_str()
            .or_else(|| self.stream.get("name").and_then(Json::as_str))
            .unwrap_or(&self.id)
    }
}

/// Events for one interval, grouped by stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceResult {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub streams: Vec<StreamEvents>,
}

/// Windowed token for the first event page of a span
fn window_token(cursor: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    const FMT: &str = "%Y-%m-%dT%H:%M:%S%.f";
    format!(
        "{}+{}Z+{}Z",
        cursor.split('+').next().unwrap_or(cursor),
        start.naive_utc().format(FMT),
        end.naive_utc().format(FMT)
    )
}

/// Live handle to a submitted query
pub struct Cursor {
    transport: Arc<dyn Transport>,
    query_id: String,
    limit: Option<usize>,
    max_retries: u32,
    max_workers: usize,
    spans: RwLock<Option<Arc<Vec<SpanInfo>>>>,
}

impl Cursor {
    /// Create a cursor for an already submitted query
    pub fn new(transport: Arc<dyn Transport>, query_id: String, config: &ClientConfig) -> Self {
        Self {
            transport,
            query_id,
            limit: config.span_limit,
            max_retries: config.max_retries,
            max_workers: config.max_workers,
            spans: RwLock::new(None),
        }
    }

    /// Server-assigned query id
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Matching spans, fetched on first use or when `refresh` is set
    pub async fn spans(&self, refresh: bool) -> ApiResult<Arc<Vec<SpanInfo>>> {
        if !refresh {
            if let Some(cached) = self.spans.read().await.as_ref() {
                return Ok(cached.clone());
            }
        }

        let mut spans = Vec::new();
        let mut next = Some(self.query_id.clone());
        while let Some(cid) = next {
            let page = self.transport.spans_page(&cid, self.limit).await?;
            tracing::debug!(cursor = %cid, count = page.spans.len(), "Fetched span page");
            for raw in page.spans {
                spans.push(SpanInfo::from_raw(raw)?);
            }
            next = page.cursor;
            if let Some(limit) = self.limit {
                if spans.len() >= limit {
                    spans.truncate(limit);
                    break;
                }
            }
        }

        tracing::info!(query_id = %self.query_id, spans = spans.len(), "Fetched spans");
        let spans = Arc::new(spans);
        *self.spans.write().await = Some(spans.clone());
        Ok(spans)
    }

    /// Number of matching spans
    pub async fn len(&self) -> ApiResult<usize> {
        Ok(self.spans(false).await?.len())
    }

    /// Check whether nothing matched
    pub async fn is_empty(&self) -> ApiResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Duration statistics over closed spans
    pub async fn stats(&self) -> ApiResult<Option<SpanStats>> {
        Ok(SpanStats::from_spans(&self.spans(false).await?))
    }

    /// Fetch every event in `[start, end)` of the span with handle `cursor`
    ///
    /// A retryable page failure is retried in place; `max_retries`
    /// consecutive retries are tolerated and any success resets the count.
    pub async fn slice(
        &self,
        cursor: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<SliceResult> {
        let mut streams: Vec<StreamEvents> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut retries = 0u32;
        let mut next = Some(window_token(cursor, start, end));

        while let Some(token) = next.take() {
            let page = match self.transport.events_page(&token).await {
                Ok(page) => page,
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    tracing::warn!(token = %token, retries, error = %e, "Retrying event page");
                    next = Some(token);
                    continue;
                }
                Err(e) if e.is_retryable() => {
                    tracing::error!(token = %token, error = %e, "Giving up on event page");
                    return Err(ApiError::PaginationExhausted {
                        attempts: retries + 1,
                    });
                }
                Err(e) => return Err(e),
            };
            retries = 0;
            tracing::debug!(token = %token, events = page.events.len(), "Fetched event page");

            for (sid, descriptor) in page.streams {
                if !positions.contains_key(&sid) {
                    positions.insert(sid.clone(), streams.len());
                    streams.push(StreamEvents {
                        id: sid,
                        stream: descriptor,
                        events: Vec::new(),
                    });
                }
            }
            for raw in page.events {
                let pos = *positions.get(&raw.stream).ok_or_else(|| {
                    ApiError::Malformed(format!("event from undeclared stream {}", raw.stream))
                })?;
                streams[pos].events.push(Event {
                    id: raw.id,
                    ts: raw.ts,
                    event: raw.event,
                });
            }
            next = page.cursor;
        }

        Ok(SliceResult { start, end, streams })
    }

    /// Slice every interval, keeping interval order
    pub async fn slices(&self, intervals: Vec<Interval>) -> ApiResult<Vec<SliceResult>> {
        if intervals.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.max_workers.min(intervals.len()).max(1);
        stream::iter(intervals)
            .map(|iv| async move { self.slice(&iv.cursor, iv.start, iv.end).await })
            .buffered(workers)
            .try_collect()
            .await
    }

    /// Every span's events as a pretty-printed JSON array
    pub async fn json(&self) -> ApiResult<String> {
        let spans = self.spans(false).await?;
        let data = self.slices(spans.iter().map(SpanInfo::interval).collect()).await?;
        serde_json::to_string_pretty(&data).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    /// One frame per span (or gap), optionally narrowed to `window` and
    /// resampled to `freq`
    pub fn dataset(&self, window: Option<Delta>, align: Align, freq: Option<Delta>) -> FrameGroup<'_> {
        FrameGroup::dataset(self, window, align, freq)
    }

    /// Fixed-size windows of `lookback + horizon`, advancing by `slide`
    pub fn sliding(&self, lookback: Delta, horizon: Delta, slide: Delta, freq: Delta) -> FrameGroup<'_> {
        FrameGroup::sliding(self, lookback, horizon, slide, freq)
    }
}

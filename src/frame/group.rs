//! Restartable groups of result frames

use super::error::FrameResult;
use super::table::{Frame, StackedFrame, Tensor};
use super::window::{carve, intervals, invert, narrow, shift, Align};
use crate::cursor::{Cursor, Interval, SliceResult};
use crate::query::{Delta, StreamPath};
use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Dataset {
        window: Option<Duration>,
        align: Align,
        freq: Option<Duration>,
    },
    Sliding {
        lookback: Duration,
        horizon: Duration,
        slide: Duration,
        freq: Duration,
    },
}

/// Frames derived from a cursor, one per interval (or per sliding window)
///
/// Nothing is fetched until a view is requested, and every view re-derives
/// the intervals from the cursor's cached spans, so a group can be read any
/// number of times.
#[derive(Clone, Copy)]
pub struct FrameGroup<'a> {
    cursor: &'a Cursor,
    mode: Mode,
    inverted: bool,
}

impl<'a> FrameGroup<'a> {
    pub(crate) fn dataset(
        cursor: &'a Cursor,
        window: Option<Delta>,
        align: Align,
        freq: Option<Delta>,
    ) -> Self {
        Self {
            cursor,
            mode: Mode::Dataset {
                window: window.map(Duration::from),
                align,
                freq: freq.map(Duration::from),
            },
            inverted: false,
        }
    }

    pub(crate) fn sliding(
        cursor: &'a Cursor,
        lookback: Delta,
        horizon: Delta,
        slide: Delta,
        freq: Delta,
    ) -> Self {
        Self {
            cursor,
            mode: Mode::Sliding {
                lookback: lookback.into(),
                horizon: horizon.into(),
                slide: slide.into(),
                freq: freq.into(),
            },
            inverted: false,
        }
    }

    /// Same group over the gaps between spans instead of the spans
    pub fn inverse(&self) -> Self {
        Self {
            inverted: true,
            ..*self
        }
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Materialize every frame
    pub async fn frames(&self) -> FrameResult<Vec<Frame>> {
        let spans = self.cursor.spans(false).await?;
        let base = if self.inverted {
            invert(&spans)
        } else {
            intervals(&spans)
        };

        match self.mode {
            Mode::Dataset { window, align, freq } => {
                let ivs = base.into_iter().map(|iv| narrow(iv, window, align)).collect();
                let slices = self.cursor.slices(ivs).await?;
                slices.iter().map(|s| joined(s, freq)).collect()
            }
            Mode::Sliding {
                lookback,
                horizon,
                slide,
                freq,
            } => {
                let ivs = base
                    .into_iter()
                    .map(|iv| Interval {
                        end: shift(iv.end, horizon),
                        ..iv
                    })
                    .collect();
                let slices = self.cursor.slices(ivs).await?;
                let mut out = Vec::new();
                for s in &slices {
                    out.extend(windows(s, lookback, horizon, slide, freq)?);
                }
                Ok(out)
            }
        }
    }

    /// Frames projected onto `columns` (all columns when empty), optionally
    /// without the `stream:` prefixes
    pub async fn dataframes(
        &self,
        columns: &[StreamPath],
        drop_stream_names: bool,
    ) -> FrameResult<Vec<Frame>> {
        let names: Vec<String> = columns.iter().map(StreamPath::column_name).collect();
        let mut frames = self.frames().await?;
        if !names.is_empty() {
            frames = frames
                .iter()
                .map(|f| f.select(&names))
                .collect::<FrameResult<_>>()?;
        }
        if drop_stream_names {
            frames = frames.into_iter().map(Frame::strip_prefixes).collect();
        }
        Ok(frames)
    }

    /// All frames in one table indexed by `(ts, span, delta)`
    pub async fn dataframe(
        &self,
        columns: &[StreamPath],
        drop_stream_names: bool,
    ) -> FrameResult<StackedFrame> {
        let frames = self.dataframes(columns, drop_stream_names).await?;
        Ok(StackedFrame::concat(&frames))
    }

    /// All frames stacked into one array; shapes must match
    ///
    /// With no `columns`, every data column is used and the event-id columns
    /// are left out.
    pub async fn tensor(&self, columns: &[StreamPath], drop_stream_names: bool) -> FrameResult<Tensor> {
        let mut frames = self.dataframes(columns, drop_stream_names).await?;
        if columns.is_empty() {
            frames = frames.iter().map(Frame::without_ids).collect();
        }
        Tensor::stack(&frames)
    }
}

/// Non-empty per-stream frames of a slice, with the stream names
fn stream_frames(slice: &SliceResult) -> FrameResult<Vec<(String, Frame)>> {
    let mut out = Vec::new();
    for s in &slice.streams {
        let frame = Frame::from_events(&s.events)?;
        if !frame.is_empty() {
            out.push((s.name().to_string(), frame));
        }
    }
    Ok(out)
}

/// One table per slice: optionally resampled, prefixed and outer-joined
fn joined(slice: &SliceResult, freq: Option<Duration>) -> FrameResult<Frame> {
    let mut prefixed = Vec::new();
    for (name, frame) in stream_frames(slice)? {
        let frame = match freq {
            Some(f) => frame.resample(f)?,
            None => frame,
        };
        prefixed.push(frame.prefixed(&name));
    }
    Ok(Frame::outer_join(prefixed))
}

/// Full sliding windows of one slice
///
/// Windows are carved between the latest first row and just past the
/// earliest last row across the resampled streams.
fn windows(
    slice: &SliceResult,
    lookback: Duration,
    horizon: Duration,
    slide: Duration,
    freq: Duration,
) -> FrameResult<Vec<Frame>> {
    let mut resampled = Vec::new();
    for (name, frame) in stream_frames(slice)? {
        resampled.push((name, frame.resample(freq)?));
    }

    let first = resampled.iter().filter_map(|(_, f)| f.first_ts()).max();
    let last = resampled.iter().filter_map(|(_, f)| f.last_ts()).min();
    let (start, end) = match (first, last) {
        (Some(f), Some(l)) => (f, shift(l, Duration::seconds(1))),
        _ => return Ok(Vec::new()),
    };

    let table = Frame::outer_join(
        resampled
            .into_iter()
            .map(|(name, f)| f.prefixed(&name))
            .collect(),
    );
    tracing::debug!(start = %start, end = %end, rows = table.len(), "Carving sliding windows");
    carve(&table, start, end, lookback, horizon, slide, freq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{event, event_page, span, span_page, ScriptedTransport};
    use crate::client::{parse_timestamp, ApiError};
    use crate::config::ClientConfig;
    use crate::frame::FrameError;
    use crate::query::Stream;
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value as Json};
    use std::sync::Arc;

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn cursor(transport: &Arc<ScriptedTransport>) -> Cursor {
        Cursor::new(transport.clone(), "q1".to_string(), &ClientConfig::default())
    }

    fn two_spans(transport: &ScriptedTransport) {
        transport.push_spans(Ok(span_page(
            vec![
                span("s1", Some("2020-01-01T10:00:00Z"), Some("2020-01-01T10:10:00Z")),
                span("s2", Some("2020-01-01T11:00:00Z"), Some("2020-01-01T11:10:00Z")),
            ],
            None,
        )));
    }

    #[tokio::test]
    async fn test_dataset_joins_streams() {
        let transport = Arc::new(ScriptedTransport::new("q1"));
        two_spans(&transport);
        transport.push_events(
            "s1",
            Ok(event_page(
                vec![
                    event("weather", "w1", "2020-01-01T10:00:00Z", json!({"temp": 70})),
                    event("traffic", "t1", "2020-01-01T10:01:00Z", json!({"cars": 12})),
                    event("weather", "w2", "2020-01-01T10:02:00Z", json!({"temp": 72})),
                ],
                None,
            )),
        );
        transport.push_events("s2", Ok(event_page(vec![], None)));

        let cursor = cursor(&transport);
        let frames = cursor.dataset(None, Align::Center, None).frames().await.unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0].columns(),
            &["traffic:.id", "traffic:cars", "weather:.id", "weather:temp"]
        );
        assert_eq!(frames[0].len(), 3);
        assert_eq!(frames[0].get(1, "traffic:cars"), Some(&json!(12)));
        assert_eq!(frames[0].get(1, "weather:temp"), Some(&Json::Null));
        assert!(frames[1].is_empty());
    }

    #[tokio::test]
    async fn test_dataset_window_and_resample() {
        let transport = Arc::new(ScriptedTransport::new("q1"));
        two_spans(&transport);
        let page = |id: &str, ts: &str, v: i64| {
            Ok(event_page(vec![event("w", id, ts, json!({"v": v}))], None))
        };
        transport.push_events("s1", page("a", "2020-01-01T10:04:00Z", 1));
        transport.push_events("s2", page("b", "2020-01-01T11:04:30Z", 2));

        let cursor = cursor(&transport);
        let group = cursor.dataset(
            Some(Delta::from_mins(2)),
            Align::Center,
            Some(Delta::from_mins(1)),
        );
        let frames = group.frames().await.unwrap();

        let requests = transport.requests();
        assert!(requests.contains(&"events:s1+2020-01-01T10:04:00Z+2020-01-01T10:06:00Z".to_string()));
        assert!(requests.contains(&"events:s2+2020-01-01T11:04:00Z+2020-01-01T11:06:00Z".to_string()));
        assert_eq!(frames[1].index(), &[at("2020-01-01T11:04:00Z")]);
        assert_eq!(frames[1].get(0, "w:v"), Some(&Json::Null));
    }

    #[tokio::test]
    async fn test_inverse_fetches_gaps() {
        let transport = Arc::new(ScriptedTransport::new("q1"));
        two_spans(&transport);
        transport.push_events("s1", Ok(event_page(vec![], None)));
        transport.push_events("s1", Ok(event_page(vec![], None)));

        let cursor = cursor(&transport);
        let group = cursor.dataset(None, Align::Center, None).inverse();
        assert!(group.is_inverted());
        let frames = group.frames().await.unwrap();

        assert_eq!(frames.len(), 2);
        let requests = transport.requests();
        assert!(requests.contains(&"events:s1+0001-01-01T00:00:00Z+2020-01-01T10:00:00Z".to_string()));
        assert!(requests.contains(&"events:s1+2020-01-01T10:10:00Z+2020-01-01T11:00:00Z".to_string()));
    }

    #[tokio::test]
    async fn test_sliding_windows() {
        let transport = Arc::new(ScriptedTransport::new("q1"));
        transport.push_spans(Ok(span_page(
            vec![span("s1", Some("2020-01-01T10:00:00Z"), Some("2020-01-01T10:10:00Z"))],
            None,
        )));
        let events: Vec<_> = (0..10)
            .map(|i| {
                let ts = format!("2020-01-01T10:{:02}:00Z", i);
                event("w", &i.to_string(), &ts, json!({"v": i}))
            })
            .collect();
        // one pass for `frames`, one per `tensor`
        for _ in 0..3 {
            transport.push_events("s1", Ok(event_page(events.clone(), None)));
        }

        let cursor = cursor(&transport);
        let group = cursor.sliding(
            Delta::from_mins(5),
            Delta::from_mins(1),
            Delta::from_mins(1),
            Delta::from_mins(1),
        );
        let frames = group.frames().await.unwrap();

        assert_eq!(
            transport.requests()[1],
            "events:s1+2020-01-01T10:00:00Z+2020-01-01T10:11:00Z"
        );
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.len() == 6));

        let tensor = group
            .tensor(&[Stream::new("w").attr("v")], false)
            .await
            .unwrap();
        assert_eq!(tensor.shape(), [4, 6, 1]);
        assert_eq!(tensor.get(3, 0, 0), Some(3.0));

        let all = group.tensor(&[], false).await.unwrap();
        assert_eq!(all.shape(), [4, 6, 1]);
        assert_eq!(all.get(1, 5, 0), Some(6.0));
    }

    #[tokio::test]
    async fn test_dataframe_views() {
        let transport = Arc::new(ScriptedTransport::new("q1"));
        two_spans(&transport);
        for (root, hour) in [("s1", 10), ("s2", 11)] {
            let events = vec![
                event("w", "a", &format!("2020-01-01T{}:00:00Z", hour), json!({"v": 1})),
                event("w", "b", &format!("2020-01-01T{}:05:00Z", hour), json!({"v": 2})),
            ];
            transport.push_events(root, Ok(event_page(events, None)));
        }

        let cursor = cursor(&transport);
        let group = cursor.dataset(None, Align::Center, None);
        let v = Stream::new("w").attr("v");

        let frames = group.dataframes(&[v.clone()], true).await.unwrap();
        assert_eq!(frames[0].columns(), &["v"]);

        for root in ["s1", "s2"] {
            transport.push_events(
                root,
                Ok(event_page(
                    vec![
                        event("w", "a", "2020-01-01T10:00:00Z", json!({"v": 1})),
                        event("w", "b", "2020-01-01T10:05:00Z", json!({"v": 2})),
                    ],
                    None,
                )),
            );
        }
        let stacked = group.dataframe(&[v], false).await.unwrap();
        let spans: Vec<usize> = stacked.index().iter().map(|k| k.span).collect();
        assert_eq!(spans, vec![0, 0, 1, 1]);
        let deltas: Vec<i64> = stacked.index().iter().map(|k| k.delta.num_minutes()).collect();
        assert_eq!(deltas, vec![0, 5, 0, 5]);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let transport = Arc::new(ScriptedTransport::new("q1"));
        two_spans(&transport);
        transport.push_events("s1", Err(ApiError::Authentication));
        transport.push_events("s2", Ok(event_page(vec![], None)));

        let cursor = cursor(&transport);
        let err = cursor
            .dataset(None, Align::Center, None)
            .frames()
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Api(ApiError::Authentication)));
    }
}

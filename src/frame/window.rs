//! Interval windowing
//!
//! Turns the cursor's span list into the intervals to fetch: the spans
//! themselves, or the gaps between them, optionally narrowed to a fixed
//! window, and carves resampled tables into fixed-size sliding windows.

use super::error::{FrameError, FrameResult};
use super::table::Frame;
use crate::cursor::{open_end, open_start, Interval, SpanInfo};
use chrono::{DateTime, Duration, Utc};

/// Where a fixed-size window sits inside a longer interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    /// Window starts at the interval start
    Left,
    /// Window is centered on the interval midpoint
    #[default]
    Center,
    /// Window ends at the interval end
    Right,
}

/// `t + d`, saturating at the representable range
pub(crate) fn shift(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_add_signed(d).unwrap_or(if d > Duration::zero() {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}

/// `lookback + horizon`, saturating at `Duration::MAX`
fn width(lookback: Duration, horizon: Duration) -> Duration {
    lookback.checked_add(&horizon).unwrap_or(Duration::MAX)
}

/// Every span as an interval, open ends replaced by sentinels
pub fn intervals(spans: &[SpanInfo]) -> Vec<Interval> {
    spans.iter().map(SpanInfo::interval).collect()
}

/// The gaps around the spans: everything before the first span, then the
/// stretch between each span's end and the next span's start
///
/// Each gap is fetched with the handle of the span before it (the first
/// span's handle for the leading gap). A first span without a start has no
/// leading gap.
pub fn invert(spans: &[SpanInfo]) -> Vec<Interval> {
    let first = match spans.first() {
        Some(first) => first,
        None => return Vec::new(),
    };

    let mut gaps = Vec::with_capacity(spans.len());
    if let Some(start) = first.start {
        gaps.push(Interval {
            cursor: first.cursor.clone(),
            start: open_start(),
            end: start,
        });
    }
    for pair in spans.windows(2) {
        gaps.push(Interval {
            cursor: pair[0].cursor.clone(),
            start: pair[0].end.unwrap_or_else(open_end),
            end: pair[1].start.unwrap_or_else(open_start),
        });
    }
    gaps
}

/// Narrow `iv` to `window`, anchored per `align`; no window keeps it whole
pub fn narrow(iv: Interval, window: Option<Duration>, align: Align) -> Interval {
    let w = match window {
        Some(w) => w,
        None => return iv,
    };
    let (start, end) = match align {
        Align::Left => (iv.start, shift(iv.start, w)),
        Align::Right => (shift(iv.end, -w), iv.end),
        Align::Center => {
            let mid = shift(iv.start, (iv.end - iv.start) / 2);
            (shift(mid, -(w / 2)), shift(mid, w / 2))
        }
    };
    Interval { start, end, ..iv }
}

/// Windows `[s, s + lookback + horizon)` starting at `start` and advancing
/// by `slide` while they end at or before `end`; the width must be positive
pub fn slides(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    lookback: Duration,
    horizon: Duration,
    slide: Duration,
) -> FrameResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
    let width = width(lookback, horizon);
    if width <= Duration::zero() {
        return Err(FrameError::InvalidWindow);
    }
    let mut out = Vec::new();
    let mut s = start;
    while shift(s, width) <= end {
        out.push((s, shift(s, width)));
        if slide <= Duration::zero() {
            break;
        }
        s = shift(s, slide);
    }
    Ok(out)
}

/// Rows a window of `width` holds on a `freq` grid
pub fn expected_rows(width: Duration, freq: Duration) -> usize {
    let step = freq.num_milliseconds();
    if step <= 0 {
        return 0;
    }
    (width.num_milliseconds() / step).max(0) as usize
}

/// Sliding windows over `frame` between `start` and `end`; windows short of
/// a full grid are skipped
pub fn carve(
    frame: &Frame,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    lookback: Duration,
    horizon: Duration,
    slide: Duration,
    freq: Duration,
) -> FrameResult<Vec<Frame>> {
    let expected = expected_rows(width(lookback, horizon), freq);
    Ok(slides(start, end, lookback, horizon, slide)?
        .into_iter()
        .map(|(t0, t1)| frame.slice_time(t0, t1))
        .filter(|window| window.len() == expected)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::parse_timestamp;
    use serde_json::json;

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn span(cursor: &str, start: Option<&str>, end: Option<&str>) -> SpanInfo {
        SpanInfo {
            cursor: cursor.to_string(),
            start: start.map(at),
            end: end.map(at),
        }
    }

    fn ten_minutes() -> Interval {
        Interval {
            cursor: "c".to_string(),
            start: at("2020-01-01T10:00:00Z"),
            end: at("2020-01-01T10:10:00Z"),
        }
    }

    #[test]
    fn test_narrow_alignment() {
        let w = Some(Duration::minutes(2));

        let center = narrow(ten_minutes(), w, Align::Center);
        assert_eq!((center.start, center.end), (at("2020-01-01T10:04:00Z"), at("2020-01-01T10:06:00Z")));

        let left = narrow(ten_minutes(), w, Align::Left);
        assert_eq!((left.start, left.end), (at("2020-01-01T10:00:00Z"), at("2020-01-01T10:02:00Z")));

        let right = narrow(ten_minutes(), w, Align::Right);
        assert_eq!((right.start, right.end), (at("2020-01-01T10:08:00Z"), at("2020-01-01T10:10:00Z")));

        assert_eq!(narrow(ten_minutes(), None, Align::Left), ten_minutes());
    }

    #[test]
    fn test_open_spans_use_sentinels() {
        let ivs = intervals(&[span("a", None, Some("2020-01-01T10:00:00Z"))]);
        assert_eq!(ivs[0].start, open_start());
        assert_eq!(ivs[0].end, at("2020-01-01T10:00:00Z"));
    }

    #[test]
    fn test_invert() {
        let spans = [
            span("a", Some("2020-01-01T10:00:00Z"), Some("2020-01-01T10:10:00Z")),
            span("b", Some("2020-01-01T11:00:00Z"), Some("2020-01-01T11:30:00Z")),
            span("c", Some("2020-01-01T12:00:00Z"), None),
        ];
        let gaps = invert(&spans);
        assert_eq!(gaps.len(), 3);
        assert_eq!(gaps[0].cursor, "a");
        assert_eq!(gaps[0].start, open_start());
        assert_eq!(gaps[0].end, at("2020-01-01T10:00:00Z"));
        assert_eq!(gaps[1].cursor, "a");
        assert_eq!((gaps[1].start, gaps[1].end), (at("2020-01-01T10:10:00Z"), at("2020-01-01T11:00:00Z")));
        assert_eq!(gaps[2].cursor, "b");
        assert_eq!(gaps[2].end, at("2020-01-01T12:00:00Z"));

        assert!(invert(&[]).is_empty());
        assert!(invert(&[span("x", None, Some("2020-01-01T10:00:00Z"))]).is_empty());
    }

    #[test]
    fn test_slides_fit_interval() {
        let t0 = at("2020-01-01T10:00:00Z");
        let windows = slides(
            t0,
            t0 + Duration::minutes(10),
            Duration::minutes(5),
            Duration::minutes(1),
            Duration::minutes(1),
        )
        .unwrap();
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[4], (t0 + Duration::minutes(4), t0 + Duration::minutes(10)));
    }

    #[test]
    fn test_carve_exact_windows() {
        let t0 = at("2020-01-01T10:00:00Z");
        let mut frame = Frame::new(vec!["w:v".to_string()]);
        for i in 0..10 {
            frame.push_row(t0 + Duration::minutes(i), vec![json!(i)]);
        }
        let end = t0 + Duration::minutes(9) + Duration::seconds(1);

        let windows = carve(
            &frame,
            t0,
            end,
            Duration::minutes(5),
            Duration::minutes(1),
            Duration::minutes(1),
            Duration::minutes(1),
        )
        .unwrap();
        assert_eq!(windows.len(), 4);
        for (k, w) in windows.iter().enumerate() {
            assert_eq!(w.len(), 6);
            assert_eq!(w.first_ts(), Some(t0 + Duration::minutes(k as i64)));
        }
    }

    #[test]
    fn test_carve_skips_short_windows() {
        let t0 = at("2020-01-01T10:00:00Z");
        let mut frame = Frame::new(vec!["w:v".to_string()]);
        for i in [0, 1, 2, 4, 5, 6, 7, 8, 9, 10] {
            frame.push_row(t0 + Duration::minutes(i), vec![json!(i)]);
        }

        let windows = carve(
            &frame,
            t0,
            t0 + Duration::minutes(10) + Duration::seconds(1),
            Duration::minutes(3),
            Duration::minutes(1),
            Duration::minutes(1),
            Duration::minutes(1),
        )
        .unwrap();
        let starts: Vec<i64> = windows
            .iter()
            .map(|w| (w.first_ts().unwrap() - t0).num_minutes())
            .collect();
        assert_eq!(starts, vec![4, 5, 6]);
    }

    #[test]
    fn test_zero_width_rejected() {
        let t0 = at("2020-01-01T10:00:00Z");
        let end = t0 + Duration::minutes(10);
        let zero = Duration::zero();
        assert!(matches!(
            slides(t0, end, zero, zero, Duration::minutes(1)),
            Err(FrameError::InvalidWindow)
        ));

        let frame = Frame::new(vec!["w:v".to_string()]);
        assert!(matches!(
            carve(&frame, t0, end, zero, zero, Duration::minutes(1), Duration::minutes(1)),
            Err(FrameError::InvalidWindow)
        ));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let t0 = at("2020-01-01T10:00:00Z");
        let huge = crate::query::Delta::zero().years(1_000_000_000).to_duration();
        assert_eq!(huge, Duration::MAX);

        let iv = narrow(ten_minutes(), Some(huge), Align::Center);
        assert!(iv.start < t0 && iv.end > t0);

        let windows = slides(t0, t0 + Duration::minutes(10), huge, huge, huge).unwrap();
        assert!(windows.is_empty());
    }
}

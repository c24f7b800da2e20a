//! Time-indexed tables
//!
//! A [`Frame`] is a list of rows keyed by timestamp, with named columns
//! holding JSON cells (`null` for missing). Stream columns are named
//! `stream:path.to.field`; `.id` carries the event id.

use super::error::{FrameError, FrameResult};
use crate::client::parse_timestamp;
use crate::cursor::Event;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value as Json;
use std::collections::{BTreeSet, HashMap};
use std::io;

/// Name of the timestamp index in exports
pub const TS_COLUMN: &str = ".ts";

/// Column holding the event id
pub const ID_COLUMN: &str = ".id";

/// Table of rows ordered by timestamp
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    index: Vec<DateTime<Utc>>,
    columns: Vec<String>,
    rows: Vec<Vec<Json>>,
}

impl Frame {
    /// Empty frame with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    /// Append a row; short rows are padded with nulls
    pub fn push_row(&mut self, ts: DateTime<Utc>, mut row: Vec<Json>) {
        row.resize(self.columns.len(), Json::Null);
        self.index.push(ts);
        self.rows.push(row);
    }

    /// One row per event: `.id`, then the event body flattened into dotted
    /// columns in first-seen order
    pub fn from_events(events: &[Event]) -> FrameResult<Self> {
        let mut frame = Frame::new(vec![ID_COLUMN.to_string()]);
        let mut positions: HashMap<String, usize> = HashMap::new();
        positions.insert(ID_COLUMN.to_string(), 0);

        for e in events {
            let ts = parse_timestamp(&e.ts).ok_or_else(|| FrameError::Timestamp(e.ts.clone()))?;
            let mut cells = Vec::new();
            flatten("", &e.event, &mut cells);

            let mut row = vec![Json::Null; frame.columns.len()];
            row[0] = Json::String(e.id.clone());
            for (name, value) in cells {
                let pos = *positions.entry(name.clone()).or_insert_with(|| {
                    frame.columns.push(name);
                    frame.columns.len() - 1
                });
                if pos >= row.len() {
                    row.resize(pos + 1, Json::Null);
                }
                row[pos] = value;
            }
            frame.index.push(ts);
            frame.rows.push(row);
        }

        let width = frame.columns.len();
        for row in &mut frame.rows {
            row.resize(width, Json::Null);
        }
        Ok(frame)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Json>] {
        &self.rows
    }

    pub fn first_ts(&self) -> Option<DateTime<Utc>> {
        self.index.first().copied()
    }

    pub fn last_ts(&self) -> Option<DateTime<Utc>> {
        self.index.last().copied()
    }

    /// All cells of one column
    pub fn column(&self, name: &str) -> Option<Vec<&Json>> {
        let pos = self.position(name)?;
        Some(self.rows.iter().map(|r| &r[pos]).collect())
    }

    /// One cell
    pub fn get(&self, row: usize, column: &str) -> Option<&Json> {
        self.rows.get(row)?.get(self.position(column)?)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Regrid onto epoch-aligned multiples of `freq`, carrying the last row
    /// at or before each grid point forward
    ///
    /// Grid points before the first row are all-null.
    pub fn resample(&self, freq: Duration) -> FrameResult<Frame> {
        let step = freq.num_milliseconds();
        if step <= 0 {
            return Err(FrameError::InvalidFrequency);
        }
        let (first, last) = match (self.first_ts(), self.last_ts()) {
            (Some(f), Some(l)) => (floor(f, step), floor(l, step)),
            _ => return Ok(self.clone()),
        };

        let mut out = Frame::new(self.columns.clone());
        let mut next = 0;
        let mut current: Option<usize> = None;
        let mut t = first;
        while t <= last {
            while next < self.index.len() && self.index[next] <= t {
                current = Some(next);
                next += 1;
            }
            let row = match current {
                Some(i) => self.rows[i].clone(),
                None => vec![Json::Null; self.columns.len()],
            };
            out.push_row(t, row);
            t = match t.checked_add_signed(freq) {
                Some(after) => after,
                None => break,
            };
        }
        Ok(out)
    }

    /// Prefix every column with `name:`
    pub fn prefixed(mut self, name: &str) -> Self {
        for c in &mut self.columns {
            *c = format!("{}:{}", name, c);
        }
        self
    }

    /// Drop everything up to the first `:` in each column name
    pub fn strip_prefixes(mut self) -> Self {
        for c in &mut self.columns {
            if let Some((_, rest)) = c.split_once(':') {
                *c = rest.to_string();
            }
        }
        self
    }

    /// Outer join on timestamp; within one frame a repeated timestamp keeps
    /// its last row
    pub fn outer_join(frames: Vec<Frame>) -> Frame {
        if frames.is_empty() {
            return Frame::default();
        }

        let stamps: BTreeSet<DateTime<Utc>> =
            frames.iter().flat_map(|f| f.index.iter().copied()).collect();
        let lookups: Vec<HashMap<DateTime<Utc>, usize>> = frames
            .iter()
            .map(|f| f.index.iter().enumerate().map(|(i, ts)| (*ts, i)).collect())
            .collect();

        let columns = frames.iter().flat_map(|f| f.columns.iter().cloned()).collect();
        let mut out = Frame::new(columns);
        for ts in stamps {
            let mut row = Vec::with_capacity(out.columns.len());
            for (frame, lookup) in frames.iter().zip(&lookups) {
                match lookup.get(&ts) {
                    Some(&i) => row.extend(frame.rows[i].iter().cloned()),
                    None => row.extend(std::iter::repeat(Json::Null).take(frame.columns.len())),
                }
            }
            out.push_row(ts, row);
        }
        out
    }

    /// Project onto `columns`, in that order; an empty frame projects to an
    /// empty frame
    pub fn select(&self, columns: &[String]) -> FrameResult<Frame> {
        if self.is_empty() {
            return Ok(Frame::new(columns.to_vec()));
        }
        let positions = columns
            .iter()
            .map(|c| {
                self.position(c)
                    .ok_or_else(|| FrameError::UnknownColumn(c.clone()))
            })
            .collect::<FrameResult<Vec<_>>>()?;

        Ok(Frame {
            index: self.index.clone(),
            columns: columns.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|r| positions.iter().map(|&p| r[p].clone()).collect())
                .collect(),
        })
    }

    /// Drop the event-id columns (`.id` and `stream:.id`)
    pub fn without_ids(&self) -> Frame {
        let keep: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !is_id_column(c))
            .cloned()
            .collect();
        let positions: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !is_id_column(c))
            .map(|(i, _)| i)
            .collect();
        Frame {
            index: self.index.clone(),
            columns: keep,
            rows: self
                .rows
                .iter()
                .map(|r| positions.iter().map(|&p| r[p].clone()).collect())
                .collect(),
        }
    }

    /// Rows with `start <= ts < end`
    pub fn slice_time(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Frame {
        let mut out = Frame::new(self.columns.clone());
        for (ts, row) in self.index.iter().zip(&self.rows) {
            if *ts >= start && *ts < end {
                out.push_row(*ts, row.clone());
            }
        }
        out
    }

    /// Cells as numbers: null is NaN, booleans are 0/1
    pub fn to_matrix(&self) -> FrameResult<Vec<Vec<f64>>> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.columns)
                    .map(|(cell, column)| numeric(cell, column))
                    .collect()
            })
            .collect()
    }

    /// Write as CSV with a leading `.ts` column
    pub fn write_csv<W: io::Write>(&self, writer: W) -> FrameResult<()> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(std::iter::once(TS_COLUMN).chain(self.columns.iter().map(String::as_str)))?;
        for (ts, row) in self.index.iter().zip(&self.rows) {
            let mut record = vec![ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)];
            record.extend(row.iter().map(cell_text));
            w.write_record(&record)?;
        }
        w.flush()?;
        Ok(())
    }
}

fn is_id_column(name: &str) -> bool {
    name.rsplit(':').next() == Some(ID_COLUMN)
}

fn floor(ts: DateTime<Utc>, step_ms: i64) -> DateTime<Utc> {
    ts - Duration::milliseconds(ts.timestamp_millis().rem_euclid(step_ms))
}

fn flatten(prefix: &str, value: &Json, out: &mut Vec<(String, Json)>) {
    match value {
        Json::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(&key, v, out);
            }
        }
        Json::Object(_) if prefix.is_empty() => {}
        other => {
            let key = if prefix.is_empty() { "value" } else { prefix };
            out.push((key.to_string(), other.clone()));
        }
    }
}

fn numeric(cell: &Json, column: &str) -> FrameResult<f64> {
    match cell {
        Json::Null => Ok(f64::NAN),
        Json::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Json::Number(n) => n.as_f64().ok_or_else(|| FrameError::NonNumeric {
            column: column.to_string(),
        }),
        _ => Err(FrameError::NonNumeric {
            column: column.to_string(),
        }),
    }
}

fn cell_text(cell: &Json) -> String {
    match cell {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Index of a row in a [`StackedFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackedKey {
    pub ts: DateTime<Utc>,
    /// Position of the source frame among the non-empty frames
    pub span: usize,
    /// Time since the source frame's first row
    pub delta: Duration,
}

/// Several frames concatenated under a `(ts, span, delta)` index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackedFrame {
    columns: Vec<String>,
    index: Vec<StackedKey>,
    rows: Vec<Vec<Json>>,
}

impl StackedFrame {
    /// Concatenate non-empty frames; columns are the union in first-seen order
    pub fn concat(frames: &[Frame]) -> Self {
        let mut out = StackedFrame::default();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for frame in frames {
            for c in &frame.columns {
                if !positions.contains_key(c.as_str()) {
                    positions.insert(c, out.columns.len());
                    out.columns.push(c.clone());
                }
            }
        }

        for (span, frame) in frames.iter().filter(|f| !f.is_empty()).enumerate() {
            let origin = frame.index[0];
            let targets: Vec<usize> = frame.columns.iter().map(|c| positions[c.as_str()]).collect();
            for (ts, row) in frame.index.iter().zip(&frame.rows) {
                let mut cells = vec![Json::Null; out.columns.len()];
                for (value, &pos) in row.iter().zip(&targets) {
                    cells[pos] = value.clone();
                }
                out.index.push(StackedKey {
                    ts: *ts,
                    span,
                    delta: *ts - origin,
                });
                out.rows.push(cells);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[StackedKey] {
        &self.index
    }

    pub fn rows(&self) -> &[Vec<Json>] {
        &self.rows
    }

    /// Write as CSV with leading `.ts`, `.span` and `.delta` (seconds) columns
    pub fn write_csv<W: io::Write>(&self, writer: W) -> FrameResult<()> {
        let mut w = csv::Writer::from_writer(writer);
        let header = [TS_COLUMN, ".span", ".delta"];
        w.write_record(header.into_iter().chain(self.columns.iter().map(String::as_str)))?;
        for (key, row) in self.index.iter().zip(&self.rows) {
            let mut record = vec![
                key.ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                key.span.to_string(),
                (key.delta.num_milliseconds() as f64 / 1000.0).to_string(),
            ];
            record.extend(row.iter().map(cell_text));
            w.write_record(&record)?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Dense `frames x rows x columns` array of numbers
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: [usize; 3],
    data: Vec<f64>,
}

impl Tensor {
    /// Stack equally shaped frames
    pub fn stack(frames: &[Frame]) -> FrameResult<Self> {
        let expected = match frames.first() {
            Some(f) => (f.len(), f.columns.len()),
            None => {
                return Ok(Self {
                    shape: [0, 0, 0],
                    data: Vec::new(),
                })
            }
        };

        let mut data = Vec::with_capacity(frames.len() * expected.0 * expected.1);
        for frame in frames {
            let found = (frame.len(), frame.columns.len());
            if found != expected {
                return Err(FrameError::ShapeMismatch { expected, found });
            }
            for row in frame.to_matrix()? {
                data.extend(row);
            }
        }
        Ok(Self {
            shape: [frames.len(), expected.0, expected.1],
            data,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Row-major values
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, frame: usize, row: usize, column: usize) -> Option<f64> {
        let [n, r, c] = self.shape;
        if frame >= n || row >= r || column >= c {
            return None;
        }
        self.data.get((frame * r + row) * c + column).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn ev(id: &str, ts: &str, body: Json) -> Event {
        Event {
            id: id.to_string(),
            ts: ts.to_string(),
            event: body,
        }
    }

    fn series(stream: &str, points: &[(&str, f64)]) -> Frame {
        let events: Vec<Event> = points
            .iter()
            .enumerate()
            .map(|(i, (ts, v))| ev(&i.to_string(), ts, json!({"v": v})))
            .collect();
        Frame::from_events(&events).unwrap().prefixed(stream)
    }

    #[test]
    fn test_from_events_flattens() {
        let frame = Frame::from_events(&[
            ev("a", "2020-01-01T10:00:00Z", json!({"temp": {"max": 80, "min": 60}})),
            ev("b", "2020-01-01T10:05:00Z", json!({"temp": {"max": 82}, "rain": true})),
        ])
        .unwrap();

        assert_eq!(frame.columns(), &[".id", "temp.max", "temp.min", "rain"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.get(1, ".id"), Some(&json!("b")));
        assert_eq!(frame.get(1, "temp.min"), Some(&Json::Null));
        assert_eq!(frame.get(0, "rain"), Some(&Json::Null));
        assert_eq!(frame.index()[1], at("2020-01-01T10:05:00Z"));
    }

    #[test]
    fn test_from_events_bad_timestamp() {
        let err = Frame::from_events(&[ev("a", "later", json!({}))]).unwrap_err();
        assert!(matches!(err, FrameError::Timestamp(ref s) if s == "later"));
    }

    #[test]
    fn test_resample_forward_fills() {
        let frame = series(
            "w",
            &[
                ("2020-01-01T10:00:30Z", 1.0),
                ("2020-01-01T10:01:10Z", 2.0),
                ("2020-01-01T10:03:00Z", 3.0),
            ],
        );
        let out = frame.resample(Duration::minutes(1)).unwrap();

        let stamps: Vec<String> = out.index().iter().map(|t| t.format("%H:%M").to_string()).collect();
        assert_eq!(stamps, vec!["10:00", "10:01", "10:02", "10:03"]);
        let values: Vec<&Json> = out.column("w:v").unwrap();
        assert_eq!(values, vec![&Json::Null, &json!(1.0), &json!(2.0), &json!(3.0)]);
    }

    #[test]
    fn test_resample_huge_frequency() {
        let frame = series("w", &[("2020-01-01T10:00:00Z", 1.0), ("2020-01-01T11:00:00Z", 2.0)]);
        let out = frame.resample(Duration::MAX).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.get(0, "w:v"), Some(&Json::Null));
    }

    #[test]
    fn test_resample_rejects_zero_frequency() {
        let frame = series("w", &[("2020-01-01T10:00:00Z", 1.0)]);
        assert!(matches!(
            frame.resample(Duration::zero()),
            Err(FrameError::InvalidFrequency)
        ));
    }

    #[test]
    fn test_outer_join() {
        let a = series("a", &[("2020-01-01T10:00:00Z", 1.0), ("2020-01-01T10:02:00Z", 2.0)]);
        let b = series("b", &[("2020-01-01T10:01:00Z", 5.0), ("2020-01-01T10:02:00Z", 6.0)]);
        let joined = Frame::outer_join(vec![a, b]);

        assert_eq!(joined.columns(), &["a:.id", "a:v", "b:.id", "b:v"]);
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.get(0, "b:v"), Some(&Json::Null));
        assert_eq!(joined.get(1, "a:v"), Some(&Json::Null));
        assert_eq!(joined.get(2, "a:v"), Some(&json!(2.0)));
        assert_eq!(joined.get(2, "b:v"), Some(&json!(6.0)));
    }

    #[test]
    fn test_outer_join_single_frame_keeps_last_duplicate() {
        let frame = series(
            "a",
            &[
                ("2020-01-01T10:00:00Z", 1.0),
                ("2020-01-01T10:00:00Z", 2.0),
                ("2020-01-01T10:01:00Z", 3.0),
            ],
        );
        let joined = Frame::outer_join(vec![frame]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.get(0, "a:v"), Some(&json!(2.0)));
        assert_eq!(joined.get(1, "a:v"), Some(&json!(3.0)));

        assert!(Frame::outer_join(Vec::new()).is_empty());
    }

    #[test]
    fn test_without_ids() {
        let a = series("a", &[("2020-01-01T10:00:00Z", 1.0)]);
        let b = series("b", &[("2020-01-01T10:00:00Z", 2.0)]);
        let joined = Frame::outer_join(vec![a, b]).without_ids();
        assert_eq!(joined.columns(), &["a:v", "b:v"]);
        assert_eq!(joined.rows(), &[vec![json!(1.0), json!(2.0)]]);

        let bare = Frame::from_events(&[ev("x", "2020-01-01T10:00:00Z", json!({"v": 1}))]).unwrap();
        assert_eq!(bare.without_ids().columns(), &["v"]);
    }

    #[test]
    fn test_select_and_strip() {
        let frame = series("weather", &[("2020-01-01T10:00:00Z", 1.0)]);
        let picked = frame.select(&["weather:v".to_string()]).unwrap();
        assert_eq!(picked.columns(), &["weather:v"]);
        assert_eq!(picked.strip_prefixes().columns(), &["v"]);

        let err = frame.select(&["weather:nope".to_string()]).unwrap_err();
        assert!(matches!(err, FrameError::UnknownColumn(_)));

        let empty = Frame::default().select(&["weather:v".to_string()]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.columns(), &["weather:v"]);
    }

    #[test]
    fn test_slice_time_half_open() {
        let frame = series(
            "w",
            &[
                ("2020-01-01T10:00:00Z", 1.0),
                ("2020-01-01T10:01:00Z", 2.0),
                ("2020-01-01T10:02:00Z", 3.0),
            ],
        );
        let part = frame.slice_time(at("2020-01-01T10:00:00Z"), at("2020-01-01T10:02:00Z"));
        assert_eq!(part.len(), 2);
    }

    #[test]
    fn test_stacked_index() {
        let a = series("w", &[("2020-01-01T10:00:00Z", 1.0), ("2020-01-01T10:01:00Z", 2.0)]);
        let b = series("w", &[("2020-01-02T08:00:00Z", 3.0), ("2020-01-02T08:00:30Z", 4.0)]);
        let stacked = StackedFrame::concat(&[a, Frame::default(), b]);

        let spans: Vec<usize> = stacked.index().iter().map(|k| k.span).collect();
        assert_eq!(spans, vec![0, 0, 1, 1]);
        let deltas: Vec<i64> = stacked.index().iter().map(|k| k.delta.num_seconds()).collect();
        assert_eq!(deltas, vec![0, 60, 0, 30]);
        assert_eq!(stacked.columns(), &["w:.id", "w:v"]);
    }

    #[test]
    fn test_tensor() {
        let a = series("w", &[("2020-01-01T10:00:00Z", 1.0), ("2020-01-01T10:01:00Z", 2.0)])
            .select(&["w:v".to_string()])
            .unwrap();
        let b = series("w", &[("2020-01-02T10:00:00Z", 3.0), ("2020-01-02T10:01:00Z", 4.0)])
            .select(&["w:v".to_string()])
            .unwrap();
        let t = Tensor::stack(&[a.clone(), b]).unwrap();
        assert_eq!(t.shape(), [2, 2, 1]);
        assert_eq!(t.get(1, 1, 0), Some(4.0));
        assert_eq!(t.get(2, 0, 0), None);

        let short = a.slice_time(at("2020-01-01T10:00:00Z"), at("2020-01-01T10:01:00Z"));
        assert!(matches!(
            Tensor::stack(&[a, short]),
            Err(FrameError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_tensor_rejects_text() {
        let frame = series("w", &[("2020-01-01T10:00:00Z", 1.0)]);
        let err = Tensor::stack(&[frame]).unwrap_err();
        assert!(matches!(err, FrameError::NonNumeric { ref column } if column == "w:.id"));
    }

    #[test]
    fn test_write_csv() {
        let frame = series("w", &[("2020-01-01T10:00:00Z", 1.5)]);
        let mut buf = Vec::new();
        frame.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, ".ts,w:.id,w:v\n2020-01-01T10:00:00Z,0,1.5\n");
    }
}

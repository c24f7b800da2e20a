//! Query root and return projections
//!
//! A [`Select`] wraps the whole pattern in an optional absolute time bound
//! and produces the request document sent to the query service:
//!
//! ```text
//! {"between": [start, end], "select": <span | serial | {"expr": "true"}>,
//!  "projections": {"explicit": [{"stream": ..., "projection": ...}]}}
//! ```

use super::cond::iso8601;
use super::error::{QueryError, QueryResult};
use super::path::{EventPath, Stream};
use super::span::{Expr, Serial, Span, SpanOpts};
use chrono::{DateTime, FixedOffset, TimeZone};
use serde_json::{json, Map, Value as Json};
use std::collections::BTreeMap;
use std::fmt;

/// Top-level query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    start: Option<DateTime<FixedOffset>>,
    end: Option<DateTime<FixedOffset>>,
    body: Vec<Span>,
}

impl Select {
    /// Unbounded query matching everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: only match at or after `start`
    pub fn start<Tz: TimeZone>(mut self, start: DateTime<Tz>) -> Self {
        self.start = Some(start.fixed_offset());
        self
    }

    /// Builder: only match before `end`
    pub fn end<Tz: TimeZone>(mut self, end: DateTime<Tz>) -> Self {
        self.end = Some(end.fixed_offset());
        self
    }

    /// Builder: `[start, end)`
    pub fn between<Tz: TimeZone>(self, start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        self.start(start).end(end)
    }

    /// Start the pattern with its first span
    ///
    /// There is no earlier span to measure a gap from, so `within` and
    /// `after` are rejected here.
    pub fn span(mut self, exprs: Vec<Expr>, opts: SpanOpts) -> QueryResult<Self> {
        if opts.has_gap() {
            return Err(QueryError::GapOnFirstSpan);
        }
        if !self.body.is_empty() {
            return Err(QueryError::SpanAlreadyStarted);
        }
        self.body.push(Span::with_opts(exprs, opts)?);
        Ok(self)
    }

    /// Extend the pattern with a following span (`within = 0` unless a gap is given)
    pub fn then(mut self, exprs: Vec<Expr>, opts: SpanOpts) -> QueryResult<Self> {
        if self.body.is_empty() {
            return Err(QueryError::NoSpanStarted);
        }
        let serial = Serial::new(std::mem::take(&mut self.body)).then(exprs, opts)?;
        self.body = serial.spans().to_vec();
        Ok(self)
    }

    pub fn spans(&self) -> &[Span] {
        &self.body
    }

    /// Request document without projections
    pub fn to_ast(&self) -> Json {
        let mut d = Map::new();
        match (&self.start, &self.end) {
            (Some(s), Some(e)) => {
                d.insert("between".to_string(), json!([iso8601(s), iso8601(e)]));
            }
            (Some(s), None) => {
                d.insert("after".to_string(), json!(iso8601(s)));
            }
            (None, Some(e)) => {
                d.insert("before".to_string(), json!(iso8601(e)));
            }
            (None, None) => {}
        }

        let select = match self.body.as_slice() {
            [] => json!({"expr": "true"}),
            [only] => only.to_ast(),
            many => Serial::new(many.to_vec()).to_ast(),
        };
        d.insert("select".to_string(), select);
        Json::Object(d)
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sep, body) = match self.body.as_slice() {
            [] => (" ", "true".to_string()),
            [only] => (" ", only.to_string()),
            many => ("\n    ", Serial::new(many.to_vec()).to_string()),
        };
        const FMT: &str = "%Y-%m-%d %H:%M:%S%z";
        match (&self.start, &self.end) {
            (None, None) => write!(f, "select{}{}", sep, body),
            (Some(s), None) => write!(f, "select after {}{}{}", s.format(FMT), sep, body),
            (None, Some(e)) => write!(f, "select before {}{}{}", e.format(FMT), sep, body),
            (Some(s), Some(e)) => write!(
                f,
                "select from {} until {}{}{}",
                s.format(FMT),
                e.format(FMT),
                sep,
                body
            ),
        }
    }
}

/// One projected value
#[derive(Debug, Clone, PartialEq)]
pub enum ProjValue {
    /// Reference to an event attribute
    Var(EventPath),
    Double(f64),
    Int(i64),
    Bool(bool),
    String(String),
    Nested(BTreeMap<String, ProjValue>),
}

impl ProjValue {
    fn to_ast(&self) -> Json {
        let lit = |val: Json, ty: &str| json!([{"lit": {"val": val, "type": ty}}]);
        match self {
            Self::Var(path) => json!([{"var": path.segments()}]),
            Self::Double(v) => lit(json!(v), "double"),
            Self::Int(v) => lit(json!(v), "int"),
            Self::Bool(v) => lit(json!(v), "bool"),
            Self::String(v) => lit(json!(v), "string"),
            Self::Nested(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_ast()))
                    .collect(),
            ),
        }
    }
}

impl From<EventPath> for ProjValue {
    fn from(p: EventPath) -> Self {
        Self::Var(p)
    }
}

impl From<f64> for ProjValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<i64> for ProjValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for ProjValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ProjValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<BTreeMap<String, ProjValue>> for ProjValue {
    fn from(map: BTreeMap<String, ProjValue>) -> Self {
        Self::Nested(map)
    }
}

/// What to return for one stream
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// The stream's full events
    Default,
    /// Nothing from this stream
    Empty,
    /// A custom shape
    Map(BTreeMap<String, ProjValue>),
}

impl Projection {
    fn to_ast(&self) -> Json {
        match self {
            Self::Default => json!("default"),
            Self::Empty => json!({}),
            Self::Map(map) => ProjValue::Nested(map.clone()).to_ast(),
        }
    }
}

/// Per-stream projections, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Returning {
    entries: Vec<(Stream, Projection)>,
}

impl Returning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a projection for `stream`
    pub fn stream(mut self, stream: &Stream, projection: Projection) -> Self {
        self.entries.push((stream.clone(), projection));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_ast(&self) -> Json {
        let explicit: Vec<Json> = self
            .entries
            .iter()
            .map(|(s, p)| json!({"stream": s.to_ast(), "projection": p.to_ast()}))
            .collect();
        json!({ "explicit": explicit })
    }
}

/// Full request document for `select`, with optional projections
pub fn ast_dict(select: &Select, returning: Option<&Returning>) -> Json {
    let mut doc = select.to_ast();
    if let (Some(r), Some(obj)) = (returning.filter(|r| !r.is_empty()), doc.as_object_mut()) {
        obj.insert("projections".to_string(), r.to_ast());
    }
    doc
}

/// Pretty-printed request document
pub fn ast(select: &Select) -> String {
    serde_json::to_string_pretty(&ast_dict(select, None)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::delta::Delta;
    use chrono::{TimeZone, Utc};

    fn cond(name: &str) -> Expr {
        Stream::new("s").attr(name).is(true).unwrap().into()
    }

    #[test]
    fn test_empty_select() {
        assert_eq!(Select::new().to_ast(), json!({"select": {"expr": "true"}}));
        assert_eq!(Select::new().to_string(), "select true");
    }

    #[test]
    fn test_time_bounds() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap();

        let both = Select::new().between(start, end).to_ast();
        assert_eq!(
            both["between"],
            json!(["2020-01-01T00:00:00+00:00", "2020-02-01T00:00:00+00:00"])
        );
        assert_eq!(Select::new().start(start).to_ast()["after"], json!("2020-01-01T00:00:00+00:00"));
        assert_eq!(Select::new().end(end).to_ast()["before"], json!("2020-02-01T00:00:00+00:00"));
        assert_eq!(
            Select::new().between(start, end).to_string(),
            "select from 2020-01-01 00:00:00+0000 until 2020-02-01 00:00:00+0000 true"
        );
    }

    #[test]
    fn test_first_span_rejects_gaps() {
        let err = Select::new()
            .span(vec![cond("a")], SpanOpts::new().within(Delta::from_mins(1)))
            .unwrap_err();
        assert_eq!(err, QueryError::GapOnFirstSpan);

        let err = Select::new()
            .span(vec![cond("a")], SpanOpts::new().after(Delta::from_mins(1)))
            .unwrap_err();
        assert_eq!(err, QueryError::GapOnFirstSpan);
    }

    #[test]
    fn test_span_then_ordering() {
        let err = Select::new().then(vec![cond("a")], SpanOpts::new()).unwrap_err();
        assert_eq!(err, QueryError::NoSpanStarted);

        let err = Select::new()
            .span(vec![cond("a")], SpanOpts::new())
            .unwrap()
            .span(vec![cond("b")], SpanOpts::new())
            .unwrap_err();
        assert_eq!(err, QueryError::SpanAlreadyStarted);
    }

    #[test]
    fn test_single_span_body() {
        let q = Select::new()
            .span(vec![cond("a")], SpanOpts::new().min(Delta::from_hours(1)))
            .unwrap();
        let ast = q.to_ast();
        assert_eq!(ast["select"]["type"], json!("span"));
        assert_eq!(ast["select"]["for"], json!({"at-least": {"hours": 1}}));
    }

    #[test]
    fn test_sequence_body() {
        let q = Select::new()
            .span(vec![cond("a")], SpanOpts::new())
            .unwrap()
            .then(vec![cond("b")], SpanOpts::new())
            .unwrap()
            .then(vec![cond("c")], SpanOpts::new().after(Delta::from_mins(5)))
            .unwrap();
        let ast = q.to_ast();
        assert_eq!(ast["select"]["type"], json!("serial"));
        let conds = ast["select"]["conds"].as_array().unwrap();
        assert_eq!(conds.len(), 3);
        assert!(conds[0].get("within").is_none());
        assert_eq!(conds[1]["within"], json!({"seconds": 0}));
        assert!(conds[2].get("within").is_none());
        assert_eq!(conds[2]["after"], json!({"minutes": 5}));
    }

    #[test]
    fn test_projections() {
        let weather = Stream::new("weather");
        let mut inner = BTreeMap::new();
        inner.insert("unit".to_string(), ProjValue::from("F"));
        let mut shape = BTreeMap::new();
        shape.insert("t".to_string(), ProjValue::from(EventPath::new().attr("temp.max")));
        shape.insert("scale".to_string(), ProjValue::from(1.5));
        shape.insert("n".to_string(), ProjValue::from(3i64));
        shape.insert("ok".to_string(), ProjValue::from(true));
        shape.insert("meta".to_string(), ProjValue::from(inner));

        let returning = Returning::new()
            .stream(&weather, Projection::Map(shape))
            .stream(&Stream::new("traffic"), Projection::Default)
            .stream(&Stream::new("noise"), Projection::Empty);

        let doc = ast_dict(&Select::new(), Some(&returning));
        let explicit = doc["projections"]["explicit"].as_array().unwrap();
        assert_eq!(explicit.len(), 3);
        assert_eq!(explicit[0]["stream"], json!({"name": "weather"}));
        assert_eq!(
            explicit[0]["projection"],
            json!({
                "t": [{"var": ["temp", "max"]}],
                "scale": [{"lit": {"val": 1.5, "type": "double"}}],
                "n": [{"lit": {"val": 3, "type": "int"}}],
                "ok": [{"lit": {"val": true, "type": "bool"}}],
                "meta": {"unit": [{"lit": {"val": "F", "type": "string"}}]},
            })
        );
        assert_eq!(explicit[1]["projection"], json!("default"));
        assert_eq!(explicit[2]["projection"], json!({}));
    }

    #[test]
    fn test_no_projections_key_without_returning() {
        let doc = ast_dict(&Select::new(), Some(&Returning::new()));
        assert!(doc.get("projections").is_none());
        assert!(ast(&Select::new()).contains("\"expr\": \"true\""));
    }
}

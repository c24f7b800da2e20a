//! Streams and attribute paths
//!
//! An [`EventPath`] is an unbound accessor into an event (`V.foo.bar` in the
//! query language); a [`StreamPath`] is the same accessor bound to a named
//! [`Stream`]. Comparisons on either produce a [`Cond`].

use super::cond::{Cond, Operator, Value};
use super::error::QueryResult;
use super::switch::Switch;
use serde_json::{json, Map, Value as Json};
use std::fmt;

/// A named stream of events, optionally pre-filtered
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    name: String,
    meta: Json,
    filters: Vec<Cond>,
}

impl Stream {
    /// Create a stream reference; the name is URL-quoted
    pub fn new(name: &str) -> Self {
        Self {
            name: quote(name),
            meta: Json::Object(Map::new()),
            filters: Vec::new(),
        }
    }

    /// Builder: attach metadata
    pub fn meta(mut self, meta: Json) -> Self {
        self.meta = meta;
        self
    }

    /// Builder: restrict the stream to events matching all `filters`
    pub fn with_filters(mut self, filters: Vec<Cond>) -> Self {
        self.filters = filters;
        self
    }

    /// Quoted stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Json {
        &self.meta
    }

    /// Path to an attribute of this stream's events (dots split segments)
    pub fn attr(&self, dotted: &str) -> StreamPath {
        StreamPath {
            stream: self.clone(),
            segments: split(dotted),
        }
    }

    /// Path segment taken verbatim, for names containing reserved characters
    pub fn raw(&self, segment: &str) -> StreamPath {
        StreamPath {
            stream: self.clone(),
            segments: vec![segment.to_string()],
        }
    }

    /// Bind a switch to this stream
    pub fn switch(&self, switch: Switch) -> QueryResult<Switch> {
        switch.bind(self)
    }

    /// Wire form
    pub fn to_ast(&self) -> Json {
        let mut map = Map::new();
        map.insert("name".to_string(), json!(self.name));
        match self.filters.as_slice() {
            [] => {}
            [only] => {
                let mut filter = only.to_ast();
                if let Some(obj) = filter.as_object_mut() {
                    obj.remove("type");
                }
                map.insert("filter".to_string(), filter);
            }
            many => {
                let args: Vec<Json> = many.iter().map(Cond::to_ast).collect();
                map.insert("filter".to_string(), json!({"type": "&&", "args": args}));
            }
        }
        Json::Object(map)
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.filters.is_empty() {
            write!(f, "(stream \"{}\")", self.name)
        } else {
            let filters: Vec<String> = self.filters.iter().map(|c| c.to_string()).collect();
            write!(f, "(stream \"{}\" with {})", self.name, filters.join(", "))
        }
    }
}

/// Percent-encode a stream name, keeping `/` like the server's URL scheme
fn quote(name: &str) -> String {
    urlencoding::encode(name).replace("%2F", "/")
}

fn split(dotted: &str) -> Vec<String> {
    dotted
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Unbound path into an event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPath {
    segments: Vec<String>,
}

impl EventPath {
    /// The empty path (the event root)
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend with one or more dotted segments
    pub fn attr(mut self, dotted: &str) -> Self {
        self.segments.extend(split(dotted));
        self
    }

    /// Extend with a segment taken verbatim
    pub fn raw(mut self, segment: &str) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Wire form: `{"path": ["event", ...]}`
    pub fn to_ast(&self) -> Map<String, Json> {
        let mut map = Map::new();
        map.insert("path".to_string(), json!(event_path(&self.segments)));
        map
    }
}

impl fmt::Display for EventPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Path into the events of a specific stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamPath {
    stream: Stream,
    segments: Vec<String>,
}

impl StreamPath {
    /// Extend with one or more dotted segments
    pub fn attr(mut self, dotted: &str) -> Self {
        self.segments.extend(split(dotted));
        self
    }

    /// Extend with a segment taken verbatim
    pub fn raw(mut self, segment: &str) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Column name this path gets in materialized frames
    pub fn column_name(&self) -> String {
        format!("{}:{}", self.stream.name(), self.segments.join("."))
    }

    /// Wire form: `{"path": ["event", ...], "stream": {...}}`
    pub fn to_ast(&self) -> Map<String, Json> {
        let mut map = Map::new();
        map.insert("path".to_string(), json!(event_path(&self.segments)));
        map.insert("stream".to_string(), self.stream.to_ast());
        map
    }
}

impl fmt::Display for StreamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stream, self.segments.join("."))
    }
}

fn event_path(segments: &[String]) -> Vec<&str> {
    std::iter::once("event")
        .chain(segments.iter().map(String::as_str))
        .collect()
}

/// Either kind of attribute path
#[derive(Debug, Clone, PartialEq)]
pub enum Path {
    Event(EventPath),
    Stream(StreamPath),
}

impl Path {
    /// Check whether the path is bound to a stream
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    pub fn to_ast(&self) -> Map<String, Json> {
        match self {
            Self::Event(p) => p.to_ast(),
            Self::Stream(p) => p.to_ast(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(p) => p.fmt(f),
            Self::Stream(p) => p.fmt(f),
        }
    }
}

impl From<EventPath> for Path {
    fn from(p: EventPath) -> Self {
        Self::Event(p)
    }
}

impl From<StreamPath> for Path {
    fn from(p: StreamPath) -> Self {
        Self::Stream(p)
    }
}

macro_rules! comparisons {
    ($ty:ty) => {
        impl $ty {
            /// Equality; a list operand becomes membership
            pub fn is(&self, val: impl Into<Value>) -> QueryResult<Cond> {
                let val = val.into();
                let op = match val {
                    Value::List(_) => Operator::In,
                    _ => Operator::Eq,
                };
                Cond::new(self.clone(), op, val)
            }

            /// Inequality; a list operand becomes non-membership
            pub fn is_not(&self, val: impl Into<Value>) -> QueryResult<Cond> {
                let val = val.into();
                let op = match val {
                    Value::List(_) => Operator::NotIn,
                    _ => Operator::Ne,
                };
                Cond::new(self.clone(), op, val)
            }

            pub fn gt(&self, val: impl Into<Value>) -> QueryResult<Cond> {
                Cond::new(self.clone(), Operator::Gt, val)
            }

            pub fn gte(&self, val: impl Into<Value>) -> QueryResult<Cond> {
                Cond::new(self.clone(), Operator::Gte, val)
            }

            pub fn lt(&self, val: impl Into<Value>) -> QueryResult<Cond> {
                Cond::new(self.clone(), Operator::Lt, val)
            }

            pub fn lte(&self, val: impl Into<Value>) -> QueryResult<Cond> {
                Cond::new(self.clone(), Operator::Lte, val)
            }
        }
    };
}

comparisons!(EventPath);
comparisons!(StreamPath);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_path_segments() {
        let p = EventPath::new().attr("weather.temp").raw("max:f");
        assert_eq!(p.segments(), &["weather", "temp", "max:f"]);
        assert_eq!(p.to_string(), "weather.temp.max:f");
        assert_eq!(
            Json::Object(p.to_ast()),
            json!({"path": ["event", "weather", "temp", "max:f"]})
        );
    }

    #[test]
    fn test_stream_name_is_quoted() {
        let s = Stream::new("boston weather/daily");
        assert_eq!(s.name(), "boston%20weather/daily");
    }

    #[test]
    fn test_column_name() {
        let s = Stream::new("weather");
        assert_eq!(s.attr("temp.max").column_name(), "weather:temp.max");
    }

    #[test]
    fn test_single_filter_drops_type() {
        let bos = Stream::new("weather");
        let filtered = Stream::new("weather").with_filters(vec![bos.attr("city").is("Boston").unwrap()]);
        let ast = filtered.to_ast();
        assert_eq!(ast["filter"]["op"], json!("=="));
        assert!(ast["filter"].get("type").is_none());
    }

    #[test]
    fn test_multiple_filters_conjoined() {
        let v = EventPath::new();
        let filtered = Stream::new("weather").with_filters(vec![
            v.clone().attr("city").is("Boston").unwrap(),
            v.attr("temp").gt(10).unwrap(),
        ]);
        let ast = filtered.to_ast();
        assert_eq!(ast["filter"]["type"], json!("&&"));
        assert_eq!(ast["filter"]["args"].as_array().map(Vec::len), Some(2));
    }
}

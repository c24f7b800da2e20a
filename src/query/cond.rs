//! Conditions: one typed predicate on an attribute path
//!
//! The value's kind decides the wire type tag:
//!
//! ```text
//! f64, i64      -> "double"     NaiveDate     -> "date" (Y-M-D)
//! bool          -> "bool"       DateTime      -> "datetime" (ISO-8601, UTC if naive)
//! &str, String  -> "string"     Circle        -> "circle"  (op forced to "in")
//! Vec<Value>    -> "string"     Polygon       -> "polygon" (op forced to "in")
//! ```

use super::error::{QueryError, QueryResult};
use super::path::Path;
use super::span::Or;
use super::Expr;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use std::fmt;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal to
    Gte,
    /// Less than
    Lt,
    /// Less than or equal to
    Lte,
    /// Member of a list (or inside a region)
    In,
    /// Not a member of a list
    NotIn,
}

impl Operator {
    /// Wire spelling of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A geographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Circular region
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub center: Point,
    /// Radius in the units of the coordinate system
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point, radius: f64) -> Self {
        Self { center, radius }
    }

    fn to_ast(&self) -> Json {
        json!({
            "center": {"lat": self.center.lat, "lon": self.center.lon},
            "radius": self.radius,
        })
    }
}

/// Polygonal region given by its exterior ring
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    fn to_ast(&self) -> Json {
        json!({ "vertices": self.vertices })
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Double(f64),
    Int(i64),
    Bool(bool),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    List(Vec<Value>),
    Circle(Circle),
    Polygon(Polygon),
}

impl Value {
    /// Wire type tag for this value
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Double(_) | Self::Int(_) => "double",
            Self::Bool(_) => "bool",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Circle(_) => "circle",
            Self::Polygon(_) => "polygon",
            Self::String(_) | Self::List(_) => "string",
        }
    }

    /// Check for a geometric region
    pub fn is_region(&self) -> bool {
        matches!(self, Self::Circle(_) | Self::Polygon(_))
    }

    /// Wire form of the bare value
    pub fn to_ast(&self) -> Json {
        match self {
            Self::Double(v) => json!(v),
            Self::Int(v) => json!(v),
            Self::Bool(v) => json!(v),
            Self::String(v) => json!(v),
            Self::Date(d) => json!(format!("{}-{}-{}", d.year(), d.month(), d.day())),
            Self::DateTime(dt) => json!(iso8601(dt)),
            Self::List(vs) => Json::Array(vs.iter().map(Value::to_ast).collect()),
            Self::Circle(c) => c.to_ast(),
            Self::Polygon(p) => p.to_ast(),
        }
    }
}

/// ISO-8601 with an explicit offset
pub fn iso8601(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "\"{}\"", v),
            Self::Date(d) => write!(f, "{}", d),
            Self::DateTime(dt) => write!(f, "{}", iso8601(dt)),
            Self::List(vs) => {
                let items: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Circle(c) => write!(
                f,
                "Circle{{lat:{}, lon:{}, radius:{}}}",
                c.center.lat, c.center.lon, c.radius
            ),
            Self::Polygon(p) => {
                let vs: Vec<String> = p
                    .vertices
                    .iter()
                    .map(|v| format!("{{lat: {}, lon: {}}}", v.lat, v.lon))
                    .collect();
                write!(f, "Polygon[{}]", vs.join(", "))
            }
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

/// Timezone-naive datetimes are taken to be UTC
impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v.and_utc().fixed_offset())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Self::DateTime(v)
    }
}

impl From<Circle> for Value {
    fn from(v: Circle) -> Self {
        Self::Circle(v)
    }
}

impl From<Polygon> for Value {
    fn from(v: Polygon) -> Self {
        Self::Polygon(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(vs: Vec<T>) -> Self {
        Self::List(vs.into_iter().map(Into::into).collect())
    }
}

/// A single predicate: `path op value`
#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    path: Path,
    op: Operator,
    val: Value,
}

impl Cond {
    /// Create a condition, rejecting non-equality operators on regions
    pub fn new(path: impl Into<Path>, op: Operator, val: impl Into<Value>) -> QueryResult<Self> {
        let val = val.into();
        if val.is_region() && op != Operator::Eq {
            return Err(QueryError::RegionOperator(op));
        }
        Ok(Self {
            path: path.into(),
            op,
            val,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.val
    }

    /// Disjunction of this condition with another expression
    pub fn or(self, other: impl Into<Expr>) -> Or {
        Or::new(vec![Expr::Cond(self), other.into()])
    }

    /// Wire form
    pub fn to_ast(&self) -> Json {
        let op = if self.val.is_region() {
            Operator::In
        } else {
            self.op
        };
        let mut map = Map::new();
        map.insert("op".to_string(), json!(op.as_str()));
        map.insert(
            "arg".to_string(),
            json!({"type": self.val.type_tag(), "val": self.val.to_ast()}),
        );
        if self.path.is_bound() {
            map.insert("type".to_string(), json!("span"));
        }
        map.extend(self.path.to_ast());
        Json::Object(map)
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.op, self.val)
    }
}

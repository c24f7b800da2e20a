//! Combinators: spans, disjunctions, condition groups and sequences
//!
//! # Wire forms
//!
//! ```text
//! Span      {"type": "span", <child>, "for": ..., "within": ..., "after": ...}
//!           {"expr": "&&", "args": [...], ...}          (several children)
//! Or        {"expr": "||", "args": [...]}
//! Par       {"type": "all" | "any", "conds": [...]}     (one child: the child itself)
//! Serial    {"type": "serial", "conds": [...]}
//! ```
//!
//! A span whose only child is another span is folded with [`merge`] before
//! serializing, so the nesting never reaches the wire.

use super::cond::Cond;
use super::delta::Delta;
use super::error::{QueryError, QueryResult};
use super::switch::Switch;
use serde_json::{json, Map, Value as Json};
use std::fmt;

/// Any expression that may appear inside a span
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Cond(Cond),
    Span(Span),
    Or(Or),
    Par(Par),
    Switch(Switch),
}

impl Expr {
    pub fn to_ast(&self) -> Json {
        match self {
            Self::Cond(c) => c.to_ast(),
            Self::Span(s) => s.to_ast(),
            Self::Or(o) => o.to_ast(),
            Self::Par(p) => p.to_ast(),
            Self::Switch(s) => s.to_ast(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cond(c) => c.fmt(f),
            Self::Span(s) => s.fmt(f),
            Self::Or(o) => o.fmt(f),
            Self::Par(p) => p.fmt(f),
            Self::Switch(s) => s.fmt(f),
        }
    }
}

impl From<Cond> for Expr {
    fn from(c: Cond) -> Self {
        Self::Cond(c)
    }
}

impl From<Span> for Expr {
    fn from(s: Span) -> Self {
        Self::Span(s)
    }
}

impl From<Or> for Expr {
    fn from(o: Or) -> Self {
        Self::Or(o)
    }
}

impl From<Par> for Expr {
    fn from(p: Par) -> Self {
        Self::Par(p)
    }
}

/// Only switches bound to a stream can take part in a query
impl TryFrom<Switch> for Expr {
    type Error = QueryError;

    fn try_from(s: Switch) -> QueryResult<Self> {
        if s.stream().is_none() {
            return Err(QueryError::UnboundSwitch);
        }
        Ok(Self::Switch(s))
    }
}

fn extend(map: &mut Map<String, Json>, value: Json) {
    if let Json::Object(obj) = value {
        map.extend(obj);
    }
}

/// Width and gap constraints of a span
///
/// `min`/`max`/`exactly` bound the span's own duration; `within` is the
/// longest allowed gap after the previous span ends, `after` the shortest.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpanOpts {
    pub min: Option<Delta>,
    pub max: Option<Delta>,
    pub exactly: Option<Delta>,
    pub within: Option<Delta>,
    pub after: Option<Delta>,
}

impl SpanOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, d: Delta) -> Self {
        self.min = Some(d);
        self
    }

    pub fn max(mut self, d: Delta) -> Self {
        self.max = Some(d);
        self
    }

    pub fn exactly(mut self, d: Delta) -> Self {
        self.exactly = Some(d);
        self
    }

    pub fn within(mut self, d: Delta) -> Self {
        self.within = Some(d);
        self
    }

    pub fn after(mut self, d: Delta) -> Self {
        self.after = Some(d);
        self
    }

    /// Check whether either gap constraint is set
    pub fn has_gap(&self) -> bool {
        self.within.is_some() || self.after.is_some()
    }

    /// A following segment must start right after the previous one unless
    /// the caller said otherwise
    fn or_adjacent(mut self) -> Self {
        if !self.has_gap() {
            self.within = Some(Delta::zero());
        }
        self
    }
}

/// A stretch of time during which all child expressions hold continuously
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    exprs: Vec<Expr>,
    opts: SpanOpts,
}

impl Span {
    /// Create a span over one or more expressions
    pub fn new(exprs: Vec<Expr>) -> QueryResult<Self> {
        Self::with_opts(exprs, SpanOpts::default())
    }

    /// Create a span with width and gap constraints
    pub fn with_opts(exprs: Vec<Expr>, opts: SpanOpts) -> QueryResult<Self> {
        if exprs.is_empty() {
            return Err(QueryError::EmptySpan);
        }
        Ok(Self { exprs, opts })
    }

    /// Span over a single expression
    pub fn of(expr: impl Into<Expr>) -> Self {
        Self {
            exprs: vec![expr.into()],
            opts: SpanOpts::default(),
        }
    }

    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    pub fn opts(&self) -> SpanOpts {
        self.opts
    }

    /// Builder: minimum duration
    pub fn min(mut self, d: Delta) -> Self {
        self.opts.min = Some(d);
        self
    }

    /// Builder: maximum duration
    pub fn max(mut self, d: Delta) -> Self {
        self.opts.max = Some(d);
        self
    }

    /// Builder: exact duration
    pub fn exactly(mut self, d: Delta) -> Self {
        self.opts.exactly = Some(d);
        self
    }

    /// Builder: longest gap after the previous span
    pub fn within(mut self, d: Delta) -> Self {
        self.opts.within = Some(d);
        self
    }

    /// Builder: shortest gap after the previous span
    pub fn after(mut self, d: Delta) -> Self {
        self.opts.after = Some(d);
        self
    }

    /// Both spans must hold at once
    pub fn and(self, other: impl Into<Expr>) -> Span {
        Span::of(self).push(other.into())
    }

    fn push(mut self, expr: Expr) -> Self {
        self.exprs.push(expr);
        self
    }

    /// Either span may hold
    pub fn or(self, other: impl Into<Expr>) -> Or {
        Or::new(vec![Expr::Span(self), other.into()])
    }

    /// This span, then `next`; `next` defaults to `within = 0`
    pub fn followed_by(self, next: Span) -> Serial {
        Serial::new(vec![self]).followed_by(next)
    }

    /// This span, then a new span over `exprs`
    pub fn then(self, exprs: Vec<Expr>, opts: SpanOpts) -> QueryResult<Serial> {
        Serial::new(vec![self]).then(exprs, opts)
    }

    /// Wire form
    pub fn to_ast(&self) -> Json {
        if let [Expr::Span(inner)] = self.exprs.as_slice() {
            return merge(self, inner).to_ast();
        }

        let mut d = Map::new();
        if let Some(w) = self.opts.within {
            d.insert("within".to_string(), w.to_ast());
        }
        if let Some(a) = self.opts.after {
            d.insert("after".to_string(), a.to_ast());
        }
        if let Some(width) = self.opts.exactly {
            d.insert("for".to_string(), width.to_ast());
        } else {
            let mut range = Map::new();
            if let Some(min) = self.opts.min {
                range.insert("at-least".to_string(), min.to_ast());
            }
            if let Some(max) = self.opts.max {
                range.insert("at-most".to_string(), max.to_ast());
            }
            if !range.is_empty() {
                d.insert("for".to_string(), Json::Object(range));
            }
        }

        match self.exprs.as_slice() {
            [Expr::Or(or)] => extend(&mut d, or.to_ast()),
            [only] => {
                d.insert("type".to_string(), json!("span"));
                extend(&mut d, only.to_ast());
            }
            many => {
                d.insert("expr".to_string(), json!("&&"));
                d.insert(
                    "args".to_string(),
                    Json::Array(many.iter().map(Expr::to_ast).collect()),
                );
            }
        }
        Json::Object(d)
    }
}

/// Nested spans with a gap constraint need parentheses to read unambiguously
fn grouped(expr: &Expr) -> String {
    match expr {
        Expr::Span(s) if s.opts.within.is_some() => format!("({})", s),
        other => other.to_string(),
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.exprs.iter().map(grouped).collect();
        write!(f, "{}", parts.join(" && "))?;

        let o = &self.opts;
        if let Some(a) = o.after {
            write!(f, " after {}", a)?;
        }
        if let Some(w) = o.within {
            write!(f, " within {}", w)?;
        }
        match (o.exactly, o.min, o.max) {
            (Some(width), _, _) => write!(f, " for exactly {}", width),
            (None, Some(min), None) => write!(f, " for at least {}", min),
            (None, None, Some(max)) => write!(f, " for at most {}", max),
            (None, Some(min), Some(max)) => {
                write!(f, " for at least {} and at most {}", min, max)
            }
            (None, None, None) => Ok(()),
        }
    }
}

/// Fold a span and its sole child span into one node.
///
/// Tighter constraints win field by field: the smaller `within`, the larger
/// `after`, the larger `min`, the smaller `max`. Two different exact widths
/// collapse to a zero-length width. A field set on only one side is kept.
pub fn merge(outer: &Span, inner: &Span) -> Span {
    fn pick(a: Option<Delta>, b: Option<Delta>, f: fn(Delta, Delta) -> Delta) -> Option<Delta> {
        match (a, b) {
            (Some(a), Some(b)) => Some(f(a, b)),
            (a, b) => a.or(b),
        }
    }

    let (o, i) = (outer.opts, inner.opts);
    Span {
        exprs: inner.exprs.clone(),
        opts: SpanOpts {
            within: pick(o.within, i.within, std::cmp::min),
            after: pick(o.after, i.after, std::cmp::max),
            min: pick(o.min, i.min, std::cmp::max),
            max: pick(o.max, i.max, std::cmp::min),
            exactly: pick(o.exactly, i.exactly, |a, b| if a == b { a } else { Delta::zero() }),
        },
    }
}

/// Disjunction over spans or conditions
#[derive(Debug, Clone, PartialEq)]
pub struct Or {
    exprs: Vec<Expr>,
}

impl Or {
    pub fn new(exprs: Vec<Expr>) -> Self {
        Self { exprs }
    }

    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    /// Add another alternative
    pub fn or(mut self, other: impl Into<Expr>) -> Self {
        self.exprs.push(other.into());
        self
    }

    pub fn to_ast(&self) -> Json {
        json!({
            "expr": "||",
            "args": self.exprs.iter().map(Expr::to_ast).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for Or {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.exprs.iter().map(grouped).collect();
        write!(f, "{}", parts.join(" || "))
    }
}

/// ALL or ANY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParKind {
    All,
    Any,
}

impl ParKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
        }
    }
}

/// A group of conditions that must all (or any one) hold
#[derive(Debug, Clone, PartialEq)]
pub struct Par {
    kind: ParKind,
    exprs: Vec<Expr>,
}

impl Par {
    /// Every expression must hold
    pub fn all(exprs: Vec<Expr>) -> QueryResult<Self> {
        Self::new(ParKind::All, exprs)
    }

    /// At least one expression must hold
    pub fn any(exprs: Vec<Expr>) -> QueryResult<Self> {
        Self::new(ParKind::Any, exprs)
    }

    fn new(kind: ParKind, exprs: Vec<Expr>) -> QueryResult<Self> {
        if exprs.is_empty() {
            return Err(QueryError::EmptyGroup);
        }
        Ok(Self { kind, exprs })
    }

    pub fn kind(&self) -> ParKind {
        self.kind
    }

    pub fn to_ast(&self) -> Json {
        match self.exprs.as_slice() {
            [only] => only.to_ast(),
            many => json!({
                "type": self.kind.as_str(),
                "conds": many.iter().map(Expr::to_ast).collect::<Vec<_>>(),
            }),
        }
    }
}

impl fmt::Display for Par {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exprs.as_slice() {
            [only] => only.fmt(f),
            many => {
                let parts: Vec<String> = many.iter().map(|e| e.to_string()).collect();
                write!(f, "{} {}", self.kind.as_str(), parts.join(",\n    "))
            }
        }
    }
}

/// Spans that must occur one after another
#[derive(Debug, Clone, PartialEq)]
pub struct Serial {
    spans: Vec<Span>,
}

impl Serial {
    /// Sequence over spans, taken as given
    pub fn new(spans: Vec<Span>) -> Self {
        Self { spans }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Append a span; it defaults to `within = 0` when it has no gap constraint
    pub fn followed_by(mut self, next: Span) -> Self {
        let opts = next.opts.or_adjacent();
        self.spans.push(Span { opts, ..next });
        self
    }

    /// Append a new span over `exprs`
    pub fn then(self, exprs: Vec<Expr>, opts: SpanOpts) -> QueryResult<Self> {
        let next = Span::with_opts(exprs, opts.or_adjacent())?;
        Ok(self.followed_by(next))
    }

    /// Concatenate another sequence onto this one
    pub fn chain(mut self, other: Serial) -> Self {
        self.spans.extend(other.spans);
        self
    }

    pub fn to_ast(&self) -> Json {
        json!({
            "type": "serial",
            "conds": self.spans.iter().map(Span::to_ast).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.spans.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", parts.join(";\n    "))
    }
}

//! Query construction error types
//!
//! Every malformed expression is rejected when it is built, never when it
//! is serialized or submitted.

use super::cond::Operator;
use thiserror::Error;

/// Errors raised while building a query expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// A span was given no sub-expressions
    #[error("Syntax error: a span needs at least one condition")]
    EmptySpan,

    /// An `all`/`any` group was given no conditions
    #[error("Syntax error: condition groups need at least one condition")]
    EmptyGroup,

    /// One step of a switch had no conditions
    #[error("Syntax error: switches must have non-empty conditions")]
    EmptySwitchGroup,

    /// A switch needs two or more steps
    #[error("Syntax error: switches must contain at least two events")]
    TooFewTransitions,

    /// A stream-bound path was used inside a switch step
    #[error("Syntax error: use event paths (V) for conditions inside a switch")]
    BoundPathInSwitch,

    /// The switch is already bound to a stream
    #[error("Syntax error: cannot rebind switches")]
    AlreadyBound,

    /// A switch was used in a span before being bound to a stream
    #[error("Syntax error: switch must be bound to a stream before use")]
    UnboundSwitch,

    /// Regions only support equality
    #[error("Syntax error: only `==` can be used with regions, got `{0}`")]
    RegionOperator(Operator),

    /// `within`/`after` on the first span of a select
    #[error("Syntax error: first span in a select supports only `min`, `max` and `exactly`")]
    GapOnFirstSpan,

    /// `span` was called twice on a select
    #[error("Syntax error: select already has a span, use `then`")]
    SpanAlreadyStarted,

    /// `then` was called before `span`
    #[error("Syntax error: use `span` to start a select")]
    NoSpanStarted,

    /// A duration string could not be parsed
    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    /// A duration too long to represent
    #[error("Delta out of range: {0}")]
    DeltaOutOfRange(String),
}

/// Result type for query construction
pub type QueryResult<T> = Result<T, QueryError>;

//! Switches: ordered, zero-width transitions within one stream

use super::cond::Cond;
use super::error::{QueryError, QueryResult};
use super::path::Stream;
use serde_json::{json, Map, Value as Json};
use std::fmt;

/// A chain of event boundaries, e.g. "state goes from A to B"
///
/// Steps use unbound [`EventPath`](super::path::EventPath) conditions; the
/// stream is supplied once with [`Switch::bind`].
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    steps: Vec<Vec<Cond>>,
    stream: Option<Stream>,
}

impl Switch {
    /// Create a switch from two or more condition groups
    pub fn new(steps: Vec<Vec<Cond>>) -> QueryResult<Self> {
        if steps.len() < 2 {
            return Err(QueryError::TooFewTransitions);
        }
        for step in &steps {
            check_step(step)?;
        }
        Ok(Self { steps, stream: None })
    }

    /// Shorthand for a two-step switch
    pub fn transition(from: Vec<Cond>, to: Vec<Cond>) -> QueryResult<Self> {
        Self::new(vec![from, to])
    }

    /// Append another step
    pub fn then(mut self, step: Vec<Cond>) -> QueryResult<Self> {
        check_step(&step)?;
        self.steps.push(step);
        Ok(self)
    }

    /// Bind to a stream; a switch can be bound only once
    pub fn bind(self, stream: &Stream) -> QueryResult<Self> {
        if self.stream.is_some() {
            return Err(QueryError::AlreadyBound);
        }
        Ok(Self {
            stream: Some(stream.clone()),
            ..self
        })
    }

    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    pub fn steps(&self) -> &[Vec<Cond>] {
        &self.steps
    }

    /// Wire form: `{"type": "switch", "conds": [...], "stream": {...}}`
    pub fn to_ast(&self) -> Json {
        let conds: Vec<Json> = self
            .steps
            .iter()
            .map(|step| match step.as_slice() {
                [only] => only.to_ast(),
                many => json!({
                    "type": "&&",
                    "args": many.iter().map(Cond::to_ast).collect::<Vec<_>>(),
                }),
            })
            .collect();

        let mut map = Map::new();
        map.insert("type".to_string(), json!("switch"));
        map.insert("conds".to_string(), Json::Array(conds));
        if let Some(stream) = &self.stream {
            map.insert("stream".to_string(), stream.to_ast());
        }
        Json::Object(map)
    }
}

fn check_step(step: &[Cond]) -> QueryResult<()> {
    if step.is_empty() {
        return Err(QueryError::EmptySwitchGroup);
    }
    if step.iter().any(|c| c.path().is_bound()) {
        return Err(QueryError::BoundPathInSwitch);
    }
    Ok(())
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self
            .steps
            .iter()
            .map(|step| {
                step.iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(" && ")
            })
            .collect();
        match &self.stream {
            Some(stream) => write!(f, "{}:({})", stream, steps.join(" -> ")),
            None => write!(f, "({})", steps.join(" -> ")),
        }
    }
}

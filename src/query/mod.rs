//! Flare query algebra
//!
//! Composable temporal patterns over event streams:
//!
//! - **Conditions**: typed predicates on attribute paths
//! - **Spans**: stretches of time where conditions hold continuously,
//!   with width (`min`/`max`/`exactly`) and gap (`within`/`after`) bounds
//! - **Sequences**: spans that follow one another
//! - **Switches**: zero-width transitions within one stream
//! - **Select**: the time-bounded query root
//!
//! Every node serializes to the service's JSON request form with `to_ast`
//! and renders in the textual query language with `Display`.
//!
//! # Example
//!
//! ```rust
//! use flare::query::{ast_dict, Delta, Select, SpanOpts, Stream};
//!
//! # fn main() -> Result<(), flare::query::QueryError> {
//! let weather = Stream::new("weather");
//! let query = Select::new()
//!     .span(
//!         vec![weather.attr("temp").gte(80)?.into()],
//!         SpanOpts::new().min(Delta::from_hours(2)),
//!     )?
//!     .then(vec![weather.attr("rain").is(true)?.into()], SpanOpts::new())?;
//!
//! let doc = ast_dict(&query, None);
//! assert_eq!(doc["select"]["type"], "serial");
//! # Ok(())
//! # }
//! ```

mod cond;
mod delta;
mod error;
mod path;
mod select;
mod span;
mod switch;

pub use cond::{iso8601, Circle, Cond, Operator, Point, Polygon, Value};
pub use delta::Delta;
pub use error::{QueryError, QueryResult};
pub use path::{EventPath, Path, Stream, StreamPath};
pub use select::{ast, ast_dict, ProjValue, Projection, Returning, Select};
pub use span::{merge, Expr, Or, Par, ParKind, Serial, Span, SpanOpts};
pub use switch::Switch;

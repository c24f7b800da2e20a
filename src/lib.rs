//! # Flare
//!
//! Temporal pattern queries over event streams. Describe spans of time
//! during which conditions hold (optionally chained in sequence), run them
//! on the query service and materialize the matches as aligned, resampled
//! tables.
//!
//! ## Modules
//!
//! - [`query`]: the query algebra and its wire/text forms
//! - [`client`]: transport and query submission
//! - [`cursor`]: span pagination and event slicing with retry
//! - [`frame`]: tables, windowing and frame groups
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flare::{Align, Client, ClientConfig, Delta, Select, SpanOpts, Stream};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::default().auth_key("secret"))?;
//!
//!     let weather = Stream::new("weather");
//!     let query = Select::new().span(
//!         vec![weather.attr("temp").gt(90)?.into()],
//!         SpanOpts::new().min(Delta::from_hours(3)),
//!     )?;
//!
//!     let cursor = client.query(&query, None).await?;
//!     println!("{} heat waves", cursor.len().await?);
//!
//!     let frames = cursor
//!         .dataset(Some(Delta::from_hours(1)), Align::Center, Some(Delta::from_mins(5)))
//!         .frames()
//!         .await?;
//!     println!("{} frames", frames.len());
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod cursor;
pub mod frame;
pub mod query;

// Re-export top-level types for convenience
pub use client::{ApiError, ApiResult, Client, HttpTransport, Transport};

pub use config::{ClientConfig, Config, ConfigError, LoggingConfig};

pub use cursor::{Cursor, Interval, SliceResult, SpanInfo, SpanStats};

pub use frame::{Align, Frame, FrameError, FrameGroup, FrameResult, StackedFrame, Tensor};

pub use query::{
    ast, ast_dict, Cond, Delta, EventPath, Expr, Or, Par, Projection, QueryError, QueryResult,
    Returning, Select, Serial, Span, SpanOpts, Stream, Switch,
};

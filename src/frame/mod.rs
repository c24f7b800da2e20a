//! Result frames
//!
//! Turns the events of matching spans into time-indexed tables:
//!
//! - **Table**: per-stream frames, resampling, prefixing, outer joins
//! - **Window**: span/gap intervals, alignment, sliding windows
//! - **Group**: restartable views (`dataframes`, `dataframe`, `tensor`)
//!
//! # Pipeline
//!
//! ```text
//! spans -> intervals (or gaps) -> narrow -> slice events (bounded fan-out)
//!       -> frame per stream -> resample -> prefix "stream:" -> outer join
//! ```

mod error;
mod group;
mod table;
mod window;

pub use error::{FrameError, FrameResult};
pub use group::FrameGroup;
pub use table::{Frame, StackedFrame, StackedKey, Tensor, ID_COLUMN, TS_COLUMN};
pub use window::{carve, expected_rows, intervals, invert, narrow, slides, Align};

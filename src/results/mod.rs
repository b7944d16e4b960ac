//! Result persistence.
//!
//! Stores the candidate and good-group sets of a finished run and keeps
//! the last good-group list in memory for status queries.

mod sink;

pub use sink::{new_run_id, ResultDocument, ResultSink, SinkError};

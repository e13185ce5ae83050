//! envmon-stats
//!
//! Aggregate statistics over user-entered numeric columns.
//!
//! Pure functions, no IO. The raw reducers (`sum`, `median`, ...) are total
//! and follow IEEE semantics on empty input; [`apply`] is the checked entry
//! point used by the workflow and rejects an empty column.

mod aggregate;
mod summary;

pub use aggregate::*;
pub use summary::Summary;

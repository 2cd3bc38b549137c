//! SQL template extraction
//!
//! `SqlRenderer` compiles a `QueryPlan` straight to statement text with a
//! placeholder where the runtime identifier set goes. `SentinelCapture`
//! produces the same text by reading back a deliberately failed execution.

pub mod capture;
pub mod render;

pub use capture::{CaptureBackend, RejectingBackend, SentinelCapture};
pub use render::{identifier_set_sql, IdentifierSet, SqlRenderer};

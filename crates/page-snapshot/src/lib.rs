//! Semantic page snapshots.
//!
//! The browser extension renders the page into a ranked list of interactive
//! elements; this crate owns that model, the bridge that acquires it, the
//! per-runtime staleness cache, and the pipe-delimited compaction used in
//! LLM prompts.

pub mod bridge;
pub mod cache;
pub mod compact;
pub mod errors;
pub mod model;
pub mod options;
pub mod rank;

pub use bridge::*;
pub use cache::*;
pub use compact::*;
pub use errors::*;
pub use model::*;
pub use options::*;
pub use rank::*;

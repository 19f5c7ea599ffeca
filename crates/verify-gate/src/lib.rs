//! Deterministic verification algebra.
//!
//! A predicate is a pure function over (snapshot, url, downloads): no I/O,
//! no time, no state. Refreshing stale context is the eventually driver's
//! job, never the predicate's; testing relies on this split.

pub mod combinators;
pub mod errors;
pub mod eventually;
pub mod expect;
pub mod predicate;
pub mod primitives;
pub mod query;

pub use combinators::*;
pub use errors::*;
pub use eventually::*;
pub use expect::*;
pub use predicate::*;
pub use primitives::*;
pub use query::*;

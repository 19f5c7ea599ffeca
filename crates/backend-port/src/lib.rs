//! Minimal browser-control port.
//!
//! The runtime talks to the browser exclusively through the [`Backend`]
//! trait: JS evaluation, input dispatch, layout metrics, screenshots and a
//! ready-state wait. Anything richer (element queries, accessibility data)
//! is delegated to the extension-produced semantic snapshot, which keeps CDP
//! and Playwright implementations behaviorally interchangeable.

pub mod backend;
pub mod errors;
pub mod mock;
pub mod types;

pub use backend::*;
pub use errors::*;
pub use mock::*;
pub use types::*;

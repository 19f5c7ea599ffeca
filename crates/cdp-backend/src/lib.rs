//! Chrome DevTools Protocol implementation of the backend port.
//!
//! The WebSocket/browser-process plumbing is an external collaborator; this
//! crate only defines the [`CdpTransport`] command port and maps the
//! [`backend_port::Backend`] surface onto raw CDP methods with the exact
//! parameter shapes the protocol expects.

pub mod adapter;
pub mod keys;
pub mod transport;

pub use adapter::*;
pub use keys::*;
pub use transport::*;

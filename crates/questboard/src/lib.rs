//! Umbrella crate for Questboard.
//!
//! Re-exports the protocol, engine and client crates so downstream code can
//! depend on a single crate name (`questboard`).

pub use questboard_client as client;
pub use questboard_engine as engine;
pub use questboard_protocol as protocol;

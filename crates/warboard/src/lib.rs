//! Umbrella crate for Warboard.
//!
//! Re-exports the engine and protocol crates so downstream code can depend on
//! a single crate name (`warboard`).

pub use warboard_engine as engine;
pub use warboard_protocol as protocol;

pub use warboard_engine::{BoardError, Session};

//! Test doubles for the connection capability
//!
//! - [`MockConnection`] replays scripted replies and records what was sent.
//! - [`FakeEngine`] keeps users, privileges and per-connection principals in
//!   memory and answers the administrative calls with the engine's error codes.

mod doer;
mod engine;

pub use doer::MockConnection;
pub use engine::{FakeConnection, FakeEngine};

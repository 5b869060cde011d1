//! Device agent: runs the device client against a real broker.
//!
//! Library half of the `tb-agent` binary, exposed so `tb-e2e-tests` can
//! drive an `Agent` over `MockChannel`.

pub mod client_attributes;
pub mod config;
pub mod flash;
pub mod handlers;
pub mod orchestrator;
pub mod signals;
pub mod store;
pub mod telemetry;

pub use orchestrator::{Agent, Exit};

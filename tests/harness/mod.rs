//! Test harness utilities for loopback WebSocket testing.
//!
//! Spawns a real `wsline` echo server on an ephemeral port and drives it
//! with either the `wsline` client or raw TCP.

mod client;
mod metrics;
mod server;

pub use client::{RawClient, TestClient};
pub use metrics::Metrics;
pub use server::TestServer;

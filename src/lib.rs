//! Forwarding gateway for the Savager fitness-club frontend.
//!
//! Browser requests under `/api/*` and `/swagger*` are relayed to a single
//! upstream host with the `Host` header rewritten, under a CORS policy that
//! admits exactly one frontend origin.

pub mod config;
pub mod error;
pub mod handlers;
pub mod proxy;
pub mod server;
pub mod telemetry;

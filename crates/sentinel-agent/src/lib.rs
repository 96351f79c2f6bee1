//! CPU sentinel daemon
//!
//! Exposes the HTTP API so it can be exercised by integration tests.

pub mod api;

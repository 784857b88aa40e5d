//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler that opens event streams.
//! The broker, framing and stream lifecycle live in the `sse` crate.

pub(crate) mod handler;

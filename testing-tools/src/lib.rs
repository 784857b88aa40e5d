// Testing Tools Library
//
// This crate provides testing utilities and tools for the SSE broadcaster.
// Currently includes:
// - sse-test-client: drives a running server through the broadcast scenarios

pub mod api_client;
pub mod output;
pub mod scenarios;
pub mod sse_client;

//! HTTP API module for exposing indexed data via REST.

pub mod docs;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;

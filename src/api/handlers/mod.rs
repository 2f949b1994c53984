//! HTTP handlers for API endpoints.

pub mod health;
pub mod tokens;

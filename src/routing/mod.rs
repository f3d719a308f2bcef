//! HTTP routing for the Weathervane gateway
//!
//! Splits routing into the upstream client factory, the route table, and the
//! per-endpoint proxy handlers.

pub mod client;
pub mod handlers;
pub mod router;

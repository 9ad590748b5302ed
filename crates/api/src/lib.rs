//! HTTP API: compartment reads, character inventory CRUD, service wiring.

pub mod app;
pub mod context;
pub mod middleware;

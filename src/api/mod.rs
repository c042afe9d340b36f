//! HTTP surface of the origin tier: paginated read API, ingest, poll and
//! server-sent event streams.

pub mod config;
pub mod periodic;
pub mod routes;
pub mod server;

pub use server::{build_router, serve, start_server, AppState};

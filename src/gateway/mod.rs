//! HTTP surface: routes, handlers and the server lifecycle.

pub mod handlers;
pub mod server;

pub use server::{build_cache_store, build_router, AppState, GatewayServer};

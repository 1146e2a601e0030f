//! HTTP surface of the relay: routes and the server that runs them.

pub mod routes;
pub mod server;

pub use routes::{build_router, metrics_router, AppState};
pub use server::RelayServer;

//! HTTP surface of GrimoirePlot: configuration, routes, SSE and runtime.

pub mod config;
mod error;
pub mod protocol;
pub mod routes;
mod runtime;

pub use config::ServerConfig;
pub use error::ServerError;
pub use routes::{build_router, ApiError, AppState};
pub use runtime::{ctrl_c, run, serve, start_blocking};

/// Header carrying the producer secret on `/add_plot` and deletes.
pub use grimoire_sync::SECRET_HEADER;

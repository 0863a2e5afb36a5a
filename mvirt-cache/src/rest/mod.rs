//! REST API of the cache daemon.

mod handlers;
mod routes;

pub use handlers::{ApiError, AppState, OnDemandRequest, VersionInfo};
pub use routes::create_router;

pub mod app;
pub mod error;
pub mod routes;

pub use app::{build_app, build_registry, build_router};
pub use error::ApiError;

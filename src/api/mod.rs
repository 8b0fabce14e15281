//! HTTP surface: request context, error mapping, routes and the server loop.

pub mod context;
pub mod error;
pub mod routes;
pub mod server;

pub use context::RequestContext;
pub use error::{ApiError, ApiResult};
pub use server::{router, serve, AppState};

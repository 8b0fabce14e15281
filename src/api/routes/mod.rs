//! Route tables for the `/api/v1` surface.

use std::sync::Arc;

use axum::Router;

use crate::api::server::AppState;

pub mod catalog;
pub mod sales;
pub mod stock;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(catalog::routes())
        .merge(stock::routes())
        .merge(sales::routes())
}

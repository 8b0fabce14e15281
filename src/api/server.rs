//! Application state, router assembly and the HTTP server loop.

use std::future::Future;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::routes;
use crate::config::AppConfig;
use crate::core::catalog::CatalogService;
use crate::core::checkout::CheckoutPipeline;
use crate::core::engine::SaleEngine;
use crate::core::export::ExportService;
use crate::core::inventory::InventoryService;
use crate::core::summary::SummaryService;
use crate::domain::ports::DocumentStore;
use crate::utils::error::Result;

type Store = dyn DocumentStore;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Shared application state for all request handlers.
pub struct AppState {
    pub config: AppConfig,
    store: Arc<Store>,
    sales: SaleEngine<CheckoutPipeline<Store>>,
    catalog: CatalogService<Store>,
    inventory: InventoryService<Store>,
    summary: SummaryService<Store>,
    export: ExportService<Store>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &"<DocumentStore>")
            .finish()
    }
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<Store>) -> Self {
        let pipeline = CheckoutPipeline::with_tolerance(store.clone(), config.sales.tolerance);
        Self {
            sales: SaleEngine::new(pipeline),
            catalog: CatalogService::new(store.clone(), config.catalog_defaults()),
            inventory: InventoryService::new(store.clone()),
            summary: SummaryService::new(store.clone()),
            export: ExportService::new(store.clone()),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn sales(&self) -> &SaleEngine<CheckoutPipeline<Store>> {
        &self.sales
    }

    pub fn catalog(&self) -> &CatalogService<Store> {
        &self.catalog
    }

    pub fn inventory(&self) -> &InventoryService<Store> {
        &self.inventory
    }

    pub fn summary(&self) -> &SummaryService<Store> {
        &self.summary
    }

    pub fn export(&self) -> &ExportService<Store> {
        &self.export
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(origin = %origin, error = %err, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers(Any),
    )
}

/// Builds the full router with middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", routes::api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(layer) => router.layer(layer),
        None => router,
    }
}

/// Serves the router until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, debug = state.config.server.debug, "🚀 MarktBook listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

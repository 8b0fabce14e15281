//! Stock levels, adjustments and transfers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::context::RequestContext;
use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::core::inventory::{AdjustStockRequest, SetStockRequest, TransferStockRequest};
use crate::utils::error::MarktError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stock", get(list_stock).put(set_stock))
        .route("/stock/adjust", post(adjust_stock))
        .route("/stock/transfer", post(transfer_stock))
        .route("/stock/low", get(low_stock))
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub location_id: Option<Uuid>,
}

fn require_manager(ctx: &RequestContext) -> ApiResult<()> {
    if !ctx.actor.role.can_manage() {
        return Err(ctx.error(MarktError::forbidden(
            "stock changes require an owner or manager",
        )));
    }
    Ok(())
}

pub(crate) async fn list_stock(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<StockQuery>,
) -> ApiResult<impl IntoResponse> {
    let levels = state
        .inventory()
        .list(&ctx.actor, query.location_id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(levels))
}

pub(crate) async fn set_stock(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetStockRequest>,
) -> ApiResult<impl IntoResponse> {
    require_manager(&ctx)?;
    let level = state
        .inventory()
        .set_level(&ctx.actor, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(level))
}

pub(crate) async fn adjust_stock(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdjustStockRequest>,
) -> ApiResult<impl IntoResponse> {
    require_manager(&ctx)?;
    let level = state
        .inventory()
        .adjust(&ctx.actor, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(level))
}

pub(crate) async fn transfer_stock(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TransferStockRequest>,
) -> ApiResult<impl IntoResponse> {
    require_manager(&ctx)?;
    let result = state
        .inventory()
        .transfer(&ctx.actor, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(result))
}

pub(crate) async fn low_stock(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<StockQuery>,
) -> ApiResult<impl IntoResponse> {
    let levels = state
        .inventory()
        .low_stock(&ctx.actor, query.location_id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(levels))
}

//! Checkout, sale history, analytics and the activity log.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::context::RequestContext;
use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::core::checkout::CheckoutRequest;
use crate::core::summary::SummaryQuery;
use crate::domain::model::SaleFilter;
use crate::utils::error::MarktError;

const DEFAULT_PAGE: usize = 100;
const MAX_PAGE: usize = 500;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sales", get(list_sales).post(checkout))
        .route("/sales/summary", get(sales_summary))
        .route("/sales/export", get(export_sales))
        .route("/sales/:id", get(get_sale))
        .route("/activity", get(recent_activity))
}

/// Runs the checkout pipeline and records the sale.
///
/// POST /api/v1/sales
pub(crate) async fn checkout(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<impl IntoResponse> {
    let receipt = state
        .sales()
        .run(&ctx.actor, req)
        .await
        .map_err(|e| {
            tracing::info!(
                business = %ctx.business_id(),
                request_id = %ctx.request_id,
                reason = %e,
                "Checkout rejected"
            );
            ctx.error(e)
        })?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub(crate) async fn list_sales(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(mut filter): Query<SaleFilter>,
) -> ApiResult<impl IntoResponse> {
    filter.limit = Some(filter.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE));
    let sales = state
        .store()
        .list_sales(ctx.business_id(), &filter)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(sales))
}

pub(crate) async fn get_sale(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let sale = state
        .store()
        .get_sale(ctx.business_id(), id)
        .await
        .map_err(|e| ctx.error(e))?
        .ok_or_else(|| ctx.error(MarktError::not_found("sale", id)))?;
    Ok(Json(sale))
}

pub(crate) async fn sales_summary(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<impl IntoResponse> {
    let summary = state
        .summary()
        .summary(ctx.business_id(), &query)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(summary))
}

pub(crate) async fn export_sales(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<impl IntoResponse> {
    let archive = state
        .export()
        .export(ctx.business_id(), &query)
        .await
        .map_err(|e| ctx.error(e))?;
    let filename = format!(
        "attachment; filename=\"sales-{}-{}.zip\"",
        query.from.format("%Y%m%d"),
        query.to.format("%Y%m%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        archive,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

pub(crate) async fn recent_activity(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_PAGE);
    let entries = state
        .store()
        .recent(ctx.business_id(), limit)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(entries))
}

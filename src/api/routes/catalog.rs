//! Business settings, products, locations and contacts.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::context::RequestContext;
use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::core::catalog::{
    BusinessUpdate, ContactUpdate, NewBusiness, NewContact, NewLocation, NewProduct,
    ProductUpdate,
};
use crate::domain::model::{ContactKind, ProductFilter, Role};
use crate::utils::error::MarktError;

/// Creates catalog routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/businesses", axum::routing::post(create_business))
        .route("/business", get(get_business).patch(update_business))
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            get(get_product).patch(update_product).delete(deactivate_product),
        )
        .route("/locations", get(list_locations).post(create_location))
        .route("/contacts", get(list_contacts).post(create_contact))
        .route(
            "/contacts/:id",
            get(get_contact).patch(update_contact).delete(delete_contact),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateBusinessRequest {
    pub name: String,
    pub currency: Option<String>,
    pub tax_rate: Option<f64>,
    pub low_stock_threshold: Option<i64>,
}

/// Registers the caller's business. The id comes from the token (or debug header),
/// so a tenant can only ever create its own record.
///
/// POST /api/v1/businesses
pub(crate) async fn create_business(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBusinessRequest>,
) -> ApiResult<impl IntoResponse> {
    if ctx.actor.role != Role::Owner {
        return Err(ctx.error(MarktError::forbidden("only an owner can register a business")));
    }
    let business = state
        .catalog()
        .create_business(NewBusiness {
            id: Some(ctx.business_id()),
            created_by: ctx.actor.user_id.clone(),
            name: req.name,
            currency: req.currency,
            tax_rate: req.tax_rate,
            low_stock_threshold: req.low_stock_threshold,
        })
        .await
        .map_err(|e| ctx.error(e))?;
    Ok((StatusCode::CREATED, Json(business)))
}

pub(crate) async fn get_business(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let business = state
        .catalog()
        .business(&ctx.actor)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(business))
}

pub(crate) async fn update_business(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BusinessUpdate>,
) -> ApiResult<impl IntoResponse> {
    let business = state
        .catalog()
        .update_business(&ctx.actor, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(business))
}

pub(crate) async fn list_products(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<impl IntoResponse> {
    let products = state
        .catalog()
        .list_products(&ctx.actor, &filter)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(products))
}

pub(crate) async fn create_product(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewProduct>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(business = %ctx.business_id(), sku = %req.sku, "Creating product");
    let product = state
        .catalog()
        .create_product(&ctx.actor, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub(crate) async fn get_product(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let product = state
        .catalog()
        .product(&ctx.actor, id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(product))
}

pub(crate) async fn update_product(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProductUpdate>,
) -> ApiResult<impl IntoResponse> {
    let product = state
        .catalog()
        .update_product(&ctx.actor, id, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(product))
}

pub(crate) async fn deactivate_product(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let product = state
        .catalog()
        .deactivate_product(&ctx.actor, id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(product))
}

pub(crate) async fn list_locations(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let locations = state
        .catalog()
        .list_locations(&ctx.actor)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(locations))
}

pub(crate) async fn create_location(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewLocation>,
) -> ApiResult<impl IntoResponse> {
    let location = state
        .catalog()
        .create_location(&ctx.actor, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok((StatusCode::CREATED, Json(location)))
}

#[derive(Debug, Deserialize)]
pub struct ContactQuery {
    pub kind: Option<ContactKind>,
}

pub(crate) async fn list_contacts(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContactQuery>,
) -> ApiResult<impl IntoResponse> {
    let contacts = state
        .catalog()
        .list_contacts(&ctx.actor, query.kind)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(contacts))
}

pub(crate) async fn create_contact(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewContact>,
) -> ApiResult<impl IntoResponse> {
    let contact = state
        .catalog()
        .create_contact(&ctx.actor, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok((StatusCode::CREATED, Json(contact)))
}

pub(crate) async fn get_contact(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let contact = state
        .catalog()
        .contact(&ctx.actor, id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(contact))
}

pub(crate) async fn update_contact(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ContactUpdate>,
) -> ApiResult<impl IntoResponse> {
    let contact = state
        .catalog()
        .update_contact(&ctx.actor, id, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(contact))
}

pub(crate) async fn delete_contact(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state
        .catalog()
        .delete_contact(&ctx.actor, id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(StatusCode::NO_CONTENT)
}

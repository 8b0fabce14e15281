mod common;

use std::io::Read;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use chrono::{Duration, Utc};
use common::{debug_app, seed_shop, stock_quantity};
use jsonwebtoken::{encode, EncodingKey, Header};
use marktbook::domain::ports::DocumentStore;
use marktbook::{router, AppConfig, AppState, MemoryStore};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn window() -> (String, String) {
    let fmt = "%Y-%m-%dT%H:%M:%SZ";
    let from = (Utc::now() - Duration::days(1)).format(fmt).to_string();
    let to = (Utc::now() + Duration::days(1)).format(fmt).to_string();
    (from, to)
}

#[tokio::test]
async fn test_health_needs_no_identity() {
    let app = debug_app();
    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cashier_cannot_manage_catalog_or_stock() {
    let app = debug_app();
    let shop = seed_shop(&app).await;

    let (status, body) = app
        .call(
            "POST",
            "/api/v1/products",
            "cashier",
            Some(json!({ "name": "Mocha", "sku": "MO-1", "price": 4.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app
        .call(
            "POST",
            "/api/v1/stock/adjust",
            "cashier",
            Some(json!({
                "product_id": shop.product,
                "location_id": shop.location,
                "delta": 5
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(stock_quantity(&app, &shop).await, 10);
}

#[tokio::test]
async fn test_tenants_cannot_see_each_other() {
    let app = debug_app();
    let shop = seed_shop(&app).await;

    let other = common::TestApp {
        app: app.app.clone(),
        business: Uuid::new_v4(),
    };
    let (status, _) = other
        .owner("GET", &format!("/api/v1/products/{}", shop.product), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, products) = other.owner("GET", "/api/v1/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(products.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_stock_transfer_between_locations() {
    let app = debug_app();
    let shop = seed_shop(&app).await;
    let (_, warehouse) = app
        .owner("POST", "/api/v1/locations", Some(json!({ "name": "Warehouse" })))
        .await;

    let (status, result) = app
        .call(
            "POST",
            "/api/v1/stock/transfer",
            "manager",
            Some(json!({
                "product_id": shop.product,
                "from_location_id": shop.location,
                "to_location_id": warehouse["id"],
                "quantity": 4
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", result);
    assert_eq!(result["from"]["quantity"], 6);
    assert_eq!(result["to"]["quantity"], 4);

    let (status, body) = app
        .owner(
            "POST",
            "/api/v1/stock/transfer",
            Some(json!({
                "product_id": shop.product,
                "from_location_id": shop.location,
                "to_location_id": warehouse["id"],
                "quantity": 7
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_STOCK");
}

async fn record_sales(app: &common::TestApp, shop: &common::Shop) {
    for (quantity, method) in [(1, "cash"), (2, "card"), (3, "card")] {
        let (status, body) = app
            .owner(
                "POST",
                "/api/v1/sales",
                Some(json!({
                    "location_id": shop.location,
                    "items": [{ "product_id": shop.product, "quantity": quantity }],
                    "payment_method": method
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }
}

#[tokio::test]
async fn test_summary_aggregates_recorded_sales() {
    let app = debug_app();
    let shop = seed_shop(&app).await;
    record_sales(&app, &shop).await;

    let (from, to) = window();
    let (status, summary) = app
        .owner(
            "GET",
            &format!("/api/v1/sales/summary?from={}&to={}", from, to),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", summary);

    // 3.5 * 6 = 21.00 加 10% 稅
    assert_eq!(summary["totals"]["sale_count"], 3);
    assert_eq!(summary["totals"]["items_sold"], 6);
    assert_eq!(summary["totals"]["revenue"], 23.1);
    assert_eq!(summary["top_products"][0]["quantity"], 6);
    assert_eq!(summary["top_categories"][0]["category"], "Coffee");
    let methods = summary["payment_methods"].as_array().unwrap();
    assert_eq!(methods.len(), 2);

    let (status, body) = app
        .owner(
            "GET",
            &format!("/api/v1/sales/summary?from={}&to={}", to, from),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_export_returns_zip_archive() {
    let app = debug_app();
    let shop = seed_shop(&app).await;
    record_sales(&app, &shop).await;

    let (from, to) = window();
    let (status, bytes) = app
        .call_raw(
            "GET",
            &format!("/api/v1/sales/export?from={}&to={}", from, to),
            "manager",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut sales_csv = String::new();
    archive
        .by_name("sales.csv")
        .unwrap()
        .read_to_string(&mut sales_csv)
        .unwrap();
    // 標題列加三筆銷售
    assert_eq!(sales_csv.lines().count(), 4);
    assert!(archive.by_name("items.csv").is_ok());
    assert!(archive.by_name("summary.json").is_ok());
}

fn jwt_app(secret: &str) -> axum::Router {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(secret.to_string());
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    router(Arc::new(AppState::new(config, store)))
}

fn token(secret: &str, business: Uuid, role: &str) -> String {
    let claims = json!({
        "sub": "user-42",
        "business_id": business.to_string(),
        "role": role,
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_jwt_identity_is_required_and_verified() {
    let app = jwt_app("test-secret");
    let business = Uuid::new_v4();

    let missing = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/business")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let forged = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/business")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", token("other-secret", business, "owner")),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    let created = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/businesses")
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", token("test-secret", business, "owner")),
                )
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "name": "Token Shop" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = to_bytes(created.into_body(), usize::MAX).await.unwrap();
    let business_json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(business_json["id"], business.to_string());
}

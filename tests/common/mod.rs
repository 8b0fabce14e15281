#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use marktbook::domain::ports::DocumentStore;
use marktbook::{router, AppConfig, AppState, MemoryStore};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub app: Router,
    pub business: Uuid,
}

/// 除錯模式的應用程式：身分由 X-Business-Id / X-Role 標頭提供
pub fn debug_app() -> TestApp {
    let mut config = AppConfig::default();
    config.server.debug = true;
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    TestApp {
        app: router(Arc::new(AppState::new(config, store))),
        business: Uuid::new_v4(),
    }
}

impl TestApp {
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        role: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.call_raw(method, uri, role, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn call_raw(
        &self,
        method: &str,
        uri: &str,
        role: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-Business-Id", self.business.to_string())
            .header("X-User-Id", format!("{}-1", role))
            .header("X-Role", role);
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub async fn owner(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, "owner", body).await
    }
}

/// 建好的商店：一個商品、一個門市，庫存 10
pub struct Shop {
    pub product: String,
    pub location: String,
}

pub async fn seed_shop(app: &TestApp) -> Shop {
    let (status, _) = app
        .owner(
            "POST",
            "/api/v1/businesses",
            Some(json!({ "name": "Corner Cafe", "currency": "eur", "tax_rate": 0.1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, product) = app
        .owner(
            "POST",
            "/api/v1/products",
            Some(json!({
                "name": "Flat white",
                "sku": "FW-1",
                "category": "Coffee",
                "price": 3.5
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, location) = app
        .owner("POST", "/api/v1/locations", Some(json!({ "name": "Main street" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let shop = Shop {
        product: product["id"].as_str().unwrap().to_string(),
        location: location["id"].as_str().unwrap().to_string(),
    };

    let (status, _) = app
        .owner(
            "PUT",
            "/api/v1/stock",
            Some(json!({
                "product_id": shop.product,
                "location_id": shop.location,
                "quantity": 10
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    shop
}

pub async fn stock_quantity(app: &TestApp, shop: &Shop) -> i64 {
    let (status, levels) = app
        .owner(
            "GET",
            &format!("/api/v1/stock?location_id={}", shop.location),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    levels
        .as_array()
        .unwrap()
        .iter()
        .find(|level| level["product_id"] == shop.product.as_str())
        .map_or(0, |level| level["quantity"].as_i64().unwrap())
}

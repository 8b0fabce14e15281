use crate::domain::model::{ActivityLog, Actor, StockLevel, StockLine};
use crate::domain::ports::{DecrementOutcome, DocumentStore};
use crate::utils::error::{MarktError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStockRequest {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i64,
    pub reorder_level: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStockRequest {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub delta: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferStockRequest {
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub from: StockLevel,
    pub to: StockLevel,
}

pub struct InventoryService<S: DocumentStore + ?Sized> {
    store: Arc<S>,
}

impl<S: DocumentStore + ?Sized> InventoryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn ensure_product(&self, business_id: Uuid, product_id: Uuid) -> Result<()> {
        self.store
            .get_product(business_id, product_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| MarktError::not_found("product", product_id))
    }

    async fn ensure_location(&self, business_id: Uuid, location_id: Uuid) -> Result<()> {
        self.store
            .get_location(business_id, location_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| MarktError::not_found("location", location_id))
    }

    async fn log(&self, actor: &Actor, action: &str, entity_id: Uuid, detail: serde_json::Value) {
        let entry = ActivityLog::new(
            actor.business_id,
            actor.user_id.clone(),
            action,
            "stock",
            Some(entity_id),
            detail,
        );
        if let Err(err) = self.store.append(entry).await {
            tracing::warn!(action, error = %err, "Failed to append activity log");
        }
    }

    pub async fn list(&self, actor: &Actor, location_id: Option<Uuid>) -> Result<Vec<StockLevel>> {
        self.store.list_stock(actor.business_id, location_id).await
    }

    pub async fn set_level(&self, actor: &Actor, request: SetStockRequest) -> Result<StockLevel> {
        if request.quantity < 0 {
            return Err(MarktError::validation("stock quantity cannot be negative"));
        }
        if request.reorder_level.is_some_and(|level| level < 0) {
            return Err(MarktError::validation("reorder level cannot be negative"));
        }
        self.ensure_product(actor.business_id, request.product_id).await?;
        self.ensure_location(actor.business_id, request.location_id).await?;

        let existing = self
            .store
            .stock_level(actor.business_id, request.product_id, request.location_id)
            .await?;
        let reorder_level = request
            .reorder_level
            .or(existing.as_ref().map(|s| s.reorder_level))
            .unwrap_or(0);

        let level = self
            .store
            .set_stock(StockLevel {
                business_id: actor.business_id,
                product_id: request.product_id,
                location_id: request.location_id,
                quantity: request.quantity,
                reorder_level,
                updated_at: Utc::now(),
            })
            .await?;

        self.log(
            actor,
            "stock.set",
            request.product_id,
            serde_json::json!({
                "location_id": request.location_id,
                "previous": existing.map(|s| s.quantity),
                "quantity": level.quantity,
            }),
        )
        .await;
        Ok(level)
    }

    pub async fn adjust(&self, actor: &Actor, request: AdjustStockRequest) -> Result<StockLevel> {
        if request.delta == 0 {
            return Err(MarktError::validation("adjustment cannot be zero"));
        }
        self.ensure_product(actor.business_id, request.product_id).await?;
        self.ensure_location(actor.business_id, request.location_id).await?;

        let level = self
            .store
            .adjust_stock(
                actor.business_id,
                request.product_id,
                request.location_id,
                request.delta,
            )
            .await?;

        tracing::info!(
            product = %request.product_id,
            location = %request.location_id,
            delta = request.delta,
            quantity = level.quantity,
            "Stock adjusted"
        );
        self.log(
            actor,
            "stock.adjusted",
            request.product_id,
            serde_json::json!({
                "location_id": request.location_id,
                "delta": request.delta,
                "reason": request.reason,
                "quantity": level.quantity,
            }),
        )
        .await;
        Ok(level)
    }

    pub async fn transfer(
        &self,
        actor: &Actor,
        request: TransferStockRequest,
    ) -> Result<TransferResult> {
        if request.quantity <= 0 {
            return Err(MarktError::validation("transfer quantity must be positive"));
        }
        if request.from_location_id == request.to_location_id {
            return Err(MarktError::validation(
                "source and destination locations must differ",
            ));
        }
        self.ensure_product(actor.business_id, request.product_id).await?;
        self.ensure_location(actor.business_id, request.from_location_id).await?;
        self.ensure_location(actor.business_id, request.to_location_id).await?;

        let lines = [StockLine {
            product_id: request.product_id,
            quantity: request.quantity,
        }];
        let from = match self
            .store
            .decrement_many(actor.business_id, request.from_location_id, &lines)
            .await?
        {
            DecrementOutcome::Applied(mut levels) => levels
                .pop()
                .ok_or_else(|| MarktError::not_found("stock", request.product_id))?,
            DecrementOutcome::Rejected(shortages) => {
                return Err(MarktError::InsufficientStock { shortages });
            }
        };
        let to = match self
            .store
            .increment_many(actor.business_id, request.to_location_id, &lines)
            .await
        {
            Ok(mut levels) => levels
                .pop()
                .ok_or_else(|| MarktError::not_found("stock", request.product_id))?,
            Err(err) => {
                // 目的地寫入失敗：把數量還給來源門市
                if let Err(restore_err) = self
                    .store
                    .increment_many(actor.business_id, request.from_location_id, &lines)
                    .await
                {
                    tracing::error!(
                        product = %request.product_id,
                        error = %restore_err,
                        "Failed to restore source stock after transfer failure"
                    );
                }
                return Err(err);
            }
        };

        self.log(
            actor,
            "stock.transferred",
            request.product_id,
            serde_json::json!({
                "from": request.from_location_id,
                "to": request.to_location_id,
                "quantity": request.quantity,
            }),
        )
        .await;
        Ok(TransferResult { from, to })
    }

    pub async fn low_stock(&self, actor: &Actor, location_id: Option<Uuid>) -> Result<Vec<StockLevel>> {
        let threshold = self
            .store
            .get_business(actor.business_id)
            .await?
            .map_or(0, |b| b.low_stock_threshold);
        let levels = self.store.list_stock(actor.business_id, location_id).await?;
        Ok(levels
            .into_iter()
            .filter(|level| level.is_low(threshold))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::core::catalog::{CatalogDefaults, CatalogService, NewBusiness, NewLocation, NewProduct};
    use crate::domain::model::Role;

    struct Fixture {
        service: InventoryService<MemoryStore>,
        actor: Actor,
        product: Uuid,
        front: Uuid,
        back: Uuid,
    }

    async fn setup() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let catalog = CatalogService::new(store.clone(), CatalogDefaults::default());
        let business = catalog
            .create_business(NewBusiness {
                id: None,
                created_by: None,
                name: "Corner Shop".to_string(),
                currency: None,
                tax_rate: None,
                low_stock_threshold: Some(3),
            })
            .await
            .unwrap();
        let actor = Actor::new(business.id, Some("owner-1".to_string()), Role::Owner);
        let product = catalog
            .create_product(
                &actor,
                NewProduct {
                    name: "Oat milk".to_string(),
                    sku: "OAT-1".to_string(),
                    category: None,
                    price: 2.5,
                    cost: None,
                },
            )
            .await
            .unwrap();
        let mut locations = Vec::new();
        for name in ["Front", "Back"] {
            let location = catalog
                .create_location(
                    &actor,
                    NewLocation {
                        name: name.to_string(),
                        address: None,
                    },
                )
                .await
                .unwrap();
            locations.push(location.id);
        }

        Fixture {
            service: InventoryService::new(store),
            actor,
            product: product.id,
            front: locations[0],
            back: locations[1],
        }
    }

    async fn set(fx: &Fixture, location_id: Uuid, quantity: i64) {
        fx.service
            .set_level(
                &fx.actor,
                SetStockRequest {
                    product_id: fx.product,
                    location_id,
                    quantity,
                    reorder_level: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transfer_moves_stock_between_locations() {
        let fx = setup().await;
        set(&fx, fx.front, 10).await;

        let result = fx
            .service
            .transfer(
                &fx.actor,
                TransferStockRequest {
                    product_id: fx.product,
                    from_location_id: fx.front,
                    to_location_id: fx.back,
                    quantity: 4,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.from.quantity, 6);
        assert_eq!(result.to.quantity, 4);
    }

    #[tokio::test]
    async fn test_transfer_beyond_available_changes_nothing() {
        let fx = setup().await;
        set(&fx, fx.front, 2).await;

        let err = fx
            .service
            .transfer(
                &fx.actor,
                TransferStockRequest {
                    product_id: fx.product,
                    from_location_id: fx.front,
                    to_location_id: fx.back,
                    quantity: 5,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MarktError::InsufficientStock { .. }));

        let levels = fx.service.list(&fx.actor, None).await.unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_transfer_into_full_level_restores_source() {
        let fx = setup().await;
        set(&fx, fx.front, 10).await;
        set(&fx, fx.back, i64::MAX - 2).await;

        let err = fx
            .service
            .transfer(
                &fx.actor,
                TransferStockRequest {
                    product_id: fx.product,
                    from_location_id: fx.front,
                    to_location_id: fx.back,
                    quantity: 5,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MarktError::ValidationError { .. }));

        let front = fx.service.list(&fx.actor, Some(fx.front)).await.unwrap();
        assert_eq!(front[0].quantity, 10);
    }

    #[tokio::test]
    async fn test_adjust_with_extreme_delta_is_an_error() {
        let fx = setup().await;
        set(&fx, fx.front, 5).await;

        let request = AdjustStockRequest {
            product_id: fx.product,
            location_id: fx.front,
            delta: i64::MAX,
            reason: None,
        };
        assert!(fx.service.adjust(&fx.actor, request).await.is_err());
    }

    #[tokio::test]
    async fn test_adjust_rejects_zero_and_negative_result() {
        let fx = setup().await;
        set(&fx, fx.front, 1).await;

        let zero = AdjustStockRequest {
            product_id: fx.product,
            location_id: fx.front,
            delta: 0,
            reason: None,
        };
        assert!(fx.service.adjust(&fx.actor, zero).await.is_err());

        let too_much = AdjustStockRequest {
            product_id: fx.product,
            location_id: fx.front,
            delta: -2,
            reason: Some("breakage".to_string()),
        };
        assert!(fx.service.adjust(&fx.actor, too_much).await.is_err());
    }

    #[tokio::test]
    async fn test_low_stock_uses_business_threshold() {
        let fx = setup().await;
        set(&fx, fx.front, 3).await;
        set(&fx, fx.back, 9).await;

        let low = fx.service.low_stock(&fx.actor, None).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].location_id, fx.front);
    }

    #[tokio::test]
    async fn test_unknown_location_is_not_found() {
        let fx = setup().await;
        let err = fx
            .service
            .set_level(
                &fx.actor,
                SetStockRequest {
                    product_id: fx.product,
                    location_id: Uuid::new_v4(),
                    quantity: 1,
                    reorder_level: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}

use crate::domain::model::{
    ActivityLog, Actor, Business, Contact, ContactKind, Location, Product, ProductFilter, Role,
};
use crate::domain::ports::DocumentStore;
use crate::utils::error::{MarktError, Result};
use crate::utils::validation::{require_money, require_text};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 建立商家時未提供的欄位由這些預設值補上
#[derive(Debug, Clone)]
pub struct CatalogDefaults {
    pub currency: String,
    pub tax_rate: f64,
    pub low_stock_threshold: i64,
}

impl Default for CatalogDefaults {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            tax_rate: 0.0,
            low_stock_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBusiness {
    pub id: Option<Uuid>,
    /// 建立者，寫入活動紀錄
    #[serde(default)]
    pub created_by: Option<String>,
    pub name: String,
    pub currency: Option<String>,
    pub tax_rate: Option<f64>,
    pub low_stock_threshold: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusinessUpdate {
    pub name: Option<String>,
    pub currency: Option<String>,
    pub tax_rate: Option<f64>,
    pub low_stock_threshold: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub category: Option<String>,
    pub price: f64,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub cost: Option<f64>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLocation {
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub kind: ContactKind,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

fn validate_tax_rate(rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(MarktError::validation(format!(
            "tax rate must be between 0 and 1, got {}",
            rate
        )));
    }
    Ok(())
}

fn validate_currency(code: &str) -> Result<String> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(MarktError::validation(format!(
            "currency must be a 3-letter code, got '{}'",
            code
        )));
    }
    Ok(code)
}

fn validate_email(email: Option<&str>) -> Result<()> {
    match email {
        Some(e) if !e.contains('@') => Err(MarktError::validation(format!(
            "'{}' is not an email address",
            e
        ))),
        _ => Ok(()),
    }
}

fn require_manager(actor: &Actor) -> Result<()> {
    if !actor.role.can_manage() {
        return Err(MarktError::forbidden("this action requires an owner or manager"));
    }
    Ok(())
}

pub struct CatalogService<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    defaults: CatalogDefaults,
}

impl<S: DocumentStore + ?Sized> CatalogService<S> {
    pub fn new(store: Arc<S>, defaults: CatalogDefaults) -> Self {
        Self { store, defaults }
    }

    async fn log(
        &self,
        actor: &Actor,
        action: &str,
        entity: &str,
        entity_id: Uuid,
        detail: serde_json::Value,
    ) {
        let entry = ActivityLog::new(
            actor.business_id,
            actor.user_id.clone(),
            action,
            entity,
            Some(entity_id),
            detail,
        );
        if let Err(err) = self.store.append(entry).await {
            tracing::warn!(action, error = %err, "Failed to append activity log");
        }
    }

    // ---- businesses ----

    pub async fn create_business(&self, request: NewBusiness) -> Result<Business> {
        require_text("name", &request.name)?;
        let currency = validate_currency(
            request
                .currency
                .as_deref()
                .unwrap_or(self.defaults.currency.as_str()),
        )?;
        let tax_rate = request.tax_rate.unwrap_or(self.defaults.tax_rate);
        validate_tax_rate(tax_rate)?;
        let low_stock_threshold = request
            .low_stock_threshold
            .unwrap_or(self.defaults.low_stock_threshold);
        if low_stock_threshold < 0 {
            return Err(MarktError::validation("low stock threshold cannot be negative"));
        }

        let business = self
            .store
            .insert_business(Business {
                id: request.id.unwrap_or_else(Uuid::new_v4),
                name: request.name.trim().to_string(),
                currency,
                tax_rate,
                low_stock_threshold,
                created_at: Utc::now(),
            })
            .await?;
        tracing::info!(business = %business.id, name = %business.name, "Business created");
        let creator = Actor::new(business.id, request.created_by, Role::Owner);
        self.log(
            &creator,
            "business.created",
            "business",
            business.id,
            serde_json::json!({ "name": business.name, "currency": business.currency }),
        )
        .await;
        Ok(business)
    }

    pub async fn business(&self, actor: &Actor) -> Result<Business> {
        self.store
            .get_business(actor.business_id)
            .await?
            .ok_or_else(|| MarktError::not_found("business", actor.business_id))
    }

    pub async fn update_business(&self, actor: &Actor, update: BusinessUpdate) -> Result<Business> {
        if actor.role != crate::domain::model::Role::Owner {
            return Err(MarktError::forbidden("only the owner can change business settings"));
        }
        let mut business = self.business(actor).await?;
        if let Some(name) = update.name {
            require_text("name", &name)?;
            business.name = name.trim().to_string();
        }
        if let Some(currency) = update.currency {
            business.currency = validate_currency(&currency)?;
        }
        if let Some(rate) = update.tax_rate {
            validate_tax_rate(rate)?;
            business.tax_rate = rate;
        }
        if let Some(threshold) = update.low_stock_threshold {
            if threshold < 0 {
                return Err(MarktError::validation("low stock threshold cannot be negative"));
            }
            business.low_stock_threshold = threshold;
        }
        let business = self.store.update_business(business).await?;
        self.log(
            actor,
            "business.updated",
            "business",
            business.id,
            serde_json::json!({ "tax_rate": business.tax_rate, "currency": business.currency }),
        )
        .await;
        Ok(business)
    }

    // ---- products ----

    pub async fn create_product(&self, actor: &Actor, request: NewProduct) -> Result<Product> {
        require_manager(actor)?;
        require_text("name", &request.name)?;
        require_text("sku", &request.sku)?;
        require_money("price", request.price)?;
        if let Some(cost) = request.cost {
            require_money("cost", cost)?;
        }

        let now = Utc::now();
        let product = self
            .store
            .insert_product(Product {
                id: Uuid::new_v4(),
                business_id: actor.business_id,
                name: request.name.trim().to_string(),
                sku: request.sku.trim().to_string(),
                category: request.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
                price: request.price,
                cost: request.cost,
                active: true,
                created_at: now,
                updated_at: now,
            })
            .await?;
        self.log(
            actor,
            "product.created",
            "product",
            product.id,
            serde_json::json!({ "sku": product.sku, "price": product.price }),
        )
        .await;
        Ok(product)
    }

    pub async fn product(&self, actor: &Actor, id: Uuid) -> Result<Product> {
        self.store
            .get_product(actor.business_id, id)
            .await?
            .ok_or_else(|| MarktError::not_found("product", id))
    }

    pub async fn list_products(&self, actor: &Actor, filter: &ProductFilter) -> Result<Vec<Product>> {
        self.store.list_products(actor.business_id, filter).await
    }

    pub async fn update_product(
        &self,
        actor: &Actor,
        id: Uuid,
        update: ProductUpdate,
    ) -> Result<Product> {
        require_manager(actor)?;
        let mut product = self.product(actor, id).await?;
        let previous_price = product.price;

        if let Some(name) = update.name {
            require_text("name", &name)?;
            product.name = name.trim().to_string();
        }
        if let Some(sku) = update.sku {
            require_text("sku", &sku)?;
            product.sku = sku.trim().to_string();
        }
        if let Some(category) = update.category {
            let category = category.trim().to_string();
            product.category = (!category.is_empty()).then_some(category);
        }
        if let Some(price) = update.price {
            require_money("price", price)?;
            product.price = price;
        }
        if let Some(cost) = update.cost {
            require_money("cost", cost)?;
            product.cost = Some(cost);
        }
        if let Some(active) = update.active {
            product.active = active;
        }
        product.updated_at = Utc::now();

        let product = self.store.update_product(product).await?;
        self.log(
            actor,
            "product.updated",
            "product",
            product.id,
            serde_json::json!({ "previous_price": previous_price, "price": product.price }),
        )
        .await;
        Ok(product)
    }

    /// 商品只會停用，不會刪除，歷史銷售仍可引用
    pub async fn deactivate_product(&self, actor: &Actor, id: Uuid) -> Result<Product> {
        self.update_product(
            actor,
            id,
            ProductUpdate {
                active: Some(false),
                ..ProductUpdate::default()
            },
        )
        .await
    }

    // ---- locations ----

    pub async fn create_location(&self, actor: &Actor, request: NewLocation) -> Result<Location> {
        require_manager(actor)?;
        require_text("name", &request.name)?;
        let location = self
            .store
            .insert_location(Location {
                id: Uuid::new_v4(),
                business_id: actor.business_id,
                name: request.name.trim().to_string(),
                address: request.address,
            })
            .await?;
        self.log(
            actor,
            "location.created",
            "location",
            location.id,
            serde_json::json!({ "name": location.name }),
        )
        .await;
        Ok(location)
    }

    pub async fn list_locations(&self, actor: &Actor) -> Result<Vec<Location>> {
        self.store.list_locations(actor.business_id).await
    }

    // ---- contacts ----

    pub async fn create_contact(&self, actor: &Actor, request: NewContact) -> Result<Contact> {
        require_text("name", &request.name)?;
        validate_email(request.email.as_deref())?;
        let contact = self
            .store
            .insert_contact(Contact {
                id: Uuid::new_v4(),
                business_id: actor.business_id,
                kind: request.kind,
                name: request.name.trim().to_string(),
                email: request.email,
                phone: request.phone,
                address: request.address,
                notes: request.notes,
                created_at: Utc::now(),
            })
            .await?;
        self.log(
            actor,
            "contact.created",
            "contact",
            contact.id,
            serde_json::json!({ "kind": contact.kind }),
        )
        .await;
        Ok(contact)
    }

    pub async fn contact(&self, actor: &Actor, id: Uuid) -> Result<Contact> {
        self.store
            .get_contact(actor.business_id, id)
            .await?
            .ok_or_else(|| MarktError::not_found("contact", id))
    }

    pub async fn list_contacts(&self, actor: &Actor, kind: Option<ContactKind>) -> Result<Vec<Contact>> {
        self.store.list_contacts(actor.business_id, kind).await
    }

    pub async fn update_contact(
        &self,
        actor: &Actor,
        id: Uuid,
        update: ContactUpdate,
    ) -> Result<Contact> {
        let mut contact = self.contact(actor, id).await?;
        if let Some(name) = update.name {
            require_text("name", &name)?;
            contact.name = name.trim().to_string();
        }
        if let Some(email) = update.email {
            validate_email(Some(&email))?;
            contact.email = Some(email);
        }
        if update.phone.is_some() {
            contact.phone = update.phone;
        }
        if update.address.is_some() {
            contact.address = update.address;
        }
        if update.notes.is_some() {
            contact.notes = update.notes;
        }
        let contact = self.store.update_contact(contact).await?;
        self.log(actor, "contact.updated", "contact", contact.id, serde_json::json!({}))
            .await;
        Ok(contact)
    }

    pub async fn delete_contact(&self, actor: &Actor, id: Uuid) -> Result<()> {
        require_manager(actor)?;
        if !self.store.delete_contact(actor.business_id, id).await? {
            return Err(MarktError::not_found("contact", id));
        }
        self.log(actor, "contact.deleted", "contact", id, serde_json::json!({}))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::ports::ActivityRepository;

    async fn setup() -> (CatalogService<MemoryStore>, Actor) {
        let service = CatalogService::new(Arc::new(MemoryStore::new()), CatalogDefaults::default());
        let business = service
            .create_business(NewBusiness {
                id: None,
                created_by: None,
                name: "Corner Shop".to_string(),
                currency: Some("eur".to_string()),
                tax_rate: Some(0.2),
                low_stock_threshold: None,
            })
            .await
            .unwrap();
        let actor = Actor::new(business.id, Some("owner-1".to_string()), Role::Owner);
        (service, actor)
    }

    fn new_product(sku: &str) -> NewProduct {
        NewProduct {
            name: "Espresso beans".to_string(),
            sku: sku.to_string(),
            category: Some("Coffee".to_string()),
            price: 12.5,
            cost: Some(7.0),
        }
    }

    #[tokio::test]
    async fn test_create_business_normalizes_currency() {
        let (service, actor) = setup().await;
        let business = service.business(&actor).await.unwrap();
        assert_eq!(business.currency, "EUR");
        assert_eq!(business.low_stock_threshold, 5);
    }

    #[tokio::test]
    async fn test_business_creation_is_logged() {
        let store = Arc::new(MemoryStore::new());
        let service = CatalogService::new(store.clone(), CatalogDefaults::default());
        let business = service
            .create_business(NewBusiness {
                id: None,
                created_by: Some("owner-7".to_string()),
                name: "Kiosk".to_string(),
                currency: None,
                tax_rate: None,
                low_stock_threshold: None,
            })
            .await
            .unwrap();

        let entries = store.recent(business.id, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "business.created");
        assert_eq!(entries[0].entity_id, Some(business.id));
        assert_eq!(entries[0].actor.as_deref(), Some("owner-7"));
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_conflict() {
        let (service, actor) = setup().await;
        service.create_product(&actor, new_product("ESP-1")).await.unwrap();

        let err = service
            .create_product(&actor, new_product("esp-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, MarktError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_cashier_cannot_create_products() {
        let (service, actor) = setup().await;
        let cashier = Actor::new(actor.business_id, None, Role::Cashier);

        let err = service
            .create_product(&cashier, new_product("ESP-2"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_deactivated_products_are_hidden_by_default() {
        let (service, actor) = setup().await;
        let product = service.create_product(&actor, new_product("ESP-3")).await.unwrap();
        service.deactivate_product(&actor, product.id).await.unwrap();

        let visible = service
            .list_products(&actor, &ProductFilter::default())
            .await
            .unwrap();
        assert!(visible.is_empty());

        let all = service
            .list_products(
                &actor,
                &ProductFilter {
                    include_inactive: true,
                    ..ProductFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].active);
    }

    #[tokio::test]
    async fn test_products_are_scoped_to_business() {
        let (service, actor) = setup().await;
        let product = service.create_product(&actor, new_product("ESP-4")).await.unwrap();
        let stranger = Actor::new(Uuid::new_v4(), None, Role::Owner);

        let err = service.product(&stranger, product.id).await.unwrap_err();
        assert!(matches!(err, MarktError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_contact_email_is_checked() {
        let (service, actor) = setup().await;
        let err = service
            .create_contact(
                &actor,
                NewContact {
                    kind: ContactKind::Supplier,
                    name: "Roastery".to_string(),
                    email: Some("not-an-email".to_string()),
                    phone: None,
                    address: None,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MarktError::ValidationError { .. }));
    }
}

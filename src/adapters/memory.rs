use crate::domain::model::{
    ActivityLog, Business, Contact, ContactKind, Location, Product, ProductFilter, Sale,
    SaleFilter, StockLevel, StockLine,
};
use crate::domain::ports::{
    ActivityRepository, CatalogRepository, DecrementOutcome, InventoryRepository,
    SalesRepository, Storage,
};
use crate::utils::error::{MarktError, Result, StockShortage};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

type StockKey = (Uuid, Uuid, Uuid);

#[derive(Debug, Default)]
struct Collections {
    businesses: HashMap<Uuid, Business>,
    products: HashMap<Uuid, Product>,
    locations: HashMap<Uuid, Location>,
    contacts: HashMap<Uuid, Contact>,
    stock: HashMap<StockKey, StockLevel>,
    sales: Vec<Sale>,
    activity: Vec<ActivityLog>,
}

/// 快照格式：所有集合攤平成陣列
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub businesses: Vec<Business>,
    pub products: Vec<Product>,
    pub locations: Vec<Location>,
    pub contacts: Vec<Contact>,
    pub stock: Vec<StockLevel>,
    pub sales: Vec<Sale>,
    pub activity: Vec<ActivityLog>,
}

/// 行程內文件儲存。每個寫入操作都在同一把寫鎖內完成，
/// 因此條件式批次更新對其他請求而言是原子的。
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Snapshot {
        let data = self.inner.read().await;
        let mut sales = data.sales.clone();
        sales.sort_by_key(|s| s.created_at);
        Snapshot {
            businesses: data.businesses.values().cloned().collect(),
            products: data.products.values().cloned().collect(),
            locations: data.locations.values().cloned().collect(),
            contacts: data.contacts.values().cloned().collect(),
            stock: data.stock.values().cloned().collect(),
            sales,
            activity: data.activity.clone(),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let collections = Collections {
            businesses: snapshot.businesses.into_iter().map(|b| (b.id, b)).collect(),
            products: snapshot.products.into_iter().map(|p| (p.id, p)).collect(),
            locations: snapshot.locations.into_iter().map(|l| (l.id, l)).collect(),
            contacts: snapshot.contacts.into_iter().map(|c| (c.id, c)).collect(),
            stock: snapshot
                .stock
                .into_iter()
                .map(|s| ((s.business_id, s.product_id, s.location_id), s))
                .collect(),
            sales: snapshot.sales,
            activity: snapshot.activity,
        };
        Self {
            inner: RwLock::new(collections),
        }
    }

    pub async fn save_to<S: Storage>(&self, storage: &S, path: &str) -> Result<usize> {
        let snapshot = self.snapshot().await;
        let data = serde_json::to_vec(&snapshot)?;
        storage.write_file(path, &data).await?;
        tracing::debug!(bytes = data.len(), path, "Snapshot written");
        Ok(data.len())
    }

    pub async fn load_from<S: Storage>(storage: &S, path: &str) -> Result<Self> {
        let data = storage.read_file(path).await?;
        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        tracing::info!(
            businesses = snapshot.businesses.len(),
            products = snapshot.products.len(),
            sales = snapshot.sales.len(),
            "Snapshot restored"
        );
        Ok(Self::from_snapshot(snapshot))
    }
}

fn stock_key(business_id: Uuid, product_id: Uuid, location_id: Uuid) -> StockKey {
    (business_id, product_id, location_id)
}

fn quantity_out_of_range(product_id: Uuid) -> MarktError {
    MarktError::validation(format!(
        "stock quantity for product {} would exceed the supported range",
        product_id
    ))
}

fn require_positive_lines(lines: &[StockLine]) -> Result<()> {
    match lines.iter().find(|line| line.quantity <= 0) {
        Some(line) => Err(MarktError::validation(format!(
            "stock movement for product {} must be positive",
            line.product_id
        ))),
        None => Ok(()),
    }
}

fn empty_level(business_id: Uuid, product_id: Uuid, location_id: Uuid) -> StockLevel {
    StockLevel {
        business_id,
        product_id,
        location_id,
        quantity: 0,
        reorder_level: 0,
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn insert_business(&self, business: Business) -> Result<Business> {
        let mut data = self.inner.write().await;
        if data.businesses.contains_key(&business.id) {
            return Err(MarktError::conflict(format!(
                "business {} already exists",
                business.id
            )));
        }
        data.businesses.insert(business.id, business.clone());
        Ok(business)
    }

    async fn get_business(&self, id: Uuid) -> Result<Option<Business>> {
        Ok(self.inner.read().await.businesses.get(&id).cloned())
    }

    async fn update_business(&self, business: Business) -> Result<Business> {
        let mut data = self.inner.write().await;
        match data.businesses.get_mut(&business.id) {
            Some(existing) => {
                *existing = business.clone();
                Ok(business)
            }
            None => Err(MarktError::not_found("business", business.id)),
        }
    }

    async fn insert_product(&self, product: Product) -> Result<Product> {
        let mut data = self.inner.write().await;
        let sku_taken = data.products.values().any(|p| {
            p.business_id == product.business_id && p.sku.eq_ignore_ascii_case(&product.sku)
        });
        if sku_taken {
            return Err(MarktError::conflict(format!(
                "SKU '{}' is already in use",
                product.sku
            )));
        }
        data.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, business_id: Uuid, id: Uuid) -> Result<Option<Product>> {
        let data = self.inner.read().await;
        Ok(data
            .products
            .get(&id)
            .filter(|p| p.business_id == business_id)
            .cloned())
    }

    async fn get_products(&self, business_id: Uuid, ids: &[Uuid]) -> Result<Vec<Product>> {
        let data = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.products.get(id))
            .filter(|p| p.business_id == business_id)
            .cloned()
            .collect())
    }

    async fn list_products(
        &self,
        business_id: Uuid,
        filter: &ProductFilter,
    ) -> Result<Vec<Product>> {
        let data = self.inner.read().await;
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut products: Vec<Product> = data
            .products
            .values()
            .filter(|p| p.business_id == business_id)
            .filter(|p| filter.include_inactive || p.active)
            .filter(|p| {
                filter
                    .category
                    .as_ref()
                    .map_or(true, |c| p.category.as_deref() == Some(c.as_str()))
            })
            .filter(|p| {
                search.as_ref().map_or(true, |s| {
                    p.name.to_lowercase().contains(s) || p.sku.to_lowercase().contains(s)
                })
            })
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn update_product(&self, product: Product) -> Result<Product> {
        let mut data = self.inner.write().await;
        let sku_taken = data.products.values().any(|p| {
            p.id != product.id
                && p.business_id == product.business_id
                && p.sku.eq_ignore_ascii_case(&product.sku)
        });
        if sku_taken {
            return Err(MarktError::conflict(format!(
                "SKU '{}' is already in use",
                product.sku
            )));
        }
        match data.products.get_mut(&product.id) {
            Some(existing) if existing.business_id == product.business_id => {
                *existing = product.clone();
                Ok(product)
            }
            _ => Err(MarktError::not_found("product", product.id)),
        }
    }

    async fn insert_location(&self, location: Location) -> Result<Location> {
        let mut data = self.inner.write().await;
        data.locations.insert(location.id, location.clone());
        Ok(location)
    }

    async fn get_location(&self, business_id: Uuid, id: Uuid) -> Result<Option<Location>> {
        let data = self.inner.read().await;
        Ok(data
            .locations
            .get(&id)
            .filter(|l| l.business_id == business_id)
            .cloned())
    }

    async fn list_locations(&self, business_id: Uuid) -> Result<Vec<Location>> {
        let data = self.inner.read().await;
        let mut locations: Vec<Location> = data
            .locations
            .values()
            .filter(|l| l.business_id == business_id)
            .cloned()
            .collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(locations)
    }

    async fn insert_contact(&self, contact: Contact) -> Result<Contact> {
        let mut data = self.inner.write().await;
        data.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn get_contact(&self, business_id: Uuid, id: Uuid) -> Result<Option<Contact>> {
        let data = self.inner.read().await;
        Ok(data
            .contacts
            .get(&id)
            .filter(|c| c.business_id == business_id)
            .cloned())
    }

    async fn list_contacts(
        &self,
        business_id: Uuid,
        kind: Option<ContactKind>,
    ) -> Result<Vec<Contact>> {
        let data = self.inner.read().await;
        let mut contacts: Vec<Contact> = data
            .contacts
            .values()
            .filter(|c| c.business_id == business_id)
            .filter(|c| kind.map_or(true, |k| c.kind == k))
            .cloned()
            .collect();
        contacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(contacts)
    }

    async fn update_contact(&self, contact: Contact) -> Result<Contact> {
        let mut data = self.inner.write().await;
        match data.contacts.get_mut(&contact.id) {
            Some(existing) if existing.business_id == contact.business_id => {
                *existing = contact.clone();
                Ok(contact)
            }
            _ => Err(MarktError::not_found("contact", contact.id)),
        }
    }

    async fn delete_contact(&self, business_id: Uuid, id: Uuid) -> Result<bool> {
        let mut data = self.inner.write().await;
        let owned = data
            .contacts
            .get(&id)
            .is_some_and(|c| c.business_id == business_id);
        if owned {
            data.contacts.remove(&id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl InventoryRepository for MemoryStore {
    async fn stock_level(
        &self,
        business_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<StockLevel>> {
        let data = self.inner.read().await;
        Ok(data
            .stock
            .get(&stock_key(business_id, product_id, location_id))
            .cloned())
    }

    async fn list_stock(
        &self,
        business_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<Vec<StockLevel>> {
        let data = self.inner.read().await;
        let mut levels: Vec<StockLevel> = data
            .stock
            .values()
            .filter(|s| s.business_id == business_id)
            .filter(|s| location_id.map_or(true, |id| s.location_id == id))
            .cloned()
            .collect();
        levels.sort_by_key(|s| (s.location_id, s.product_id));
        Ok(levels)
    }

    async fn set_stock(&self, level: StockLevel) -> Result<StockLevel> {
        if level.quantity < 0 {
            return Err(MarktError::validation("stock quantity cannot be negative"));
        }
        let mut data = self.inner.write().await;
        data.stock.insert(
            stock_key(level.business_id, level.product_id, level.location_id),
            level.clone(),
        );
        Ok(level)
    }

    async fn adjust_stock(
        &self,
        business_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
        delta: i64,
    ) -> Result<StockLevel> {
        let mut data = self.inner.write().await;
        let key = stock_key(business_id, product_id, location_id);
        let available = data.stock.get(&key).map_or(0, |level| level.quantity);
        let next = available
            .checked_add(delta)
            .ok_or_else(|| quantity_out_of_range(product_id))?;
        if next < 0 {
            return Err(MarktError::InsufficientStock {
                shortages: vec![StockShortage {
                    product_id,
                    requested: delta.checked_neg().unwrap_or(i64::MAX),
                    available,
                }],
            });
        }
        let entry = data
            .stock
            .entry(key)
            .or_insert_with(|| empty_level(business_id, product_id, location_id));
        entry.quantity = next;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn decrement_many(
        &self,
        business_id: Uuid,
        location_id: Uuid,
        lines: &[StockLine],
    ) -> Result<DecrementOutcome> {
        require_positive_lines(lines)?;
        let mut data = self.inner.write().await;

        let shortages: Vec<StockShortage> = lines
            .iter()
            .filter_map(|line| {
                let available = data
                    .stock
                    .get(&stock_key(business_id, line.product_id, location_id))
                    .map_or(0, |s| s.quantity);
                (available < line.quantity).then_some(StockShortage {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available,
                })
            })
            .collect();
        if !shortages.is_empty() {
            return Ok(DecrementOutcome::Rejected(shortages));
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(level) = data
                .stock
                .get_mut(&stock_key(business_id, line.product_id, location_id))
            {
                level.quantity -= line.quantity;
                level.updated_at = now;
                updated.push(level.clone());
            }
        }
        Ok(DecrementOutcome::Applied(updated))
    }

    async fn increment_many(
        &self,
        business_id: Uuid,
        location_id: Uuid,
        lines: &[StockLine],
    ) -> Result<Vec<StockLevel>> {
        require_positive_lines(lines)?;
        let mut data = self.inner.write().await;

        // 先算出所有結果，任一行溢位則整批不套用
        let mut pending: HashMap<Uuid, i64> = HashMap::new();
        for line in lines {
            let current = match pending.get(&line.product_id) {
                Some(&quantity) => quantity,
                None => data
                    .stock
                    .get(&stock_key(business_id, line.product_id, location_id))
                    .map_or(0, |s| s.quantity),
            };
            let next = current
                .checked_add(line.quantity)
                .ok_or_else(|| quantity_out_of_range(line.product_id))?;
            pending.insert(line.product_id, next);
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(lines.len());
        for line in lines {
            let level = data
                .stock
                .entry(stock_key(business_id, line.product_id, location_id))
                .or_insert_with(|| empty_level(business_id, line.product_id, location_id));
            level.quantity += line.quantity;
            level.updated_at = now;
            updated.push(level.clone());
        }
        Ok(updated)
    }
}

#[async_trait]
impl SalesRepository for MemoryStore {
    async fn insert_sale(&self, sale: Sale) -> Result<Sale> {
        let mut data = self.inner.write().await;
        if let Some(reference) = sale.reference.as_deref() {
            let duplicate = data
                .sales
                .iter()
                .any(|s| s.business_id == sale.business_id && s.reference.as_deref() == Some(reference));
            if duplicate {
                return Err(MarktError::conflict(format!(
                    "sale reference '{}' already recorded",
                    reference
                )));
            }
        }
        data.sales.push(sale.clone());
        Ok(sale)
    }

    async fn get_sale(&self, business_id: Uuid, id: Uuid) -> Result<Option<Sale>> {
        let data = self.inner.read().await;
        Ok(data
            .sales
            .iter()
            .find(|s| s.id == id && s.business_id == business_id)
            .cloned())
    }

    async fn list_sales(&self, business_id: Uuid, filter: &SaleFilter) -> Result<Vec<Sale>> {
        let data = self.inner.read().await;
        let mut sales: Vec<Sale> = data
            .sales
            .iter()
            .filter(|s| s.business_id == business_id && filter.matches(s))
            .cloned()
            .collect();
        // 最新的在前
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            sales.truncate(limit);
        }
        Ok(sales)
    }
}

#[async_trait]
impl ActivityRepository for MemoryStore {
    async fn append(&self, entry: ActivityLog) -> Result<()> {
        self.inner.write().await.activity.push(entry);
        Ok(())
    }

    async fn recent(&self, business_id: Uuid, limit: usize) -> Result<Vec<ActivityLog>> {
        let data = self.inner.read().await;
        Ok(data
            .activity
            .iter()
            .rev()
            .filter(|a| a.business_id == business_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

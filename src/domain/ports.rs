use crate::domain::model::{
    ActivityLog, Business, Contact, ContactKind, Location, Product, ProductFilter, Sale,
    SaleFilter, StockLevel, StockLine,
};
use crate::utils::error::{Result, StockShortage};
use async_trait::async_trait;
use uuid::Uuid;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 條件式批次扣庫存的結果：全部套用或全部拒絕
#[derive(Debug, Clone, PartialEq)]
pub enum DecrementOutcome {
    Applied(Vec<StockLevel>),
    Rejected(Vec<StockShortage>),
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn insert_business(&self, business: Business) -> Result<Business>;
    async fn get_business(&self, id: Uuid) -> Result<Option<Business>>;
    async fn update_business(&self, business: Business) -> Result<Business>;

    /// SKU 在同一商家內必須唯一
    async fn insert_product(&self, product: Product) -> Result<Product>;
    async fn get_product(&self, business_id: Uuid, id: Uuid) -> Result<Option<Product>>;
    async fn get_products(&self, business_id: Uuid, ids: &[Uuid]) -> Result<Vec<Product>>;
    async fn list_products(&self, business_id: Uuid, filter: &ProductFilter)
        -> Result<Vec<Product>>;
    async fn update_product(&self, product: Product) -> Result<Product>;

    async fn insert_location(&self, location: Location) -> Result<Location>;
    async fn get_location(&self, business_id: Uuid, id: Uuid) -> Result<Option<Location>>;
    async fn list_locations(&self, business_id: Uuid) -> Result<Vec<Location>>;

    async fn insert_contact(&self, contact: Contact) -> Result<Contact>;
    async fn get_contact(&self, business_id: Uuid, id: Uuid) -> Result<Option<Contact>>;
    async fn list_contacts(
        &self,
        business_id: Uuid,
        kind: Option<ContactKind>,
    ) -> Result<Vec<Contact>>;
    async fn update_contact(&self, contact: Contact) -> Result<Contact>;
    async fn delete_contact(&self, business_id: Uuid, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn stock_level(
        &self,
        business_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
    ) -> Result<Option<StockLevel>>;
    async fn list_stock(
        &self,
        business_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<Vec<StockLevel>>;
    async fn set_stock(&self, level: StockLevel) -> Result<StockLevel>;
    /// 以正負差值調整，結果不得為負
    async fn adjust_stock(
        &self,
        business_id: Uuid,
        product_id: Uuid,
        location_id: Uuid,
        delta: i64,
    ) -> Result<StockLevel>;
    /// 每一行的過濾條件為 `quantity >= requested`，任一行不成立則整批不套用
    async fn decrement_many(
        &self,
        business_id: Uuid,
        location_id: Uuid,
        lines: &[StockLine],
    ) -> Result<DecrementOutcome>;
    async fn increment_many(
        &self,
        business_id: Uuid,
        location_id: Uuid,
        lines: &[StockLine],
    ) -> Result<Vec<StockLevel>>;
}

#[async_trait]
pub trait SalesRepository: Send + Sync {
    /// `reference` 在同一商家內唯一，重複時回傳 Conflict
    async fn insert_sale(&self, sale: Sale) -> Result<Sale>;
    async fn get_sale(&self, business_id: Uuid, id: Uuid) -> Result<Option<Sale>>;
    async fn list_sales(&self, business_id: Uuid, filter: &SaleFilter) -> Result<Vec<Sale>>;
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn append(&self, entry: ActivityLog) -> Result<()>;
    async fn recent(&self, business_id: Uuid, limit: usize) -> Result<Vec<ActivityLog>>;
}

pub trait DocumentStore:
    CatalogRepository + InventoryRepository + SalesRepository + ActivityRepository
{
}

impl<T> DocumentStore for T where
    T: CatalogRepository + InventoryRepository + SalesRepository + ActivityRepository
{
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 租戶：所有資料都歸屬於一個商家
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Business {
    pub id: Uuid,
    pub name: String,
    pub currency: String,
    pub tax_rate: f64,
    pub low_stock_threshold: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Manager,
    Cashier,
}

impl Role {
    pub fn can_manage(&self) -> bool {
        matches!(self, Role::Owner | Role::Manager)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "manager" => Ok(Role::Manager),
            "cashier" => Ok(Role::Cashier),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// 執行操作的身分，由 API 層從 token 或除錯標頭建立
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub business_id: Uuid,
    pub user_id: Option<String>,
    pub role: Role,
}

impl Actor {
    pub fn new(business_id: Uuid, user_id: Option<String>, role: Role) -> Self {
        Self {
            business_id,
            user_id,
            role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub sku: String,
    pub category: Option<String>,
    pub price: f64,
    pub cost: Option<f64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLevel {
    pub business_id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub quantity: i64,
    pub reorder_level: i64,
    pub updated_at: DateTime<Utc>,
}

impl StockLevel {
    /// 低於（或等於）補貨點即視為低庫存；補貨點為 0 時改用商家預設門檻
    pub fn is_low(&self, default_threshold: i64) -> bool {
        let threshold = if self.reorder_level > 0 {
            self.reorder_level
        } else {
            default_threshold
        };
        self.quantity <= threshold
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Customer,
    Supplier,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: Uuid,
    pub business_id: Uuid,
    pub kind: ContactKind,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mobile,
    Credit,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Mobile => "mobile",
            PaymentMethod::Credit => "credit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub category: Option<String>,
    pub unit_price: f64,
    pub quantity: i64,
    pub line_discount: f64,
    pub line_total: f64,
}

/// 已成立的銷售紀錄，寫入後不可修改
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sale {
    pub id: Uuid,
    pub business_id: Uuid,
    pub location_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub cashier_id: Option<String>,
    pub reference: Option<String>,
    pub items: Vec<SaleItem>,
    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
    pub payment_method: PaymentMethod,
    pub amount_paid: f64,
    pub change_due: f64,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    pub fn items_sold(&self) -> i64 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityLog {
    pub id: Uuid,
    pub business_id: Uuid,
    pub actor: Option<String>,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(
        business_id: Uuid,
        actor: Option<String>,
        action: impl Into<String>,
        entity: impl Into<String>,
        entity_id: Option<Uuid>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            business_id,
            actor,
            action: action.into(),
            entity: entity.into(),
            entity_id,
            detail,
            at: Utc::now(),
        }
    }
}

/// 一行庫存異動：商品與數量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaleFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub location_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl SaleFilter {
    pub fn matches(&self, sale: &Sale) -> bool {
        self.from.map_or(true, |from| sale.created_at >= from)
            && self.to.map_or(true, |to| sale.created_at < to)
            && self.location_id.map_or(true, |id| sale.location_id == id)
            && self.customer_id.map_or(true, |id| sale.customer_id == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_stock_uses_reorder_level_then_business_default() {
        let mut level = StockLevel {
            business_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            quantity: 4,
            reorder_level: 5,
            updated_at: Utc::now(),
        };
        assert!(level.is_low(0));

        level.reorder_level = 0;
        assert!(!level.is_low(3));
        assert!(level.is_low(4));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("admin".parse::<Role>().is_err());
        assert!(!Role::Cashier.can_manage());
    }
}

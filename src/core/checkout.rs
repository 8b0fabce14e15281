use crate::core::totals::{
    compute_totals, reconcile, round_money, ComputedTotals, Discount, PricedLine,
    SubmittedTotals, DEFAULT_TOLERANCE,
};
use crate::domain::model::{
    ActivityLog, Actor, Business, ContactKind, PaymentMethod, Product, Sale, SaleItem,
    StockLevel, StockLine,
};
use crate::domain::ports::{DecrementOutcome, DocumentStore};
use crate::utils::error::{MarktError, Result, StockShortage};
use crate::utils::validation::require_money;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub quantity: i64,
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub discount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub location_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub reference: Option<String>,
    pub items: Vec<CheckoutItem>,
    pub discount: Option<Discount>,
    pub tax_rate: Option<f64>,
    pub payment_method: PaymentMethod,
    pub amount_paid: Option<f64>,
    #[serde(default)]
    pub totals: SubmittedTotals,
}

#[derive(Debug, Clone, Serialize)]
pub struct LowStockAlert {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub reorder_level: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub sale: Sale,
    pub low_stock: Vec<LowStockAlert>,
}

#[derive(Debug, Clone)]
pub struct ValidatedCheckout {
    pub business: Business,
    pub request: CheckoutRequest,
}

#[derive(Debug, Clone)]
pub struct PricedCheckout {
    pub validated: ValidatedCheckout,
    pub items: Vec<SaleItem>,
    pub totals: ComputedTotals,
    pub amount_paid: f64,
    pub change_due: f64,
}

impl PricedCheckout {
    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items
            .iter()
            .map(|item| StockLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ReservedCheckout {
    pub priced: PricedCheckout,
    pub lines: Vec<StockLine>,
    pub levels: Vec<StockLevel>,
}

/// 結帳流程的四個階段，由 [`SaleEngine`] 依序執行
#[async_trait]
pub trait TransactionPipeline: Send + Sync {
    async fn validate(&self, actor: &Actor, request: CheckoutRequest) -> Result<ValidatedCheckout>;
    async fn price(&self, actor: &Actor, checkout: ValidatedCheckout) -> Result<PricedCheckout>;
    async fn reserve(&self, actor: &Actor, checkout: PricedCheckout) -> Result<ReservedCheckout>;
    async fn commit(&self, actor: &Actor, checkout: ReservedCheckout) -> Result<CheckoutReceipt>;
}

pub struct CheckoutPipeline<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    tolerance: f64,
}

impl<S: DocumentStore + ?Sized> CheckoutPipeline<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_tolerance(store, DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(store: Arc<S>, tolerance: f64) -> Self {
        Self { store, tolerance }
    }

    fn within_tolerance(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tolerance + 1e-9
    }
}

/// 單一商品在一筆銷售中的數量上限
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;

fn check_line_quantity(product_id: Uuid, quantity: i64) -> Result<()> {
    if quantity <= 0 {
        return Err(MarktError::validation(format!(
            "quantity for product {} must be positive",
            product_id
        )));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(MarktError::validation(format!(
            "quantity for product {} exceeds the limit of {}",
            product_id, MAX_LINE_QUANTITY
        )));
    }
    Ok(())
}

/// 合併同一商品的多行，保留第一次出現的順序
fn merge_items(items: Vec<CheckoutItem>, tolerance: f64) -> Result<Vec<CheckoutItem>> {
    let mut merged: Vec<CheckoutItem> = Vec::with_capacity(items.len());
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for item in items {
        check_line_quantity(item.product_id, item.quantity)?;
        require_money("item discount", item.discount)?;
        if let Some(price) = item.unit_price {
            require_money("unit price", price)?;
        }

        match index.get(&item.product_id) {
            Some(&pos) => {
                let existing = &mut merged[pos];
                if let (Some(a), Some(b)) = (existing.unit_price, item.unit_price) {
                    if (a - b).abs() > tolerance + 1e-9 {
                        return Err(MarktError::validation(format!(
                            "product {} appears with different prices",
                            item.product_id
                        )));
                    }
                }
                existing.quantity = existing
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or_else(|| {
                        MarktError::validation(format!(
                            "quantity for product {} is too large",
                            item.product_id
                        ))
                    })?;
                check_line_quantity(item.product_id, existing.quantity)?;
                existing.discount = round_money(existing.discount + item.discount);
                existing.unit_price = existing.unit_price.or(item.unit_price);
            }
            None => {
                index.insert(item.product_id, merged.len());
                merged.push(item);
            }
        }
    }
    Ok(merged)
}

#[async_trait]
impl<S: DocumentStore + ?Sized> TransactionPipeline for CheckoutPipeline<S> {
    async fn validate(&self, actor: &Actor, mut request: CheckoutRequest) -> Result<ValidatedCheckout> {
        if request.items.is_empty() {
            return Err(MarktError::validation("a sale needs at least one item"));
        }
        request.items = merge_items(std::mem::take(&mut request.items), self.tolerance)?;

        if let Some(discount) = request.discount {
            discount.validate()?;
        }
        if let Some(rate) = request.tax_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(MarktError::validation(format!(
                    "tax rate must be between 0 and 1, got {}",
                    rate
                )));
            }
        }
        if let Some(paid) = request.amount_paid {
            require_money("amount paid", paid)?;
        }
        request.reference = request
            .reference
            .take()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let business = self
            .store
            .get_business(actor.business_id)
            .await?
            .ok_or_else(|| MarktError::not_found("business", actor.business_id))?;

        if self
            .store
            .get_location(business.id, request.location_id)
            .await?
            .is_none()
        {
            return Err(MarktError::not_found("location", request.location_id));
        }

        match request.customer_id {
            Some(customer_id) => {
                let contact = self
                    .store
                    .get_contact(business.id, customer_id)
                    .await?
                    .ok_or_else(|| MarktError::not_found("customer", customer_id))?;
                if contact.kind != ContactKind::Customer {
                    return Err(MarktError::validation(format!(
                        "contact {} is not a customer",
                        customer_id
                    )));
                }
            }
            None if request.payment_method == PaymentMethod::Credit => {
                return Err(MarktError::validation(
                    "credit sales must be linked to a customer",
                ));
            }
            None => {}
        }

        Ok(ValidatedCheckout { business, request })
    }

    async fn price(&self, _actor: &Actor, checkout: ValidatedCheckout) -> Result<PricedCheckout> {
        let request = &checkout.request;
        let ids: Vec<Uuid> = request.items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, Product> = self
            .store
            .get_products(checkout.business.id, &ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut priced_lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| MarktError::not_found("product", item.product_id))?;
            if !product.active {
                return Err(MarktError::validation(format!(
                    "product '{}' is no longer sold",
                    product.name
                )));
            }
            if let Some(client_price) = item.unit_price {
                if !self.within_tolerance(client_price, product.price) {
                    return Err(MarktError::validation(format!(
                        "price changed for '{}': submitted {:.2}, current {:.2}",
                        product.name, client_price, product.price
                    )));
                }
            }
            priced_lines.push(PricedLine {
                unit_price: product.price,
                quantity: item.quantity,
                line_discount: item.discount,
            });
        }

        let tax_rate = request.tax_rate.unwrap_or(checkout.business.tax_rate);
        let totals = compute_totals(&priced_lines, request.discount, tax_rate);
        reconcile(&totals, &request.totals, self.tolerance)?;

        let (amount_paid, change_due) = match (request.payment_method, request.amount_paid) {
            (PaymentMethod::Cash, Some(paid)) => {
                if paid + 1e-9 < totals.total {
                    return Err(MarktError::validation(format!(
                        "amount paid {:.2} is less than the total {:.2}",
                        paid, totals.total
                    )));
                }
                (round_money(paid), round_money(paid - totals.total))
            }
            (_, Some(paid)) if !self.within_tolerance(paid, totals.total) => {
                return Err(MarktError::validation(format!(
                    "{} payments must equal the total {:.2}",
                    request.payment_method, totals.total
                )));
            }
            _ => (totals.total, 0.0),
        };

        let items = request
            .items
            .iter()
            .zip(priced_lines.iter())
            .zip(totals.line_totals.iter())
            .map(|((item, line), line_total)| {
                let product = &products[&item.product_id];
                SaleItem {
                    product_id: product.id,
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    category: product.category.clone(),
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                    line_discount: round_money(line.gross() - line_total),
                    line_total: *line_total,
                }
            })
            .collect();

        Ok(PricedCheckout {
            validated: checkout,
            items,
            totals,
            amount_paid,
            change_due,
        })
    }

    async fn reserve(&self, _actor: &Actor, checkout: PricedCheckout) -> Result<ReservedCheckout> {
        let business_id = checkout.validated.business.id;
        let location_id = checkout.validated.request.location_id;
        let lines = checkout.stock_lines();

        // 先讀取庫存，一次回報所有不足的品項，不做任何寫入
        let mut shortages = Vec::new();
        for line in &lines {
            let available = self
                .store
                .stock_level(business_id, line.product_id, location_id)
                .await?
                .map_or(0, |level| level.quantity);
            if available < line.quantity {
                shortages.push(StockShortage {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available,
                });
            }
        }
        if !shortages.is_empty() {
            return Err(MarktError::InsufficientStock { shortages });
        }

        match self
            .store
            .decrement_many(business_id, location_id, &lines)
            .await?
        {
            DecrementOutcome::Applied(levels) => Ok(ReservedCheckout {
                priced: checkout,
                lines,
                levels,
            }),
            DecrementOutcome::Rejected(shortages) => {
                tracing::warn!(
                    business = %business_id,
                    location = %location_id,
                    short_lines = shortages.len(),
                    "Stock changed between availability check and decrement"
                );
                Err(MarktError::conflict(
                    "stock changed while the sale was being processed",
                ))
            }
        }
    }

    async fn commit(&self, actor: &Actor, checkout: ReservedCheckout) -> Result<CheckoutReceipt> {
        let ReservedCheckout {
            priced,
            lines,
            levels,
        } = checkout;
        let business = &priced.validated.business;
        let request = &priced.validated.request;

        let sale = Sale {
            id: Uuid::new_v4(),
            business_id: business.id,
            location_id: request.location_id,
            customer_id: request.customer_id,
            cashier_id: actor.user_id.clone(),
            reference: request.reference.clone(),
            items: priced.items.clone(),
            subtotal: priced.totals.subtotal,
            discount: priced.totals.discount,
            tax: priced.totals.tax,
            total: priced.totals.total,
            payment_method: request.payment_method,
            amount_paid: priced.amount_paid,
            change_due: priced.change_due,
            created_at: Utc::now(),
        };

        let sale = match self.store.insert_sale(sale).await {
            Ok(sale) => sale,
            Err(err) => {
                // 銷售寫入失敗：歸還已扣除的庫存
                if let Err(restore_err) = self
                    .store
                    .increment_many(business.id, request.location_id, &lines)
                    .await
                {
                    tracing::error!(
                        business = %business.id,
                        error = %restore_err,
                        "Failed to restore stock after sale insert failure"
                    );
                }
                return Err(err);
            }
        };

        let entry = ActivityLog::new(
            business.id,
            actor.user_id.clone(),
            "sale.created",
            "sale",
            Some(sale.id),
            serde_json::json!({
                "total": sale.total,
                "items": sale.items_sold(),
                "payment_method": sale.payment_method,
            }),
        );
        if let Err(err) = self.store.append(entry).await {
            tracing::warn!(sale = %sale.id, error = %err, "Failed to append activity log");
        }

        let low_stock: Vec<LowStockAlert> = levels
            .iter()
            .filter(|level| level.is_low(business.low_stock_threshold))
            .filter_map(|level| {
                sale.items
                    .iter()
                    .find(|item| item.product_id == level.product_id)
                    .map(|item| LowStockAlert {
                        product_id: level.product_id,
                        name: item.name.clone(),
                        quantity: level.quantity,
                        reorder_level: level.reorder_level,
                    })
            })
            .collect();
        for alert in &low_stock {
            tracing::info!(
                product = %alert.product_id,
                quantity = alert.quantity,
                "Low stock after sale"
            );
        }

        Ok(CheckoutReceipt { sale, low_stock })
    }
}

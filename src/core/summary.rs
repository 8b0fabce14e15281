//! 銷售彙總引擎：由銷售紀錄推導總額、趨勢、熱銷商品與分類。
//!
//! [`summarize`] 是純函式，[`SummaryService`] 負責從資料庫讀取兩個時間窗的銷售。

use crate::core::totals::round_money;
use crate::domain::model::{PaymentMethod, Sale, SaleFilter};
use crate::domain::ports::SalesRepository;
use crate::utils::error::{MarktError, Result};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_TOP: usize = 5;
const MAX_TOP: usize = 50;
/// 單次查詢最多產生的趨勢點數
pub const MAX_TREND_POINTS: i64 = 1000;
const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

impl Granularity {
    /// 所屬區間的起始日；週以星期一為起點
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                date - Days::new(u64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    fn next(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Granularity::Day => start.checked_add_days(Days::new(1)),
            Granularity::Week => start.checked_add_days(Days::new(7)),
            Granularity::Month => start.checked_add_months(Months::new(1)),
        }
    }

    /// 區間可能跨越的區段數上限（寧多估不少估）
    fn max_buckets(&self, span_days: i64) -> i64 {
        match self {
            Granularity::Day => span_days + 2,
            Granularity::Week => span_days / 7 + 2,
            Granularity::Month => span_days / 28 + 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub granularity: Granularity,
    pub top: Option<usize>,
}

impl SummaryQuery {
    pub fn validate(&self) -> Result<()> {
        if self.from >= self.to {
            return Err(MarktError::validation("'from' must be earlier than 'to'"));
        }
        if self.from.checked_sub_signed(self.to - self.from).is_none() {
            return Err(MarktError::validation("date range too large"));
        }
        let span_days = (self.to - self.from).num_days();
        if self.granularity.max_buckets(span_days) > MAX_TREND_POINTS {
            return Err(MarktError::validation(format!(
                "date range too large for {:?} granularity (at most {} periods)",
                self.granularity, MAX_TREND_POINTS
            )));
        }
        Ok(())
    }

    pub fn top(&self) -> usize {
        self.top.unwrap_or(DEFAULT_TOP).clamp(1, MAX_TOP)
    }

    /// 緊接在查詢區間之前、等長的比較區間
    pub fn previous_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let span = self.to - self.from;
        let start = self
            .from
            .checked_sub_signed(span)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        (start, self.from)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryTotals {
    pub sale_count: usize,
    pub items_sold: i64,
    pub gross: f64,
    pub discount: f64,
    pub tax: f64,
    pub revenue: f64,
    pub average_sale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period_start: NaiveDate,
    pub sale_count: usize,
    pub items_sold: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRank {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRank {
    pub category: String,
    pub quantity: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentBreakdown {
    pub method: PaymentMethod,
    pub count: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub previous_from: DateTime<Utc>,
    pub previous_to: DateTime<Utc>,
    pub previous_revenue: f64,
    pub previous_sale_count: usize,
    pub revenue_change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub granularity: Granularity,
    pub totals: SummaryTotals,
    pub trend: Vec<TrendPoint>,
    pub top_products: Vec<ProductRank>,
    pub top_categories: Vec<CategoryRank>,
    pub payment_methods: Vec<PaymentBreakdown>,
    pub comparison: PeriodComparison,
}

fn in_window(sale: &Sale, from: DateTime<Utc>, to: DateTime<Utc>, location: Option<Uuid>) -> bool {
    sale.created_at >= from
        && sale.created_at < to
        && location.map_or(true, |id| sale.location_id == id)
}

fn totals_of(sales: &[&Sale]) -> SummaryTotals {
    let sale_count = sales.len();
    let revenue = round_money(sales.iter().map(|s| s.total).sum());
    SummaryTotals {
        sale_count,
        items_sold: sales.iter().map(|s| s.items_sold()).sum(),
        gross: round_money(sales.iter().map(|s| s.subtotal).sum()),
        discount: round_money(sales.iter().map(|s| s.discount).sum()),
        tax: round_money(sales.iter().map(|s| s.tax).sum()),
        revenue,
        average_sale: if sale_count == 0 {
            0.0
        } else {
            round_money(revenue / sale_count as f64)
        },
    }
}

fn trend_of(sales: &[&Sale], query: &SummaryQuery) -> Vec<TrendPoint> {
    let granularity = query.granularity;
    let mut buckets: BTreeMap<NaiveDate, (usize, i64, f64)> = BTreeMap::new();

    // 先填入空區間，讓沒有銷售的日子也出現在趨勢中
    let first = granularity.bucket_start(query.from.date_naive());
    let last_instant = query
        .to
        .checked_sub_signed(chrono::Duration::nanoseconds(1))
        .unwrap_or(query.to);
    let last = granularity.bucket_start(last_instant.date_naive());
    let mut cursor = Some(first);
    while let Some(start) = cursor {
        if start > last || buckets.len() as i64 >= MAX_TREND_POINTS {
            break;
        }
        buckets.insert(start, (0, 0, 0.0));
        cursor = granularity.next(start);
    }

    for sale in sales {
        let bucket = granularity.bucket_start(sale.created_at.date_naive());
        let entry = buckets.entry(bucket).or_insert((0, 0, 0.0));
        entry.0 += 1;
        entry.1 += sale.items_sold();
        entry.2 += sale.total;
    }

    buckets
        .into_iter()
        .map(|(period_start, (sale_count, items_sold, revenue))| TrendPoint {
            period_start,
            sale_count,
            items_sold,
            revenue: round_money(revenue),
        })
        .collect()
}

fn rank_by_revenue(a: (f64, i64, &str), b: (f64, i64, &str)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.1.cmp(&a.1))
        .then_with(|| a.2.cmp(b.2))
}

fn top_products_of(sales: &[&Sale], top: usize) -> Vec<ProductRank> {
    let mut by_product: HashMap<Uuid, ProductRank> = HashMap::new();
    for item in sales.iter().flat_map(|s| s.items.iter()) {
        let rank = by_product.entry(item.product_id).or_insert_with(|| ProductRank {
            product_id: item.product_id,
            name: item.name.clone(),
            quantity: 0,
            revenue: 0.0,
        });
        rank.quantity += item.quantity;
        rank.revenue += item.line_total;
    }

    let mut ranks: Vec<ProductRank> = by_product
        .into_values()
        .map(|mut r| {
            r.revenue = round_money(r.revenue);
            r
        })
        .collect();
    ranks.sort_by(|a, b| {
        rank_by_revenue(
            (a.revenue, a.quantity, a.name.as_str()),
            (b.revenue, b.quantity, b.name.as_str()),
        )
    });
    ranks.truncate(top);
    ranks
}

fn top_categories_of(sales: &[&Sale], top: usize) -> Vec<CategoryRank> {
    let mut by_category: HashMap<String, (i64, f64)> = HashMap::new();
    for item in sales.iter().flat_map(|s| s.items.iter()) {
        let category = item
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(UNCATEGORIZED);
        let entry = by_category.entry(category.to_string()).or_insert((0, 0.0));
        entry.0 += item.quantity;
        entry.1 += item.line_total;
    }

    let mut ranks: Vec<CategoryRank> = by_category
        .into_iter()
        .map(|(category, (quantity, revenue))| CategoryRank {
            category,
            quantity,
            revenue: round_money(revenue),
        })
        .collect();
    ranks.sort_by(|a, b| {
        rank_by_revenue(
            (a.revenue, a.quantity, a.category.as_str()),
            (b.revenue, b.quantity, b.category.as_str()),
        )
    });
    ranks.truncate(top);
    ranks
}

fn payment_methods_of(sales: &[&Sale]) -> Vec<PaymentBreakdown> {
    let mut by_method: BTreeMap<PaymentMethod, (usize, f64)> = BTreeMap::new();
    for sale in sales {
        let entry = by_method.entry(sale.payment_method).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += sale.total;
    }

    let mut breakdown: Vec<PaymentBreakdown> = by_method
        .into_iter()
        .map(|(method, (count, amount))| PaymentBreakdown {
            method,
            count,
            amount: round_money(amount),
        })
        .collect();
    breakdown.sort_by(|a, b| b.amount.partial_cmp(&a.amount).unwrap_or(Ordering::Equal));
    breakdown
}

/// 對傳入的銷售做彙總；區間外或其他門市的銷售會被忽略
pub fn summarize(sales: &[Sale], query: &SummaryQuery) -> SalesSummary {
    let current: Vec<&Sale> = sales
        .iter()
        .filter(|s| in_window(s, query.from, query.to, query.location_id))
        .collect();
    let (previous_from, previous_to) = query.previous_window();
    let previous: Vec<&Sale> = sales
        .iter()
        .filter(|s| in_window(s, previous_from, previous_to, query.location_id))
        .collect();

    let totals = totals_of(&current);
    let previous_totals = totals_of(&previous);
    let revenue_change_percent = (previous_totals.revenue > 0.0).then(|| {
        round_money((totals.revenue - previous_totals.revenue) / previous_totals.revenue * 100.0)
    });

    SalesSummary {
        from: query.from,
        to: query.to,
        granularity: query.granularity,
        trend: trend_of(&current, query),
        top_products: top_products_of(&current, query.top()),
        top_categories: top_categories_of(&current, query.top()),
        payment_methods: payment_methods_of(&current),
        comparison: PeriodComparison {
            previous_from,
            previous_to,
            previous_revenue: previous_totals.revenue,
            previous_sale_count: previous_totals.sale_count,
            revenue_change_percent,
        },
        totals,
    }
}

pub struct SummaryService<S: SalesRepository + ?Sized> {
    store: Arc<S>,
}

impl<S: SalesRepository + ?Sized> SummaryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn summary(&self, business_id: Uuid, query: &SummaryQuery) -> Result<SalesSummary> {
        query.validate()?;
        let (previous_from, _) = query.previous_window();
        let filter = SaleFilter {
            from: Some(previous_from),
            to: Some(query.to),
            location_id: query.location_id,
            ..SaleFilter::default()
        };
        let sales = self.store.list_sales(business_id, &filter).await?;
        tracing::debug!(
            business = %business_id,
            loaded = sales.len(),
            "Summarizing sales"
        );
        Ok(summarize(&sales, query))
    }
}

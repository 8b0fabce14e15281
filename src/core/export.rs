use crate::core::summary::{summarize, SalesSummary, SummaryQuery};
use crate::domain::model::{Sale, SaleFilter};
use crate::domain::ports::SalesRepository;
use crate::utils::error::Result;
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const SALES_FILE: &str = "sales.csv";
pub const ITEMS_FILE: &str = "items.csv";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone)]
pub struct SalesReport {
    pub sales_csv: String,
    pub items_csv: String,
    pub summary: SalesSummary,
}

impl SalesReport {
    pub fn build(sales: &[Sale], query: &SummaryQuery) -> Result<Self> {
        let mut in_range: Vec<&Sale> = sales
            .iter()
            .filter(|s| s.created_at >= query.from && s.created_at < query.to)
            .filter(|s| query.location_id.map_or(true, |id| s.location_id == id))
            .collect();
        in_range.sort_by_key(|s| s.created_at);

        let mut sales_writer = csv::Writer::from_writer(Vec::new());
        sales_writer.write_record([
            "sale_id",
            "created_at",
            "location_id",
            "customer_id",
            "reference",
            "payment_method",
            "items",
            "subtotal",
            "discount",
            "tax",
            "total",
        ])?;

        let mut items_writer = csv::Writer::from_writer(Vec::new());
        items_writer.write_record([
            "sale_id",
            "product_id",
            "sku",
            "name",
            "category",
            "quantity",
            "unit_price",
            "line_discount",
            "line_total",
        ])?;

        for sale in &in_range {
            let sale_id = sale.id.to_string();
            sales_writer.write_record([
                sale_id.clone(),
                sale.created_at.to_rfc3339(),
                sale.location_id.to_string(),
                sale.customer_id.map(|id| id.to_string()).unwrap_or_default(),
                sale.reference.clone().unwrap_or_default(),
                sale.payment_method.to_string(),
                sale.items_sold().to_string(),
                format!("{:.2}", sale.subtotal),
                format!("{:.2}", sale.discount),
                format!("{:.2}", sale.tax),
                format!("{:.2}", sale.total),
            ])?;

            for item in &sale.items {
                items_writer.write_record([
                    sale_id.clone(),
                    item.product_id.to_string(),
                    item.sku.clone(),
                    item.name.clone(),
                    item.category.clone().unwrap_or_default(),
                    item.quantity.to_string(),
                    format!("{:.2}", item.unit_price),
                    format!("{:.2}", item.line_discount),
                    format!("{:.2}", item.line_total),
                ])?;
            }
        }

        Ok(Self {
            sales_csv: into_string(sales_writer)?,
            items_csv: into_string(items_writer)?,
            summary: summarize(sales, query),
        })
    }

    /// 打包成 zip：sales.csv、items.csv、summary.json
    pub fn to_zip(&self) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        zip.start_file(SALES_FILE, options)?;
        zip.write_all(self.sales_csv.as_bytes())?;

        zip.start_file(ITEMS_FILE, options)?;
        zip.write_all(self.items_csv.as_bytes())?;

        zip.start_file(SUMMARY_FILE, options)?;
        let json_data = serde_json::to_string_pretty(&self.summary)?;
        zip.write_all(json_data.as_bytes())?;

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| {
        crate::utils::error::MarktError::StorageError {
            message: format!("CSV output is not UTF-8: {}", e),
        }
    })
}

pub struct ExportService<S: SalesRepository + ?Sized> {
    store: Arc<S>,
}

impl<S: SalesRepository + ?Sized> ExportService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn export(&self, business_id: Uuid, query: &SummaryQuery) -> Result<Vec<u8>> {
        query.validate()?;
        let (previous_from, _) = query.previous_window();
        let filter = SaleFilter {
            from: Some(previous_from),
            to: Some(query.to),
            location_id: query.location_id,
            ..SaleFilter::default()
        };
        let sales = self.store.list_sales(business_id, &filter).await?;
        let report = SalesReport::build(&sales, query)?;
        let archive = report.to_zip()?;
        tracing::info!(
            business = %business_id,
            sales = report.summary.totals.sale_count,
            bytes = archive.len(),
            "Sales report exported"
        );
        Ok(archive)
    }
}

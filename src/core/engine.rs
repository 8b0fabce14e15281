use crate::core::checkout::{CheckoutReceipt, CheckoutRequest, TransactionPipeline};
use crate::domain::model::Actor;
use crate::utils::error::Result;
use std::time::Instant;

pub struct SaleEngine<P: TransactionPipeline> {
    pipeline: P,
}

impl<P: TransactionPipeline> SaleEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self, actor: &Actor, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        let started = Instant::now();
        let line_count = request.items.len();
        tracing::debug!(
            business = %actor.business_id,
            location = %request.location_id,
            lines = line_count,
            "Starting checkout"
        );

        let validated = self.pipeline.validate(actor, request).await?;
        tracing::debug!(elapsed = ?started.elapsed(), "Checkout validated");

        let priced = self.pipeline.price(actor, validated).await?;
        tracing::debug!(
            elapsed = ?started.elapsed(),
            total = priced.totals.total,
            "Checkout priced"
        );

        let reserved = self.pipeline.reserve(actor, priced).await?;
        tracing::debug!(
            elapsed = ?started.elapsed(),
            lines = reserved.lines.len(),
            "Stock reserved"
        );

        let receipt = self.pipeline.commit(actor, reserved).await?;
        tracing::info!(
            business = %actor.business_id,
            sale = %receipt.sale.id,
            total = receipt.sale.total,
            items = receipt.sale.items_sold(),
            elapsed = ?started.elapsed(),
            "✅ Sale recorded"
        );

        Ok(receipt)
    }
}

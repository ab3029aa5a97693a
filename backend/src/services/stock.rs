//! Stock movement service: stock-in, stock-out and corrections
//!
//! Each operation locks the product's ledger row, applies the movement to an
//! in-memory copy, and writes the new ledger plus its log entries in the same
//! transaction. A failed check rolls everything back.

use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{
    min_stock_correction, round_money, validate_invoice_reference, validate_min_stock, validate_movement_quantity,
    validate_price, validate_reason, InventoryLedger, NewStockLog, OutboundChannel, Product, ReturnCondition, StockInKind, StockLog,
    StockType,
};

use super::store::{self, ProductRow};
use super::{check, movement_date};
use crate::config::InventorySettings;
use crate::db::with_deadline;
use crate::error::{AppError, AppResult};

/// Stock service for recording movements
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
    timeout: Duration,
}

/// Ledger state after a movement, with the entries that were recorded
#[derive(Debug, Clone, Serialize)]
pub struct MovementResult {
    pub ledger: InventoryLedger,
    pub logs: Vec<StockLog>,
}

/// Product after a reorder threshold change
#[derive(Debug, Clone, Serialize)]
pub struct MinStockResult {
    pub product: Product,
    pub log: Option<StockLog>,
}

/// Input for receiving stock
#[derive(Debug, Deserialize, Validate)]
pub struct StockInInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub stock_type: StockType,
    pub purchase_price: Option<Decimal>,
    pub invoice_reference: Option<String>,
    #[validate(url)]
    pub document_url: Option<String>,
    pub condition: Option<ReturnCondition>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub remarks: String,
    pub date: Option<NaiveDate>,
}

/// Input for shipping stock out
#[derive(Debug, Deserialize, Validate)]
pub struct StockOutInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub source: OutboundChannel,
    pub date: Option<NaiveDate>,
}

/// Input for correcting opening stock values
#[derive(Debug, Deserialize)]
pub struct AdjustOpeningInput {
    pub product_id: Uuid,
    pub opening_qty: Option<i64>,
    pub opening_price: Option<Decimal>,
    pub reason: String,
    pub date: Option<NaiveDate>,
}

/// Input for changing the reorder threshold
#[derive(Debug, Deserialize)]
pub struct AdjustMinStockInput {
    pub product_id: Uuid,
    pub min_stock: i64,
    pub reason: String,
    pub date: Option<NaiveDate>,
}

impl StockService {
    pub fn new(db: PgPool, settings: &InventorySettings) -> Self {
        Self {
            db,
            timeout: settings.storage_timeout(),
        }
    }

    /// Receive purchased or returned stock
    pub async fn stock_in(&self, actor_id: Uuid, input: StockInInput) -> AppResult<MovementResult> {
        input.validate()?;
        check("quantity", validate_movement_quantity(input.quantity))?;
        let date = movement_date(input.date)?;
        let product_id = input.product_id;
        let quantity = input.quantity;

        let (kind, entry) = match input.stock_type {
            StockType::New => {
                let price = input
                    .purchase_price
                    .ok_or_else(|| AppError::validation("purchase_price", "Purchase price is required for new stock"))?;
                check("purchase_price", validate_price(price))?;
                let price = round_money(price);
                let invoice_reference = input.invoice_reference.unwrap_or_default().trim().to_string();
                check("invoice_reference", validate_invoice_reference(&invoice_reference))?;
                (
                    StockInKind::New { price },
                    NewStockLog::purchase(
                        product_id,
                        actor_id,
                        quantity,
                        price,
                        invoice_reference,
                        input.document_url,
                        date,
                    ),
                )
            }
            StockType::Return => (
                StockInKind::Return,
                NewStockLog::customer_return(
                    product_id,
                    actor_id,
                    quantity,
                    input.condition.unwrap_or_default(),
                    input.remarks,
                    date,
                ),
            ),
        };

        let result = self
            .mutate("stock_in", product_id, move |ledger| {
                ledger.stock_in(quantity, kind)?;
                Ok(vec![entry])
            })
            .await?;

        tracing::info!(
            product_id = %product_id,
            quantity,
            on_hand = result.ledger.quantity,
            avg_price = %result.ledger.avg_purchase_price,
            "Stock received"
        );
        Ok(result)
    }

    /// Ship stock out through a sales channel
    pub async fn stock_out(&self, actor_id: Uuid, input: StockOutInput) -> AppResult<MovementResult> {
        input.validate()?;
        check("quantity", validate_movement_quantity(input.quantity))?;
        let date = movement_date(input.date)?;
        let StockOutInput {
            product_id,
            quantity,
            source,
            ..
        } = input;

        let result = self
            .mutate("stock_out", product_id, move |ledger| {
                ledger.stock_out(quantity, source)?;
                Ok(vec![NewStockLog::stock_out(product_id, actor_id, quantity, source, date)])
            })
            .await?;

        tracing::info!(
            product_id = %product_id,
            quantity,
            source = %source,
            on_hand = result.ledger.quantity,
            "Stock shipped"
        );
        Ok(result)
    }

    /// Correct the opening quantity and/or opening price.
    ///
    /// Unchanged values record nothing; when both are unchanged the ledger is
    /// returned as is with no log entries.
    pub async fn adjust_opening(&self, actor_id: Uuid, input: AdjustOpeningInput) -> AppResult<MovementResult> {
        if input.opening_qty.is_none() && input.opening_price.is_none() {
            return Err(AppError::ValidationError(
                "Provide opening_qty or opening_price to correct".to_string(),
            ));
        }
        let reason = input.reason.trim().to_string();
        check("reason", validate_reason(&reason))?;
        let date = movement_date(input.date)?;
        let product_id = input.product_id;

        let result = self
            .mutate("adjust_opening", product_id, move |ledger| {
                let mut entries = Vec::new();
                if let Some(opening_qty) = input.opening_qty {
                    if let Some(correction) = ledger.correct_opening_qty(opening_qty)? {
                        entries.push(NewStockLog::adjustment(product_id, actor_id, &correction, reason.clone(), date));
                    }
                }
                if let Some(opening_price) = input.opening_price {
                    if let Some(correction) = ledger.correct_opening_price(opening_price)? {
                        entries.push(NewStockLog::adjustment(product_id, actor_id, &correction, reason.clone(), date));
                    }
                }
                Ok(entries)
            })
            .await?;

        if result.logs.is_empty() {
            tracing::debug!(product_id = %product_id, "Opening correction matched current values");
        } else {
            tracing::info!(
                product_id = %product_id,
                opening_qty = result.ledger.opening_qty,
                on_hand = result.ledger.quantity,
                avg_price = %result.ledger.avg_purchase_price,
                "Opening stock corrected"
            );
        }
        Ok(result)
    }

    /// Change a product's reorder threshold with an audit entry
    pub async fn adjust_min_stock(&self, actor_id: Uuid, input: AdjustMinStockInput) -> AppResult<MinStockResult> {
        check("min_stock", validate_min_stock(input.min_stock))?;
        let reason = input.reason.trim().to_string();
        check("reason", validate_reason(&reason))?;
        let date = movement_date(input.date)?;

        with_deadline(self.timeout, "adjust_min_stock", async move {
            let mut tx = self.db.begin().await?;

            let product = store::lock_product(&mut *tx, input.product_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

            let Some(correction) = min_stock_correction(product.min_stock, input.min_stock)? else {
                return Ok(MinStockResult { product, log: None });
            };

            let product: Product = sqlx::query_as::<_, ProductRow>(
                r#"
                UPDATE products
                SET min_stock = $2, updated_at = NOW()
                WHERE id = $1
                RETURNING id, name, sku, category, variant, unit, min_stock, unique_key, created_at, updated_at
                "#,
            )
            .bind(input.product_id)
            .bind(input.min_stock)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;

            let log = store::append_log(
                &mut *tx,
                &NewStockLog::adjustment(input.product_id, actor_id, &correction, reason, date),
            )
            .await?;

            tx.commit().await?;
            tracing::info!(product_id = %product.id, min_stock = product.min_stock, "Minimum stock changed");
            Ok(MinStockResult {
                product,
                log: Some(log),
            })
        })
        .await
    }

    /// Lock the ledger, let `apply` change it, then persist ledger and entries together
    async fn mutate<F>(&self, operation: &'static str, product_id: Uuid, apply: F) -> AppResult<MovementResult>
    where
        F: FnOnce(&mut InventoryLedger) -> AppResult<Vec<NewStockLog>> + Send,
    {
        with_deadline(self.timeout, operation, async move {
            let mut tx = self.db.begin().await?;

            let mut ledger = store::lock_ledger(&mut *tx, product_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Inventory ledger".to_string()))?;

            let entries = apply(&mut ledger)?;
            if entries.is_empty() {
                return Ok(MovementResult {
                    ledger,
                    logs: Vec::new(),
                });
            }

            store::save_ledger(&mut *tx, &ledger).await?;
            let mut logs = Vec::with_capacity(entries.len());
            for entry in &entries {
                logs.push(store::append_log(&mut *tx, entry).await?);
            }

            tx.commit().await?;
            Ok(MovementResult { ledger, logs })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_in_input_parses_wire_names() {
        let input: StockInInput = serde_json::from_str(
            r#"{
                "product_id": "7b1f4c9e-2f0a-4a7e-9d0c-3b3f2f6c8a11",
                "quantity": 3,
                "stock_type": "RETURN",
                "condition": "DAMAGED"
            }"#,
        )
        .unwrap();
        assert_eq!(input.stock_type, StockType::Return);
        assert_eq!(input.condition, Some(ReturnCondition::Damaged));
        assert!(input.remarks.is_empty());
    }

    #[test]
    fn test_stock_out_rejects_zero_quantity() {
        let input: StockOutInput = serde_json::from_str(
            r#"{
                "product_id": "7b1f4c9e-2f0a-4a7e-9d0c-3b3f2f6c8a11",
                "quantity": 0,
                "source": "MARKETPLACE"
            }"#,
        )
        .unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_stock_in_rejects_bad_document_url() {
        let input: StockInInput = serde_json::from_str(
            r#"{
                "product_id": "7b1f4c9e-2f0a-4a7e-9d0c-3b3f2f6c8a11",
                "quantity": 1,
                "stock_type": "NEW",
                "purchase_price": "10.00",
                "invoice_reference": "INV-1",
                "document_url": "not a url"
            }"#,
        )
        .unwrap();
        assert!(input.validate().is_err());
    }
}

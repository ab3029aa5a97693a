//! Read-only dashboard projection

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{InventoryLedger, Product, Unit};

/// One product line on the stock dashboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardRow {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub category: String,
    pub variant: String,
    pub unit: Unit,
    pub opening_qty: i64,
    pub qty_in: i64,
    pub marketplace_out: i64,
    pub others_out: i64,
    pub current_qty: i64,
    pub min_stock: i64,
    pub avg_purchase_price: Decimal,
    pub stock_value: Decimal,
    pub low_stock: bool,
}

impl DashboardRow {
    /// Join a product with its ledger; a product without a ledger shows zeros
    pub fn from_parts(product: &Product, ledger: Option<&InventoryLedger>) -> Self {
        let empty = InventoryLedger::baseline(product.id, 0);
        let ledger = ledger.unwrap_or(&empty);
        Self {
            id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            category: product.category.clone(),
            variant: product.variant.clone(),
            unit: product.unit,
            opening_qty: ledger.opening_qty,
            qty_in: ledger.qty_in_total,
            marketplace_out: ledger.marketplace_out_total,
            others_out: ledger.others_out_total,
            current_qty: ledger.quantity,
            min_stock: product.min_stock,
            avg_purchase_price: ledger.avg_purchase_price,
            stock_value: ledger.total_value,
            low_stock: ledger.is_low_stock(product.min_stock),
        }
    }
}

//! Dashboard projection: per-product stock lines, low-stock list and CSV export

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{DashboardRow, InventoryLedger, PaginatedResponse, Pagination, PaginationMeta, Product, Unit};

use super::search_pattern;
use crate::config::InventorySettings;
use crate::db::with_deadline;
use crate::error::{AppError, AppResult};

/// Dashboard service for read-only stock views
#[derive(Clone)]
pub struct DashboardService {
    db: PgPool,
    timeout: Duration,
    default_page_size: u32,
}

/// Query parameters for the dashboard
#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    #[serde(default)]
    pub low_stock_only: bool,
    pub format: Option<String>,
}

/// Totals across the whole catalog
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DashboardSummary {
    pub product_count: i64,
    pub low_stock_count: i64,
    pub total_quantity: i64,
    pub total_value: Decimal,
}

/// Product joined with its ledger, if any
#[derive(Debug, FromRow)]
struct DashboardRecord {
    id: Uuid,
    name: String,
    sku: String,
    category: String,
    variant: String,
    unit: String,
    min_stock: i64,
    unique_key: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ledger_product_id: Option<Uuid>,
    opening_qty: Option<i64>,
    quantity: Option<i64>,
    avg_purchase_price: Option<Decimal>,
    total_value: Option<Decimal>,
    qty_in_total: Option<i64>,
    marketplace_out_total: Option<i64>,
    others_out_total: Option<i64>,
}

impl TryFrom<DashboardRecord> for DashboardRow {
    type Error = AppError;

    fn try_from(record: DashboardRecord) -> Result<Self, Self::Error> {
        let unit = Unit::parse(&record.unit).ok_or_else(|| {
            AppError::InvariantViolation(format!("product {} has unknown unit '{}'", record.id, record.unit))
        })?;
        let ledger = record.ledger_product_id.map(|product_id| InventoryLedger {
            product_id,
            opening_qty: record.opening_qty.unwrap_or_default(),
            quantity: record.quantity.unwrap_or_default(),
            avg_purchase_price: record.avg_purchase_price.unwrap_or_default(),
            total_value: record.total_value.unwrap_or_default(),
            qty_in_total: record.qty_in_total.unwrap_or_default(),
            marketplace_out_total: record.marketplace_out_total.unwrap_or_default(),
            others_out_total: record.others_out_total.unwrap_or_default(),
        });
        let product = Product {
            id: record.id,
            name: record.name,
            sku: record.sku,
            category: record.category,
            variant: record.variant,
            unit,
            min_stock: record.min_stock,
            unique_key: record.unique_key,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        Ok(DashboardRow::from_parts(&product, ledger.as_ref()))
    }
}

impl DashboardService {
    pub fn new(db: PgPool, settings: &InventorySettings) -> Self {
        Self {
            db,
            timeout: settings.storage_timeout(),
            default_page_size: settings.dashboard_page_size,
        }
    }

    /// One page of dashboard lines, ordered by product name
    pub async fn get_dashboard(&self, query: &DashboardQuery) -> AppResult<PaginatedResponse<DashboardRow>> {
        let pagination = Pagination {
            page: query.page.unwrap_or(1),
            per_page: query.per_page.unwrap_or(self.default_page_size),
        }
        .normalized();
        let pattern = search_pattern(query.search.as_deref());
        let low_stock_only = query.low_stock_only;

        with_deadline(self.timeout, "dashboard", async move {
            let total = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM products p
                LEFT JOIN inventory_ledgers l ON l.product_id = p.id
                WHERE ($1::text IS NULL OR p.name ILIKE $1 OR p.sku ILIKE $1 OR p.category ILIKE $1)
                  AND (NOT $2 OR COALESCE(l.quantity, 0) <= p.min_stock)
                "#,
            )
            .bind(&pattern)
            .bind(low_stock_only)
            .fetch_one(&self.db)
            .await?;

            let records = sqlx::query_as::<_, DashboardRecord>(
                r#"
                SELECT p.id, p.name, p.sku, p.category, p.variant, p.unit, p.min_stock, p.unique_key,
                       p.created_at, p.updated_at,
                       l.product_id AS ledger_product_id, l.opening_qty, l.quantity, l.avg_purchase_price,
                       l.total_value, l.qty_in_total, l.marketplace_out_total, l.others_out_total
                FROM products p
                LEFT JOIN inventory_ledgers l ON l.product_id = p.id
                WHERE ($1::text IS NULL OR p.name ILIKE $1 OR p.sku ILIKE $1 OR p.category ILIKE $1)
                  AND (NOT $2 OR COALESCE(l.quantity, 0) <= p.min_stock)
                ORDER BY p.name ASC, p.id ASC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(&pattern)
            .bind(low_stock_only)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

            let data = records
                .into_iter()
                .map(DashboardRow::try_from)
                .collect::<AppResult<Vec<_>>>()?;

            Ok(PaginatedResponse {
                data,
                pagination: PaginationMeta::new(&pagination, total.max(0) as u64),
            })
        })
        .await
    }

    /// Every product at or below its reorder threshold, most urgent first
    pub async fn low_stock(&self) -> AppResult<Vec<DashboardRow>> {
        with_deadline(self.timeout, "low_stock", async move {
            let records = sqlx::query_as::<_, DashboardRecord>(
                r#"
                SELECT p.id, p.name, p.sku, p.category, p.variant, p.unit, p.min_stock, p.unique_key,
                       p.created_at, p.updated_at,
                       l.product_id AS ledger_product_id, l.opening_qty, l.quantity, l.avg_purchase_price,
                       l.total_value, l.qty_in_total, l.marketplace_out_total, l.others_out_total
                FROM products p
                LEFT JOIN inventory_ledgers l ON l.product_id = p.id
                WHERE COALESCE(l.quantity, 0) <= p.min_stock
                ORDER BY COALESCE(l.quantity, 0) - p.min_stock ASC, p.name ASC
                "#,
            )
            .fetch_all(&self.db)
            .await?;

            records.into_iter().map(DashboardRow::try_from).collect()
        })
        .await
    }

    /// All dashboard lines matching the search, for export
    pub async fn all_rows(&self, search: Option<&str>) -> AppResult<Vec<DashboardRow>> {
        let pattern = search_pattern(search);

        with_deadline(self.timeout, "dashboard_export", async move {
            let records = sqlx::query_as::<_, DashboardRecord>(
                r#"
                SELECT p.id, p.name, p.sku, p.category, p.variant, p.unit, p.min_stock, p.unique_key,
                       p.created_at, p.updated_at,
                       l.product_id AS ledger_product_id, l.opening_qty, l.quantity, l.avg_purchase_price,
                       l.total_value, l.qty_in_total, l.marketplace_out_total, l.others_out_total
                FROM products p
                LEFT JOIN inventory_ledgers l ON l.product_id = p.id
                WHERE ($1::text IS NULL OR p.name ILIKE $1 OR p.sku ILIKE $1 OR p.category ILIKE $1)
                ORDER BY p.name ASC, p.id ASC
                "#,
            )
            .bind(&pattern)
            .fetch_all(&self.db)
            .await?;

            records.into_iter().map(DashboardRow::try_from).collect()
        })
        .await
    }

    /// Catalog-wide totals
    pub async fn summary(&self) -> AppResult<DashboardSummary> {
        with_deadline(self.timeout, "dashboard_summary", async move {
            let summary = sqlx::query_as::<_, DashboardSummary>(
                r#"
                SELECT COUNT(*) AS product_count,
                       COUNT(*) FILTER (WHERE COALESCE(l.quantity, 0) <= p.min_stock) AS low_stock_count,
                       COALESCE(SUM(l.quantity), 0)::BIGINT AS total_quantity,
                       COALESCE(SUM(l.total_value), 0) AS total_value
                FROM products p
                LEFT JOIN inventory_ledgers l ON l.product_id = p.id
                "#,
            )
            .fetch_one(&self.db)
            .await?;
            Ok(summary)
        })
        .await
    }

    /// Export rows to CSV format
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(min_stock: i64) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Blue Mug".to_string(),
            sku: "KITC-BL-0001".to_string(),
            category: "Kitchen".to_string(),
            variant: "Blue".to_string(),
            unit: Unit::Pcs,
            min_stock,
            unique_key: "blue mug|blue|kitchen|pcs".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_export_dashboard_csv_has_header_and_rows() {
        let product = product(3);
        let mut ledger = InventoryLedger::open(product.id, 10, Decimal::new(250, 2)).unwrap();
        ledger.stock_out(2, shared::OutboundChannel::Marketplace).unwrap();
        let rows = vec![DashboardRow::from_parts(&product, Some(&ledger))];

        let csv = DashboardService::export_to_csv(&rows).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("id,name,sku,"));
        assert!(header.contains("marketplace_out"));
        let line = lines.next().unwrap();
        assert!(line.contains("KITC-BL-0001"));
        assert!(line.contains("Pcs"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_export_empty_is_empty() {
        let rows: Vec<DashboardRow> = Vec::new();
        assert_eq!(DashboardService::export_to_csv(&rows).unwrap(), "");
    }
}

//! Stock movement history: filtered listing and CSV export

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{validate_date_range, MovementType, PaginatedResponse, Pagination, PaginationMeta, StockLog};

use super::check;
use super::store::StockLogRow;
use crate::config::InventorySettings;
use crate::db::with_deadline;
use crate::error::AppResult;

/// Upper bound on rows in one history export
const MAX_EXPORT_ROWS: i64 = 50_000;

/// History service for browsing the movement log
#[derive(Clone)]
pub struct HistoryService {
    db: PgPool,
    timeout: Duration,
}

/// Query parameters for history
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub product_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub movement_type: Option<MovementType>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub format: Option<String>,
}

/// A log entry with the product it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct StockHistoryEntry {
    #[serde(flatten)]
    pub log: StockLog,
    pub product_name: String,
    pub product_sku: String,
}

/// Flat CSV line for one history entry
#[derive(Debug, Serialize)]
pub struct HistoryCsvRecord {
    pub date: NaiveDate,
    pub sku: String,
    pub product_name: String,
    #[serde(rename = "type")]
    pub movement_type: &'static str,
    pub stock_type: &'static str,
    pub quantity: i64,
    pub purchase_price: Option<Decimal>,
    pub invoice_reference: String,
    pub source: &'static str,
    pub condition: &'static str,
    pub adjustment_field: &'static str,
    pub adjustment_direction: &'static str,
    pub old_value: Option<Decimal>,
    pub new_value: Option<Decimal>,
    pub reason: String,
    pub remarks: String,
    pub actor_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}

impl From<&StockHistoryEntry> for HistoryCsvRecord {
    fn from(entry: &StockHistoryEntry) -> Self {
        let log = &entry.log;
        Self {
            date: log.date,
            sku: entry.product_sku.clone(),
            product_name: entry.product_name.clone(),
            movement_type: log.movement_type.as_str(),
            stock_type: log.stock_type.map(|t| t.as_str()).unwrap_or_default(),
            quantity: log.quantity,
            purchase_price: log.purchase_price,
            invoice_reference: log.invoice_reference.clone(),
            source: log.source.map(|s| s.as_str()).unwrap_or_default(),
            condition: log.condition.map(|c| c.as_str()).unwrap_or_default(),
            adjustment_field: log.adjustment_field.map(|f| f.as_str()).unwrap_or_default(),
            adjustment_direction: log.adjustment_direction.map(|d| d.as_str()).unwrap_or_default(),
            old_value: log.old_value,
            new_value: log.new_value,
            reason: log.reason.clone(),
            remarks: log.remarks.clone(),
            actor_id: log.actor_id,
            recorded_at: log.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct HistoryRecord {
    #[sqlx(flatten)]
    log: StockLogRow,
    product_name: String,
    product_sku: String,
}

impl TryFrom<HistoryRecord> for StockHistoryEntry {
    type Error = crate::error::AppError;

    fn try_from(record: HistoryRecord) -> Result<Self, Self::Error> {
        Ok(StockHistoryEntry {
            log: record.log.try_into()?,
            product_name: record.product_name,
            product_sku: record.product_sku,
        })
    }
}

impl HistoryService {
    pub fn new(db: PgPool, settings: &InventorySettings) -> Self {
        Self {
            db,
            timeout: settings.storage_timeout(),
        }
    }

    /// Page through history, newest first
    pub async fn list(&self, query: &HistoryQuery) -> AppResult<PaginatedResponse<StockHistoryEntry>> {
        validate_filter(query)?;
        let pagination = Pagination {
            page: query.page.unwrap_or(1),
            per_page: query.per_page.unwrap_or(50),
        }
        .normalized();

        with_deadline(self.timeout, "history", async move {
            let total = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM stock_logs s
                WHERE ($1::date IS NULL OR s.date >= $1)
                  AND ($2::date IS NULL OR s.date <= $2)
                  AND ($3::uuid IS NULL OR s.product_id = $3)
                  AND ($4::text IS NULL OR s.type = $4)
                "#,
            )
            .bind(query.from)
            .bind(query.to)
            .bind(query.product_id)
            .bind(query.movement_type.map(|t| t.as_str()))
            .fetch_one(&self.db)
            .await?;

            let entries = self.fetch(query, pagination.limit(), pagination.offset()).await?;

            Ok(PaginatedResponse {
                data: entries,
                pagination: PaginationMeta::new(&pagination, total.max(0) as u64),
            })
        })
        .await
    }

    /// Flat CSV rows for the filtered history, newest first
    pub async fn export_rows(&self, query: &HistoryQuery) -> AppResult<Vec<HistoryCsvRecord>> {
        validate_filter(query)?;

        with_deadline(self.timeout, "history_export", async move {
            let entries = self.fetch(query, MAX_EXPORT_ROWS, 0).await?;
            Ok(entries.iter().map(HistoryCsvRecord::from).collect())
        })
        .await
    }

    async fn fetch(&self, query: &HistoryQuery, limit: i64, offset: i64) -> AppResult<Vec<StockHistoryEntry>> {
        sqlx::query_as::<_, HistoryRecord>(
            r#"
            SELECT s.id, s.seq, s.product_id, s.actor_id, s.type AS movement_type, s.stock_type,
                   s.is_opening, s.condition, s.adjustment_direction, s.adjustment_field, s.old_value,
                   s.new_value, s.reason, s.quantity, s.date, s.invoice_reference, s.purchase_price,
                   s.document_url, s.source, s.remarks, s.created_at,
                   p.name AS product_name, p.sku AS product_sku
            FROM stock_logs s
            JOIN products p ON p.id = s.product_id
            WHERE ($1::date IS NULL OR s.date >= $1)
              AND ($2::date IS NULL OR s.date <= $2)
              AND ($3::uuid IS NULL OR s.product_id = $3)
              AND ($4::text IS NULL OR s.type = $4)
            ORDER BY s.date DESC, s.seq DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(query.from)
        .bind(query.to)
        .bind(query.product_id)
        .bind(query.movement_type.map(|t| t.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(StockHistoryEntry::try_from)
        .collect()
    }
}

fn validate_filter(query: &HistoryQuery) -> AppResult<()> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        check("from", validate_date_range(from, to))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::DashboardService;
    use shared::{NewStockLog, OutboundChannel};

    fn entry(new: NewStockLog) -> StockHistoryEntry {
        StockHistoryEntry {
            log: StockLog {
                id: Uuid::new_v4(),
                seq: 1,
                product_id: new.product_id,
                actor_id: new.actor_id,
                movement_type: new.movement_type,
                stock_type: new.stock_type,
                is_opening: new.is_opening,
                condition: new.condition,
                adjustment_direction: new.adjustment_direction,
                adjustment_field: new.adjustment_field,
                old_value: new.old_value,
                new_value: new.new_value,
                reason: new.reason,
                quantity: new.quantity,
                date: new.date,
                invoice_reference: new.invoice_reference,
                purchase_price: new.purchase_price,
                document_url: new.document_url,
                source: new.source,
                remarks: new.remarks,
                created_at: Utc::now(),
            },
            product_name: "Blue Mug".to_string(),
            product_sku: "KITC-BL-0001".to_string(),
        }
    }

    #[test]
    fn test_csv_record_flattens_labels() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let out = entry(NewStockLog::stock_out(
            Uuid::new_v4(),
            Uuid::new_v4(),
            4,
            OutboundChannel::Others,
            date,
        ));
        let record = HistoryCsvRecord::from(&out);
        assert_eq!(record.movement_type, "OUT");
        assert_eq!(record.source, "OTHERS");
        assert_eq!(record.stock_type, "");

        let csv = DashboardService::export_to_csv(&[record]).unwrap();
        assert!(csv.starts_with("date,sku,product_name,type,"));
        assert!(csv.contains("2024-05-02,KITC-BL-0001,Blue Mug,OUT,,4,"));
    }

    #[test]
    fn test_filter_rejects_inverted_range() {
        let query = HistoryQuery {
            from: NaiveDate::from_ymd_opt(2024, 6, 1),
            to: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        };
        assert!(validate_filter(&query).is_err());
    }
}

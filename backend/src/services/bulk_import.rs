//! Bulk CSV product import
//!
//! Rows are validated and planned up front, then written in chunks. Each
//! chunk is one transaction and each row inside it runs under its own
//! savepoint, so one bad row rolls back only itself.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use sqlx::{Acquire, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::import::{
    normalize_header, plan_import, validate_row, ExistingProduct, ImportReport, ImportRow, PlannedAction,
    RawImportRow, RowIssue, HEADER_OFFSET,
};
use shared::{min_stock_correction, NewStockLog};

use super::store::{self, ProductDraft};
use crate::config::InventorySettings;
use crate::db::with_deadline;
use crate::error::{AppError, AppResult};

/// Bulk import service for CSV product batches
#[derive(Clone)]
pub struct BulkImportService {
    db: PgPool,
    timeout: Duration,
    chunk_size: usize,
}

/// What happened to one row inside a chunk
enum RowOutcome {
    Created,
    Updated,
    Skipped(RowIssue),
    Failed(RowIssue),
}

impl BulkImportService {
    pub fn new(db: PgPool, settings: &InventorySettings) -> Self {
        Self {
            db,
            timeout: settings.storage_timeout(),
            chunk_size: settings.import_chunk_size.max(1),
        }
    }

    /// Import a CSV batch and report per-row results.
    ///
    /// Existing products never get their opening stock re-applied; only a
    /// changed minimum stock is written back.
    pub async fn import_csv(&self, actor_id: Uuid, data: &[u8]) -> AppResult<ImportReport> {
        let rows = parse_csv(data)?;
        let total_rows = rows.len();

        let keys: Vec<String> = rows
            .iter()
            .filter_map(|row| row.as_ref().ok())
            .map(|row| row.unique_key.clone())
            .collect();
        let existing = self.existing_products(keys).await?;

        let plan = plan_import(rows, &existing);
        let mut report = ImportReport {
            total_rows,
            failed: plan.invalid,
            ..Default::default()
        };

        let date = Utc::now().date_naive();
        for chunk in plan.actions.chunks(self.chunk_size) {
            let result = with_deadline(self.timeout, "import_chunk", self.apply_chunk(actor_id, chunk, date)).await;
            match result {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome {
                            RowOutcome::Created => report.created += 1,
                            RowOutcome::Updated => report.updated += 1,
                            RowOutcome::Skipped(issue) => report.skipped.push(issue),
                            RowOutcome::Failed(issue) => report.failed.push(issue),
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, rows = chunk.len(), "Import chunk rolled back");
                    report.failed.extend(
                        chunk
                            .iter()
                            .map(|action| RowIssue::new(action.row_number(), "storage unavailable; retry the import")),
                    );
                }
            }
        }

        report.skipped.sort_by_key(|issue| issue.row_number);
        report.failed.sort_by_key(|issue| issue.row_number);

        tracing::info!(
            total = report.total_rows,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "Bulk import finished"
        );
        Ok(report)
    }

    async fn existing_products(&self, keys: Vec<String>) -> AppResult<HashMap<String, ExistingProduct>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        with_deadline(self.timeout, "import_lookup", async move {
            let rows = sqlx::query_as::<_, (Uuid, String, i64)>(
                "SELECT id, unique_key, min_stock FROM products WHERE unique_key = ANY($1)",
            )
            .bind(&keys)
            .fetch_all(&self.db)
            .await?;

            Ok(rows
                .into_iter()
                .map(|(product_id, key, min_stock)| (key, ExistingProduct { product_id, min_stock }))
                .collect())
        })
        .await
    }

    async fn apply_chunk(
        &self,
        actor_id: Uuid,
        actions: &[PlannedAction],
        date: NaiveDate,
    ) -> AppResult<Vec<RowOutcome>> {
        let mut tx = self.db.begin().await?;
        let mut outcomes = Vec::with_capacity(actions.len());

        for action in actions {
            let outcome = match action {
                PlannedAction::Create(row) => {
                    let mut savepoint = tx.begin().await?;
                    match create_row(&mut savepoint, actor_id, row, date).await {
                        Ok(()) => {
                            savepoint.commit().await?;
                            RowOutcome::Created
                        }
                        Err(e) => {
                            savepoint.rollback().await?;
                            row_failure(row.row_number, e)?
                        }
                    }
                }
                PlannedAction::UpdateMinStock { product_id, row, .. } => {
                    let mut savepoint = tx.begin().await?;
                    match update_min_stock(&mut savepoint, actor_id, *product_id, row, date).await {
                        Ok(outcome) => {
                            savepoint.commit().await?;
                            outcome
                        }
                        Err(e) => {
                            savepoint.rollback().await?;
                            row_failure(row.row_number, e)?
                        }
                    }
                }
                PlannedAction::Unchanged { row_number, .. } => RowOutcome::Skipped(RowIssue::new(
                    *row_number,
                    "product already exists; opening stock is not re-applied",
                )),
                PlannedAction::DuplicateInBatch { row_number, first_row } => RowOutcome::Skipped(RowIssue::new(
                    *row_number,
                    format!("duplicate of row {}", first_row),
                )),
            };
            outcomes.push(outcome);
        }

        tx.commit().await?;
        Ok(outcomes)
    }
}

/// Read the CSV into validated rows, one result per data record
fn parse_csv(data: &[u8]) -> AppResult<Vec<Result<ImportRow, RowIssue>>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| AppError::ValidationError(format!("CSV header row could not be read: {}", e)))?
        .iter()
        .map(normalize_header)
        .collect::<csv::StringRecord>();
    if !headers.iter().any(|h| h == "name") {
        return Err(AppError::validation("file", "CSV must have a 'name' column"));
    }
    reader.set_headers(headers);

    Ok(reader
        .deserialize::<RawImportRow>()
        .enumerate()
        .map(|(index, record)| match record {
            Ok(raw) => validate_row(&raw, index),
            Err(e) => Err(RowIssue::new(
                index + HEADER_OFFSET,
                format!("row could not be read: {}", e),
            )),
        })
        .collect())
}

/// Turn a row-level error into a report line, or propagate it if the
/// storage itself is failing
fn row_failure(row_number: usize, err: AppError) -> AppResult<RowOutcome> {
    match err {
        AppError::DuplicateEntry(field) => Ok(RowOutcome::Skipped(RowIssue::new(
            row_number,
            format!("a product with this {} already exists", field),
        ))),
        e if e.is_retryable() => Err(e),
        AppError::NotFound(resource) => Ok(RowOutcome::Skipped(RowIssue::new(
            row_number,
            format!("{} was removed during the import", resource),
        ))),
        AppError::Validation { message, .. } | AppError::ValidationError(message) => {
            Ok(RowOutcome::Failed(RowIssue::new(row_number, message)))
        }
        AppError::DatabaseError(e) => {
            tracing::warn!(row_number, error = %e, "Import row rejected by storage");
            Ok(RowOutcome::Failed(RowIssue::new(row_number, "row could not be stored")))
        }
        e => Ok(RowOutcome::Failed(RowIssue::new(row_number, e.to_string()))),
    }
}

async fn create_row(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: Uuid,
    row: &ImportRow,
    date: NaiveDate,
) -> AppResult<()> {
    let draft = ProductDraft {
        name: row.name.clone(),
        sku: None,
        category: row.category.clone(),
        variant: row.variant.clone(),
        unit: row.unit,
        min_stock: row.min_stock,
    };
    let (product, _) =
        store::insert_stocked_product(tx, actor_id, &draft, row.opening_qty, row.opening_price, date).await?;
    tracing::debug!(row = row.row_number, sku = %product.sku, "Import row created product");
    Ok(())
}

async fn update_min_stock(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: Uuid,
    product_id: Uuid,
    row: &ImportRow,
    date: NaiveDate,
) -> AppResult<RowOutcome> {
    // Re-read under lock; the plan may be stale by now
    let product = store::lock_product(&mut **tx, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

    let Some(correction) = min_stock_correction(product.min_stock, row.min_stock)? else {
        return Ok(RowOutcome::Skipped(RowIssue::new(
            row.row_number,
            "product already exists; nothing to update",
        )));
    };

    sqlx::query("UPDATE products SET min_stock = $2, updated_at = NOW() WHERE id = $1")
        .bind(product_id)
        .bind(row.min_stock)
        .execute(&mut **tx)
        .await?;

    store::append_log(
        &mut **tx,
        &NewStockLog::adjustment(
            product_id,
            actor_id,
            &correction,
            format!("Bulk import row {}", row.row_number),
            date,
        ),
    )
    .await?;

    Ok(RowOutcome::Updated)
}

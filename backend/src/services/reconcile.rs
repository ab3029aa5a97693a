//! Ledger reconciliation: rebuild stored ledgers from the movement log

use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use shared::replay::{replay, ReplayWarning};
use shared::{AdjustmentField, InventoryLedger, MovementType, StockLog};

use super::store;
use crate::config::InventorySettings;
use crate::db::with_deadline;
use crate::error::{AppError, AppResult};

/// Reconcile service for rebuilding ledgers
#[derive(Clone)]
pub struct ReconcileService {
    db: PgPool,
    timeout: Duration,
}

/// Result of rebuilding one product
#[derive(Debug, Clone, Serialize)]
pub struct RebuildResult {
    pub product_id: Uuid,
    pub ledger: InventoryLedger,
    pub entries_replayed: usize,
    /// Whether the stored ledger differed from the replayed one
    pub changed: bool,
    pub warnings: Vec<ReplayWarning>,
}

/// Per-product line of a full rebuild
#[derive(Debug, Clone, Serialize)]
pub struct RebuildOutcome {
    pub product_id: Uuid,
    pub rebuilt: bool,
    pub changed: bool,
    pub entries_replayed: usize,
    pub warnings: Vec<ReplayWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a full rebuild
#[derive(Debug, Clone, Default, Serialize)]
pub struct RebuildReport {
    pub total: usize,
    pub rebuilt: usize,
    pub changed: usize,
    pub failed: usize,
    pub products: Vec<RebuildOutcome>,
}

impl ReconcileService {
    pub fn new(db: PgPool, settings: &InventorySettings) -> Self {
        Self {
            db,
            timeout: settings.storage_timeout(),
        }
    }

    /// Recompute one product's ledger from its full history.
    ///
    /// The ledger row stays locked for the duration, so no movement can be
    /// recorded between reading the log and writing the result. If history
    /// would drive stock negative, nothing is written.
    pub async fn rebuild_ledger(&self, product_id: Uuid) -> AppResult<RebuildResult> {
        with_deadline(self.timeout, "rebuild_ledger", async move {
            let mut tx = self.db.begin().await?;

            store::lock_product(&mut *tx, product_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

            let stored = store::lock_ledger(&mut *tx, product_id).await?;
            let logs = store::product_logs(&mut *tx, product_id).await?;

            // A missing ledger is recreated from the opening entry, if any
            let opening_qty = match &stored {
                Some(ledger) => ledger.opening_qty,
                None => recorded_opening(&logs),
            };

            let outcome = replay(product_id, opening_qty, &logs).map_err(|e| {
                tracing::error!(product_id = %product_id, error = %e, "Ledger rebuild rejected");
                AppError::from(e)
            })?;

            for warning in &outcome.warnings {
                tracing::warn!(
                    product_id = %product_id,
                    log_id = %warning.log_id,
                    seq = warning.seq,
                    "{}",
                    warning.message
                );
            }

            let changed = stored.as_ref() != Some(&outcome.ledger);
            match &stored {
                Some(_) if changed => store::save_ledger(&mut *tx, &outcome.ledger).await?,
                Some(_) => {}
                None => store::insert_ledger(&mut *tx, &outcome.ledger).await?,
            }

            tx.commit().await?;

            if changed {
                tracing::info!(
                    product_id = %product_id,
                    entries = outcome.entries_replayed,
                    quantity = outcome.ledger.quantity,
                    avg_price = %outcome.ledger.avg_purchase_price,
                    "Ledger rebuilt with corrections"
                );
            } else {
                tracing::debug!(product_id = %product_id, "Ledger already matches history");
            }

            Ok(RebuildResult {
                product_id,
                ledger: outcome.ledger,
                entries_replayed: outcome.entries_replayed,
                changed,
                warnings: outcome.warnings,
            })
        })
        .await
    }

    /// Rebuild every product, one transaction each.
    ///
    /// A product that fails is reported and skipped; the rest continue.
    pub async fn rebuild_all(&self) -> AppResult<RebuildReport> {
        let product_ids = with_deadline(self.timeout, "list_product_ids", async move {
            let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM products ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.db)
                .await?;
            Ok(ids)
        })
        .await?;

        let mut report = RebuildReport {
            total: product_ids.len(),
            ..Default::default()
        };

        for product_id in product_ids {
            match self.rebuild_ledger(product_id).await {
                Ok(result) => {
                    report.rebuilt += 1;
                    if result.changed {
                        report.changed += 1;
                    }
                    report.products.push(RebuildOutcome {
                        product_id,
                        rebuilt: true,
                        changed: result.changed,
                        entries_replayed: result.entries_replayed,
                        warnings: result.warnings,
                        error: None,
                    });
                }
                // Deleted between listing and rebuilding
                Err(AppError::NotFound(_)) => {
                    report.total -= 1;
                }
                Err(e) => {
                    report.failed += 1;
                    report.products.push(RebuildOutcome {
                        product_id,
                        rebuilt: false,
                        changed: false,
                        entries_replayed: 0,
                        warnings: Vec::new(),
                        error: Some(failure_reason(&e)),
                    });
                }
            }
        }

        tracing::info!(
            total = report.total,
            rebuilt = report.rebuilt,
            changed = report.changed,
            failed = report.failed,
            "Full ledger rebuild finished"
        );
        Ok(report)
    }
}

/// Current opening quantity implied by the log when no ledger row exists:
/// the latest opening correction if there is one, else the opening entry
fn recorded_opening(logs: &[StockLog]) -> i64 {
    let corrected = logs
        .iter()
        .filter(|log| {
            log.movement_type == MovementType::Adjust && log.adjustment_field == Some(AdjustmentField::OpeningQty)
        })
        .max_by_key(|log| log.seq)
        .and_then(|log| log.new_value)
        .and_then(|value| value.trunc().to_i64());

    corrected.unwrap_or_else(|| {
        logs.iter()
            .filter(|log| log.is_opening)
            .min_by_key(|log| log.seq)
            .map(|log| log.quantity)
            .unwrap_or(0)
    })
}

fn failure_reason(err: &AppError) -> String {
    match err {
        AppError::InvariantViolation(msg) => msg.clone(),
        e if e.is_retryable() => "storage unavailable".to_string(),
        AppError::DatabaseError(_) => "storage error".to_string(),
        e => e.to_string(),
    }
}

//! Ledger reconstruction from the stock movement log
//!
//! Replay starts from the opening baseline with no cost history and feeds
//! every entry, in recording order, through [`InventoryLedger::apply`].
//! Opening-quantity corrections are unwound first so that each one is
//! re-applied at the point in history where it happened.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    AdjustmentField, Correction, InventoryLedger, LedgerError, Movement, MovementType, StockInKind,
    StockLog, StockType,
};

/// Something odd found in a log entry that replay worked around
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayWarning {
    pub log_id: Uuid,
    pub seq: i64,
    pub message: String,
}

/// Result of replaying one product's history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayOutcome {
    pub ledger: InventoryLedger,
    pub entries_replayed: usize,
    pub warnings: Vec<ReplayWarning>,
}

/// Rebuild a ledger from `opening_qty` (the current, possibly corrected,
/// opening quantity) and the product's full log.
pub fn replay(product_id: Uuid, opening_qty: i64, logs: &[StockLog]) -> Result<ReplayOutcome, LedgerError> {
    let mut ordered: Vec<&StockLog> = logs.iter().filter(|log| log.product_id == product_id).collect();
    ordered.sort_by_key(|log| log.seq);

    let mut warnings = Vec::new();
    let mut entries_replayed = 0;

    let baseline = initial_opening(opening_qty, &ordered)?;
    let mut ledger = InventoryLedger::baseline(product_id, baseline);

    for log in ordered {
        let Some(movement) = to_movement(log, &mut warnings) else {
            continue;
        };
        ledger.apply(&movement).map_err(|e| match e {
            LedgerError::InsufficientStock { requested, available } => LedgerError::InvariantViolation(format!(
                "log entry {} (seq {}) removes {} units but only {} were on hand",
                log.id, log.seq, requested, available
            )),
            other => other,
        })?;
        entries_replayed += 1;
    }

    if ledger.opening_qty != opening_qty {
        return Err(LedgerError::InvariantViolation(format!(
            "replayed opening quantity {} does not match recorded {}",
            ledger.opening_qty, opening_qty
        )));
    }

    Ok(ReplayOutcome {
        ledger,
        entries_replayed,
        warnings,
    })
}

/// Opening quantity before any recorded correction
fn initial_opening(current: i64, logs: &[&StockLog]) -> Result<i64, LedgerError> {
    let mut opening = current;
    for log in logs.iter().rev() {
        if log.movement_type != MovementType::Adjust || log.adjustment_field != Some(AdjustmentField::OpeningQty) {
            continue;
        }
        if let (Some(old_value), Some(new_value)) = (log.old_value, log.new_value) {
            let correction = Correction {
                field: AdjustmentField::OpeningQty,
                old_value,
                new_value,
            };
            opening = opening
                .checked_sub(correction.quantity_delta()?)
                .ok_or_else(|| LedgerError::InvariantViolation("opening quantity overflow".to_string()))?;
        }
    }
    if opening < 0 {
        return Err(LedgerError::InvariantViolation(format!(
            "corrections imply a negative initial opening quantity ({})",
            opening
        )));
    }
    Ok(opening)
}

fn to_movement(log: &StockLog, warnings: &mut Vec<ReplayWarning>) -> Option<Movement> {
    let mut warn = |message: String| {
        warnings.push(ReplayWarning {
            log_id: log.id,
            seq: log.seq,
            message,
        })
    };

    match log.movement_type {
        MovementType::In if log.is_opening => Some(Movement::Opening {
            price: log.purchase_price.unwrap_or(Decimal::ZERO),
        }),
        MovementType::In => {
            let stock_type = log.stock_type.unwrap_or_else(|| {
                warn("stock type missing; replayed as NEW".to_string());
                StockType::New
            });
            let kind = match stock_type {
                StockType::New => StockInKind::New {
                    price: log.purchase_price.unwrap_or_else(|| {
                        warn("purchase price missing; replayed as 0".to_string());
                        Decimal::ZERO
                    }),
                },
                StockType::Return => StockInKind::Return,
            };
            Some(Movement::StockIn {
                quantity: log.quantity,
                kind,
            })
        }
        MovementType::Out => {
            if log.source.is_none() {
                warn("outbound source unknown".to_string());
            }
            Some(Movement::StockOut {
                quantity: log.quantity,
                source: log.source,
            })
        }
        MovementType::Adjust => {
            let (Some(field), Some(old_value), Some(new_value)) = (log.adjustment_field, log.old_value, log.new_value)
            else {
                warn("adjustment without field or values; skipped".to_string());
                return None;
            };
            Some(Movement::Correction(Correction {
                field,
                old_value,
                new_value,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewStockLog, OutboundChannel, ReturnCondition};
    use chrono::{NaiveDate, Utc};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn record(seq: i64, entry: NewStockLog) -> StockLog {
        StockLog {
            id: Uuid::from_u128(seq as u128),
            seq,
            product_id: entry.product_id,
            actor_id: entry.actor_id,
            movement_type: entry.movement_type,
            stock_type: entry.stock_type,
            is_opening: entry.is_opening,
            condition: entry.condition,
            adjustment_direction: entry.adjustment_direction,
            adjustment_field: entry.adjustment_field,
            old_value: entry.old_value,
            new_value: entry.new_value,
            reason: entry.reason,
            quantity: entry.quantity,
            date: entry.date,
            invoice_reference: entry.invoice_reference,
            purchase_price: entry.purchase_price,
            document_url: entry.document_url,
            source: entry.source,
            remarks: entry.remarks,
            created_at: Utc::now(),
        }
    }

    const PRODUCT: Uuid = Uuid::from_u128(7);

    fn purchase(seq: i64, qty: i64, price: &str) -> StockLog {
        record(
            seq,
            NewStockLog::purchase(PRODUCT, Uuid::nil(), qty, dec(price), "INV-1".into(), None, date()),
        )
    }

    #[test]
    fn test_replay_matches_live_ledger() {
        let mut live = InventoryLedger::open(PRODUCT, 4, dec("10")).unwrap();
        let mut logs = vec![record(1, NewStockLog::opening(PRODUCT, Uuid::nil(), 4, dec("10"), date()))];

        live.stock_in(6, StockInKind::New { price: dec("20") }).unwrap();
        logs.push(purchase(2, 6, "20"));
        live.stock_out(3, OutboundChannel::Marketplace).unwrap();
        logs.push(record(
            3,
            NewStockLog::stock_out(PRODUCT, Uuid::nil(), 3, OutboundChannel::Marketplace, date()),
        ));
        live.stock_in(2, StockInKind::Return).unwrap();
        logs.push(record(
            4,
            NewStockLog::customer_return(PRODUCT, Uuid::nil(), 2, ReturnCondition::Damaged, String::new(), date()),
        ));
        let correction = live.correct_opening_qty(6).unwrap().unwrap();
        logs.push(record(5, NewStockLog::adjustment(PRODUCT, Uuid::nil(), &correction, "recount".into(), date())));
        live.stock_in(1, StockInKind::New { price: dec("31") }).unwrap();
        logs.push(purchase(6, 1, "31"));

        let outcome = replay(PRODUCT, live.opening_qty, &logs).unwrap();
        assert_eq!(outcome.ledger, live);
        assert_eq!(outcome.entries_replayed, 6);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_replay_orders_by_seq_not_position() {
        let logs = vec![purchase(2, 10, "200"), purchase(1, 10, "100")];
        let outcome = replay(PRODUCT, 0, &logs).unwrap();
        assert_eq!(outcome.ledger.quantity, 20);
        assert_eq!(outcome.ledger.avg_purchase_price, dec("150"));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let logs = vec![purchase(1, 3, "9.99"), purchase(2, 7, "4.10")];
        let first = replay(PRODUCT, 2, &logs).unwrap();
        let second = replay(PRODUCT, first.ledger.opening_qty, &logs).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_legacy_entries_are_reported_not_fatal() {
        let mut legacy_in = purchase(1, 5, "8");
        legacy_in.stock_type = None;
        let mut legacy_out = record(
            2,
            NewStockLog::stock_out(PRODUCT, Uuid::nil(), 2, OutboundChannel::Others, date()),
        );
        legacy_out.source = None;

        let outcome = replay(PRODUCT, 0, &[legacy_in, legacy_out]).unwrap();
        assert_eq!(outcome.ledger.quantity, 3);
        assert_eq!(outcome.ledger.avg_purchase_price, dec("8"));
        assert_eq!(outcome.ledger.others_out_total, 0);
        assert_eq!(outcome.warnings.len(), 2);
        assert_eq!(outcome.warnings[1].seq, 2);
    }

    #[test]
    fn test_replay_rejects_history_that_goes_negative() {
        let out = record(
            1,
            NewStockLog::stock_out(PRODUCT, Uuid::nil(), 5, OutboundChannel::Others, date()),
        );
        let err = replay(PRODUCT, 2, &[out]).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[test]
    fn test_replay_ignores_other_products() {
        let mut foreign = purchase(1, 50, "1");
        foreign.product_id = Uuid::from_u128(99);
        let outcome = replay(PRODUCT, 1, &[foreign]).unwrap();
        assert_eq!(outcome.ledger.quantity, 1);
        assert_eq!(outcome.entries_replayed, 0);
    }
}

//! Inventory ledger state and movement arithmetic
//!
//! All quantity and cost changes go through [`InventoryLedger::apply`], both
//! for live operations and for replay, so the two paths cannot drift.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{AdjustmentDirection, AdjustmentField, OutboundChannel};
use crate::validation::{MAX_PRICE, MAX_STOCK_VALUE};

/// Failures raised by pure ledger arithmetic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: &'static str,
    },

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),
}

/// Current stock state of one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLedger {
    pub product_id: Uuid,
    /// Baseline established at first stocking
    pub opening_qty: i64,
    /// On-hand count; never negative
    pub quantity: i64,
    /// Weighted average cost of NEW stock-ins
    pub avg_purchase_price: Decimal,
    /// `quantity * avg_purchase_price`
    pub total_value: Decimal,
    /// IN quantities excluding the opening entry
    pub qty_in_total: i64,
    pub marketplace_out_total: i64,
    pub others_out_total: i64,
}

/// How a stock-in enters inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockInKind {
    New { price: Decimal },
    Return,
}

/// A before/after record of a corrected field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    pub field: AdjustmentField,
    pub old_value: Decimal,
    pub new_value: Decimal,
}

impl Correction {
    pub fn direction(&self) -> AdjustmentDirection {
        if self.new_value >= self.old_value {
            AdjustmentDirection::Increase
        } else {
            AdjustmentDirection::Decrease
        }
    }

    /// Quantity recorded on the ADJUST entry.
    ///
    /// Log quantities are at least 1, so price corrections and sub-unit
    /// deltas are recorded as 1; the exact change lives in old/new values.
    pub fn log_quantity(&self) -> i64 {
        match self.field {
            AdjustmentField::OpeningPrice => 1,
            AdjustmentField::OpeningQty | AdjustmentField::MinStock => {
                let delta = (self.new_value - self.old_value).abs().trunc();
                i64::try_from(delta).unwrap_or(i64::MAX).max(1)
            }
        }
    }

    /// Signed whole-unit delta for quantity-type corrections
    pub fn quantity_delta(&self) -> Result<i64, LedgerError> {
        whole_units(self.new_value - self.old_value)
    }
}

/// One state transition of a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    /// Opening entry: sets the cost basis of the opening quantity
    Opening { price: Decimal },
    StockIn { quantity: i64, kind: StockInKind },
    /// `source` is `None` only for legacy entries
    StockOut {
        quantity: i64,
        source: Option<OutboundChannel>,
    },
    Correction(Correction),
}

/// Round a monetary amount to 2 decimal places, midpoint away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Quantity-weighted blend of the existing cost and an incoming purchase
pub fn weighted_average(old_qty: i64, old_avg: Decimal, in_qty: i64, price: Decimal) -> Result<Decimal, LedgerError> {
    let total_qty = Decimal::from(old_qty) + Decimal::from(in_qty);
    if total_qty <= Decimal::ZERO {
        return Ok(old_avg);
    }
    let total_cost = Decimal::from(old_qty)
        .checked_mul(old_avg)
        .zip(Decimal::from(in_qty).checked_mul(price))
        .and_then(|(held, incoming)| held.checked_add(incoming))
        .ok_or(VALUE_OUT_OF_RANGE)?;
    Ok(round_money(total_cost / total_qty))
}

/// `quantity * price` rounded to cents, within what storage can hold
pub fn stock_value(quantity: i64, price: Decimal) -> Result<Decimal, LedgerError> {
    match Decimal::from(quantity).checked_mul(price).map(round_money) {
        Some(value) if value <= MAX_STOCK_VALUE => Ok(value),
        _ => Err(VALUE_OUT_OF_RANGE),
    }
}

const VALUE_OUT_OF_RANGE: LedgerError = LedgerError::Validation {
    field: "quantity",
    message: "Stock value exceeds the supported range",
};

/// Reject prices storage cannot hold and round the rest to cents
fn money_price(field: &'static str, price: Decimal) -> Result<Decimal, LedgerError> {
    if price < Decimal::ZERO {
        return Err(LedgerError::Validation {
            field,
            message: "Price cannot be negative",
        });
    }
    if price > MAX_PRICE {
        return Err(LedgerError::Validation {
            field,
            message: "Price must be at most 999999999999.99",
        });
    }
    Ok(round_money(price))
}

impl InventoryLedger {
    /// Create the ledger for a newly stocked product.
    ///
    /// The opening price only takes effect when there is opening stock.
    pub fn open(product_id: Uuid, opening_qty: i64, opening_price: Decimal) -> Result<Self, LedgerError> {
        if opening_qty < 0 {
            return Err(LedgerError::Validation {
                field: "opening_qty",
                message: "Opening quantity cannot be negative",
            });
        }
        let opening_price = money_price("opening_price", opening_price)?;

        let mut ledger = Self::baseline(product_id, opening_qty);
        if opening_qty > 0 {
            ledger.apply(&Movement::Opening { price: opening_price })?;
        }
        Ok(ledger)
    }

    /// Empty cost state at the given opening quantity; the starting point of replay
    pub fn baseline(product_id: Uuid, opening_qty: i64) -> Self {
        Self {
            product_id,
            opening_qty,
            quantity: opening_qty,
            avg_purchase_price: Decimal::ZERO,
            total_value: Decimal::ZERO,
            qty_in_total: 0,
            marketplace_out_total: 0,
            others_out_total: 0,
        }
    }

    pub fn is_low_stock(&self, min_stock: i64) -> bool {
        self.quantity <= min_stock
    }

    /// Apply one movement, leaving `self` untouched on error
    pub fn apply(&mut self, movement: &Movement) -> Result<(), LedgerError> {
        let mut next = self.clone();

        match *movement {
            Movement::Opening { price } => {
                next.avg_purchase_price = money_price("purchase_price", price)?;
            }
            Movement::StockIn { quantity, kind } => {
                require_positive(quantity)?;
                if let StockInKind::New { price } = kind {
                    // Logged purchase prices hold cents only
                    let price = money_price("purchase_price", price)?;
                    next.avg_purchase_price =
                        weighted_average(self.quantity, self.avg_purchase_price, quantity, price)?;
                }
                next.quantity = checked_add(self.quantity, quantity)?;
                next.qty_in_total = checked_add(self.qty_in_total, quantity)?;
            }
            Movement::StockOut { quantity, source } => {
                require_positive(quantity)?;
                if self.quantity < quantity {
                    return Err(LedgerError::InsufficientStock {
                        requested: quantity,
                        available: self.quantity,
                    });
                }
                next.quantity = self.quantity - quantity;
                match source {
                    Some(OutboundChannel::Marketplace) => {
                        next.marketplace_out_total = checked_add(self.marketplace_out_total, quantity)?;
                    }
                    Some(OutboundChannel::Others) => {
                        next.others_out_total = checked_add(self.others_out_total, quantity)?;
                    }
                    None => {}
                }
            }
            Movement::Correction(correction) => match correction.field {
                AdjustmentField::OpeningQty => {
                    let delta = correction.quantity_delta()?;
                    let new_opening = whole_units(correction.new_value)?;
                    if new_opening < 0 {
                        return Err(LedgerError::Validation {
                            field: "opening_qty",
                            message: "Opening quantity cannot be negative",
                        });
                    }
                    let quantity = checked_add(self.quantity, delta)?;
                    if quantity < 0 {
                        return Err(LedgerError::InsufficientStock {
                            requested: -delta,
                            available: self.quantity,
                        });
                    }
                    next.opening_qty = new_opening;
                    next.quantity = quantity;
                }
                AdjustmentField::OpeningPrice => {
                    next.avg_purchase_price = money_price("opening_price", correction.new_value)?;
                }
                AdjustmentField::MinStock => {}
            },
        }

        if next.quantity < 0 {
            return Err(LedgerError::InvariantViolation(format!(
                "quantity for product {} would become {}",
                self.product_id, next.quantity
            )));
        }

        next.total_value = stock_value(next.quantity, next.avg_purchase_price)?;
        *self = next;
        Ok(())
    }

    /// Stock-in with weighted-average or return semantics
    pub fn stock_in(&mut self, quantity: i64, kind: StockInKind) -> Result<(), LedgerError> {
        self.apply(&Movement::StockIn { quantity, kind })
    }

    pub fn stock_out(&mut self, quantity: i64, source: OutboundChannel) -> Result<(), LedgerError> {
        self.apply(&Movement::StockOut {
            quantity,
            source: Some(source),
        })
    }

    /// Overwrite the opening quantity, shifting on-hand stock by the same delta.
    ///
    /// Returns `None` when the value is unchanged.
    pub fn correct_opening_qty(&mut self, new_opening: i64) -> Result<Option<Correction>, LedgerError> {
        if new_opening < 0 {
            return Err(LedgerError::Validation {
                field: "opening_qty",
                message: "Opening quantity cannot be negative",
            });
        }
        if new_opening == self.opening_qty {
            return Ok(None);
        }
        let correction = Correction {
            field: AdjustmentField::OpeningQty,
            old_value: Decimal::from(self.opening_qty),
            new_value: Decimal::from(new_opening),
        };
        self.apply(&Movement::Correction(correction))?;
        Ok(Some(correction))
    }

    /// Overwrite the average purchase price without weighting.
    ///
    /// Returns `None` when the rounded value is unchanged.
    pub fn correct_opening_price(&mut self, new_price: Decimal) -> Result<Option<Correction>, LedgerError> {
        let new_price = money_price("opening_price", new_price)?;
        if new_price == self.avg_purchase_price {
            return Ok(None);
        }
        let correction = Correction {
            field: AdjustmentField::OpeningPrice,
            old_value: self.avg_purchase_price,
            new_value: new_price,
        };
        self.apply(&Movement::Correction(correction))?;
        Ok(Some(correction))
    }
}

/// Correction record for a catalog reorder threshold change; `None` if unchanged
pub fn min_stock_correction(old: i64, new: i64) -> Result<Option<Correction>, LedgerError> {
    if new < 0 {
        return Err(LedgerError::Validation {
            field: "min_stock",
            message: "Minimum stock cannot be negative",
        });
    }
    if old == new {
        return Ok(None);
    }
    Ok(Some(Correction {
        field: AdjustmentField::MinStock,
        old_value: Decimal::from(old),
        new_value: Decimal::from(new),
    }))
}

fn require_positive(quantity: i64) -> Result<(), LedgerError> {
    if quantity <= 0 {
        return Err(LedgerError::Validation {
            field: "quantity",
            message: "Quantity must be at least 1",
        });
    }
    Ok(())
}

fn whole_units(value: Decimal) -> Result<i64, LedgerError> {
    if !value.fract().is_zero() {
        return Err(LedgerError::InvariantViolation(format!(
            "{} is not a whole quantity",
            value
        )));
    }
    i64::try_from(value)
        .map_err(|_| LedgerError::InvariantViolation(format!("{} is out of quantity range", value)))
}

fn checked_add(a: i64, b: i64) -> Result<i64, LedgerError> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::InvariantViolation(format!("quantity overflow adding {} to {}", b, a)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn empty() -> InventoryLedger {
        InventoryLedger::open(Uuid::nil(), 0, Decimal::ZERO).unwrap()
    }

    #[test]
    fn test_weighted_average_two_purchases() {
        let mut ledger = empty();
        ledger.stock_in(10, StockInKind::New { price: dec("100") }).unwrap();
        assert_eq!(ledger.quantity, 10);
        assert_eq!(ledger.avg_purchase_price, dec("100"));

        ledger.stock_in(10, StockInKind::New { price: dec("200") }).unwrap();
        assert_eq!(ledger.quantity, 20);
        assert_eq!(ledger.avg_purchase_price, dec("150.00"));
        assert_eq!(ledger.total_value, dec("3000"));
    }

    #[test]
    fn test_return_keeps_average() {
        let mut ledger = empty();
        ledger.stock_in(10, StockInKind::New { price: dec("100") }).unwrap();
        ledger.stock_in(10, StockInKind::New { price: dec("200") }).unwrap();
        ledger.stock_in(5, StockInKind::Return).unwrap();
        assert_eq!(ledger.quantity, 25);
        assert_eq!(ledger.avg_purchase_price, dec("150"));
        assert_eq!(ledger.total_value, dec("3750"));
    }

    #[test]
    fn test_average_rounds_to_cents() {
        let mut ledger = InventoryLedger::open(Uuid::nil(), 3, dec("10")).unwrap();
        ledger.stock_in(3, StockInKind::New { price: dec("10.01") }).unwrap();
        // (30 + 30.03) / 6 = 10.005 -> 10.01
        assert_eq!(ledger.avg_purchase_price, dec("10.01"));
    }

    #[test]
    fn test_stock_out_insufficient_leaves_ledger_unchanged() {
        let mut ledger = InventoryLedger::open(Uuid::nil(), 5, dec("20")).unwrap();
        let before = ledger.clone();
        let err = ledger.stock_out(6, OutboundChannel::Marketplace).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientStock { requested: 6, available: 5 });
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_stock_out_keeps_average_and_counts_channel() {
        let mut ledger = InventoryLedger::open(Uuid::nil(), 10, dec("20")).unwrap();
        ledger.stock_out(4, OutboundChannel::Others).unwrap();
        assert_eq!(ledger.quantity, 6);
        assert_eq!(ledger.avg_purchase_price, dec("20"));
        assert_eq!(ledger.total_value, dec("120"));
        assert_eq!(ledger.others_out_total, 4);
        assert_eq!(ledger.marketplace_out_total, 0);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut ledger = empty();
        assert!(matches!(
            ledger.stock_in(0, StockInKind::Return),
            Err(LedgerError::Validation { field: "quantity", .. })
        ));
        assert!(ledger.stock_out(0, OutboundChannel::Others).is_err());
    }

    #[test]
    fn test_open_without_stock_ignores_price() {
        let ledger = InventoryLedger::open(Uuid::nil(), 0, dec("99")).unwrap();
        assert_eq!(ledger.avg_purchase_price, Decimal::ZERO);
        assert_eq!(ledger.total_value, Decimal::ZERO);
    }

    #[test]
    fn test_open_with_stock_sets_value() {
        let ledger = InventoryLedger::open(Uuid::nil(), 4, dec("12.5")).unwrap();
        assert_eq!(ledger.quantity, 4);
        assert_eq!(ledger.opening_qty, 4);
        assert_eq!(ledger.total_value, dec("50"));
        assert_eq!(ledger.qty_in_total, 0);
    }

    #[test]
    fn test_correct_opening_qty_shifts_quantity() {
        let mut ledger = InventoryLedger::open(Uuid::nil(), 10, dec("5")).unwrap();
        ledger.stock_out(3, OutboundChannel::Marketplace).unwrap();
        let correction = ledger.correct_opening_qty(8).unwrap().unwrap();
        assert_eq!(correction.direction(), AdjustmentDirection::Decrease);
        assert_eq!(correction.log_quantity(), 2);
        assert_eq!(ledger.opening_qty, 8);
        assert_eq!(ledger.quantity, 5);
        assert_eq!(ledger.total_value, dec("25"));
    }

    #[test]
    fn test_correct_opening_qty_cannot_go_negative() {
        let mut ledger = InventoryLedger::open(Uuid::nil(), 10, dec("5")).unwrap();
        ledger.stock_out(9, OutboundChannel::Marketplace).unwrap();
        let before = ledger.clone();
        assert!(matches!(
            ledger.correct_opening_qty(5),
            Err(LedgerError::InsufficientStock { .. })
        ));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_zero_delta_corrections_are_noops() {
        let mut ledger = InventoryLedger::open(Uuid::nil(), 10, dec("5")).unwrap();
        assert_eq!(ledger.correct_opening_qty(10).unwrap(), None);
        assert_eq!(ledger.correct_opening_price(dec("5.000")).unwrap(), None);
        assert_eq!(min_stock_correction(3, 3).unwrap(), None);
    }

    #[test]
    fn test_correct_opening_price_overwrites_average() {
        let mut ledger = InventoryLedger::open(Uuid::nil(), 10, dec("5")).unwrap();
        ledger.stock_in(10, StockInKind::New { price: dec("15") }).unwrap();
        assert_eq!(ledger.avg_purchase_price, dec("10"));

        let correction = ledger.correct_opening_price(dec("7.255")).unwrap().unwrap();
        assert_eq!(correction.log_quantity(), 1);
        assert_eq!(correction.direction(), AdjustmentDirection::Decrease);
        assert_eq!(ledger.avg_purchase_price, dec("7.26"));
        assert_eq!(ledger.total_value, dec("145.20"));
        assert_eq!(ledger.quantity, 20);
    }

    #[test]
    fn test_min_stock_correction_direction() {
        let correction = min_stock_correction(2, 9).unwrap().unwrap();
        assert_eq!(correction.direction(), AdjustmentDirection::Increase);
        assert_eq!(correction.log_quantity(), 7);
        assert!(min_stock_correction(2, -1).is_err());
    }

    #[test]
    fn test_purchase_price_rounded_before_averaging() {
        let mut ledger = InventoryLedger::open(Uuid::nil(), 1, dec("10")).unwrap();
        ledger.stock_in(1, StockInKind::New { price: dec("0.005") }).unwrap();
        // 0.005 is kept as 0.01, so (10 + 0.01) / 2 = 5.005 -> 5.01
        assert_eq!(ledger.avg_purchase_price, dec("5.01"));
        assert_eq!(ledger.total_value, dec("10.02"));
    }

    #[test]
    fn test_open_rounds_price_like_purchases() {
        let ledger = InventoryLedger::open(Uuid::nil(), 3, dec("1.005")).unwrap();
        assert_eq!(ledger.avg_purchase_price, dec("1.01"));
    }

    #[test]
    fn test_oversized_values_are_rejected_not_panicking() {
        let err = InventoryLedger::open(Uuid::nil(), i64::MAX, dec("100000000000")).unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "quantity", .. }));

        assert!(matches!(
            InventoryLedger::open(Uuid::nil(), 1, dec("1000000000000")),
            Err(LedgerError::Validation { field: "opening_price", .. })
        ));

        let mut ledger = InventoryLedger::open(Uuid::nil(), 10, dec("999999999999.99")).unwrap();
        let before = ledger.clone();
        assert!(ledger
            .stock_in(i64::MAX - 10, StockInKind::New { price: dec("999999999999.99") })
            .is_err());
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_weighted_average_overflow_is_an_error() {
        assert!(weighted_average(i64::MAX, Decimal::MAX, 1, dec("1")).is_err());
        assert_eq!(weighted_average(0, Decimal::ZERO, 0, dec("5")).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_low_stock_threshold_inclusive() {
        let ledger = InventoryLedger::open(Uuid::nil(), 5, Decimal::ZERO).unwrap();
        assert!(ledger.is_low_stock(5));
        assert!(!ledger.is_low_stock(4));
    }
}

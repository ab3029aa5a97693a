//! Stock movement log models
//!
//! Log entries are append-only. Replaying a product's entries in recording
//! order reproduces its ledger (see [`crate::replay`]).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of stock movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
    Adjust,
}

/// Origin of incoming stock
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum StockType {
    /// Purchased stock; feeds the weighted average
    New,
    /// Customer return; re-enters at the existing cost basis
    Return,
}

/// Condition of returned goods
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReturnCondition {
    #[default]
    Good,
    Damaged,
}

/// Outbound sales channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboundChannel {
    Marketplace,
    Others,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdjustmentDirection {
    Increase,
    Decrease,
}

/// Ledger or catalog field changed by a correction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentField {
    OpeningQty,
    OpeningPrice,
    MinStock,
}

macro_rules! text_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(MovementType { In => "IN", Out => "OUT", Adjust => "ADJUST" });
text_enum!(StockType { New => "NEW", Return => "RETURN" });
text_enum!(ReturnCondition { Good => "GOOD", Damaged => "DAMAGED" });
text_enum!(OutboundChannel { Marketplace => "MARKETPLACE", Others => "OTHERS" });
text_enum!(AdjustmentDirection { Increase => "INCREASE", Decrease => "DECREASE" });
text_enum!(AdjustmentField {
    OpeningQty => "OPENING_QTY",
    OpeningPrice => "OPENING_PRICE",
    MinStock => "MIN_STOCK",
});

/// A recorded stock movement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockLog {
    pub id: Uuid,
    /// Recording order; replay follows this, not `date`
    pub seq: i64,
    pub product_id: Uuid,
    pub actor_id: Uuid,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// `None` only for entries written before stock types existed
    pub stock_type: Option<StockType>,
    /// Marks the entry that established the opening baseline
    pub is_opening: bool,
    pub condition: Option<ReturnCondition>,
    pub adjustment_direction: Option<AdjustmentDirection>,
    pub adjustment_field: Option<AdjustmentField>,
    pub old_value: Option<Decimal>,
    pub new_value: Option<Decimal>,
    pub reason: String,
    pub quantity: i64,
    pub date: NaiveDate,
    pub invoice_reference: String,
    pub purchase_price: Option<Decimal>,
    pub document_url: Option<String>,
    pub source: Option<OutboundChannel>,
    pub remarks: String,
    pub created_at: DateTime<Utc>,
}

/// A log entry waiting to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewStockLog {
    pub product_id: Uuid,
    pub actor_id: Uuid,
    pub movement_type: MovementType,
    pub stock_type: Option<StockType>,
    pub is_opening: bool,
    pub condition: Option<ReturnCondition>,
    pub adjustment_direction: Option<AdjustmentDirection>,
    pub adjustment_field: Option<AdjustmentField>,
    pub old_value: Option<Decimal>,
    pub new_value: Option<Decimal>,
    pub reason: String,
    pub quantity: i64,
    pub date: NaiveDate,
    pub invoice_reference: String,
    pub purchase_price: Option<Decimal>,
    pub document_url: Option<String>,
    pub source: Option<OutboundChannel>,
    pub remarks: String,
}

impl NewStockLog {
    fn base(product_id: Uuid, actor_id: Uuid, movement_type: MovementType, quantity: i64, date: NaiveDate) -> Self {
        Self {
            product_id,
            actor_id,
            movement_type,
            stock_type: None,
            is_opening: false,
            condition: None,
            adjustment_direction: None,
            adjustment_field: None,
            old_value: None,
            new_value: None,
            reason: String::new(),
            quantity,
            date,
            invoice_reference: String::new(),
            purchase_price: None,
            document_url: None,
            source: None,
            remarks: String::new(),
        }
    }

    /// Opening stock entry written when a product is first stocked
    pub fn opening(product_id: Uuid, actor_id: Uuid, quantity: i64, price: Decimal, date: NaiveDate) -> Self {
        Self {
            stock_type: Some(StockType::New),
            is_opening: true,
            purchase_price: Some(price),
            remarks: "Opening stock".to_string(),
            ..Self::base(product_id, actor_id, MovementType::In, quantity, date)
        }
    }

    pub fn purchase(
        product_id: Uuid,
        actor_id: Uuid,
        quantity: i64,
        price: Decimal,
        invoice_reference: String,
        document_url: Option<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            stock_type: Some(StockType::New),
            purchase_price: Some(price),
            invoice_reference,
            document_url,
            ..Self::base(product_id, actor_id, MovementType::In, quantity, date)
        }
    }

    pub fn customer_return(
        product_id: Uuid,
        actor_id: Uuid,
        quantity: i64,
        condition: ReturnCondition,
        remarks: String,
        date: NaiveDate,
    ) -> Self {
        Self {
            stock_type: Some(StockType::Return),
            condition: Some(condition),
            remarks,
            ..Self::base(product_id, actor_id, MovementType::In, quantity, date)
        }
    }

    pub fn stock_out(product_id: Uuid, actor_id: Uuid, quantity: i64, source: OutboundChannel, date: NaiveDate) -> Self {
        Self {
            source: Some(source),
            ..Self::base(product_id, actor_id, MovementType::Out, quantity, date)
        }
    }

    pub fn adjustment(
        product_id: Uuid,
        actor_id: Uuid,
        correction: &super::Correction,
        reason: String,
        date: NaiveDate,
    ) -> Self {
        Self {
            adjustment_direction: Some(correction.direction()),
            adjustment_field: Some(correction.field),
            old_value: Some(correction.old_value),
            new_value: Some(correction.new_value),
            reason,
            ..Self::base(product_id, actor_id, MovementType::Adjust, correction.log_quantity(), date)
        }
    }
}

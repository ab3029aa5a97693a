//! WebAssembly module for the inventory tracker
//!
//! Provides client-side previews for:
//! - Product identity keys and SKU formats
//! - Weighted-average cost after a purchase
//! - Stock-out availability
//! - Offline import row validation

use std::str::FromStr;

use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

use shared::import::{validate_row, RawImportRow};

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Set up panic hook for better error messages in browser console
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Normalized identity key used to detect duplicate products
#[wasm_bindgen]
pub fn compute_unique_key(name: &str, variant: &str, category: &str, unit: &str) -> Result<String, JsValue> {
    unique_key_for(name, variant, category, unit).map_err(|e| JsValue::from_str(&e))
}

/// What a SKU for this category and variant will look like at `sequence`
#[wasm_bindgen]
pub fn preview_sku(category: &str, variant: &str, sequence: u32) -> String {
    SkuPrefix::new(category, variant).format(i64::from(sequence))
}

/// Average purchase price after receiving `in_qty` units at `price`
#[wasm_bindgen]
pub fn preview_weighted_average(old_qty: u32, old_avg: &str, in_qty: u32, price: &str) -> Result<String, JsValue> {
    average_after_purchase(old_qty, old_avg, in_qty, price).map_err(|e| JsValue::from_str(&e))
}

/// Whether `requested` units can ship from `on_hand`
#[wasm_bindgen]
pub fn can_stock_out(on_hand: u32, requested: u32) -> bool {
    requested >= 1 && requested <= on_hand
}

/// Whether a movement dated `date` (YYYY-MM-DD) is allowed today
#[wasm_bindgen]
pub fn is_valid_movement_date(date: &str) -> bool {
    let now = js_sys::Date::new_0();
    let today = (now.get_full_year(), now.get_month() + 1, now.get_date());
    date_parts(date).map_or(false, |date| date <= today)
}

/// Validate one import row given as JSON; returns the normalized row as JSON
#[wasm_bindgen]
pub fn validate_import_row(row_json: &str, index: u32) -> Result<String, JsValue> {
    check_import_row(row_json, index as usize).map_err(|e| JsValue::from_str(&e))
}

fn unique_key_for(name: &str, variant: &str, category: &str, unit: &str) -> Result<String, String> {
    let unit = match unit.trim() {
        "" => Unit::default(),
        other => Unit::parse(other).ok_or_else(|| format!("Unknown unit '{}'", other))?,
    };
    validate_product_name(name).map_err(str::to_string)?;
    Ok(unique_key(name, variant, category, unit))
}

fn average_after_purchase(old_qty: u32, old_avg: &str, in_qty: u32, price: &str) -> Result<String, String> {
    let old_avg = Decimal::from_str(old_avg.trim()).map_err(|e| format!("Invalid average price: {}", e))?;
    let price = Decimal::from_str(price.trim()).map_err(|e| format!("Invalid price: {}", e))?;
    validate_price(price).map_err(str::to_string)?;
    weighted_average(i64::from(old_qty), old_avg, i64::from(in_qty), round_money(price))
        .map(|average| average.to_string())
        .map_err(|e| e.to_string())
}

fn check_import_row(row_json: &str, index: usize) -> Result<String, String> {
    let raw: RawImportRow = serde_json::from_str(row_json).map_err(|e| format!("Invalid row JSON: {}", e))?;
    let row = validate_row(&raw, index).map_err(|issue| format!("Row {}: {}", issue.row_number, issue.reason))?;
    serde_json::to_string(&row).map_err(|e| e.to_string())
}

/// (year, month, day) from a YYYY-MM-DD string
fn date_parts(date: &str) -> Option<(u32, u32, u32)> {
    let mut parts = date.trim().splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some((year, month, day))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_key_normalizes() {
        assert_eq!(
            unique_key_for(" Blue Mug ", "Large", "Kitchen", "pcs").unwrap(),
            "blue mug|large|kitchen|pcs"
        );
        assert!(unique_key_for("Mug", "", "", "crate").is_err());
        assert!(unique_key_for("  ", "", "", "").is_err());
    }

    #[test]
    fn test_preview_sku() {
        assert_eq!(preview_sku("Kitchen", "Blue", 7), "KITC-BL-0007");
    }

    #[test]
    fn test_average_after_purchase() {
        assert_eq!(average_after_purchase(10, "100", 10, "200").unwrap(), "150.00");
        assert!(average_after_purchase(10, "100", 10, "-1").is_err());
        assert_eq!(average_after_purchase(1, "10", 1, "0.005").unwrap(), "5.01");
        assert!(average_after_purchase(10, "100", 10, "1000000000000").is_err());
    }

    #[test]
    fn test_can_stock_out() {
        assert!(can_stock_out(5, 5));
        assert!(!can_stock_out(5, 6));
        assert!(!can_stock_out(5, 0));
    }

    #[test]
    fn test_check_import_row() {
        let row = check_import_row(r#"{"name": "Mug", "opening_qty": "4"}"#, 0).unwrap();
        assert!(row.contains("\"opening_qty\":4"));
        let err = check_import_row(r#"{"name": ""}"#, 1).unwrap_err();
        assert!(err.starts_with("Row 3"));
    }

    #[test]
    fn test_date_parts() {
        assert_eq!(date_parts("2024-03-09"), Some((2024, 3, 9)));
        assert_eq!(date_parts("2024-13-01"), None);
        assert!(date_parts("2024-03-09") < date_parts("2024-11-01"));
    }
}

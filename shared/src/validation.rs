//! Input validation for the inventory service

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Longest accepted product name
pub const MAX_NAME_LEN: usize = 200;
/// Longest accepted category, variant, invoice reference or reason
pub const MAX_LABEL_LEN: usize = 100;
/// Largest unit price storage holds, `NUMERIC(14,2)`: 999 999 999 999.99
pub const MAX_PRICE: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);
/// Largest stock value storage holds, `NUMERIC(16,2)`: 99 999 999 999 999.99
pub const MAX_STOCK_VALUE: Decimal = Decimal::from_parts(1_874_919_423, 2_328_306, 0, false, 2);

// ============================================================================
// Catalog Validations
// ============================================================================

/// Validate a product name is present and not excessively long
pub fn validate_product_name(name: &str) -> Result<(), &'static str> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Product name is required");
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err("Product name must be at most 200 characters");
    }
    Ok(())
}

/// Validate an optional short label (category, variant)
pub fn validate_label(label: &str) -> Result<(), &'static str> {
    if label.trim().chars().count() > MAX_LABEL_LEN {
        return Err("Value must be at most 100 characters");
    }
    Ok(())
}

/// Validate a reorder threshold
pub fn validate_min_stock(min_stock: i64) -> Result<(), &'static str> {
    if min_stock < 0 {
        return Err("Minimum stock cannot be negative");
    }
    Ok(())
}

// ============================================================================
// Movement Validations
// ============================================================================

/// Validate a movement quantity (log entries always move at least one unit)
pub fn validate_movement_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity < 1 {
        return Err("Quantity must be at least 1");
    }
    Ok(())
}

/// Validate an opening quantity
pub fn validate_opening_qty(quantity: i64) -> Result<(), &'static str> {
    if quantity < 0 {
        return Err("Opening quantity cannot be negative");
    }
    Ok(())
}

/// Validate a unit purchase price
pub fn validate_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Price cannot be negative");
    }
    if price > MAX_PRICE {
        return Err("Price must be at most 999999999999.99");
    }
    Ok(())
}

/// Validate that `quantity` units at `price` fit the stored stock value
pub fn validate_stock_value(quantity: i64, price: Decimal) -> Result<(), &'static str> {
    match Decimal::from(quantity).checked_mul(price) {
        Some(value) if value.abs() <= MAX_STOCK_VALUE => Ok(()),
        _ => Err("Stock value exceeds the supported range"),
    }
}

/// Validate an invoice reference for purchased stock
pub fn validate_invoice_reference(reference: &str) -> Result<(), &'static str> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err("Invoice reference is required for new stock");
    }
    if reference.chars().count() > MAX_LABEL_LEN {
        return Err("Invoice reference must be at most 100 characters");
    }
    Ok(())
}

/// Validate a movement is not dated in the future (today is allowed)
pub fn validate_not_future(date: NaiveDate, today: NaiveDate) -> Result<(), &'static str> {
    if date > today {
        return Err("Movement date cannot be in the future");
    }
    Ok(())
}

/// Validate a correction reason
pub fn validate_reason(reason: &str) -> Result<(), &'static str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err("A reason is required for corrections");
    }
    if reason.chars().count() > 500 {
        return Err("Reason must be at most 500 characters");
    }
    Ok(())
}

/// Validate a history filter range
pub fn validate_date_range(from: NaiveDate, to: NaiveDate) -> Result<(), &'static str> {
    if from > to {
        return Err("Start date must not be after end date");
    }
    Ok(())
}

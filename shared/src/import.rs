//! Bulk CSV import: row validation and batch planning
//!
//! Rows are validated one by one, so a bad row only fails itself. Valid rows
//! are then matched against the catalog by unique key. Opening stock is a
//! one-time event: a row for a product that already exists can only change
//! its minimum stock.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{unique_key, Unit};
use crate::validation::{validate_label, validate_price, validate_product_name, validate_stock_value};

/// Data rows start on line 2, after the header
pub const HEADER_OFFSET: usize = 2;

/// A CSV record as read, before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImportRow {
    pub name: Option<String>,
    pub category: Option<String>,
    pub variant: Option<String>,
    pub unit: Option<String>,
    pub min_stock: Option<String>,
    pub opening_qty: Option<String>,
    pub opening_price: Option<String>,
}

/// Canonical field name for a CSV header cell.
///
/// Matching ignores case, spaces, underscores and hyphens, so "Min Stock",
/// "minStock" and "min_stock" all land on the same column.
pub fn normalize_header(header: &str) -> String {
    let compact: String = header
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect();

    match compact.as_str() {
        "minstock" | "minimumstock" | "reorderlevel" => "min_stock".to_string(),
        "openingqty" | "openingquantity" | "quantity" | "qty" => "opening_qty".to_string(),
        "openingprice" | "price" | "purchaseprice" => "opening_price".to_string(),
        _ => compact,
    }
}

/// A validated import row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRow {
    /// 1-indexed line number in the uploaded file
    pub row_number: usize,
    pub name: String,
    pub category: String,
    pub variant: String,
    pub unit: Unit,
    pub min_stock: i64,
    pub opening_qty: i64,
    pub opening_price: Decimal,
    pub unique_key: String,
}

/// Why a row was not applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub row_number: usize,
    pub reason: String,
}

impl RowIssue {
    pub fn new(row_number: usize, reason: impl Into<String>) -> Self {
        Self {
            row_number,
            reason: reason.into(),
        }
    }
}

/// Catalog state relevant to planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingProduct {
    pub product_id: Uuid,
    pub min_stock: i64,
}

/// What to do with one valid row
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    Create(ImportRow),
    UpdateMinStock {
        product_id: Uuid,
        old_min_stock: i64,
        row: ImportRow,
    },
    /// Product exists and nothing changes
    Unchanged { product_id: Uuid, row_number: usize },
    /// Same unique key as an earlier row in this batch
    DuplicateInBatch { row_number: usize, first_row: usize },
}

impl PlannedAction {
    /// Source line of the row behind this action
    pub fn row_number(&self) -> usize {
        match self {
            PlannedAction::Create(row) => row.row_number,
            PlannedAction::UpdateMinStock { row, .. } => row.row_number,
            PlannedAction::Unchanged { row_number, .. } => *row_number,
            PlannedAction::DuplicateInBatch { row_number, .. } => *row_number,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPlan {
    pub actions: Vec<PlannedAction>,
    pub invalid: Vec<RowIssue>,
}

/// Per-batch outcome returned to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<RowIssue>,
    pub failed: Vec<RowIssue>,
}

impl ImportReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Validate one raw record. `index` is the 0-based data row index.
pub fn validate_row(raw: &RawImportRow, index: usize) -> Result<ImportRow, RowIssue> {
    let row_number = index + HEADER_OFFSET;
    let text = |value: &Option<String>| value.as_deref().map(str::trim).unwrap_or_default().to_string();

    let name = text(&raw.name);
    if name.is_empty() {
        return Err(RowIssue::new(row_number, "name is required"));
    }
    validate_product_name(&name).map_err(|e| RowIssue::new(row_number, e))?;

    let unit = match raw.unit.as_deref().map(str::trim) {
        None | Some("") => Unit::default(),
        Some(value) => Unit::parse(value)
            .ok_or_else(|| RowIssue::new(row_number, format!("unit '{}' is not one of Nos, Pcs, Unit, Set, Pair, Box", value)))?,
    };

    let min_stock = parse_count(&raw.min_stock, "minStock", row_number)?;
    let opening_qty = parse_count(&raw.opening_qty, "openingQty", row_number)?;
    let opening_price = parse_price(&raw.opening_price, row_number)?;
    validate_stock_value(opening_qty, opening_price)
        .map_err(|e| RowIssue::new(row_number, format!("openingQty: {}", e)))?;

    let category = text(&raw.category);
    validate_label(&category).map_err(|e| RowIssue::new(row_number, format!("category: {}", e)))?;
    let variant = text(&raw.variant);
    validate_label(&variant).map_err(|e| RowIssue::new(row_number, format!("variant: {}", e)))?;
    let unique_key = unique_key(&name, &variant, &category, unit);

    Ok(ImportRow {
        row_number,
        name,
        category,
        variant,
        unit,
        min_stock,
        opening_qty,
        opening_price,
        unique_key,
    })
}

fn parse_count(value: &Option<String>, field: &str, row_number: usize) -> Result<i64, RowIssue> {
    let raw = value.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(0);
    }
    match raw.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        Ok(_) => Err(RowIssue::new(row_number, format!("{} cannot be negative", field))),
        Err(_) => Err(RowIssue::new(
            row_number,
            format!("{} must be a whole number, got '{}'", field, raw),
        )),
    }
}

fn parse_price(value: &Option<String>, row_number: usize) -> Result<Decimal, RowIssue> {
    let raw = value.as_deref().map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let price = Decimal::from_str(raw)
        .map_err(|_| RowIssue::new(row_number, format!("openingPrice must be numeric, got '{}'", raw)))?;
    if price < Decimal::ZERO {
        return Err(RowIssue::new(row_number, "openingPrice cannot be negative"));
    }
    validate_price(price).map_err(|e| RowIssue::new(row_number, format!("openingPrice: {}", e)))?;
    Ok(price)
}

/// Decide create / update / skip for every row.
///
/// `existing` maps unique keys already in the catalog to their product.
/// The first row with a given key wins; later rows with that key are
/// reported as duplicates.
pub fn plan_import(
    rows: Vec<Result<ImportRow, RowIssue>>,
    existing: &HashMap<String, ExistingProduct>,
) -> ImportPlan {
    let mut plan = ImportPlan::default();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let row = match row {
            Ok(row) => row,
            Err(issue) => {
                plan.invalid.push(issue);
                continue;
            }
        };

        if let Some(&first_row) = seen.get(&row.unique_key) {
            plan.actions.push(PlannedAction::DuplicateInBatch {
                row_number: row.row_number,
                first_row,
            });
            continue;
        }
        seen.insert(row.unique_key.clone(), row.row_number);

        let action = match existing.get(&row.unique_key) {
            None => PlannedAction::Create(row),
            Some(product) if product.min_stock != row.min_stock => PlannedAction::UpdateMinStock {
                product_id: product.product_id,
                old_min_stock: product.min_stock,
                row,
            },
            Some(product) => PlannedAction::Unchanged {
                product_id: product.product_id,
                row_number: row.row_number,
            },
        };
        plan.actions.push(action);
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, unit: &str, min: &str, qty: &str, price: &str) -> RawImportRow {
        RawImportRow {
            name: Some(name.to_string()),
            category: Some("Kitchen".to_string()),
            variant: Some("Red".to_string()),
            unit: Some(unit.to_string()),
            min_stock: Some(min.to_string()),
            opening_qty: Some(qty.to_string()),
            opening_price: Some(price.to_string()),
        }
    }

    #[test]
    fn test_validate_row_applies_header_offset() {
        let row = validate_row(&raw("Mug", "pcs", "2", "10", "4.50"), 0).unwrap();
        assert_eq!(row.row_number, 2);
        assert_eq!(row.unit, Unit::Pcs);
        assert_eq!(row.opening_qty, 10);
        assert_eq!(row.opening_price, Decimal::new(450, 2));
        assert_eq!(row.unique_key, "mug|red|kitchen|pcs");
    }

    #[test]
    fn test_validate_row_defaults_blank_numbers_and_unit() {
        let row = validate_row(&raw("Mug", "", "", "", ""), 3).unwrap();
        assert_eq!(row.unit, Unit::Nos);
        assert_eq!(row.min_stock, 0);
        assert_eq!(row.opening_qty, 0);
        assert_eq!(row.opening_price, Decimal::ZERO);
    }

    #[test]
    fn test_validate_row_rejections() {
        let missing_name = validate_row(&raw("  ", "Pcs", "0", "1", "1"), 4).unwrap_err();
        assert_eq!(missing_name.row_number, 6);
        assert!(missing_name.reason.contains("name"));

        assert!(validate_row(&raw("Mug", "kg", "0", "1", "1"), 0).is_err());
        assert!(validate_row(&raw("Mug", "Pcs", "0", "-1", "1"), 0).is_err());
        assert!(validate_row(&raw("Mug", "Pcs", "0", "ten", "1"), 0).is_err());
        assert!(validate_row(&raw("Mug", "Pcs", "0", "1", "-0.01"), 0).is_err());
        assert!(validate_row(&raw("Mug", "Pcs", "abc", "1", "1"), 0).is_err());
    }

    #[test]
    fn test_validate_row_rejects_values_storage_cannot_hold() {
        let mut long_category = raw("Mug", "Pcs", "0", "1", "1");
        long_category.category = Some("c".repeat(101));
        let issue = validate_row(&long_category, 0).unwrap_err();
        assert_eq!(issue.row_number, 2);
        assert!(issue.reason.starts_with("category"));

        let mut long_variant = raw("Mug", "Pcs", "0", "1", "1");
        long_variant.variant = Some("v".repeat(101));
        assert!(validate_row(&long_variant, 0).unwrap_err().reason.starts_with("variant"));

        let mut at_limit = raw("Mug", "Pcs", "0", "1", "1");
        at_limit.category = Some("c".repeat(100));
        assert!(validate_row(&at_limit, 0).is_ok());

        let price = validate_row(&raw("Mug", "Pcs", "0", "1", "1000000000000"), 0).unwrap_err();
        assert!(price.reason.starts_with("openingPrice"));
        assert!(validate_row(&raw("Mug", "Pcs", "0", "1", "999999999999.99"), 0).is_ok());

        let value = validate_row(&raw("Mug", "Pcs", "0", "9223372036854775807", "100000000000"), 0).unwrap_err();
        assert!(value.reason.starts_with("openingQty"));
    }

    #[test]
    fn test_plan_three_valid_one_missing_name() {
        let rows = vec![
            raw("Mug", "Pcs", "1", "5", "2"),
            raw("Plate", "Pcs", "1", "5", "2"),
            raw("", "Pcs", "1", "5", "2"),
            raw("Bowl", "Pcs", "1", "5", "2"),
        ];
        let validated = rows.iter().enumerate().map(|(i, r)| validate_row(r, i)).collect();
        let plan = plan_import(validated, &HashMap::new());

        let creates = plan
            .actions
            .iter()
            .filter(|a| matches!(a, PlannedAction::Create(_)))
            .count();
        assert_eq!(creates, 3);
        assert_eq!(plan.invalid.len(), 1);
        assert_eq!(plan.invalid[0].row_number, 4);
    }

    #[test]
    fn test_plan_collapses_duplicates_in_batch() {
        let rows = vec![
            validate_row(&raw("Mug", "Pcs", "1", "5", "2"), 0),
            validate_row(&raw(" MUG ", "pcs", "9", "50", "3"), 1),
        ];
        let plan = plan_import(rows, &HashMap::new());
        assert_eq!(plan.actions.len(), 2);
        assert!(matches!(&plan.actions[0], PlannedAction::Create(row) if row.opening_qty == 5));
        assert_eq!(
            plan.actions[1],
            PlannedAction::DuplicateInBatch {
                row_number: 3,
                first_row: 2
            }
        );
    }

    #[test]
    fn test_plan_existing_rows_never_restock() {
        let row = validate_row(&raw("Mug", "Pcs", "4", "100", "2"), 0).unwrap();
        let id = Uuid::from_u128(1);
        let mut existing = HashMap::new();
        existing.insert(
            row.unique_key.clone(),
            ExistingProduct {
                product_id: id,
                min_stock: 4,
            },
        );

        let plan = plan_import(vec![Ok(row.clone())], &existing);
        assert_eq!(
            plan.actions,
            vec![PlannedAction::Unchanged {
                product_id: id,
                row_number: 2
            }]
        );

        existing.get_mut(&row.unique_key).unwrap().min_stock = 1;
        let plan = plan_import(vec![Ok(row)], &existing);
        assert!(matches!(
            plan.actions[0],
            PlannedAction::UpdateMinStock {
                old_min_stock: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_normalize_header_variants() {
        assert_eq!(normalize_header("Name"), "name");
        assert_eq!(normalize_header(" Min Stock "), "min_stock");
        assert_eq!(normalize_header("minStock"), "min_stock");
        assert_eq!(normalize_header("OPENING_QTY"), "opening_qty");
        assert_eq!(normalize_header("quantity"), "opening_qty");
        assert_eq!(normalize_header("Price"), "opening_price");
        assert_eq!(normalize_header("\u{feff}name"), "name");
    }
}

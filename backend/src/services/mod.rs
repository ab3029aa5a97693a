//! Business logic services for the inventory reconciliation engine

pub mod bulk_import;
pub mod catalog;
pub mod dashboard;
pub mod history;
pub mod reconcile;
pub mod stock;
pub mod store;

pub use bulk_import::BulkImportService;
pub use catalog::CatalogService;
pub use dashboard::DashboardService;
pub use history::HistoryService;
pub use reconcile::ReconcileService;
pub use stock::StockService;

use chrono::{NaiveDate, Utc};

use crate::error::{AppError, AppResult};

/// Lift a shared-crate field check into an API validation error
pub(crate) fn check(field: &str, result: Result<(), &'static str>) -> AppResult<()> {
    result.map_err(|message| AppError::validation(field, message))
}

/// Movement date, defaulting to today and refusing future dates
pub(crate) fn movement_date(date: Option<NaiveDate>) -> AppResult<NaiveDate> {
    let today = Utc::now().date_naive();
    let date = date.unwrap_or(today);
    check("date", shared::validate_not_future(date, today))?;
    Ok(date)
}

/// `%term%` pattern for ILIKE searches; blank terms mean no filter
pub(crate) fn search_pattern(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_pattern_escapes_wildcards() {
        assert_eq!(search_pattern(Some(" mug ")), Some("%mug%".to_string()));
        assert_eq!(search_pattern(Some("50%")), Some("%50\\%%".to_string()));
        assert_eq!(search_pattern(Some("   ")), None);
        assert_eq!(search_pattern(None), None);
    }

    #[test]
    fn test_movement_date_rejects_future() {
        let tomorrow = Utc::now().date_naive().succ_opt().unwrap();
        assert!(matches!(
            movement_date(Some(tomorrow)),
            Err(AppError::Validation { ref field, .. }) if field == "date"
        ));
        assert_eq!(movement_date(None).unwrap(), Utc::now().date_naive());
    }
}

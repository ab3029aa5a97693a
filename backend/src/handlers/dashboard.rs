//! HTTP handlers for the dashboard and exports

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};

use shared::DashboardRow;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::dashboard::{DashboardQuery, DashboardService, DashboardSummary};
use crate::AppState;

/// Dashboard lines; `format=csv` exports every matching line
pub async fn get_dashboard(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<DashboardQuery>,
) -> AppResult<impl IntoResponse> {
    let service = DashboardService::new(state.db, &state.config.inventory);

    if query.format.as_deref() == Some("csv") {
        let rows = service.all_rows(query.search.as_deref()).await?;
        let csv = DashboardService::export_to_csv(&rows)?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"dashboard.csv\""),
            ],
            csv,
        )
            .into_response())
    } else {
        let page = service.get_dashboard(&query).await?;
        Ok(Json(page).into_response())
    }
}

/// Products at or below their reorder threshold
pub async fn get_low_stock(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<DashboardRow>>> {
    let service = DashboardService::new(state.db, &state.config.inventory);
    let rows = service.low_stock().await?;
    Ok(Json(rows))
}

/// Catalog-wide totals
pub async fn get_summary(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<DashboardSummary>> {
    let service = DashboardService::new(state.db, &state.config.inventory);
    let summary = service.summary().await?;
    Ok(Json(summary))
}

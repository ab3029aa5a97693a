//! HTTP handlers for stock history

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::dashboard::DashboardService;
use crate::services::history::{HistoryQuery, HistoryService};
use crate::AppState;

/// Movement history, newest first; `format=csv` exports it
pub async fn get_history(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let service = HistoryService::new(state.db, &state.config.inventory);

    if query.format.as_deref() == Some("csv") {
        let rows = service.export_rows(&query).await?;
        let csv = DashboardService::export_to_csv(&rows)?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"stock_history.csv\""),
            ],
            csv,
        )
            .into_response())
    } else {
        let page = service.list(&query).await?;
        Ok(Json(page).into_response())
    }
}

//! HTTP handlers for ledger reads and reconciliation

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::reconcile::{RebuildReport, RebuildResult, ReconcileService};
use crate::AppState;

/// Rebuild one product's ledger from its history
pub async fn rebuild_ledger(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<RebuildResult>> {
    current_user.0.require_admin()?;
    let service = ReconcileService::new(state.db, &state.config.inventory);
    let result = service.rebuild_ledger(product_id).await?;
    Ok(Json(result))
}

/// Rebuild every ledger
pub async fn rebuild_all(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<RebuildReport>> {
    current_user.0.require_admin()?;
    tracing::info!(user_id = %current_user.0.user_id, "Full ledger rebuild requested");
    let service = ReconcileService::new(state.db, &state.config.inventory);
    let report = service.rebuild_all().await?;
    Ok(Json(report))
}

//! HTTP handlers for stock movements

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::stock::{
    AdjustMinStockInput, AdjustOpeningInput, MinStockResult, MovementResult, StockInInput, StockOutInput,
    StockService,
};
use crate::AppState;

/// Receive purchased or returned stock
pub async fn stock_in(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<StockInInput>,
) -> AppResult<Json<MovementResult>> {
    current_user.0.require_admin()?;
    let service = StockService::new(state.db, &state.config.inventory);
    let result = service.stock_in(current_user.0.user_id, input).await?;
    Ok(Json(result))
}

/// Ship stock out
pub async fn stock_out(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<StockOutInput>,
) -> AppResult<Json<MovementResult>> {
    let service = StockService::new(state.db, &state.config.inventory);
    let result = service.stock_out(current_user.0.user_id, input).await?;
    Ok(Json(result))
}

/// Correct opening quantity or price
pub async fn adjust_opening(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AdjustOpeningInput>,
) -> AppResult<Json<MovementResult>> {
    current_user.0.require_admin()?;
    let service = StockService::new(state.db, &state.config.inventory);
    let result = service.adjust_opening(current_user.0.user_id, input).await?;
    Ok(Json(result))
}

/// Change the reorder threshold
pub async fn adjust_min_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AdjustMinStockInput>,
) -> AppResult<Json<MinStockResult>> {
    current_user.0.require_admin()?;
    let service = StockService::new(state.db, &state.config.inventory);
    let result = service.adjust_min_stock(current_user.0.user_id, input).await?;
    Ok(Json(result))
}

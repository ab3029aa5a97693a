//! HTTP handlers for the product catalog

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{InventoryLedger, PaginatedResponse, Product};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::catalog::{
    CatalogService, CreateLedgerInput, CreateProductInput, ProductQuery, ProductWithLedger, UpdateProductInput,
};
use crate::AppState;

/// Create a product with its ledger and opening stock
pub async fn create_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<ProductWithLedger>)> {
    current_user.0.require_admin()?;
    let service = CatalogService::new(state.db, &state.config.inventory);
    let product = service.create_product(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Category and variant to allocate a SKU for
#[derive(Debug, Deserialize)]
pub struct SkuRequest {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub variant: String,
}

#[derive(Debug, Serialize)]
pub struct SkuResponse {
    pub sku: String,
}

/// Reserve the next free SKU for a category and variant
pub async fn generate_sku(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<SkuRequest>,
) -> AppResult<Json<SkuResponse>> {
    current_user.0.require_admin()?;
    let service = CatalogService::new(state.db, &state.config.inventory);
    let sku = service.generate_sku(&request.category, &request.variant).await?;
    Ok(Json(SkuResponse { sku }))
}

/// List products
pub async fn list_products(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<PaginatedResponse<Product>>> {
    let service = CatalogService::new(state.db, &state.config.inventory);
    let products = service.list_products(query).await?;
    Ok(Json(products))
}

/// Get a product with its ledger
pub async fn get_product(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ProductWithLedger>> {
    let service = CatalogService::new(state.db, &state.config.inventory);
    let product = service.get_product(product_id).await?;
    Ok(Json(product))
}

/// Edit product identity fields
pub async fn update_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<Product>> {
    current_user.0.require_admin()?;
    let service = CatalogService::new(state.db, &state.config.inventory);
    let product = service.update_product(product_id, input).await?;
    Ok(Json(product))
}

/// Delete a product without movements
pub async fn delete_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require_admin()?;
    let service = CatalogService::new(state.db, &state.config.inventory);
    service.delete_product(product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create the ledger for a product that has none
pub async fn create_ledger(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<CreateLedgerInput>,
) -> AppResult<(StatusCode, Json<InventoryLedger>)> {
    current_user.0.require_admin()?;
    let service = CatalogService::new(state.db, &state.config.inventory);
    let ledger = service
        .create_ledger(current_user.0.user_id, product_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(ledger)))
}

//! Route definitions for the inventory API

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - product catalog
        .nest("/products", product_routes(state.clone()))
        // Protected routes - stock movements
        .nest("/stock", stock_routes(state.clone()))
        // Protected routes - ledger reconciliation
        .nest("/inventory", inventory_routes(state.clone()))
        // Protected routes - dashboard and history
        .nest("/dashboard", dashboard_routes(state.clone()))
        .nest("/history", history_routes(state))
}

/// Product catalog routes (protected)
fn product_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_products).post(handlers::create_product))
        .route("/sku", post(handlers::generate_sku))
        .route(
            "/import",
            post(handlers::import_products).layer(DefaultBodyLimit::max(handlers::MAX_IMPORT_BYTES + 64 * 1024)),
        )
        .route(
            "/:product_id",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
        .route("/:product_id/ledger", post(handlers::create_ledger))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Stock movement routes (protected)
fn stock_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/in", post(handlers::stock_in))
        .route("/out", post(handlers::stock_out))
        .route("/adjust/opening", post(handlers::adjust_opening))
        .route("/adjust/min-stock", post(handlers::adjust_min_stock))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Reconciliation routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/rebuild", post(handlers::rebuild_all))
        .route("/:product_id/rebuild", post(handlers::rebuild_ledger))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Dashboard routes (protected)
fn dashboard_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_dashboard))
        .route("/low-stock", get(handlers::get_low_stock))
        .route("/summary", get(handlers::get_summary))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// History routes (protected)
fn history_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_history))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

//! Router-level tests for authentication and role checks
//!
//! These requests are refused before any query runs, so the pool is
//! created lazily and never connects.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use inventory_backend::config::{Config, DatabaseConfig, InventorySettings, JwtConfig, ServerConfig};
use inventory_backend::middleware::auth::{Claims, Role};
use inventory_backend::{create_app, AppState};

const SECRET: &str = "api-test-secret";

fn app() -> Router {
    let config = Config {
        environment: "test".to_string(),
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://localhost/unused".to_string(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_secs: 1,
            statement_timeout_ms: 1_000,
        },
        jwt: JwtConfig {
            secret: SECRET.to_string(),
        },
        inventory: InventorySettings::default(),
    };
    let db = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&config.database.url)
        .unwrap();

    create_app(AppState {
        db,
        config: Arc::new(config),
    })
}

fn token(role: Role) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: Uuid::new_v4().to_string(),
        role,
        exp: now + 3600,
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn error_code(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_root_is_public() {
    let response = app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = app()
        .oneshot(Request::builder().uri("/api/v1/products").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "UNAUTHORIZED");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: Uuid::new_v4().to_string(),
        role: Role::Admin,
        exp: now + 3600,
        iat: now,
    };
    let forged = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"someone-else")).unwrap();

    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/dashboard")
                .header(header::AUTHORIZATION, format!("Bearer {}", forged))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stock_in_requires_admin() {
    let body = json!({
        "product_id": Uuid::new_v4(),
        "quantity": 3,
        "stock_type": "NEW",
        "purchase_price": "12.50",
        "invoice_reference": "INV-7"
    });

    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/stock/in")
                .header(header::AUTHORIZATION, format!("Bearer {}", token(Role::User)))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(response).await, "INSUFFICIENT_PERMISSIONS");
}

#[tokio::test]
async fn test_rebuild_requires_admin() {
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/inventory/rebuild")
                .header(header::AUTHORIZATION, format!("Bearer {}", token(Role::User)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

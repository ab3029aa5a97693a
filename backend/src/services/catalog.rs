//! Product catalog service: products, SKUs and ledger creation

use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{
    unique_key, validate_label, validate_min_stock, validate_opening_qty, validate_price, validate_product_name,
    validate_stock_value, InventoryLedger, NewStockLog, PaginatedResponse, Pagination, PaginationMeta, Product, Unit,
};

use super::store::{self, ProductDraft, ProductRow};
use super::{check, movement_date, search_pattern};
use crate::config::InventorySettings;
use crate::db::with_deadline;
use crate::error::{AppError, AppResult};

/// Catalog service for managing products
#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
    timeout: Duration,
}

/// Product with its current stock state
#[derive(Debug, Clone, Serialize)]
pub struct ProductWithLedger {
    #[serde(flatten)]
    pub product: Product,
    pub ledger: Option<InventoryLedger>,
    pub low_stock: bool,
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default)]
    pub unit: Unit,
    #[serde(default)]
    pub min_stock: i64,
    #[serde(default)]
    pub opening_qty: i64,
    pub opening_price: Option<Decimal>,
    pub date: Option<NaiveDate>,
}

/// Input for editing catalog identity fields
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    pub category: Option<String>,
    pub variant: Option<String>,
    pub unit: Option<Unit>,
}

/// Input for creating the ledger of an existing product
#[derive(Debug, Deserialize)]
pub struct CreateLedgerInput {
    #[serde(default)]
    pub opening_qty: i64,
    pub opening_price: Option<Decimal>,
    pub date: Option<NaiveDate>,
}

/// Query parameters for listing products
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub category: Option<String>,
}

impl CatalogService {
    pub fn new(db: PgPool, settings: &InventorySettings) -> Self {
        Self {
            db,
            timeout: settings.storage_timeout(),
        }
    }

    /// Create a product, its ledger and the opening entry in one transaction
    pub async fn create_product(&self, actor_id: Uuid, input: CreateProductInput) -> AppResult<ProductWithLedger> {
        input.validate()?;
        check("name", validate_product_name(&input.name))?;
        check("category", validate_label(&input.category))?;
        check("variant", validate_label(&input.variant))?;
        check("min_stock", validate_min_stock(input.min_stock))?;
        check("opening_qty", validate_opening_qty(input.opening_qty))?;
        let opening_price = input.opening_price.unwrap_or(Decimal::ZERO);
        check("opening_price", validate_price(opening_price))?;
        check("opening_price", validate_stock_value(input.opening_qty, opening_price))?;
        let date = movement_date(input.date)?;
        let opening_qty = input.opening_qty;

        let draft = ProductDraft {
            name: input.name,
            sku: input.sku.map(|s| s.trim().to_string()),
            category: input.category,
            variant: input.variant,
            unit: input.unit,
            min_stock: input.min_stock,
        };

        with_deadline(self.timeout, "create_product", async move {
            let mut tx = self.db.begin().await?;
            let (product, ledger) =
                store::insert_stocked_product(&mut tx, actor_id, &draft, opening_qty, opening_price, date)
                    .await?;
            tx.commit().await?;

            tracing::info!(product_id = %product.id, sku = %product.sku, "Product created");
            let low_stock = ledger.is_low_stock(product.min_stock);
            Ok(ProductWithLedger {
                product,
                ledger: Some(ledger),
                low_stock,
            })
        })
        .await
    }

    /// Allocate the next SKU for a category and variant
    pub async fn generate_sku(&self, category: &str, variant: &str) -> AppResult<String> {
        with_deadline(self.timeout, "generate_sku", async move {
            let mut conn = self.db.acquire().await?;
            store::generate_sku(&mut conn, category, variant).await
        })
        .await
    }

    /// List products with optional search and category filters
    pub async fn list_products(&self, query: ProductQuery) -> AppResult<PaginatedResponse<Product>> {
        let pagination = Pagination {
            page: query.page.unwrap_or(1),
            per_page: query.per_page.unwrap_or(20),
        }
        .normalized();
        let pattern = search_pattern(query.search.as_deref());
        let category = query.category.filter(|c| !c.trim().is_empty());

        with_deadline(self.timeout, "list_products", async move {
            let total = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COUNT(*)
                FROM products
                WHERE ($1::text IS NULL OR name ILIKE $1 OR sku ILIKE $1 OR category ILIKE $1)
                  AND ($2::text IS NULL OR category = $2)
                "#,
            )
            .bind(&pattern)
            .bind(&category)
            .fetch_one(&self.db)
            .await?;

            let rows = sqlx::query_as::<_, ProductRow>(
                r#"
                SELECT id, name, sku, category, variant, unit, min_stock, unique_key, created_at, updated_at
                FROM products
                WHERE ($1::text IS NULL OR name ILIKE $1 OR sku ILIKE $1 OR category ILIKE $1)
                  AND ($2::text IS NULL OR category = $2)
                ORDER BY name ASC, id ASC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(&pattern)
            .bind(&category)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?;

            let data = rows.into_iter().map(Product::try_from).collect::<AppResult<Vec<_>>>()?;
            Ok(PaginatedResponse {
                data,
                pagination: PaginationMeta::new(&pagination, total.max(0) as u64),
            })
        })
        .await
    }

    /// Get a product with its ledger
    pub async fn get_product(&self, product_id: Uuid) -> AppResult<ProductWithLedger> {
        with_deadline(self.timeout, "get_product", async move {
            let product = store::fetch_product(&self.db, product_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
            let ledger = store::fetch_ledger(&self.db, product_id).await?;
            let low_stock = ledger.as_ref().map_or(true, |l| l.is_low_stock(product.min_stock));

            Ok(ProductWithLedger {
                product,
                ledger,
                low_stock,
            })
        })
        .await
    }

    /// Edit catalog identity fields.
    ///
    /// Identity is frozen once the product has movements beyond its opening
    /// stock, because the history would no longer describe the same item.
    pub async fn update_product(&self, product_id: Uuid, input: UpdateProductInput) -> AppResult<Product> {
        input.validate()?;
        if let Some(name) = &input.name {
            check("name", validate_product_name(name))?;
        }
        if let Some(category) = &input.category {
            check("category", validate_label(category))?;
        }
        if let Some(variant) = &input.variant {
            check("variant", validate_label(variant))?;
        }

        with_deadline(self.timeout, "update_product", async move {
            let mut tx = self.db.begin().await?;

            let existing = store::lock_product(&mut *tx, product_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

            let name = input.name.map(|n| n.trim().to_string()).unwrap_or_else(|| existing.name.clone());
            let sku = input.sku.map(|s| s.trim().to_string()).unwrap_or_else(|| existing.sku.clone());
            let category = input.category.map(|c| c.trim().to_string()).unwrap_or_else(|| existing.category.clone());
            let variant = input.variant.map(|v| v.trim().to_string()).unwrap_or_else(|| existing.variant.clone());
            let unit = input.unit.unwrap_or(existing.unit);

            let identity_changed = name != existing.name
                || sku != existing.sku
                || category != existing.category
                || variant != existing.variant
                || unit != existing.unit;
            if !identity_changed {
                return Ok(existing);
            }

            if store::count_movements(&mut *tx, product_id).await? > 0 {
                return Err(AppError::Conflict {
                    resource: "product".to_string(),
                    message: "Product identity cannot change after stock movements were recorded".to_string(),
                });
            }

            let updated: Product = sqlx::query_as::<_, ProductRow>(
                r#"
                UPDATE products
                SET name = $2, sku = $3, category = $4, variant = $5, unit = $6, unique_key = $7,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING id, name, sku, category, variant, unit, min_stock, unique_key, created_at, updated_at
                "#,
            )
            .bind(product_id)
            .bind(&name)
            .bind(&sku)
            .bind(&category)
            .bind(&variant)
            .bind(unit.as_str())
            .bind(unique_key(&name, &variant, &category, unit))
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;

            tx.commit().await?;
            tracing::info!(product_id = %product_id, "Product updated");
            Ok(updated)
        })
        .await
    }

    /// Delete a product that has no recorded movements
    pub async fn delete_product(&self, product_id: Uuid) -> AppResult<()> {
        with_deadline(self.timeout, "delete_product", async move {
            let mut tx = self.db.begin().await?;

            store::lock_product(&mut *tx, product_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

            if store::count_movements(&mut *tx, product_id).await? > 0 {
                return Err(AppError::Conflict {
                    resource: "product".to_string(),
                    message: "Product has recorded stock movements and cannot be deleted".to_string(),
                });
            }

            // Ledger and opening entry go with it through ON DELETE CASCADE
            sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(product_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            tracing::info!(product_id = %product_id, "Product deleted");
            Ok(())
        })
        .await
    }

    /// Create the ledger for a product that has none yet
    pub async fn create_ledger(
        &self,
        actor_id: Uuid,
        product_id: Uuid,
        input: CreateLedgerInput,
    ) -> AppResult<InventoryLedger> {
        check("opening_qty", validate_opening_qty(input.opening_qty))?;
        let opening_price = input.opening_price.unwrap_or(Decimal::ZERO);
        check("opening_price", validate_price(opening_price))?;
        check("opening_price", validate_stock_value(input.opening_qty, opening_price))?;
        let date = movement_date(input.date)?;

        with_deadline(self.timeout, "create_ledger", async move {
            let mut tx = self.db.begin().await?;

            store::lock_product(&mut *tx, product_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

            if store::fetch_ledger(&mut *tx, product_id).await?.is_some() {
                return Err(AppError::Conflict {
                    resource: "inventory ledger".to_string(),
                    message: "Product already has an inventory ledger".to_string(),
                });
            }

            let ledger = InventoryLedger::open(product_id, input.opening_qty, opening_price)?;
            store::insert_ledger(&mut *tx, &ledger).await?;
            if input.opening_qty > 0 {
                store::append_log(
                    &mut *tx,
                    &NewStockLog::opening(product_id, actor_id, input.opening_qty, ledger.avg_purchase_price, date),
                )
                .await?;
            }

            tx.commit().await?;
            tracing::info!(product_id = %product_id, opening_qty = input.opening_qty, "Inventory ledger created");
            Ok(ledger)
        })
        .await
    }
}

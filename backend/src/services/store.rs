//! Row mapping and queries shared by the inventory services
//!
//! Everything here runs on whatever executor the caller hands in, so the
//! same query serves pool reads and statements inside a transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, PgConnection, Postgres};
use uuid::Uuid;

use shared::{
    unique_key, AdjustmentDirection, AdjustmentField, InventoryLedger, MovementType, NewStockLog, OutboundChannel,
    Product, ReturnCondition, SkuPrefix, StockLog, StockType, Unit,
};

use crate::error::{AppError, AppResult};

/// Attempts before giving up on finding a free generated SKU
const SKU_ATTEMPTS: usize = 5;

#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    name: String,
    sku: String,
    category: String,
    variant: String,
    unit: String,
    min_stock: i64,
    unique_key: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let unit = Unit::parse(&row.unit).ok_or_else(|| {
            AppError::InvariantViolation(format!("product {} has unknown unit '{}'", row.id, row.unit))
        })?;
        Ok(Product {
            id: row.id,
            name: row.name,
            sku: row.sku,
            category: row.category,
            variant: row.variant,
            unit,
            min_stock: row.min_stock,
            unique_key: row.unique_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct LedgerRow {
    product_id: Uuid,
    opening_qty: i64,
    quantity: i64,
    avg_purchase_price: Decimal,
    total_value: Decimal,
    qty_in_total: i64,
    marketplace_out_total: i64,
    others_out_total: i64,
}

impl From<LedgerRow> for InventoryLedger {
    fn from(row: LedgerRow) -> Self {
        InventoryLedger {
            product_id: row.product_id,
            opening_qty: row.opening_qty,
            quantity: row.quantity,
            avg_purchase_price: row.avg_purchase_price,
            total_value: row.total_value,
            qty_in_total: row.qty_in_total,
            marketplace_out_total: row.marketplace_out_total,
            others_out_total: row.others_out_total,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct StockLogRow {
    id: Uuid,
    seq: i64,
    product_id: Uuid,
    actor_id: Uuid,
    movement_type: String,
    stock_type: Option<String>,
    is_opening: bool,
    condition: Option<String>,
    adjustment_direction: Option<String>,
    adjustment_field: Option<String>,
    old_value: Option<Decimal>,
    new_value: Option<Decimal>,
    reason: String,
    quantity: i64,
    date: NaiveDate,
    invoice_reference: String,
    purchase_price: Option<Decimal>,
    document_url: Option<String>,
    source: Option<String>,
    remarks: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<StockLogRow> for StockLog {
    type Error = AppError;

    // Unknown optional labels are read as absent; replay reports them as legacy gaps.
    fn try_from(row: StockLogRow) -> Result<Self, Self::Error> {
        let movement_type = MovementType::parse(&row.movement_type).ok_or_else(|| {
            AppError::InvariantViolation(format!(
                "log entry {} has unknown movement type '{}'",
                row.id, row.movement_type
            ))
        })?;
        Ok(StockLog {
            id: row.id,
            seq: row.seq,
            product_id: row.product_id,
            actor_id: row.actor_id,
            movement_type,
            stock_type: row.stock_type.as_deref().and_then(StockType::parse),
            is_opening: row.is_opening,
            condition: row.condition.as_deref().and_then(ReturnCondition::parse),
            adjustment_direction: row.adjustment_direction.as_deref().and_then(AdjustmentDirection::parse),
            adjustment_field: row.adjustment_field.as_deref().and_then(AdjustmentField::parse),
            old_value: row.old_value,
            new_value: row.new_value,
            reason: row.reason,
            quantity: row.quantity,
            date: row.date,
            invoice_reference: row.invoice_reference,
            purchase_price: row.purchase_price,
            document_url: row.document_url,
            source: row.source.as_deref().and_then(OutboundChannel::parse),
            remarks: row.remarks,
            created_at: row.created_at,
        })
    }
}

/// Catalog fields for a product about to be inserted
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub name: String,
    pub sku: Option<String>,
    pub category: String,
    pub variant: String,
    pub unit: Unit,
    pub min_stock: i64,
}

impl ProductDraft {
    pub fn unique_key(&self) -> String {
        unique_key(&self.name, &self.variant, &self.category, self.unit)
    }
}

pub(crate) async fn fetch_product<'e, E>(executor: E, product_id: Uuid) -> AppResult<Option<Product>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, ProductRow>(
        r#"
        SELECT id, name, sku, category, variant, unit, min_stock, unique_key, created_at, updated_at
        FROM products
        WHERE id = $1
        "#,
    )
    .bind(product_id)
    .fetch_optional(executor)
    .await?
    .map(Product::try_from)
    .transpose()
}

pub(crate) async fn lock_product<'e, E>(executor: E, product_id: Uuid) -> AppResult<Option<Product>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, ProductRow>(
        r#"
        SELECT id, name, sku, category, variant, unit, min_stock, unique_key, created_at, updated_at
        FROM products
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(product_id)
    .fetch_optional(executor)
    .await?
    .map(Product::try_from)
    .transpose()
}

pub(crate) async fn fetch_ledger<'e, E>(executor: E, product_id: Uuid) -> AppResult<Option<InventoryLedger>>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT product_id, opening_qty, quantity, avg_purchase_price, total_value,
               qty_in_total, marketplace_out_total, others_out_total
        FROM inventory_ledgers
        WHERE product_id = $1
        "#,
    )
    .bind(product_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(InventoryLedger::from))
}

/// Take the per-product write lock. Held until the surrounding transaction ends.
pub(crate) async fn lock_ledger<'e, E>(executor: E, product_id: Uuid) -> AppResult<Option<InventoryLedger>>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, LedgerRow>(
        r#"
        SELECT product_id, opening_qty, quantity, avg_purchase_price, total_value,
               qty_in_total, marketplace_out_total, others_out_total
        FROM inventory_ledgers
        WHERE product_id = $1
        FOR UPDATE
        "#,
    )
    .bind(product_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(InventoryLedger::from))
}

pub(crate) async fn insert_ledger<'e, E>(executor: E, ledger: &InventoryLedger) -> AppResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO inventory_ledgers (
            product_id, opening_qty, quantity, avg_purchase_price, total_value,
            qty_in_total, marketplace_out_total, others_out_total
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(ledger.product_id)
    .bind(ledger.opening_qty)
    .bind(ledger.quantity)
    .bind(ledger.avg_purchase_price)
    .bind(ledger.total_value)
    .bind(ledger.qty_in_total)
    .bind(ledger.marketplace_out_total)
    .bind(ledger.others_out_total)
    .execute(executor)
    .await?;

    Ok(())
}

pub(crate) async fn save_ledger<'e, E>(executor: E, ledger: &InventoryLedger) -> AppResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE inventory_ledgers
        SET opening_qty = $2,
            quantity = $3,
            avg_purchase_price = $4,
            total_value = $5,
            qty_in_total = $6,
            marketplace_out_total = $7,
            others_out_total = $8,
            updated_at = NOW()
        WHERE product_id = $1
        "#,
    )
    .bind(ledger.product_id)
    .bind(ledger.opening_qty)
    .bind(ledger.quantity)
    .bind(ledger.avg_purchase_price)
    .bind(ledger.total_value)
    .bind(ledger.qty_in_total)
    .bind(ledger.marketplace_out_total)
    .bind(ledger.others_out_total)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Inventory ledger".to_string()));
    }
    Ok(())
}

/// Append one entry to the movement log. Entries are never updated afterwards.
pub(crate) async fn append_log<'e, E>(executor: E, log: &NewStockLog) -> AppResult<StockLog>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, StockLogRow>(
        r#"
        INSERT INTO stock_logs (
            id, product_id, actor_id, type, stock_type, is_opening, condition,
            adjustment_direction, adjustment_field, old_value, new_value, reason,
            quantity, date, invoice_reference, purchase_price, document_url, source, remarks
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        RETURNING id, seq, product_id, actor_id, type AS movement_type, stock_type, is_opening,
                  condition, adjustment_direction, adjustment_field, old_value, new_value, reason,
                  quantity, date, invoice_reference, purchase_price, document_url, source, remarks,
                  created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(log.product_id)
    .bind(log.actor_id)
    .bind(log.movement_type.as_str())
    .bind(log.stock_type.map(|t| t.as_str()))
    .bind(log.is_opening)
    .bind(log.condition.map(|c| c.as_str()))
    .bind(log.adjustment_direction.map(|d| d.as_str()))
    .bind(log.adjustment_field.map(|f| f.as_str()))
    .bind(log.old_value)
    .bind(log.new_value)
    .bind(&log.reason)
    .bind(log.quantity)
    .bind(log.date)
    .bind(&log.invoice_reference)
    .bind(log.purchase_price)
    .bind(&log.document_url)
    .bind(log.source.map(|s| s.as_str()))
    .bind(&log.remarks)
    .fetch_one(executor)
    .await?
    .try_into()
}

/// Full history of one product in recording order
pub(crate) async fn product_logs<'e, E>(executor: E, product_id: Uuid) -> AppResult<Vec<StockLog>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, StockLogRow>(
        r#"
        SELECT id, seq, product_id, actor_id, type AS movement_type, stock_type, is_opening,
               condition, adjustment_direction, adjustment_field, old_value, new_value, reason,
               quantity, date, invoice_reference, purchase_price, document_url, source, remarks,
               created_at
        FROM stock_logs
        WHERE product_id = $1
        ORDER BY seq ASC
        "#,
    )
    .bind(product_id)
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(StockLog::try_from)
    .collect()
}

/// Number of recorded movements other than the opening entry
pub(crate) async fn count_movements<'e, E>(executor: E, product_id: Uuid) -> AppResult<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM stock_logs WHERE product_id = $1 AND is_opening = FALSE",
    )
    .bind(product_id)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

/// Reserve the next sequence number for a SKU prefix.
///
/// The upsert is a single statement, so concurrent callers always get
/// distinct numbers even without an outer transaction.
pub(crate) async fn next_sku_sequence<'e, E>(executor: E, prefix: &SkuPrefix) -> AppResult<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    let seq = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO sku_counters (id, seq)
        VALUES ($1, 1)
        ON CONFLICT (id) DO UPDATE SET seq = sku_counters.seq + 1
        RETURNING seq
        "#,
    )
    .bind(prefix.counter_id())
    .fetch_one(executor)
    .await?;

    Ok(seq)
}

/// Generate a SKU that no product currently uses
pub(crate) async fn generate_sku(conn: &mut PgConnection, category: &str, variant: &str) -> AppResult<String> {
    let prefix = SkuPrefix::new(category, variant);

    for _ in 0..SKU_ATTEMPTS {
        let seq = next_sku_sequence(&mut *conn, &prefix).await?;
        let sku = prefix.format(seq);
        if !sku_exists(&mut *conn, &sku).await? {
            return Ok(sku);
        }
        tracing::warn!(sku = %sku, "Generated SKU already taken, drawing the next number");
    }

    Err(AppError::Conflict {
        resource: "sku".to_string(),
        message: format!("Could not allocate a free SKU for prefix {}", prefix.counter_id()),
    })
}

pub(crate) async fn sku_exists<'e, E>(executor: E, sku: &str) -> AppResult<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE sku = $1)")
        .bind(sku)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}

/// Insert a product together with its ledger and, when there is opening
/// stock, the opening log entry. Runs on the caller's transaction.
pub(crate) async fn insert_stocked_product(
    conn: &mut PgConnection,
    actor_id: Uuid,
    draft: &ProductDraft,
    opening_qty: i64,
    opening_price: Decimal,
    date: NaiveDate,
) -> AppResult<(Product, InventoryLedger)> {
    let sku = match &draft.sku {
        Some(sku) => sku.clone(),
        None => generate_sku(&mut *conn, &draft.category, &draft.variant).await?,
    };
    let product_id = Uuid::new_v4();
    let ledger = InventoryLedger::open(product_id, opening_qty, opening_price)?;

    let product: Product = sqlx::query_as::<_, ProductRow>(
        r#"
        INSERT INTO products (id, name, sku, category, variant, unit, min_stock, unique_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, name, sku, category, variant, unit, min_stock, unique_key, created_at, updated_at
        "#,
    )
    .bind(product_id)
    .bind(draft.name.trim())
    .bind(&sku)
    .bind(draft.category.trim())
    .bind(draft.variant.trim())
    .bind(draft.unit.as_str())
    .bind(draft.min_stock)
    .bind(draft.unique_key())
    .fetch_one(&mut *conn)
    .await?
    .try_into()?;

    insert_ledger(&mut *conn, &ledger).await?;

    if opening_qty > 0 {
        append_log(
            &mut *conn,
            &NewStockLog::opening(product_id, actor_id, opening_qty, ledger.avg_purchase_price, date),
        )
        .await?;
    }

    Ok((product, ledger))
}

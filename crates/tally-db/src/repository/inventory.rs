//! # Inventory Repository
//!
//! Products, stock batches and the adjustment ledger.
//!
//! ## Stock Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Ledger entries are INSERT-only.                                        │
//! │                                                                         │
//! │  Batch deltas clamp in SQL and return the new row in one statement:    │
//! │    UPDATE inventory_batches SET                                         │
//! │      quantity_actual    = MAX(0, quantity_actual    + :delta),          │
//! │      quantity_available = MAX(0, quantity_available + :delta)           │
//! │    WHERE id = :id RETURNING ...                                         │
//! │                                                                         │
//! │  The ledger insert and the batch update are separate statements; the   │
//! │  caller owns the two-phase contract between them.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{InventoryAdjustment, InventoryBatch, ProductStock};

const BATCH_COLUMNS: &str =
    "id, product_id, quantity_actual, quantity_available, low_stock_threshold, updated_at";

const PRODUCT_COLUMNS: &str = "id, sku, name, stock_quantity, low_stock_threshold, updated_at";

/// Repository for inventory database operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Gets a product's stock row by ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<ProductStock>> {
        let product = sqlx::query_as::<_, ProductStock>(&format!(
            "SELECT {} FROM products WHERE id = ?1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists products ordered by SKU.
    pub async fn list_products(&self) -> DbResult<Vec<ProductStock>> {
        let products = sqlx::query_as::<_, ProductStock>(&format!(
            "SELECT {} FROM products ORDER BY sku",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a product stock row.
    pub async fn insert_product(&self, product: &ProductStock) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, stock_quantity, low_stock_threshold, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.stock_quantity)
        .bind(product.low_stock_threshold)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrites a product's stock with an absolute target.
    ///
    /// ## Errors
    /// `DbError::NotFound` when the product does not exist.
    pub async fn set_product_stock(&self, product_id: &str, target: i64) -> DbResult<ProductStock> {
        debug!(product_id = %product_id, target, "Setting product stock");

        sqlx::query_as::<_, ProductStock>(&format!(
            r#"
            UPDATE products SET stock_quantity = ?2, updated_at = ?3
            WHERE id = ?1
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(target)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Product", product_id))
    }

    /// Adds a signed delta to a product's stock, clamping at zero.
    pub async fn adjust_product_stock(&self, product_id: &str, delta: i64) -> DbResult<ProductStock> {
        debug!(product_id = %product_id, delta, "Adjusting product stock");

        sqlx::query_as::<_, ProductStock>(&format!(
            r#"
            UPDATE products SET
                stock_quantity = MAX(0, stock_quantity + ?2),
                updated_at = ?3
            WHERE id = ?1
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Product", product_id))
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Gets a batch by ID.
    pub async fn get_batch(&self, id: &str) -> DbResult<Option<InventoryBatch>> {
        let batch = sqlx::query_as::<_, InventoryBatch>(&format!(
            "SELECT {} FROM inventory_batches WHERE id = ?1",
            BATCH_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(batch)
    }

    /// Inserts a batch.
    pub async fn insert_batch(&self, batch: &InventoryBatch) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_batches (
                id, product_id, quantity_actual, quantity_available, low_stock_threshold, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.product_id)
        .bind(batch.quantity_actual)
        .bind(batch.quantity_available)
        .bind(batch.low_stock_threshold)
        .bind(batch.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Applies a signed delta to both batch quantities, clamping each at zero.
    ///
    /// ## Errors
    /// `DbError::NotFound` when the batch does not exist.
    pub async fn apply_batch_delta(&self, batch_id: &str, delta: i64) -> DbResult<InventoryBatch> {
        debug!(batch_id = %batch_id, delta, "Applying batch delta");

        sqlx::query_as::<_, InventoryBatch>(&format!(
            r#"
            UPDATE inventory_batches SET
                quantity_actual = MAX(0, quantity_actual + ?2),
                quantity_available = MAX(0, quantity_available + ?2),
                updated_at = ?3
            WHERE id = ?1
            RETURNING {}
            "#,
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("InventoryBatch", batch_id))
    }

    // =========================================================================
    // Adjustment Ledger
    // =========================================================================

    /// Appends a ledger entry.
    pub async fn insert_adjustment(&self, adjustment: &InventoryAdjustment) -> DbResult<()> {
        debug!(
            batch_id = %adjustment.batch_id,
            delta = adjustment.quantity_delta,
            reason_code = %adjustment.reason_code,
            "Inserting inventory adjustment"
        );

        sqlx::query(
            r#"
            INSERT INTO inventory_adjustments (
                id, batch_id, quantity_delta, adjustment_type, reason_code, notes, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&adjustment.id)
        .bind(&adjustment.batch_id)
        .bind(adjustment.quantity_delta)
        .bind(adjustment.adjustment_type)
        .bind(&adjustment.reason_code)
        .bind(&adjustment.notes)
        .bind(&adjustment.actor_id)
        .bind(adjustment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists a batch's ledger entries, newest first.
    pub async fn adjustments_for_batch(&self, batch_id: &str) -> DbResult<Vec<InventoryAdjustment>> {
        let adjustments = sqlx::query_as::<_, InventoryAdjustment>(
            r#"
            SELECT id, batch_id, quantity_delta, adjustment_type, reason_code, notes, actor_id, created_at
            FROM inventory_adjustments
            WHERE batch_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(adjustments)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db;
    use tally_core::AdjustmentType;

    fn product(id: &str, stock: i64) -> ProductStock {
        ProductStock {
            id: id.to_string(),
            sku: format!("SKU-{}", id),
            name: format!("Product {}", id),
            stock_quantity: stock,
            low_stock_threshold: 2,
            updated_at: Utc::now(),
        }
    }

    fn batch(id: &str, product_id: &str, quantity: i64) -> InventoryBatch {
        InventoryBatch {
            id: id.to_string(),
            product_id: product_id.to_string(),
            quantity_actual: quantity,
            quantity_available: quantity,
            low_stock_threshold: 2,
            updated_at: Utc::now(),
        }
    }

    fn adjustment(id: &str, batch_id: &str, delta: i64) -> InventoryAdjustment {
        InventoryAdjustment {
            id: id.to_string(),
            batch_id: batch_id.to_string(),
            quantity_delta: delta,
            adjustment_type: AdjustmentType::Count,
            reason_code: "cycle_count".to_string(),
            notes: None,
            actor_id: "admin-1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_batch_delta_clamps_each_quantity() {
        let db = db().await;
        let repo = db.inventory();
        repo.insert_product(&product("p-1", 10)).await.unwrap();

        let mut b = batch("b-1", "p-1", 9);
        b.quantity_available = 5;
        repo.insert_batch(&b).await.unwrap();

        let updated = repo.apply_batch_delta("b-1", -8).await.unwrap();
        assert_eq!(updated.quantity_available, 0);
        assert_eq!(updated.quantity_actual, 1);

        let updated = repo.apply_batch_delta("b-1", 3).await.unwrap();
        assert_eq!(updated.quantity_available, 3);
        assert_eq!(updated.quantity_actual, 4);

        assert!(repo.apply_batch_delta("b-9", 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_ledger_is_newest_first() {
        let db = db().await;
        let repo = db.inventory();
        repo.insert_product(&product("p-1", 10)).await.unwrap();
        repo.insert_batch(&batch("b-1", "p-1", 10)).await.unwrap();

        repo.insert_adjustment(&adjustment("a-1", "b-1", -2)).await.unwrap();
        repo.insert_adjustment(&adjustment("a-2", "b-1", 5)).await.unwrap();

        let ledger = repo.adjustments_for_batch("b-1").await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].id, "a-2");
    }

    #[tokio::test]
    async fn test_adjustment_for_unknown_batch_violates_foreign_key() {
        let db = db().await;
        let err = db
            .inventory()
            .insert_adjustment(&adjustment("a-1", "missing", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_product_stock_updates() {
        let db = db().await;
        let repo = db.inventory();
        repo.insert_product(&product("p-1", 10)).await.unwrap();

        assert_eq!(repo.set_product_stock("p-1", 4).await.unwrap().stock_quantity, 4);
        assert_eq!(repo.adjust_product_stock("p-1", -9).await.unwrap().stock_quantity, 0);
        assert_eq!(repo.adjust_product_stock("p-1", 2).await.unwrap().stock_quantity, 2);
        assert!(repo.set_product_stock("p-9", 1).await.unwrap_err().is_not_found());
        assert!(matches!(
            repo.set_product_stock("p-1", -1).await.unwrap_err(),
            DbError::CheckViolation { .. }
        ));
        assert_eq!(repo.list_products().await.unwrap().len(), 1);
    }
}

//! # Shipment Repository
//!
//! Shipment rows are never deleted. Voiding flags the row; buying a new
//! label inserts a new row, and the latest row per order is authoritative.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use tally_core::Shipment;

const SHIPMENT_COLUMNS: &str = r#"
    id, order_id, label_id, tracking_number, carrier_code, service_code,
    label_url, cost_cents, status, voided, voided_at, created_by, created_at
"#;

/// Repository for shipment database operations.
#[derive(Debug, Clone)]
pub struct ShipmentRepository {
    pool: SqlitePool,
}

impl ShipmentRepository {
    /// Creates a new ShipmentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ShipmentRepository { pool }
    }

    /// Gets the most recently created shipment of an order.
    pub async fn latest_for_order(&self, order_id: &str) -> DbResult<Option<Shipment>> {
        let shipment = sqlx::query_as::<_, Shipment>(&format!(
            r#"
            SELECT {}
            FROM shipments
            WHERE order_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
            SHIPMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(shipment)
    }

    /// Lists every shipment of an order, oldest first.
    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<Shipment>> {
        let shipments = sqlx::query_as::<_, Shipment>(&format!(
            "SELECT {} FROM shipments WHERE order_id = ?1 ORDER BY created_at, rowid",
            SHIPMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(shipments)
    }

    /// Gets the shipment carrying an external label id.
    pub async fn get_by_label(&self, label_id: &str) -> DbResult<Option<Shipment>> {
        let shipment = sqlx::query_as::<_, Shipment>(&format!(
            r#"
            SELECT {}
            FROM shipments
            WHERE label_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
            SHIPMENT_COLUMNS
        ))
        .bind(label_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(shipment)
    }

    /// Inserts a new shipment row.
    pub async fn insert(&self, shipment: &Shipment) -> DbResult<()> {
        debug!(order_id = %shipment.order_id, label_id = ?shipment.label_id, "Inserting shipment");

        sqlx::query(
            r#"
            INSERT INTO shipments (
                id, order_id, label_id, tracking_number, carrier_code, service_code,
                label_url, cost_cents, status, voided, voided_at, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&shipment.id)
        .bind(&shipment.order_id)
        .bind(&shipment.label_id)
        .bind(&shipment.tracking_number)
        .bind(&shipment.carrier_code)
        .bind(&shipment.service_code)
        .bind(&shipment.label_url)
        .bind(shipment.cost_cents)
        .bind(shipment.status)
        .bind(shipment.voided)
        .bind(shipment.voided_at)
        .bind(&shipment.created_by)
        .bind(shipment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Marks a shipment voided and returns the updated row.
    ///
    /// ## Errors
    /// - `DbError::NotFound` - no such shipment
    /// - `DbError::Conflict` - already voided
    pub async fn mark_voided(&self, shipment_id: &str) -> DbResult<Shipment> {
        let now = Utc::now();

        let updated = sqlx::query_as::<_, Shipment>(&format!(
            r#"
            UPDATE shipments SET
                voided = 1,
                voided_at = ?2,
                status = 'voided'
            WHERE id = ?1 AND voided = 0
            RETURNING {}
            "#,
            SHIPMENT_COLUMNS
        ))
        .bind(shipment_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(shipment) => {
                info!(shipment_id = %shipment_id, label_id = ?shipment.label_id, "Shipment voided");
                Ok(shipment)
            }
            None => {
                let exists: Option<String> =
                    sqlx::query_scalar("SELECT id FROM shipments WHERE id = ?1")
                        .bind(shipment_id)
                        .fetch_optional(&self.pool)
                        .await?;
                Err(match exists {
                    Some(_) => DbError::conflict("Shipment", shipment_id, "already voided"),
                    None => DbError::not_found("Shipment", shipment_id),
                })
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::seeded;
    use chrono::Duration;
    use tally_core::shipment::{can_create_label, can_void_label};
    use tally_core::ShipmentStatus;

    fn shipment(id: &str, label: &str, minutes_ago: i64) -> Shipment {
        Shipment {
            id: id.to_string(),
            order_id: "o-1".to_string(),
            label_id: Some(label.to_string()),
            tracking_number: Some(format!("TRK-{}", label)),
            carrier_code: "ups".to_string(),
            service_code: "ground".to_string(),
            label_url: Some(format!("https://labels.example.com/{}.pdf", label)),
            cost_cents: 895,
            status: ShipmentStatus::LabelCreated,
            voided: false,
            voided_at: None,
            created_by: "admin-1".to_string(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_no_shipment_is_none() {
        let db = seeded("o-1").await;
        assert!(db.shipments().latest_for_order("o-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_void_then_recreate_keeps_rows() {
        let db = seeded("o-1").await;
        let repo = db.shipments();

        repo.insert(&shipment("s-1", "lbl-1", 30)).await.unwrap();
        let latest = repo.latest_for_order("o-1").await.unwrap();
        assert!(!can_create_label(latest.as_ref()));
        assert!(can_void_label(latest.as_ref()));

        let voided = repo.mark_voided("s-1").await.unwrap();
        assert!(voided.voided);
        assert!(voided.voided_at.is_some());
        assert_eq!(voided.status, ShipmentStatus::Voided);

        let latest = repo.latest_for_order("o-1").await.unwrap();
        assert!(can_create_label(latest.as_ref()));

        repo.insert(&shipment("s-2", "lbl-2", 0)).await.unwrap();
        let latest = repo.latest_for_order("o-1").await.unwrap().unwrap();
        assert_eq!(latest.id, "s-2");
        assert_eq!(repo.list_for_order("o-1").await.unwrap().len(), 2);
        assert_eq!(
            repo.get_by_label("lbl-1").await.unwrap().map(|s| s.id),
            Some("s-1".to_string())
        );
    }

    #[tokio::test]
    async fn test_double_void_conflicts() {
        let db = seeded("o-1").await;
        let repo = db.shipments();
        repo.insert(&shipment("s-1", "lbl-1", 0)).await.unwrap();

        repo.mark_voided("s-1").await.unwrap();
        assert!(matches!(
            repo.mark_voided("s-1").await.unwrap_err(),
            DbError::Conflict { .. }
        ));
        assert!(repo.mark_voided("s-9").await.unwrap_err().is_not_found());
    }
}

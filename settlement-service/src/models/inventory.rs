//! Inventory models for equipment issued at connection time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Stock item row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryItem {
    pub item_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity_on_hand: i32,
    pub created_utc: DateTime<Utc>,
}

/// Stock movement row, written in the same transaction as the movement.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryTransaction {
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub item_id: Uuid,
    /// Signed quantity change; issuing equipment is negative.
    pub change: i32,
    pub reason: String,
    pub reference_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

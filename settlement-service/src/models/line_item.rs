//! Invoice line item model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item on an invoice. References either a customer package
/// (subscription charge) or an inventory item (equipment), never both.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub description: String,
    pub package_id: Option<Uuid>,
    pub inventory_item_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub line_total: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a line item.
#[derive(Debug, Clone)]
pub struct CreateLineItem {
    pub description: String,
    pub package_id: Option<Uuid>,
    pub inventory_item_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
}

impl CreateLineItem {
    /// quantity × unit price − discount, rounded to cents.
    pub fn line_total(&self) -> Decimal {
        (self.quantity * self.unit_price - self.discount).round_dp(2)
    }
}

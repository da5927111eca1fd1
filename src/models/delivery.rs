use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryStatus {
    Active,
    Ended,
}

/// The single evolving position record for an in-transit order. Each courier
/// report overwrites `location` and `updated_at` in place; there is no
/// position history, last writer wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLocation {
    pub id: Uuid,
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub location: GeoPoint,
    pub status: DeliveryStatus,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry, written only on the courier-initiated
/// cancellation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub order_id: Uuid,
    pub courier_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

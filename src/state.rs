use dashmap::DashMap;
use uuid::Uuid;

use crate::models::courier::Courier;
use crate::models::delivery::{CancellationRecord, DeliveryLocation};
use crate::models::order::Order;
use crate::models::restaurant::Restaurant;
use crate::observability::metrics::Metrics;

/// In-process store. Entry guards from `get_mut` are the transactional
/// boundary: every order/courier state flip acquires the order entry first,
/// then the courier entry, and mutates both before releasing either. The
/// consistent lock order keeps concurrent transitions deadlock-free and makes
/// each flip atomic with respect to other transitions.
pub struct AppState {
    pub orders: DashMap<Uuid, Order>,
    pub couriers: DashMap<Uuid, Courier>,
    pub restaurants: DashMap<Uuid, Restaurant>,
    /// Keyed by order id: at most one active position record per order.
    pub deliveries: DashMap<Uuid, DeliveryLocation>,
    /// Courier-initiated cancellation audit, keyed by order id. An order is
    /// terminal after cancellation, so one record per order suffices.
    pub cancellations: DashMap<Uuid, CancellationRecord>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            couriers: DashMap::new(),
            restaurants: DashMap::new(),
            deliveries: DashMap::new(),
            cancellations: DashMap::new(),
            metrics: Metrics::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

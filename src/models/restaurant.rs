use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

/// Just enough menu knowledge to validate that every order item belongs to
/// the restaurant it was ordered from; menu management itself lives outside
/// this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: String,
    pub location: GeoPoint,
    pub menu_item_ids: Vec<Uuid>,
}

impl Restaurant {
    pub fn has_menu_item(&self, menu_item_id: Uuid) -> bool {
        self.menu_item_ids.contains(&menu_item_id)
    }
}

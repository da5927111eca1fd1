//! Seeding helpers shared by the unit tests.

use chrono::Utc;
use uuid::Uuid;

use crate::models::courier::{Courier, CourierStatus, GeoPoint};
use crate::models::order::{Order, OrderItem, OrderStatus};
use crate::models::restaurant::Restaurant;
use crate::state::AppState;

pub fn seed_restaurant(state: &AppState, owner_id: Uuid) -> Uuid {
    seed_restaurant_with_menu(state, owner_id, 1).0
}

pub fn seed_restaurant_with_menu(
    state: &AppState,
    owner_id: Uuid,
    menu_items: usize,
) -> (Uuid, Vec<Uuid>) {
    let id = Uuid::new_v4();
    let menu: Vec<Uuid> = (0..menu_items).map(|_| Uuid::new_v4()).collect();
    state.restaurants.insert(
        id,
        Restaurant {
            id,
            owner_id,
            name: "Test Lokantasi".to_string(),
            address: "Istiklal Cad. 1, Istanbul".to_string(),
            location: GeoPoint {
                lat: 41.0149,
                lng: 28.9768,
            },
            menu_item_ids: menu.clone(),
        },
    );
    (id, menu)
}

pub fn seed_order(state: &AppState, restaurant_id: Uuid, customer_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    state.orders.insert(
        id,
        Order {
            id,
            customer_id,
            restaurant_id,
            courier_id: None,
            status: OrderStatus::Pending,
            total_price: 100.0,
            delivery_address: "Alemdar Mah. 1, Istanbul".to_string(),
            items: vec![OrderItem {
                menu_item_id: Uuid::new_v4(),
                quantity: 1,
                unit_price: 100.0,
            }],
            ordered_at: now,
            updated_at: now,
        },
    );
    id
}

pub fn seed_courier(state: &AppState, status: CourierStatus) -> Uuid {
    let id = Uuid::new_v4();
    state.couriers.insert(
        id,
        Courier {
            id,
            name: "Test Kurye".to_string(),
            phone: "+90 555 000 0000".to_string(),
            status,
            updated_at: Utc::now(),
        },
    );
    id
}

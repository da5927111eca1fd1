use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AuthContext, Role};
use crate::error::AppError;
use crate::models::courier::CourierStatus;
use crate::models::delivery::{CancellationRecord, DeliveryStatus};
use crate::models::order::{Order, OrderItem, OrderStatus};
use crate::state::AppState;

pub struct NewOrder {
    pub restaurant_id: Uuid,
    pub items: Vec<OrderItem>,
    pub delivery_address: String,
}

/// Creates a pending order after checking every line item against the
/// restaurant's menu. The total is derived here, never taken from the client.
pub fn create_order(
    state: &AppState,
    ctx: &AuthContext,
    new_order: NewOrder,
) -> Result<Order, AppError> {
    if ctx.role != Role::Customer {
        return Err(AppError::Forbidden(
            "only customers can place orders".to_string(),
        ));
    }

    if new_order.items.is_empty() {
        return Err(AppError::Validation("order has no items".to_string()));
    }

    if new_order.delivery_address.trim().is_empty() {
        return Err(AppError::Validation(
            "delivery address is required".to_string(),
        ));
    }

    let restaurant = state
        .restaurants
        .get(&new_order.restaurant_id)
        .ok_or_else(|| {
            AppError::NotFound(format!("restaurant {} not found", new_order.restaurant_id))
        })?;

    for item in &new_order.items {
        if item.quantity == 0 {
            return Err(AppError::Validation(format!(
                "menu item {} has zero quantity",
                item.menu_item_id
            )));
        }
        if !item.unit_price.is_finite() || item.unit_price < 0.0 {
            return Err(AppError::Validation(format!(
                "menu item {} has an invalid price",
                item.menu_item_id
            )));
        }
        if !restaurant.has_menu_item(item.menu_item_id) {
            return Err(AppError::Validation(format!(
                "menu item {} does not belong to restaurant {}",
                item.menu_item_id, restaurant.id
            )));
        }
    }

    let total_price = new_order
        .items
        .iter()
        .map(|item| item.unit_price * f64::from(item.quantity))
        .sum();

    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        customer_id: ctx.user_id,
        restaurant_id: new_order.restaurant_id,
        courier_id: None,
        status: OrderStatus::Pending,
        total_price,
        delivery_address: new_order.delivery_address,
        items: new_order.items,
        ordered_at: now,
        updated_at: now,
    };

    state.orders.insert(order.id, order.clone());
    state
        .metrics
        .order_transitions_total
        .with_label_values(&["pending"])
        .inc();

    info!(order_id = %order.id, restaurant_id = %order.restaurant_id, total = order.total_price, "order created");

    Ok(order)
}

/// Marks an in-transit order delivered and frees its courier in the same
/// critical section. Only the assigned courier may complete.
pub fn complete_order(
    state: &AppState,
    ctx: &AuthContext,
    order_id: Uuid,
) -> Result<Order, AppError> {
    if ctx.role != Role::Courier {
        return Err(AppError::Forbidden(
            "only couriers can complete deliveries".to_string(),
        ));
    }

    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.status != OrderStatus::InTransit {
        return Err(AppError::InvalidTransition(format!(
            "order {order_id} is {:?}, not in transit",
            order.status
        )));
    }

    if order.courier_id != Some(ctx.user_id) {
        return Err(AppError::Forbidden(
            "order is assigned to another courier".to_string(),
        ));
    }

    let now = Utc::now();
    order.status = OrderStatus::Delivered;
    order.updated_at = now;

    if let Some(mut courier) = state.couriers.get_mut(&ctx.user_id) {
        courier.status = CourierStatus::Available;
        courier.updated_at = now;
    }

    end_delivery(state, order_id);

    state
        .metrics
        .order_transitions_total
        .with_label_values(&["delivered"])
        .inc();

    info!(order_id = %order_id, courier_id = %ctx.user_id, "order delivered");

    Ok(order.clone())
}

/// Cancels an order. Pending orders may be cancelled by their customer, the
/// restaurant owner, or an admin; in-transit orders only by their assigned
/// courier, with a reason, which is recorded for audit.
pub fn cancel_order(
    state: &AppState,
    ctx: &AuthContext,
    order_id: Uuid,
    reason: Option<String>,
) -> Result<Order, AppError> {
    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    match order.status {
        OrderStatus::Pending => {
            check_pending_cancel_rights(state, ctx, &order)?;

            order.status = OrderStatus::Cancelled;
            order.updated_at = Utc::now();
        }
        OrderStatus::InTransit => {
            if ctx.role != Role::Courier {
                return Err(AppError::InvalidTransition(
                    "an in-transit order can only be cancelled by its courier".to_string(),
                ));
            }
            if order.courier_id != Some(ctx.user_id) {
                return Err(AppError::Forbidden(
                    "order is assigned to another courier".to_string(),
                ));
            }

            let reason = reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    AppError::Validation("a cancellation reason is required".to_string())
                })?
                .to_string();

            let now = Utc::now();
            order.status = OrderStatus::Cancelled;
            order.updated_at = now;

            if let Some(mut courier) = state.couriers.get_mut(&ctx.user_id) {
                courier.status = CourierStatus::Available;
                courier.updated_at = now;
            }

            end_delivery(state, order_id);

            state.cancellations.insert(
                order_id,
                CancellationRecord {
                    order_id,
                    courier_id: ctx.user_id,
                    reason,
                    created_at: now,
                },
            );
        }
        status => {
            return Err(AppError::InvalidTransition(format!(
                "order {order_id} is already {status:?}"
            )));
        }
    }

    state
        .metrics
        .order_transitions_total
        .with_label_values(&["cancelled"])
        .inc();

    info!(order_id = %order_id, actor = %ctx.user_id, "order cancelled");

    Ok(order.clone())
}

fn check_pending_cancel_rights(
    state: &AppState,
    ctx: &AuthContext,
    order: &Order,
) -> Result<(), AppError> {
    match ctx.role {
        Role::Admin => Ok(()),
        Role::Customer if order.customer_id == ctx.user_id => Ok(()),
        Role::Customer => Err(AppError::Forbidden(
            "order belongs to another customer".to_string(),
        )),
        Role::RestaurantOwner => {
            let owns_restaurant = state
                .restaurants
                .get(&order.restaurant_id)
                .map(|restaurant| restaurant.owner_id == ctx.user_id)
                .unwrap_or(false);
            if owns_restaurant {
                Ok(())
            } else {
                Err(AppError::Forbidden(
                    "order belongs to another owner's restaurant".to_string(),
                ))
            }
        }
        Role::Courier => Err(AppError::InvalidTransition(
            "a pending order cannot be cancelled by a courier".to_string(),
        )),
    }
}

/// Flips the order's position record to Ended once the order leaves
/// InTransit. The row is kept; only its status changes.
fn end_delivery(state: &AppState, order_id: Uuid) {
    if let Some(mut delivery) = state.deliveries.get_mut(&order_id) {
        if delivery.status == DeliveryStatus::Active {
            delivery.status = DeliveryStatus::Ended;
            delivery.updated_at = Utc::now();
            state.metrics.active_deliveries.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{cancel_order, complete_order, create_order, NewOrder};
    use crate::auth::{AuthContext, Role};
    use crate::engine::dispatch::assign_courier;
    use crate::error::AppError;
    use crate::models::courier::CourierStatus;
    use crate::models::order::{OrderItem, OrderStatus};
    use crate::state::AppState;
    use crate::test_support::{seed_courier, seed_restaurant_with_menu};

    fn ctx(user_id: Uuid, role: Role) -> AuthContext {
        AuthContext { user_id, role }
    }

    fn place_order(state: &AppState, customer_id: Uuid, restaurant_id: Uuid) -> Uuid {
        let menu_item = state
            .restaurants
            .get(&restaurant_id)
            .unwrap()
            .menu_item_ids[0];
        create_order(
            state,
            &ctx(customer_id, Role::Customer),
            NewOrder {
                restaurant_id,
                items: vec![OrderItem {
                    menu_item_id: menu_item,
                    quantity: 2,
                    unit_price: 75.0,
                }],
                delivery_address: "Alemdar Mah. 1, Istanbul".to_string(),
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn create_order_totals_items_and_starts_pending() {
        let state = AppState::new();
        let (restaurant_id, menu) = seed_restaurant_with_menu(&state, Uuid::new_v4(), 2);
        let customer = Uuid::new_v4();

        let order = create_order(
            &state,
            &ctx(customer, Role::Customer),
            NewOrder {
                restaurant_id,
                items: vec![
                    OrderItem {
                        menu_item_id: menu[0],
                        quantity: 2,
                        unit_price: 50.0,
                    },
                    OrderItem {
                        menu_item_id: menu[1],
                        quantity: 1,
                        unit_price: 50.0,
                    },
                ],
                delivery_address: "Alemdar Mah. 1, Istanbul".to_string(),
            },
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_price, 150.0);
        assert_eq!(order.customer_id, customer);
        assert!(order.courier_id.is_none());
    }

    #[test]
    fn create_order_rejects_empty_items() {
        let state = AppState::new();
        let (restaurant_id, _) = seed_restaurant_with_menu(&state, Uuid::new_v4(), 1);

        let err = create_order(
            &state,
            &ctx(Uuid::new_v4(), Role::Customer),
            NewOrder {
                restaurant_id,
                items: vec![],
                delivery_address: "somewhere".to_string(),
            },
        )
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn create_order_rejects_foreign_menu_item() {
        let state = AppState::new();
        let (restaurant_id, _) = seed_restaurant_with_menu(&state, Uuid::new_v4(), 1);

        let err = create_order(
            &state,
            &ctx(Uuid::new_v4(), Role::Customer),
            NewOrder {
                restaurant_id,
                items: vec![OrderItem {
                    menu_item_id: Uuid::new_v4(),
                    quantity: 1,
                    unit_price: 10.0,
                }],
                delivery_address: "somewhere".to_string(),
            },
        )
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn completion_frees_the_courier() {
        let state = AppState::new();
        let owner = Uuid::new_v4();
        let (restaurant_id, _) = seed_restaurant_with_menu(&state, owner, 1);
        let order_id = place_order(&state, Uuid::new_v4(), restaurant_id);
        let courier_id = seed_courier(&state, CourierStatus::Available);

        assign_courier(&state, &ctx(owner, Role::RestaurantOwner), order_id, courier_id).unwrap();
        let order = complete_order(&state, &ctx(courier_id, Role::Courier), order_id).unwrap();

        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(
            state.couriers.get(&courier_id).unwrap().status,
            CourierStatus::Available
        );
    }

    #[test]
    fn completion_by_wrong_courier_is_forbidden() {
        let state = AppState::new();
        let owner = Uuid::new_v4();
        let (restaurant_id, _) = seed_restaurant_with_menu(&state, owner, 1);
        let order_id = place_order(&state, Uuid::new_v4(), restaurant_id);
        let courier_id = seed_courier(&state, CourierStatus::Available);
        let other_courier = seed_courier(&state, CourierStatus::Available);

        assign_courier(&state, &ctx(owner, Role::RestaurantOwner), order_id, courier_id).unwrap();
        let err = complete_order(&state, &ctx(other_courier, Role::Courier), order_id).unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(
            state.orders.get(&order_id).unwrap().status,
            OrderStatus::InTransit
        );
    }

    #[test]
    fn courier_cancel_requires_reason_and_writes_audit_record() {
        let state = AppState::new();
        let owner = Uuid::new_v4();
        let (restaurant_id, _) = seed_restaurant_with_menu(&state, owner, 1);
        let order_id = place_order(&state, Uuid::new_v4(), restaurant_id);
        let courier_id = seed_courier(&state, CourierStatus::Available);

        assign_courier(&state, &ctx(owner, Role::RestaurantOwner), order_id, courier_id).unwrap();

        let courier_ctx = ctx(courier_id, Role::Courier);
        let err = cancel_order(&state, &courier_ctx, order_id, None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let order =
            cancel_order(&state, &courier_ctx, order_id, Some("flat tire".to_string())).unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(
            state.couriers.get(&courier_id).unwrap().status,
            CourierStatus::Available
        );
        let record = state.cancellations.get(&order_id).unwrap();
        assert_eq!(record.reason, "flat tire");
        assert_eq!(record.courier_id, courier_id);
    }

    #[test]
    fn customer_can_cancel_only_while_pending() {
        let state = AppState::new();
        let owner = Uuid::new_v4();
        let (restaurant_id, _) = seed_restaurant_with_menu(&state, owner, 1);
        let customer = Uuid::new_v4();
        let order_id = place_order(&state, customer, restaurant_id);

        let order = cancel_order(&state, &ctx(customer, Role::Customer), order_id, None).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);

        // Terminal now, nothing further is legal.
        let err = cancel_order(&state, &ctx(customer, Role::Customer), order_id, None).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn customer_cannot_cancel_in_transit_order() {
        let state = AppState::new();
        let owner = Uuid::new_v4();
        let (restaurant_id, _) = seed_restaurant_with_menu(&state, owner, 1);
        let customer = Uuid::new_v4();
        let order_id = place_order(&state, customer, restaurant_id);
        let courier_id = seed_courier(&state, CourierStatus::Available);

        assign_courier(&state, &ctx(owner, Role::RestaurantOwner), order_id, courier_id).unwrap();

        let err =
            cancel_order(&state, &ctx(customer, Role::Customer), order_id, None).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }
}

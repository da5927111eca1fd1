use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{AuthContext, Role};
use crate::error::AppError;
use crate::models::courier::{Courier, CourierStatus};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

/// Atomically pairs a pending order with an available courier. The caller
/// picks the courier explicitly; this function only validates and commits.
///
/// Both entry guards are held across the two writes, so readers observe
/// either the pre-state or the post-state. Two racing assignments on the
/// same courier serialize on the courier entry: exactly one sees Available.
pub fn assign_courier(
    state: &AppState,
    ctx: &AuthContext,
    order_id: Uuid,
    courier_id: Uuid,
) -> Result<(Order, Courier), AppError> {
    let result = try_assign(state, ctx, order_id, courier_id);

    let outcome = match &result {
        Ok(_) => "success",
        Err(AppError::CourierUnavailable) => "courier_unavailable",
        Err(_) => "rejected",
    };
    state
        .metrics
        .dispatch_total
        .with_label_values(&[outcome])
        .inc();

    result
}

fn try_assign(
    state: &AppState,
    ctx: &AuthContext,
    order_id: Uuid,
    courier_id: Uuid,
) -> Result<(Order, Courier), AppError> {
    // Lock order: always the order entry before the courier entry.
    let mut order = state
        .orders
        .get_mut(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    check_dispatch_rights(state, ctx, &order)?;

    if order.status != OrderStatus::Pending {
        return Err(AppError::InvalidTransition(format!(
            "only pending orders can be assigned a courier (order {order_id} is {:?})",
            order.status
        )));
    }

    let mut courier = state
        .couriers
        .get_mut(&courier_id)
        .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;

    if courier.status != CourierStatus::Available {
        return Err(AppError::CourierUnavailable);
    }

    let now = Utc::now();
    order.status = OrderStatus::InTransit;
    order.courier_id = Some(courier_id);
    order.updated_at = now;
    courier.status = CourierStatus::Busy;
    courier.updated_at = now;

    state
        .metrics
        .order_transitions_total
        .with_label_values(&["in_transit"])
        .inc();

    info!(order_id = %order_id, courier_id = %courier_id, "courier assigned");

    Ok((order.clone(), courier.clone()))
}

fn check_dispatch_rights(
    state: &AppState,
    ctx: &AuthContext,
    order: &Order,
) -> Result<(), AppError> {
    if ctx.is_admin() {
        return Ok(());
    }

    if ctx.role != Role::RestaurantOwner {
        return Err(AppError::Forbidden(
            "only the restaurant owner can assign a courier".to_string(),
        ));
    }

    let owns_restaurant = state
        .restaurants
        .get(&order.restaurant_id)
        .map(|restaurant| restaurant.owner_id == ctx.user_id)
        .unwrap_or(false);

    if !owns_restaurant {
        return Err(AppError::Forbidden(
            "order belongs to another owner's restaurant".to_string(),
        ));
    }

    Ok(())
}

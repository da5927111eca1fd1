use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::auth::{AuthContext, Role};
use crate::error::AppError;
use crate::geo::is_finite_point;
use crate::models::courier::GeoPoint;
use crate::models::delivery::{DeliveryLocation, DeliveryStatus};
use crate::models::order::OrderStatus;
use crate::state::AppState;

/// Denormalized view returned with every successful location read, so the
/// tracking client never needs a second round trip for names and addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub delivery: DeliveryLocation,
    pub order: OrderSummary,
    pub courier: CourierSummary,
    pub restaurant: RestaurantSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub status: OrderStatus,
    pub courier_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub delivery_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierSummary {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantSummary {
    pub name: String,
    pub address: String,
    pub location: GeoPoint,
}

/// Outcome of a location read. `NotReported` is an expected transient state
/// (the courier has not pushed a position yet); the extra fields let the
/// caller tell it apart from a missing order and keep retrying.
#[derive(Debug)]
pub enum LocationQuery {
    Ready(Box<TrackingSnapshot>),
    NotReported {
        order_exists: bool,
        order_status: Option<OrderStatus>,
        order_has_courier: bool,
    },
}

/// Upserts the single position record for an in-transit order. Re-sending
/// the same coordinate is harmless: the location stays put, only the
/// timestamp advances.
pub fn report_location(
    state: &AppState,
    ctx: &AuthContext,
    order_id: Uuid,
    location: GeoPoint,
) -> Result<DeliveryLocation, AppError> {
    if ctx.role != Role::Courier {
        return Err(AppError::Forbidden(
            "only couriers can report positions".to_string(),
        ));
    }

    if !is_finite_point(&location) {
        return Err(AppError::Validation(
            "location coordinates must be finite numbers".to_string(),
        ));
    }

    // The shared guard on the order entry is held across the upsert so the
    // order cannot leave InTransit (and end the delivery row) underneath it.
    let order = state
        .orders
        .get(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.status != OrderStatus::InTransit {
        return Err(AppError::NotFound(format!(
            "order {order_id} has no delivery in progress"
        )));
    }

    if order.courier_id != Some(ctx.user_id) {
        return Err(AppError::Forbidden(
            "order is assigned to another courier".to_string(),
        ));
    }

    let now = Utc::now();
    let delivery = match state.deliveries.entry(order_id) {
        Entry::Occupied(mut occupied) => {
            let delivery = occupied.get_mut();
            delivery.location = location;
            delivery.updated_at = now;
            delivery.clone()
        }
        Entry::Vacant(vacant) => {
            state.metrics.active_deliveries.inc();
            vacant
                .insert(DeliveryLocation {
                    id: Uuid::new_v4(),
                    order_id,
                    courier_id: ctx.user_id,
                    location,
                    status: DeliveryStatus::Active,
                    updated_at: now,
                })
                .clone()
        }
    };

    drop(order);

    state.metrics.location_reports_total.inc();
    debug!(order_id = %order_id, lat = location.lat, lng = location.lng, "position reported");

    Ok(delivery)
}

/// Latest position plus the denormalized order summary. Visible to the
/// order's customer, its courier, the restaurant owner, and admins.
pub fn get_location(
    state: &AppState,
    ctx: &AuthContext,
    order_id: Uuid,
) -> Result<LocationQuery, AppError> {
    let Some(order) = state.orders.get(&order_id).map(|entry| entry.value().clone()) else {
        return Ok(LocationQuery::NotReported {
            order_exists: false,
            order_status: None,
            order_has_courier: false,
        });
    };

    let allowed = ctx.is_admin()
        || order.customer_id == ctx.user_id
        || order.courier_id == Some(ctx.user_id)
        || state
            .restaurants
            .get(&order.restaurant_id)
            .map(|restaurant| restaurant.owner_id == ctx.user_id)
            .unwrap_or(false);

    if !allowed {
        return Err(AppError::Forbidden(
            "you cannot view tracking data for this order".to_string(),
        ));
    }

    let Some(delivery) = state
        .deliveries
        .get(&order_id)
        .map(|entry| entry.value().clone())
    else {
        return Ok(LocationQuery::NotReported {
            order_exists: true,
            order_status: Some(order.status),
            order_has_courier: order.courier_id.is_some(),
        });
    };

    let courier = state
        .couriers
        .get(&delivery.courier_id)
        .map(|entry| CourierSummary {
            name: entry.name.clone(),
            phone: entry.phone.clone(),
        })
        .ok_or_else(|| {
            AppError::Internal(format!("courier {} missing from store", delivery.courier_id))
        })?;

    let restaurant = state
        .restaurants
        .get(&order.restaurant_id)
        .map(|entry| RestaurantSummary {
            name: entry.name.clone(),
            address: entry.address.clone(),
            location: entry.location,
        })
        .ok_or_else(|| {
            AppError::Internal(format!(
                "restaurant {} missing from store",
                order.restaurant_id
            ))
        })?;

    Ok(LocationQuery::Ready(Box::new(TrackingSnapshot {
        delivery,
        order: OrderSummary {
            id: order.id,
            status: order.status,
            courier_id: order.courier_id,
            customer_id: order.customer_id,
            delivery_address: order.delivery_address,
        },
        courier,
        restaurant,
    })))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{get_location, report_location, LocationQuery};
    use crate::auth::{AuthContext, Role};
    use crate::engine::dispatch::assign_courier;
    use crate::error::AppError;
    use crate::models::courier::{CourierStatus, GeoPoint};
    use crate::models::order::OrderStatus;
    use crate::state::AppState;
    use crate::test_support::{seed_courier, seed_order, seed_restaurant};

    fn ctx(user_id: Uuid, role: Role) -> AuthContext {
        AuthContext { user_id, role }
    }

    struct Fixture {
        state: AppState,
        order_id: Uuid,
        courier_id: Uuid,
        customer_id: Uuid,
    }

    fn in_transit_fixture() -> Fixture {
        let state = AppState::new();
        let owner = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let restaurant_id = seed_restaurant(&state, owner);
        let order_id = seed_order(&state, restaurant_id, customer_id);
        let courier_id = seed_courier(&state, CourierStatus::Available);
        assign_courier(
            &state,
            &ctx(owner, Role::RestaurantOwner),
            order_id,
            courier_id,
        )
        .unwrap();
        Fixture {
            state,
            order_id,
            courier_id,
            customer_id,
        }
    }

    #[test]
    fn report_then_get_round_trips_the_point() {
        let f = in_transit_fixture();
        let point = GeoPoint {
            lat: 41.01,
            lng: 28.97,
        };

        report_location(
            &f.state,
            &ctx(f.courier_id, Role::Courier),
            f.order_id,
            point,
        )
        .unwrap();

        let query = get_location(
            &f.state,
            &ctx(f.customer_id, Role::Customer),
            f.order_id,
        )
        .unwrap();

        match query {
            LocationQuery::Ready(snapshot) => {
                assert_eq!(snapshot.delivery.location, point);
                assert_eq!(snapshot.order.status, OrderStatus::InTransit);
                assert_eq!(snapshot.order.courier_id, Some(f.courier_id));
            }
            other => panic!("expected a position, got {other:?}"),
        }
    }

    #[test]
    fn repeated_reports_are_idempotent() {
        let f = in_transit_fixture();
        let point = GeoPoint {
            lat: 41.01,
            lng: 28.97,
        };
        let courier = ctx(f.courier_id, Role::Courier);

        let first = report_location(&f.state, &courier, f.order_id, point).unwrap();
        let second = report_location(&f.state, &courier, f.order_id, point).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.location, point);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(f.state.deliveries.len(), 1);
    }

    #[test]
    fn report_by_unassigned_courier_is_forbidden() {
        let f = in_transit_fixture();
        let stranger = seed_courier(&f.state, CourierStatus::Available);

        let err = report_location(
            &f.state,
            &ctx(stranger, Role::Courier),
            f.order_id,
            GeoPoint {
                lat: 41.0,
                lng: 29.0,
            },
        )
        .unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn report_rejects_non_finite_coordinates() {
        let f = in_transit_fixture();

        let err = report_location(
            &f.state,
            &ctx(f.courier_id, Role::Courier),
            f.order_id,
            GeoPoint {
                lat: f64::NAN,
                lng: 29.0,
            },
        )
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn get_before_first_report_is_retryable_not_fatal() {
        let f = in_transit_fixture();

        let query = get_location(
            &f.state,
            &ctx(f.customer_id, Role::Customer),
            f.order_id,
        )
        .unwrap();

        match query {
            LocationQuery::NotReported {
                order_exists,
                order_status,
                order_has_courier,
            } => {
                assert!(order_exists);
                assert_eq!(order_status, Some(OrderStatus::InTransit));
                assert!(order_has_courier);
            }
            other => panic!("expected not-reported, got {other:?}"),
        }
    }

    #[test]
    fn get_for_missing_order_reports_nonexistence() {
        let f = in_transit_fixture();

        let query = get_location(
            &f.state,
            &ctx(f.customer_id, Role::Customer),
            Uuid::new_v4(),
        )
        .unwrap();

        match query {
            LocationQuery::NotReported { order_exists, .. } => assert!(!order_exists),
            other => panic!("expected not-reported, got {other:?}"),
        }
    }

    #[test]
    fn foreign_customer_cannot_read_tracking_data() {
        let f = in_transit_fixture();

        let err = get_location(&f.state, &ctx(Uuid::new_v4(), Role::Customer), f.order_id)
            .unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
    }
}

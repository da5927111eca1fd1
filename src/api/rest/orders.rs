use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthContext, Role};
use crate::engine::dispatch::assign_courier;
use crate::engine::transitions::{cancel_order, complete_order, create_order, NewOrder};
use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::order::{Order, OrderItem, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create).get(list))
        .route("/orders/:id", get(get_one))
        .route("/orders/:id/assign", patch(assign))
        .route("/orders/:id/complete", post(complete))
        .route("/orders/:id/cancel", post(cancel))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub restaurant_id: Uuid,
    pub items: Vec<OrderItem>,
    pub delivery_address: String,
}

#[derive(Deserialize)]
pub struct AssignCourierRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize, Default)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct DispatchResponse {
    pub order: Order,
    pub courier: Courier,
}

async fn create(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let order = create_order(
        &state,
        &ctx,
        NewOrder {
            restaurant_id: payload.restaurant_id,
            items: payload.items,
            delivery_address: payload.delivery_address,
        },
    )?;

    Ok(Json(order))
}

async fn list(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<Vec<Order>>, AppError> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| visible_to(&state, &ctx, entry.value()))
        .map(|entry| entry.value().clone())
        .collect();

    // Couriers only see their active work, everyone else their history.
    if ctx.role == Role::Courier {
        orders.retain(|order| order.status == OrderStatus::InTransit);
    }

    orders.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at));

    Ok(Json(orders))
}

async fn get_one(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    if !visible_to(&state, &ctx, &order) {
        return Err(AppError::Forbidden(
            "you cannot view this order".to_string(),
        ));
    }

    Ok(Json(order))
}

async fn assign(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignCourierRequest>,
) -> Result<Json<DispatchResponse>, AppError> {
    let (order, courier) = assign_courier(&state, &ctx, id, payload.courier_id)?;

    Ok(Json(DispatchResponse { order, courier }))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = complete_order(&state, &ctx, id)?;

    Ok(Json(order))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderRequest>>,
) -> Result<Json<Order>, AppError> {
    let reason = payload.and_then(|Json(body)| body.reason);
    let order = cancel_order(&state, &ctx, id, reason)?;

    Ok(Json(order))
}

fn visible_to(state: &AppState, ctx: &AuthContext, order: &Order) -> bool {
    match ctx.role {
        Role::Admin => true,
        Role::Customer => order.customer_id == ctx.user_id,
        Role::Courier => order.courier_id == Some(ctx.user_id),
        Role::RestaurantOwner => state
            .restaurants
            .get(&order.restaurant_id)
            .map(|restaurant| restaurant.owner_id == ctx.user_id)
            .unwrap_or(false),
    }
}

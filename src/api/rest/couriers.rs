use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthContext, Role};
use crate::error::AppError;
use crate::models::courier::{Courier, CourierStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create).get(list))
        .route("/couriers/:id/status", patch(update_status))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub phone: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CourierStatus,
}

async fn create(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if !ctx.is_admin() {
        return Err(AppError::Forbidden(
            "only admins can register couriers".to_string(),
        ));
    }

    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        status: CourierStatus::Available,
        updated_at: Utc::now(),
    };

    state.couriers.insert(courier.id, courier.clone());

    Ok(Json(courier))
}

async fn list(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
) -> Result<Json<Vec<Courier>>, AppError> {
    if !matches!(ctx.role, Role::RestaurantOwner | Role::Admin) {
        return Err(AppError::Forbidden(
            "only restaurant owners and admins can list couriers".to_string(),
        ));
    }

    let couriers = state
        .couriers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    Ok(Json(couriers))
}

/// Shift toggle between Available and Offline, by the courier themself or an
/// admin. Busy is never set here: it belongs to the order lifecycle.
async fn update_status(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Courier>, AppError> {
    if !ctx.is_admin() && !(ctx.role == Role::Courier && ctx.user_id == id) {
        return Err(AppError::Forbidden(
            "you cannot change this courier's status".to_string(),
        ));
    }

    if payload.status == CourierStatus::Busy {
        return Err(AppError::Validation(
            "busy is set by dispatch, not by hand".to_string(),
        ));
    }

    let mut courier = state
        .couriers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;

    if courier.status == CourierStatus::Busy {
        return Err(AppError::InvalidTransition(
            "courier has a delivery in progress".to_string(),
        ));
    }

    courier.status = payload.status;
    courier.updated_at = Utc::now();

    Ok(Json(courier.clone()))
}

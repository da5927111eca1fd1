use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthContext, Role};
use crate::error::AppError;
use crate::geo::is_finite_point;
use crate::models::courier::GeoPoint;
use crate::models::restaurant::Restaurant;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/restaurants", post(create).get(list))
}

#[derive(Deserialize)]
pub struct CreateRestaurantRequest {
    pub name: String,
    pub address: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub menu_item_ids: Vec<Uuid>,
}

async fn create(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(payload): Json<CreateRestaurantRequest>,
) -> Result<Json<Restaurant>, AppError> {
    if !matches!(ctx.role, Role::RestaurantOwner | Role::Admin) {
        return Err(AppError::Forbidden(
            "only restaurant owners can register restaurants".to_string(),
        ));
    }

    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    if !is_finite_point(&payload.location) {
        return Err(AppError::Validation(
            "location coordinates must be finite numbers".to_string(),
        ));
    }

    let restaurant = Restaurant {
        id: Uuid::new_v4(),
        owner_id: ctx.user_id,
        name: payload.name,
        address: payload.address,
        location: payload.location,
        menu_item_ids: payload.menu_item_ids,
    };

    state.restaurants.insert(restaurant.id, restaurant.clone());

    Ok(Json(restaurant))
}

async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<Restaurant>> {
    let restaurants = state
        .restaurants
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    Json(restaurants)
}

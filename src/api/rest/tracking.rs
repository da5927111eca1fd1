use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::AppError;
use crate::models::courier::GeoPoint;
use crate::models::delivery::DeliveryLocation;
use crate::state::AppState;
use crate::tracking::service::{get_location, report_location, LocationQuery};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/courier-location", post(report).get(fetch))
}

#[derive(Deserialize)]
pub struct ReportLocationRequest {
    pub order_id: Uuid,
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct LocationParams {
    pub order_id: Uuid,
}

async fn report(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Json(payload): Json<ReportLocationRequest>,
) -> Result<Json<DeliveryLocation>, AppError> {
    let delivery = report_location(&state, &ctx, payload.order_id, payload.location)?;

    Ok(Json(delivery))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    ctx: AuthContext,
    Query(params): Query<LocationParams>,
) -> Result<Response, AppError> {
    match get_location(&state, &ctx, params.order_id)? {
        LocationQuery::Ready(snapshot) => Ok(Json(*snapshot).into_response()),
        LocationQuery::NotReported {
            order_exists,
            order_status,
            order_has_courier,
        } => {
            // Retryable for the tracking client: the order may simply not
            // have a reported position yet. The extra fields let callers
            // tell that apart from a missing order.
            let body = Json(json!({
                "error": "no position reported for this order",
                "details": "the courier may not have started sharing their location yet",
                "order_exists": order_exists,
                "order_status": order_status,
                "order_has_courier": order_has_courier,
            }));
            Ok((StatusCode::NOT_FOUND, body).into_response())
        }
    }
}

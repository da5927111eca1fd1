use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    RestaurantOwner,
    Courier,
    Admin,
}

/// Verified caller identity. Session handling and identity verification live
/// in the front proxy; by the time a request reaches this service the proxy
/// has resolved the session into these two trusted headers.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

const USER_ID_HEADER: &str = "x-user-id";
const ROLE_HEADER: &str = "x-user-role";

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or(AppError::Unauthenticated)?;

        let role = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_role)
            .ok_or(AppError::Unauthenticated)?;

        Ok(AuthContext { user_id, role })
    }
}

fn parse_role(raw: &str) -> Option<Role> {
    match raw {
        "customer" => Some(Role::Customer),
        "restaurant_owner" => Some(Role::RestaurantOwner),
        "courier" => Some(Role::Courier),
        "admin" => Some(Role::Admin),
        _ => None,
    }
}

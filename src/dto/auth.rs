use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Principal;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SessionRequest {
    /// Signed identity-provider envelope (`key=value` pairs with a `hash`
    /// signature field).
    pub init_data: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub access_token: String,
    pub principal: Principal,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    /// Principal id.
    pub sub: String,
    /// Session id; the session row is checked on every request.
    pub sid: String,
    pub exp: usize,
}

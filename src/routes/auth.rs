use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::auth::{SessionRequest, SessionResponse},
    error::AppResult,
    response::ApiResponse,
    services::auth_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/session", post(create_session))
}

#[utoipa::path(
    post,
    path = "/api/auth/session",
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Exchange a signed identity envelope for an access token", body = ApiResponse<SessionResponse>),
        (status = 401, description = "Invalid or stale envelope")
    ),
    tag = "Auth"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionRequest>,
) -> AppResult<Json<ApiResponse<SessionResponse>>> {
    let resp = auth_service::bootstrap_session(&state, payload).await?;
    Ok(Json(resp))
}

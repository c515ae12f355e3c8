use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::payments::{
        CashPaymentRequest, CreatePaymentRequest, PaymentWithRefunds, RefundRequest,
        TerminalPaymentRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthPrincipal,
    models::Payment,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_payment))
        .route("/cash", post(cash_payment))
        .route("/terminal", post(terminal_payment))
        .route("/{id}", get(get_payment))
        .route("/{id}/refund", post(refund_payment))
        .route("/webhooks/{provider}", post(provider_webhook))
}

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Open an asynchronous card payment", body = ApiResponse<Payment>),
        (status = 409, description = "Order already has a payment"),
        (status = 503, description = "Payment provider unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(payload): Json<CreatePaymentRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp = payment_service::create_payment(&state, &auth, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/cash",
    request_body = CashPaymentRequest,
    responses(
        (status = 200, description = "Record a cash payment, settled immediately", body = ApiResponse<Payment>),
        (status = 400, description = "Insufficient cash received"),
        (status = 409, description = "Order already has a payment")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn cash_payment(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(payload): Json<CashPaymentRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp = payment_service::create_cash_payment(&state, &auth, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/terminal",
    request_body = TerminalPaymentRequest,
    responses(
        (status = 200, description = "Record a terminal payment, settled immediately", body = ApiResponse<Payment>),
        (status = 409, description = "Order already has a payment")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn terminal_payment(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(payload): Json<TerminalPaymentRequest>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let resp = payment_service::create_terminal_payment(&state, &auth, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment with its refunds", body = ApiResponse<PaymentWithRefunds>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PaymentWithRefunds>>> {
    let resp = payment_service::get_payment(&state, &auth, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/{id}/refund",
    params(("id" = Uuid, Path, description = "Payment ID")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund recorded", body = ApiResponse<PaymentWithRefunds>),
        (status = 400, description = "Amount outside refundable range"),
        (status = 403, description = "Forbidden"),
        (status = 503, description = "Payment provider unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> AppResult<Json<ApiResponse<PaymentWithRefunds>>> {
    let resp = payment_service::refund_payment(&state, &auth, id, payload).await?;
    Ok(Json(resp))
}

/// Provider webhook endpoint. Unauthenticated; trust comes from the
/// signature over the raw body. Replies 200 for valid events (including
/// idempotent replays) and 400 for bad signatures, never leaking details.
#[utoipa::path(
    post,
    path = "/api/payments/webhooks/{provider}",
    params(("provider" = String, Path, description = "Provider slug: psp-a or psp-b")),
    request_body = String,
    responses(
        (status = 200, description = "Event accepted (or replayed)"),
        (status = 400, description = "Bad signature or malformed event"),
        (status = 404, description = "Unknown provider")
    ),
    tag = "Payments"
)]
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(adapter) = state.providers.by_slug(&provider) else {
        return StatusCode::NOT_FOUND;
    };

    let event = match adapter.verify_webhook(&body, &headers) {
        Ok(event) => event,
        Err(AppError::InvalidWebhookSignature) => {
            tracing::warn!(provider = %provider, "webhook signature verification failed");
            return StatusCode::BAD_REQUEST;
        }
        Err(err) => {
            tracing::warn!(provider = %provider, error = %err, "webhook rejected");
            return StatusCode::BAD_REQUEST;
        }
    };

    match payment_service::apply_webhook_event(&state, &provider, event).await {
        Ok(outcome) => {
            tracing::info!(provider = %provider, ?outcome, "webhook processed");
            StatusCode::OK
        }
        Err(err) => {
            tracing::error!(provider = %provider, error = %err, "webhook processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

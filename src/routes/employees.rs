use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::workforce::{
        ClockInRequest, ClockOutRequest, ConsumeInviteRequest, ConsumeInviteResponse,
        CreateEmployeeRequest, CreateInviteRequest, EmployeeList, PayrollSummary,
        ScheduleShiftRequest, ShiftList, UpdateEmployeeRequest,
    },
    error::AppResult,
    middleware::auth::AuthPrincipal,
    models::{Employee, InviteToken, Shift},
    response::ApiResponse,
    routes::params::{PayrollQuery, ShiftListQuery},
    services::workforce_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_employees).post(create_employee))
        .route("/{id}", patch(update_employee))
        .route("/{id}/payroll", get(payroll))
        .route("/invites", post(create_invite))
        .route("/invites/consume", post(consume_invite))
        .route("/shifts", get(list_shifts).post(schedule_shift))
        .route("/clock-in", post(clock_in))
        .route("/clock-out", post(clock_out))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmployeeListQuery {
    pub restaurant_id: Uuid,
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(("restaurant_id" = Uuid, Query, description = "Restaurant scope")),
    responses(
        (status = 200, description = "List employees of a restaurant", body = ApiResponse<EmployeeList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn list_employees(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Query(query): Query<EmployeeListQuery>,
) -> AppResult<Json<ApiResponse<EmployeeList>>> {
    let resp = workforce_service::list_employees(&state, &auth, query.restaurant_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployeeRequest,
    responses(
        (status = 200, description = "Create an employee", body = ApiResponse<Employee>),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Phone already in use at this restaurant")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn create_employee(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(payload): Json<CreateEmployeeRequest>,
) -> AppResult<Json<ApiResponse<Employee>>> {
    let resp = workforce_service::create_employee(&state, &auth, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/employees/{id}",
    params(("id" = Uuid, Path, description = "Employee ID")),
    request_body = UpdateEmployeeRequest,
    responses(
        (status = 200, description = "Update an employee", body = ApiResponse<Employee>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn update_employee(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateEmployeeRequest>,
) -> AppResult<Json<ApiResponse<Employee>>> {
    let resp = workforce_service::update_employee(&state, &auth, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/employees/invites",
    request_body = CreateInviteRequest,
    responses(
        (status = 200, description = "Mint an invite token", body = ApiResponse<InviteToken>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn create_invite(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(payload): Json<CreateInviteRequest>,
) -> AppResult<Json<ApiResponse<InviteToken>>> {
    let resp = workforce_service::create_invite(&state, &auth, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/employees/invites/consume",
    request_body = ConsumeInviteRequest,
    responses(
        (status = 200, description = "Join a restaurant via invite", body = ApiResponse<ConsumeInviteResponse>),
        (status = 404, description = "Unknown token"),
        (status = 409, description = "Invite expired or exhausted")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn consume_invite(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(payload): Json<ConsumeInviteRequest>,
) -> AppResult<Json<ApiResponse<ConsumeInviteResponse>>> {
    let resp = workforce_service::consume_invite(&state, &auth, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/employees/shifts",
    params(
        ("restaurant_id" = Uuid, Query, description = "Restaurant scope"),
        ("employee_id" = Option<Uuid>, Query, description = "Filter by employee"),
        ("from" = Option<String>, Query, description = "Window start (RFC 3339)"),
        ("to" = Option<String>, Query, description = "Window end (RFC 3339)")
    ),
    responses(
        (status = 200, description = "Shifts in the window", body = ApiResponse<ShiftList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn list_shifts(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Query(query): Query<ShiftListQuery>,
) -> AppResult<Json<ApiResponse<ShiftList>>> {
    let resp = workforce_service::list_shifts(&state, &auth, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/employees/shifts",
    request_body = ScheduleShiftRequest,
    responses(
        (status = 200, description = "Schedule a shift", body = ApiResponse<Shift>),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Overlapping shift")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn schedule_shift(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(payload): Json<ScheduleShiftRequest>,
) -> AppResult<Json<ApiResponse<Shift>>> {
    let resp = workforce_service::schedule_shift(&state, &auth, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/employees/clock-in",
    request_body = ClockInRequest,
    responses(
        (status = 200, description = "Start (or activate) a shift", body = ApiResponse<Shift>),
        (status = 409, description = "An active shift already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn clock_in(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(payload): Json<ClockInRequest>,
) -> AppResult<Json<ApiResponse<Shift>>> {
    let resp = workforce_service::clock_in(&state, &auth, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/employees/clock-out",
    request_body = ClockOutRequest,
    responses(
        (status = 200, description = "Close the active shift", body = ApiResponse<Shift>),
        (status = 409, description = "No active shift")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn clock_out(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(payload): Json<ClockOutRequest>,
) -> AppResult<Json<ApiResponse<Shift>>> {
    let resp = workforce_service::clock_out(&state, &auth, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/employees/{id}/payroll",
    params(
        ("id" = Uuid, Path, description = "Employee ID"),
        ("from" = String, Query, description = "Window start (RFC 3339)"),
        ("to" = String, Query, description = "Window end (RFC 3339)")
    ),
    responses(
        (status = 200, description = "Completed-shift rollup for payroll", body = ApiResponse<PayrollSummary>),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    ),
    security(("bearer_auth" = [])),
    tag = "Employees"
)]
pub async fn payroll(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Path(id): Path<Uuid>,
    Query(query): Query<PayrollQuery>,
) -> AppResult<Json<ApiResponse<PayrollSummary>>> {
    let resp = workforce_service::payroll(&state, &auth, id, query).await?;
    Ok(Json(resp))
}

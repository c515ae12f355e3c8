use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::RngCore;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    authz::{self, Resource, Verb},
    db,
    dto::workforce::{
        ClockInRequest, ClockOutRequest, ConsumeInviteRequest, ConsumeInviteResponse,
        CreateEmployeeRequest, CreateInviteRequest, EmployeeList, PayrollSummary,
        ScheduleShiftRequest, ShiftList, UpdateEmployeeRequest,
    },
    entity::{employees, invite_tokens, principals, restaurants, shifts},
    error::{AppError, AppResult},
    events::{self, DomainEvent},
    middleware::auth::AuthPrincipal,
    models::{Employee, EmployeeRole, InviteStatus, InviteToken, Role, Shift, ShiftStatus},
    response::ApiResponse,
    routes::params::{PayrollQuery, ShiftListQuery},
    state::AppState,
};

/// Half-open interval overlap: `[a_start, a_end)` against `[b_start, b_end)`.
/// Touching endpoints do not overlap.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Worked minutes net of break, never negative.
pub fn effective_minutes(
    actual_start: DateTime<Utc>,
    actual_end: DateTime<Utc>,
    break_minutes: i32,
) -> i64 {
    let worked = (actual_end - actual_start).num_minutes() - break_minutes as i64;
    worked.max(0)
}

/// Pay for a shift: `round(minutes / 60 × wage)` in integer arithmetic.
/// A null wage yields null pay.
pub fn shift_pay_minor(minutes: i64, hourly_wage_minor: Option<i64>) -> Option<i64> {
    hourly_wage_minor.map(|wage| (minutes * wage + 30) / 60)
}

pub async fn create_employee(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: CreateEmployeeRequest,
) -> AppResult<ApiResponse<Employee>> {
    authz::authorize(
        &state.orm,
        auth,
        Verb::ManageEmployees,
        Resource::Restaurant {
            restaurant_id: payload.restaurant_id,
        },
    )
    .await?;

    if payload.name.trim().is_empty() || payload.phone.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "employee name and phone are required".into(),
        ));
    }

    let result = employees::ActiveModel {
        id: Set(Uuid::new_v4()),
        restaurant_id: Set(payload.restaurant_id),
        principal_id: NotSet,
        name: Set(payload.name.trim().to_string()),
        phone: Set(payload.phone.trim().to_string()),
        email: Set(payload.email.clone()),
        employee_role: Set(payload.employee_role.as_str().to_string()),
        hourly_wage_minor: Set(payload.hourly_wage_minor),
        active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await;

    let employee = match result {
        Ok(model) => model,
        Err(err) => {
            let err = AppError::Db(err);
            if err.is_unique_violation() {
                return Err(AppError::AlreadyExists(
                    "an active employee with this phone already exists".into(),
                ));
            }
            return Err(err);
        }
    };

    Ok(ApiResponse::ok(
        "Employee created",
        employee_from_entity(employee)?,
    ))
}

pub async fn update_employee(
    state: &AppState,
    auth: &AuthPrincipal,
    id: Uuid,
    payload: UpdateEmployeeRequest,
) -> AppResult<ApiResponse<Employee>> {
    let employee = employees::Entity::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    authz::authorize(
        &state.orm,
        auth,
        Verb::ManageEmployees,
        Resource::Restaurant {
            restaurant_id: employee.restaurant_id,
        },
    )
    .await?;

    let mut active: employees::ActiveModel = employee.into();
    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::ValidationFailed("name must not be empty".into()));
        }
        active.name = Set(name.trim().to_string());
    }
    if let Some(phone) = payload.phone {
        if phone.trim().is_empty() {
            return Err(AppError::ValidationFailed("phone must not be empty".into()));
        }
        active.phone = Set(phone.trim().to_string());
    }
    if payload.email.is_some() {
        active.email = Set(payload.email);
    }
    if let Some(role) = payload.employee_role {
        active.employee_role = Set(role.as_str().to_string());
    }
    if payload.hourly_wage_minor.is_some() {
        active.hourly_wage_minor = Set(payload.hourly_wage_minor);
    }
    if let Some(flag) = payload.active {
        active.active = Set(flag);
    }

    let updated = match active.update(&state.orm).await {
        Ok(model) => model,
        Err(err) => {
            let err = AppError::Db(err);
            if err.is_unique_violation() {
                return Err(AppError::AlreadyExists(
                    "an active employee with this phone already exists".into(),
                ));
            }
            return Err(err);
        }
    };

    Ok(ApiResponse::ok(
        "Employee updated",
        employee_from_entity(updated)?,
    ))
}

pub async fn list_employees(
    state: &AppState,
    auth: &AuthPrincipal,
    restaurant_id: Uuid,
) -> AppResult<ApiResponse<EmployeeList>> {
    authz::authorize(
        &state.orm,
        auth,
        Verb::ReadEmployees,
        Resource::Restaurant { restaurant_id },
    )
    .await?;

    let rows = employees::Entity::find()
        .filter(employees::Column::RestaurantId.eq(restaurant_id))
        .order_by_asc(employees::Column::Name)
        .all(&state.orm)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(employee_from_entity(row)?);
    }

    Ok(ApiResponse::ok("Ok", EmployeeList { items }))
}

/// Mint an invite token: 256-bit random, URL-safe Base64, bounded validity.
pub async fn create_invite(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: CreateInviteRequest,
) -> AppResult<ApiResponse<InviteToken>> {
    authz::authorize(
        &state.orm,
        auth,
        Verb::CreateInvite,
        Resource::Restaurant {
            restaurant_id: payload.restaurant_id,
        },
    )
    .await?;

    if payload.expires_at < Utc::now() + chrono::Duration::minutes(1) {
        return Err(AppError::ValidationFailed(
            "invite must be valid for at least one minute".into(),
        ));
    }
    if payload.max_uses < 1 {
        return Err(AppError::ValidationFailed(
            "max uses must be at least 1".into(),
        ));
    }

    let mut token_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut token_bytes);
    let token = URL_SAFE_NO_PAD.encode(token_bytes);

    let invite = invite_tokens::ActiveModel {
        id: Set(Uuid::new_v4()),
        token: Set(token),
        restaurant_id: Set(payload.restaurant_id),
        granted_role: Set(payload.granted_role.as_str().to_string()),
        hourly_wage_minor: Set(payload.hourly_wage_minor),
        expires_at: Set(payload.expires_at.into()),
        max_uses: Set(payload.max_uses),
        used_count: Set(0),
        status: Set(InviteStatus::Active.as_str().to_string()),
        created_by_principal_id: Set(auth.id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        state,
        Some(auth.id),
        "invite_created",
        Some("invite_tokens"),
        Some(serde_json::json!({ "invite_id": invite.id, "restaurant_id": invite.restaurant_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::ok("Invite created", invite_from_entity(invite)?))
}

/// Consume an invite: creates the employee record bound to the caller,
/// bumps the use counter and upgrades the caller's principal role, all in
/// one transaction.
pub async fn consume_invite(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: ConsumeInviteRequest,
) -> AppResult<ApiResponse<ConsumeInviteResponse>> {
    authz::authorize(&state.orm, auth, Verb::ConsumeInvite, Resource::Unscoped).await?;

    if payload.name.trim().is_empty() || payload.phone.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "name and phone are required to join".into(),
        ));
    }

    let auth = *auth;
    let (employee, invite) = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        Box::pin(async move { consume_invite_in_tx(txn, &auth, payload).await })
    })
    .await?;

    if let Err(err) = log_audit(
        state,
        Some(auth.id),
        "invite_consumed",
        Some("invite_tokens"),
        Some(serde_json::json!({ "invite_id": invite.id, "employee_id": employee.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::ok(
        "Invite consumed",
        ConsumeInviteResponse {
            employee: employee_from_entity(employee)?,
            invite: invite_from_entity(invite)?,
        },
    ))
}

async fn consume_invite_in_tx(
    txn: &DatabaseTransaction,
    auth: &AuthPrincipal,
    payload: ConsumeInviteRequest,
) -> AppResult<(employees::Model, invite_tokens::Model)> {
    let invite = invite_tokens::Entity::find()
        .filter(invite_tokens::Column::Token.eq(payload.token.clone()))
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let now = Utc::now();
    let status = InviteStatus::parse(&invite.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown invite status")))?;

    // Any fetch past the expiry must observe Expired.
    if status == InviteStatus::Active && invite.expires_at.with_timezone(&Utc) < now {
        let mut active: invite_tokens::ActiveModel = invite.into();
        active.status = Set(InviteStatus::Expired.as_str().to_string());
        active.update(txn).await?;
        return Err(AppError::Conflict("invite has expired".into()));
    }

    if status != InviteStatus::Active || invite.used_count >= invite.max_uses {
        return Err(AppError::Conflict("invite is no longer active".into()));
    }

    let granted_role = EmployeeRole::parse(&invite.granted_role)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown invite role")))?;

    let employee = employees::ActiveModel {
        id: Set(Uuid::new_v4()),
        restaurant_id: Set(invite.restaurant_id),
        principal_id: Set(Some(auth.id)),
        name: Set(payload.name.trim().to_string()),
        phone: Set(payload.phone.trim().to_string()),
        email: Set(payload.email.clone()),
        employee_role: Set(granted_role.as_str().to_string()),
        hourly_wage_minor: Set(invite.hourly_wage_minor),
        active: Set(true),
        created_at: NotSet,
    }
    .insert(txn)
    .await
    .map_err(|err| {
        let err = AppError::Db(err);
        if err.is_unique_violation() {
            AppError::AlreadyExists("an active employee with this phone already exists".into())
        } else {
            err
        }
    })?;

    let invite_id = invite.id;
    let restaurant_id = invite.restaurant_id;
    let used_count = invite.used_count + 1;
    let consumed = used_count >= invite.max_uses;
    let mut active: invite_tokens::ActiveModel = invite.into();
    active.used_count = Set(used_count);
    if consumed {
        active.status = Set(InviteStatus::Consumed.as_str().to_string());
    }
    let invite = active.update(txn).await?;

    // The caller becomes staff; the live role resolution in the auth
    // extractor picks this up on the next request.
    if auth.role == Role::Customer {
        let principal = principals::Entity::find_by_id(auth.id)
            .one(txn)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("principal vanished")))?;
        let mut principal: principals::ActiveModel = principal.into();
        principal.role = Set(Role::Employee.as_str().to_string());
        principal.update(txn).await?;
    }

    events::append(
        txn,
        &DomainEvent::InviteConsumed {
            invite_id,
            restaurant_id,
            employee_id: employee.id,
        },
    )
    .await?;

    Ok((employee, invite))
}

/// Schedule a shift; rejects any intersection with the employee's existing
/// Scheduled or Active shifts (half-open intervals).
pub async fn schedule_shift(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: ScheduleShiftRequest,
) -> AppResult<ApiResponse<Shift>> {
    if payload.scheduled_start >= payload.scheduled_end {
        return Err(AppError::ValidationFailed(
            "shift start must precede its end".into(),
        ));
    }
    if payload.break_minutes < 0 {
        return Err(AppError::ValidationFailed(
            "break minutes must not be negative".into(),
        ));
    }

    let auth = *auth;
    let shift = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        Box::pin(async move {
            let employee = employees::Entity::find_by_id(payload.employee_id)
                .one(txn)
                .await?
                .filter(|e| e.active)
                .ok_or(AppError::NotFound)?;

            authz::authorize(
                txn,
                &auth,
                Verb::ScheduleShift,
                Resource::Restaurant {
                    restaurant_id: employee.restaurant_id,
                },
            )
            .await?;

            ensure_no_overlap(
                txn,
                employee.id,
                payload.scheduled_start,
                payload.scheduled_end,
            )
            .await?;

            let shift = shifts::ActiveModel {
                id: Set(Uuid::new_v4()),
                employee_id: Set(employee.id),
                scheduled_start: Set(payload.scheduled_start.into()),
                scheduled_end: Set(payload.scheduled_end.into()),
                actual_start: NotSet,
                actual_end: NotSet,
                break_minutes: Set(payload.break_minutes),
                status: Set(ShiftStatus::Scheduled.as_str().to_string()),
                pay_minor: NotSet,
                notes: Set(payload.notes.clone()),
                created_at: NotSet,
            }
            .insert(txn)
            .await?;

            Ok(shift)
        })
    })
    .await?;

    Ok(ApiResponse::ok("Shift scheduled", shift_from_entity(shift)?))
}

async fn ensure_no_overlap(
    txn: &DatabaseTransaction,
    employee_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> AppResult<()> {
    let open_shifts = shifts::Entity::find()
        .filter(shifts::Column::EmployeeId.eq(employee_id))
        .filter(
            Condition::any()
                .add(shifts::Column::Status.eq(ShiftStatus::Scheduled.as_str()))
                .add(shifts::Column::Status.eq(ShiftStatus::Active.as_str())),
        )
        .all(txn)
        .await?;

    for other in open_shifts {
        if intervals_overlap(
            start,
            end,
            other.scheduled_start.with_timezone(&Utc),
            other.scheduled_end.with_timezone(&Utc),
        ) {
            return Err(AppError::OverlappingShift);
        }
    }
    Ok(())
}

/// Clock in: activate today's scheduled shift, or open an on-demand one
/// running to the end of the local day.
pub async fn clock_in(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: ClockInRequest,
) -> AppResult<ApiResponse<Shift>> {
    let auth = *auth;
    let default_tz = state.config.default_timezone;

    let shift = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        Box::pin(async move {
            let employee = resolve_employee(txn, &auth, payload.employee_id).await?;

            authz::authorize(
                txn,
                &auth,
                Verb::ClockInOut,
                Resource::Employee {
                    restaurant_id: employee.restaurant_id,
                    principal_id: employee.principal_id,
                },
            )
            .await?;

            let active_exists = shifts::Entity::find()
                .filter(shifts::Column::EmployeeId.eq(employee.id))
                .filter(shifts::Column::Status.eq(ShiftStatus::Active.as_str()))
                .lock(LockType::Update)
                .one(txn)
                .await?
                .is_some();
            if active_exists {
                return Err(AppError::Conflict(
                    "an active shift already exists for this employee".into(),
                ));
            }

            let now = Utc::now();
            let tz = restaurant_timezone(txn, employee.restaurant_id, default_tz).await?;
            let (day_start, day_end) = local_day_bounds(tz, now);

            // Prefer a shift scheduled for today.
            let scheduled_today = shifts::Entity::find()
                .filter(shifts::Column::EmployeeId.eq(employee.id))
                .filter(shifts::Column::Status.eq(ShiftStatus::Scheduled.as_str()))
                .filter(shifts::Column::ScheduledStart.gte(day_start))
                .filter(shifts::Column::ScheduledStart.lt(day_end))
                .order_by_asc(shifts::Column::ScheduledStart)
                .lock(LockType::Update)
                .one(txn)
                .await?;

            let shift = match scheduled_today {
                Some(scheduled) => {
                    let mut active: shifts::ActiveModel = scheduled.into();
                    active.status = Set(ShiftStatus::Active.as_str().to_string());
                    active.actual_start = Set(Some(now.into()));
                    active.update(txn).await?
                }
                None => {
                    shifts::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        employee_id: Set(employee.id),
                        scheduled_start: Set(now.into()),
                        scheduled_end: Set(day_end.into()),
                        actual_start: Set(Some(now.into())),
                        actual_end: NotSet,
                        break_minutes: Set(0),
                        status: Set(ShiftStatus::Active.as_str().to_string()),
                        pay_minor: NotSet,
                        notes: NotSet,
                        created_at: NotSet,
                    }
                    .insert(txn)
                    .await?
                }
            };

            events::append(
                txn,
                &DomainEvent::ShiftStarted {
                    shift_id: shift.id,
                    employee_id: employee.id,
                },
            )
            .await?;

            Ok(shift)
        })
    })
    .await?;

    Ok(ApiResponse::ok("Clocked in", shift_from_entity(shift)?))
}

/// Clock out: close the active shift and materialize worked minutes and pay.
pub async fn clock_out(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: ClockOutRequest,
) -> AppResult<ApiResponse<Shift>> {
    if payload.break_minutes.is_some_and(|b| b < 0) {
        return Err(AppError::ValidationFailed(
            "break minutes must not be negative".into(),
        ));
    }

    let auth = *auth;
    let shift = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        Box::pin(async move {
            let employee = resolve_employee(txn, &auth, payload.employee_id).await?;

            authz::authorize(
                txn,
                &auth,
                Verb::ClockInOut,
                Resource::Employee {
                    restaurant_id: employee.restaurant_id,
                    principal_id: employee.principal_id,
                },
            )
            .await?;

            let active_shift = shifts::Entity::find()
                .filter(shifts::Column::EmployeeId.eq(employee.id))
                .filter(shifts::Column::Status.eq(ShiftStatus::Active.as_str()))
                .lock(LockType::Update)
                .one(txn)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict("no active shift to clock out from".into())
                })?;

            let now = Utc::now();
            let started = active_shift
                .actual_start
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| active_shift.scheduled_start.with_timezone(&Utc));
            let break_minutes = payload.break_minutes.unwrap_or(active_shift.break_minutes);
            let minutes_worked = effective_minutes(started, now, break_minutes);
            let pay_minor = shift_pay_minor(minutes_worked, employee.hourly_wage_minor);

            let shift_id = active_shift.id;
            let mut active: shifts::ActiveModel = active_shift.into();
            active.actual_end = Set(Some(now.into()));
            active.break_minutes = Set(break_minutes);
            active.status = Set(ShiftStatus::Completed.as_str().to_string());
            active.pay_minor = Set(pay_minor);
            let updated = active.update(txn).await?;

            events::append(
                txn,
                &DomainEvent::ShiftEnded {
                    shift_id,
                    employee_id: employee.id,
                    minutes_worked,
                    pay_minor,
                },
            )
            .await?;

            Ok(updated)
        })
    })
    .await?;

    Ok(ApiResponse::ok("Clocked out", shift_from_entity(shift)?))
}

pub async fn list_shifts(
    state: &AppState,
    auth: &AuthPrincipal,
    query: ShiftListQuery,
) -> AppResult<ApiResponse<ShiftList>> {
    authz::authorize(
        &state.orm,
        auth,
        Verb::ReadEmployees,
        Resource::Restaurant {
            restaurant_id: query.restaurant_id,
        },
    )
    .await?;

    let employee_ids: Vec<Uuid> = match query.employee_id {
        Some(id) => vec![id],
        None => employees::Entity::find()
            .filter(employees::Column::RestaurantId.eq(query.restaurant_id))
            .all(&state.orm)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect(),
    };

    let mut finder = shifts::Entity::find()
        .filter(shifts::Column::EmployeeId.is_in(employee_ids))
        .order_by_asc(shifts::Column::ScheduledStart);
    if let Some(from) = query.from {
        finder = finder.filter(shifts::Column::ScheduledEnd.gt(from));
    }
    if let Some(to) = query.to {
        finder = finder.filter(shifts::Column::ScheduledStart.lt(to));
    }

    let rows = finder.all(&state.orm).await?;
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(shift_from_entity(row)?);
    }

    Ok(ApiResponse::ok("Ok", ShiftList { items }))
}

/// Payroll rollup over completed shifts in a window.
pub async fn payroll(
    state: &AppState,
    auth: &AuthPrincipal,
    employee_id: Uuid,
    query: PayrollQuery,
) -> AppResult<ApiResponse<PayrollSummary>> {
    let employee = employees::Entity::find_by_id(employee_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    authz::authorize(
        &state.orm,
        auth,
        Verb::ManageEmployees,
        Resource::Restaurant {
            restaurant_id: employee.restaurant_id,
        },
    )
    .await?;

    let rows = shifts::Entity::find()
        .filter(shifts::Column::EmployeeId.eq(employee_id))
        .filter(shifts::Column::Status.eq(ShiftStatus::Completed.as_str()))
        .filter(shifts::Column::ActualEnd.gte(query.from))
        .filter(shifts::Column::ActualEnd.lt(query.to))
        .all(&state.orm)
        .await?;

    let mut total_minutes = 0i64;
    let mut total_pay: Option<i64> = None;
    let shift_count = rows.len() as i64;
    for row in &rows {
        if let (Some(start), Some(end)) = (row.actual_start, row.actual_end) {
            total_minutes += effective_minutes(
                start.with_timezone(&Utc),
                end.with_timezone(&Utc),
                row.break_minutes,
            );
        }
        if let Some(pay) = row.pay_minor {
            total_pay = Some(total_pay.unwrap_or(0) + pay);
        }
    }

    Ok(ApiResponse::ok(
        "Ok",
        PayrollSummary {
            employee_id,
            from: query.from,
            to: query.to,
            shift_count,
            total_minutes,
            total_pay_minor: total_pay,
        },
    ))
}

/// Resolve the employee a clock operation targets: an explicit id for staff
/// acting on someone else, otherwise the caller's own employee record.
async fn resolve_employee(
    txn: &DatabaseTransaction,
    auth: &AuthPrincipal,
    employee_id: Option<Uuid>,
) -> AppResult<employees::Model> {
    match employee_id {
        Some(id) => employees::Entity::find_by_id(id)
            .one(txn)
            .await?
            .filter(|e| e.active)
            .ok_or(AppError::NotFound),
        None => employees::Entity::find()
            .filter(employees::Column::PrincipalId.eq(auth.id))
            .filter(employees::Column::Active.eq(true))
            .one(txn)
            .await?
            .ok_or(AppError::NotFound),
    }
}

async fn restaurant_timezone<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: Uuid,
    default_tz: Tz,
) -> AppResult<Tz> {
    let restaurant = restaurants::Entity::find_by_id(restaurant_id)
        .one(conn)
        .await?;
    Ok(restaurant
        .and_then(|r| r.timezone)
        .and_then(|s| s.parse::<Tz>().ok())
        .unwrap_or(default_tz))
}

/// `[start-of-day, start-of-next-day)` in the restaurant's local timezone,
/// expressed in UTC.
fn local_day_bounds(tz: Tz, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    use chrono::TimeZone;

    let local_date = now.with_timezone(&tz).date_naive();
    let start_naive = local_date.and_hms_opt(0, 0, 0).expect("midnight is valid");
    let end_naive = (local_date + chrono::Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is valid");

    let start = tz
        .from_local_datetime(&start_naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now);
    let end = tz
        .from_local_datetime(&end_naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now);

    (start, end)
}

pub fn employee_from_entity(model: employees::Model) -> AppResult<Employee> {
    let employee_role = EmployeeRole::parse(&model.employee_role)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown employee role")))?;
    Ok(Employee {
        id: model.id,
        restaurant_id: model.restaurant_id,
        principal_id: model.principal_id,
        name: model.name,
        phone: model.phone,
        email: model.email,
        employee_role,
        hourly_wage_minor: model.hourly_wage_minor,
        active: model.active,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

pub fn shift_from_entity(model: shifts::Model) -> AppResult<Shift> {
    let status = ShiftStatus::parse(&model.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown shift status")))?;
    Ok(Shift {
        id: model.id,
        employee_id: model.employee_id,
        scheduled_start: model.scheduled_start.with_timezone(&Utc),
        scheduled_end: model.scheduled_end.with_timezone(&Utc),
        actual_start: model.actual_start.map(|t| t.with_timezone(&Utc)),
        actual_end: model.actual_end.map(|t| t.with_timezone(&Utc)),
        break_minutes: model.break_minutes,
        status,
        pay_minor: model.pay_minor,
        notes: model.notes,
    })
}

pub fn invite_from_entity(model: invite_tokens::Model) -> AppResult<InviteToken> {
    let granted_role = EmployeeRole::parse(&model.granted_role)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown invite role")))?;
    let status = InviteStatus::parse(&model.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown invite status")))?;
    Ok(InviteToken {
        id: model.id,
        token: model.token,
        restaurant_id: model.restaurant_id,
        granted_role,
        hourly_wage_minor: model.hourly_wage_minor,
        expires_at: model.expires_at.with_timezone(&Utc),
        max_uses: model.max_uses,
        used_count: model.used_count,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        assert!(!intervals_overlap(at(10, 0), at(11, 0), at(11, 0), at(12, 0)));
        assert!(!intervals_overlap(at(11, 0), at(12, 0), at(10, 0), at(11, 0)));
    }

    #[test]
    fn intersecting_intervals_overlap() {
        assert!(intervals_overlap(at(10, 0), at(11, 0), at(10, 59), at(11, 30)));
        assert!(intervals_overlap(at(10, 59), at(11, 30), at(10, 0), at(11, 0)));
        // Containment counts too.
        assert!(intervals_overlap(at(9, 0), at(17, 0), at(12, 0), at(13, 0)));
    }

    #[test]
    fn effective_minutes_subtracts_break_and_floors_at_zero() {
        assert_eq!(effective_minutes(at(9, 0), at(17, 0), 60), 420);
        assert_eq!(effective_minutes(at(9, 0), at(9, 30), 45), 0);
        assert_eq!(effective_minutes(at(9, 0), at(9, 0), 0), 0);
    }

    #[test]
    fn pay_rounds_to_nearest_minor_unit() {
        // 90 minutes at 1000/h = 1500.
        assert_eq!(shift_pay_minor(90, Some(1000)), Some(1500));
        // 50 minutes at 999/h = 832.5 → 833.
        assert_eq!(shift_pay_minor(50, Some(999)), Some(833));
        // Null wage yields null pay.
        assert_eq!(shift_pay_minor(480, None), None);
    }

    #[test]
    fn day_bounds_cover_one_local_day() {
        let tz: Tz = "Asia/Almaty".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 3, 0, 0).unwrap();
        let (start, end) = local_day_bounds(tz, now);
        assert!(start <= now && now < end);
        assert_eq!(end - start, chrono::Duration::days(1));
    }
}

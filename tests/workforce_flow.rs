use chrono::{Duration, Utc};
use foodcourt_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::workforce::{
        ClockInRequest, ClockOutRequest, ConsumeInviteRequest, CreateEmployeeRequest,
        CreateInviteRequest, ScheduleShiftRequest,
    },
    entity::{foodcourts, principals, restaurants},
    error::AppError,
    middleware::auth::AuthPrincipal,
    models::{EmployeeRole, InviteStatus, Role, ShiftStatus},
    routes::params::PayrollQuery,
    services::workforce_service,
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use uuid::Uuid;

// Integration flow: direct hire, invite consumption with role upgrade,
// overlap rejection, clock-in/out with pay materialization, payroll rollup.
#[tokio::test]
async fn workforce_ledger_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests.");
        return Ok(());
    };

    let owner_id = seed_principal(&state, Role::RestaurantOwner).await?;
    let joiner_id = seed_principal(&state, Role::Customer).await?;
    let restaurant_id = seed_restaurant(&state, owner_id).await?;

    let owner = auth(owner_id, Role::RestaurantOwner);
    let joiner = auth(joiner_id, Role::Customer);

    // Direct hire.
    let cashier = workforce_service::create_employee(
        &state,
        &owner,
        CreateEmployeeRequest {
            restaurant_id,
            name: "Boris".into(),
            phone: "+200000001".into(),
            email: None,
            employee_role: EmployeeRole::Cashier,
            hourly_wage_minor: Some(1500),
        },
    )
    .await?
    .data
    .unwrap();

    // Same phone among active employees is rejected.
    let err = workforce_service::create_employee(
        &state,
        &owner,
        CreateEmployeeRequest {
            restaurant_id,
            name: "Boris again".into(),
            phone: "+200000001".into(),
            email: None,
            employee_role: EmployeeRole::Cook,
            hourly_wage_minor: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    // Invite with a single use.
    let invite = workforce_service::create_invite(
        &state,
        &owner,
        CreateInviteRequest {
            restaurant_id,
            granted_role: EmployeeRole::Cook,
            hourly_wage_minor: Some(1200),
            expires_at: Utc::now() + Duration::hours(2),
            max_uses: 1,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(invite.status, InviteStatus::Active);
    assert!(invite.token.len() >= 43); // 256 bits, URL-safe Base64

    let consumed = workforce_service::consume_invite(
        &state,
        &joiner,
        ConsumeInviteRequest {
            token: invite.token.clone(),
            name: "Joan".into(),
            phone: "+200000002".into(),
            email: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(consumed.invite.status, InviteStatus::Consumed);
    assert_eq!(consumed.invite.used_count, 1);
    assert_eq!(consumed.employee.employee_role, EmployeeRole::Cook);
    assert_eq!(consumed.employee.hourly_wage_minor, Some(1200));
    assert_eq!(consumed.employee.principal_id, Some(joiner_id));

    // Role was upgraded in place.
    let principal = principals::Entity::find_by_id(joiner_id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(principal.role, Role::Employee.as_str());

    // The invite is exhausted for the next caller.
    let another_id = seed_principal(&state, Role::Customer).await?;
    let another = auth(another_id, Role::Customer);
    let err = workforce_service::consume_invite(
        &state,
        &another,
        ConsumeInviteRequest {
            token: invite.token,
            name: "Late".into(),
            phone: "+200000003".into(),
            email: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Tomorrow 09:00-17:00, then an overlapping 16:30-18:00 is rejected and
    // a touching 17:00-18:00 is accepted.
    let day_start = (Utc::now() + Duration::days(1))
        .date_naive()
        .and_hms_opt(9, 0, 0)
        .unwrap()
        .and_utc();
    workforce_service::schedule_shift(
        &state,
        &owner,
        ScheduleShiftRequest {
            employee_id: cashier.id,
            scheduled_start: day_start,
            scheduled_end: day_start + Duration::hours(8),
            break_minutes: 30,
            notes: None,
        },
    )
    .await?;

    let err = workforce_service::schedule_shift(
        &state,
        &owner,
        ScheduleShiftRequest {
            employee_id: cashier.id,
            scheduled_start: day_start + Duration::hours(7) + Duration::minutes(30),
            scheduled_end: day_start + Duration::hours(9),
            break_minutes: 0,
            notes: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::OverlappingShift));

    workforce_service::schedule_shift(
        &state,
        &owner,
        ScheduleShiftRequest {
            employee_id: cashier.id,
            scheduled_start: day_start + Duration::hours(8),
            scheduled_end: day_start + Duration::hours(9),
            break_minutes: 0,
            notes: None,
        },
    )
    .await?;

    // The joiner clocks in with no schedule for today: an on-demand shift.
    let employee_auth = auth(joiner_id, Role::Employee);
    let shift = workforce_service::clock_in(
        &state,
        &employee_auth,
        ClockInRequest { employee_id: None },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(shift.status, ShiftStatus::Active);
    assert!(shift.actual_start.is_some());

    // One active shift per employee.
    let err = workforce_service::clock_in(
        &state,
        &employee_auth,
        ClockInRequest { employee_id: None },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Clock out materializes minutes and pay.
    let closed = workforce_service::clock_out(
        &state,
        &employee_auth,
        ClockOutRequest {
            employee_id: None,
            break_minutes: Some(0),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(closed.status, ShiftStatus::Completed);
    assert!(closed.actual_end.is_some());
    assert!(closed.pay_minor.is_some());

    // Clocking out twice is a conflict.
    let err = workforce_service::clock_out(
        &state,
        &employee_auth,
        ClockOutRequest {
            employee_id: None,
            break_minutes: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Payroll rollup over the window sees the completed shift.
    let summary = workforce_service::payroll(
        &state,
        &owner,
        consumed.employee.id,
        PayrollQuery {
            from: Utc::now() - Duration::hours(1),
            to: Utc::now() + Duration::hours(1),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(summary.shift_count, 1);
    assert_eq!(summary.total_pay_minor, closed.pay_minor);

    Ok(())
}

async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => return Ok(None),
    };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, order_number_counters, refunds, payments, \
         processed_webhooks, shifts, invite_tokens, employees, dining_tables, products, \
         restaurants, foodcourts, sessions, outbox, leases, audit_logs, principals \
         RESTART IDENTITY CASCADE",
    ))
    .await?;

    let config = AppConfig {
        database_url,
        session_signing_secret: "test-signing-secret".into(),
        psp_a_secret: "psp-a-secret".into(),
        psp_b_shop_id: "shop-1".into(),
        psp_b_secret: "psp-b-secret".into(),
        public_base_url: "http://127.0.0.1:3000".into(),
        default_timezone: chrono_tz::UTC,
        host: "127.0.0.1".into(),
        port: 0,
        rate_limit_per_minute: 1000,
        access_token_ttl_days: 7,
    };
    Ok(Some(AppState::new(orm, config)?))
}

fn auth(id: Uuid, role: Role) -> AuthPrincipal {
    AuthPrincipal {
        id,
        role,
        session_id: Uuid::new_v4(),
    }
}

async fn seed_principal(state: &AppState, role: Role) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    principals::ActiveModel {
        id: Set(id),
        role: Set(role.as_str().to_string()),
        external_identity_id: Set(format!("ext-{id}")),
        display_name: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}

async fn seed_restaurant(state: &AppState, owner_id: Uuid) -> anyhow::Result<Uuid> {
    let foodcourt_id = Uuid::new_v4();
    foodcourts::ActiveModel {
        id: Set(foodcourt_id),
        name: Set("Central Hall".into()),
        timezone: Set("UTC".into()),
        commission_rate_bps: Set(1000),
        active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let restaurant_id = Uuid::new_v4();
    restaurants::ActiveModel {
        id: Set(restaurant_id),
        foodcourt_id: Set(foodcourt_id),
        owner_principal_id: Set(owner_id),
        name: Set("Soup Stop".into()),
        timezone: Set(Some("UTC".into())),
        commission_rate_bps: Set(1000),
        published: Set(true),
        location: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(restaurant_id)
}

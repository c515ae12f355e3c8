use chrono::Utc;
use foodcourt_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::auth::SessionRequest,
    entity::{principals, sessions},
    error::AppError,
    identity,
    models::Role,
    services::auth_service,
    state::AppState,
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Statement};

// Integration flow: signed envelope exchange creates a Customer principal on
// first contact, reuses it afterwards, and rejects tampered envelopes.
#[tokio::test]
async fn session_bootstrap_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests.");
        return Ok(());
    };

    auth_service::ensure_superadmin(&state.orm).await?;

    let issued = Utc::now().timestamp().to_string();
    let init_data = identity::sign_envelope(
        &[("user_id", "777"), ("name", "Ada"), ("issued_at", &issued)],
        &state.config.session_signing_secret,
    );

    let first = auth_service::bootstrap_session(
        &state,
        SessionRequest {
            init_data: init_data.clone(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(first.principal.role, Role::Customer);
    assert_eq!(first.principal.external_identity_id, "777");
    assert!(!first.access_token.is_empty());

    // Second exchange resolves the same principal with a fresh session.
    let second = auth_service::bootstrap_session(&state, SessionRequest { init_data })
        .await?
        .data
        .unwrap();
    assert_eq!(second.principal.id, first.principal.id);

    let principal_count = principals::Entity::find()
        .filter(principals::Column::ExternalIdentityId.eq("777"))
        .count(&state.orm)
        .await?;
    assert_eq!(principal_count, 1);

    let session_count = sessions::Entity::find()
        .filter(sessions::Column::PrincipalId.eq(first.principal.id))
        .count(&state.orm)
        .await?;
    assert_eq!(session_count, 2);

    // A tampered envelope is unauthenticated.
    let issued = Utc::now().timestamp().to_string();
    let tampered = identity::sign_envelope(
        &[("user_id", "778"), ("issued_at", &issued)],
        &state.config.session_signing_secret,
    )
    .replace("user_id=778", "user_id=779");
    let err = auth_service::bootstrap_session(&state, SessionRequest { init_data: tampered })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated));

    // The bootstrap superadmin invariant held through all of it.
    let superadmins = principals::Entity::find()
        .filter(principals::Column::Role.eq(Role::Superadmin.as_str()))
        .count(&state.orm)
        .await?;
    assert_eq!(superadmins, 1);

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

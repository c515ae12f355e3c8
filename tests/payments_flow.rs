use foodcourt_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::orders::{CreateOrderItem, CreateOrderRequest},
    dto::payments::{CashPaymentRequest, RefundRequest},
    entity::{foodcourts, outbox, payments, principals, processed_webhooks, products, restaurants},
    error::AppError,
    middleware::auth::AuthPrincipal,
    models::{DeliveryType, PaymentMethod, PaymentStatus, Role},
    providers::{WebhookEvent, WebhookEventKind},
    services::{order_service, payment_service, payment_service::WebhookOutcome},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    Statement,
};
use uuid::Uuid;

// Integration flow: cash settlement with frozen commission, full refund
// reversing the split, and idempotent card-settlement webhooks.
#[tokio::test]
async fn payment_settlement_and_refund_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests.");
        return Ok(());
    };

    let owner_id = seed_principal(&state, Role::RestaurantOwner).await?;
    let customer_id = seed_principal(&state, Role::Customer).await?;
    let restaurant_id = seed_restaurant(&state, owner_id, 1000).await?;
    let product_id = seed_product(&state, restaurant_id, 1500).await?;

    let owner = auth(owner_id, Role::RestaurantOwner);
    let customer = auth(customer_id, Role::Customer);

    // Order totalling 1500 at a 10% commission restaurant.
    let order = create_order(&state, &customer, restaurant_id, product_id, 1).await?;

    // Customers cannot take cash.
    let err = payment_service::create_cash_payment(
        &state,
        &customer,
        CashPaymentRequest {
            order_id: order,
            amount_received_minor: 2000,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Cash settles immediately with the commission split frozen.
    let payment = payment_service::create_cash_payment(
        &state,
        &owner,
        CashPaymentRequest {
            order_id: order,
            amount_received_minor: 2000,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.commission_minor, 150);
    assert_eq!(payment.net_minor, 1350);
    let metadata = payment.provider_metadata.as_ref().unwrap();
    assert_eq!(metadata["change_given_minor"], 500);

    // The 1:1 order-payment constraint holds.
    let err = payment_service::create_cash_payment(
        &state,
        &owner,
        CashPaymentRequest {
            order_id: order,
            amount_received_minor: 1500,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::PaymentAlreadyExists));

    // Full refund reverses commission and net for payout accounting.
    let refunded = payment_service::refund_payment(
        &state,
        &owner,
        payment.id,
        RefundRequest {
            amount_minor: None,
            reason: "order cancelled at counter".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(refunded.payment.status, PaymentStatus::Refunded);
    assert_eq!(refunded.payment.commission_minor, 0);
    assert_eq!(refunded.payment.net_minor, 0);
    assert_eq!(refunded.refunds.len(), 1);
    assert_eq!(refunded.refunds[0].amount_minor, 1500);

    // A refunded payment cannot be refunded again.
    let err = payment_service::refund_payment(
        &state,
        &owner,
        payment.id,
        RefundRequest {
            amount_minor: Some(100),
            reason: "double dip".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ValidationFailed(_)));

    // Card flow: a pending payment awaiting its settlement webhook.
    let order2 = create_order(&state, &customer, restaurant_id, product_id, 2).await?;
    let pending_id = seed_pending_card_payment(&state, order2, 3000, 1000, "pi_test_1").await?;

    let settle = WebhookEvent {
        event_id: "evt_settle_1".into(),
        kind: WebhookEventKind::ChargeSucceeded,
        provider_ref: "pi_test_1".into(),
        amount_minor: Some(3000),
        reason: None,
    };

    // Delivered three times, applied once.
    let first = payment_service::apply_webhook_event(&state, "psp-a", settle.clone()).await?;
    assert_eq!(first, WebhookOutcome::Processed);
    for _ in 0..2 {
        let replay = payment_service::apply_webhook_event(&state, "psp-a", settle.clone()).await?;
        assert_eq!(replay, WebhookOutcome::Duplicate);
    }

    let row = payments::Entity::find_by_id(pending_id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(row.status, PaymentStatus::Completed.as_str());

    let ledger_rows = processed_webhooks::Entity::find()
        .filter(processed_webhooks::Column::Provider.eq("psp-a"))
        .count(&state.orm)
        .await?;
    assert_eq!(ledger_rows, 1);

    let settled_events = outbox::Entity::find()
        .filter(outbox::Column::Kind.eq("payment_settled"))
        .filter(outbox::Column::AggregateId.eq(pending_id))
        .count(&state.orm)
        .await?;
    assert_eq!(settled_events, 1);

    // Provider-side refund webhook moves Completed to Refunded once.
    let refund_event = WebhookEvent {
        event_id: "evt_refund_1".into(),
        kind: WebhookEventKind::RefundSucceeded,
        provider_ref: "pi_test_1".into(),
        amount_minor: Some(3000),
        reason: None,
    };
    let outcome = payment_service::apply_webhook_event(&state, "psp-a", refund_event).await?;
    assert_eq!(outcome, WebhookOutcome::Processed);

    let row = payments::Entity::find_by_id(pending_id)
        .one(&state.orm)
        .await?
        .unwrap();
    assert_eq!(row.status, PaymentStatus::Refunded.as_str());
    assert_eq!(row.commission_minor, 0);
    assert_eq!(row.net_minor, 0);

    // A late charge event against the now-terminal payment is a no-op.
    let late = WebhookEvent {
        event_id: "evt_settle_2".into(),
        kind: WebhookEventKind::ChargeSucceeded,
        provider_ref: "pi_test_1".into(),
        amount_minor: Some(3000),
        reason: None,
    };
    let outcome = payment_service::apply_webhook_event(&state, "psp-a", late).await?;
    assert_eq!(outcome, WebhookOutcome::AlreadyTerminal);

    // Unknown provider reference is acknowledged without effect.
    let unknown = WebhookEvent {
        event_id: "evt_unknown".into(),
        kind: WebhookEventKind::ChargeSucceeded,
        provider_ref: "pi_missing".into(),
        amount_minor: None,
        reason: None,
    };
    let outcome = payment_service::apply_webhook_event(&state, "psp-a", unknown).await?;
    assert_eq!(outcome, WebhookOutcome::UnknownReference);

    Ok(())
}

async fn create_order(
    state: &AppState,
    customer: &AuthPrincipal,
    restaurant_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> anyhow::Result<Uuid> {
    let created = order_service::create_order(
        state,
        customer,
        CreateOrderRequest {
            restaurant_id,
            table_id: None,
            delivery_type: DeliveryType::Takeaway,
            customer_name: "Grace".into(),
            customer_phone: "+100000002".into(),
            special_instructions: None,
            items: vec![CreateOrderItem {
                product_id,
                variant_label: None,
                quantity,
                special_instructions: None,
            }],
        },
    )
    .await?
    .data
    .unwrap();
    Ok(created.order.id)
}

async fn seed_pending_card_payment(
    state: &AppState,
    order_id: Uuid,
    amount_minor: i64,
    rate_bps: i32,
    provider_ref: &str,
) -> anyhow::Result<Uuid> {
    let commission = payment_service::commission_for(amount_minor, rate_bps);
    let id = Uuid::new_v4();
    payments::ActiveModel {
        id: Set(id),
        order_id: Set(order_id),
        amount_minor: Set(amount_minor),
        currency: Set("USD".into()),
        method: Set(PaymentMethod::CardPspA.as_str().to_string()),
        status: Set(PaymentStatus::Pending.as_str().to_string()),
        commission_minor: Set(commission),
        net_minor: Set(amount_minor - commission),
        provider_ref: Set(Some(provider_ref.to_string())),
        redirect_url: Set(None),
        provider_metadata: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
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

async fn seed_restaurant(
    state: &AppState,
    owner_id: Uuid,
    commission_rate_bps: i32,
) -> anyhow::Result<Uuid> {
    let foodcourt_id = Uuid::new_v4();
    foodcourts::ActiveModel {
        id: Set(foodcourt_id),
        name: Set("Central Hall".into()),
        timezone: Set("UTC".into()),
        commission_rate_bps: Set(commission_rate_bps),
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
        name: Set("Grill House".into()),
        timezone: Set(None),
        commission_rate_bps: Set(commission_rate_bps),
        published: Set(true),
        location: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(restaurant_id)
}

async fn seed_product(
    state: &AppState,
    restaurant_id: Uuid,
    base_price_minor: i64,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    products::ActiveModel {
        id: Set(id),
        restaurant_id: Set(restaurant_id),
        name: Set("Steak".into()),
        base_price_minor: Set(base_price_minor),
        available: Set(true),
        variants: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}

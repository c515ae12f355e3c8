use foodcourt_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::orders::{CancelOrderRequest, CreateOrderItem, CreateOrderRequest, UpdateOrderStatusRequest},
    entity::{dining_tables, foodcourts, outbox, principals, products, restaurants},
    error::AppError,
    middleware::auth::AuthPrincipal,
    models::{DeliveryType, OrderStatus, Role},
    services::order_service,
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, Statement};
use uuid::Uuid;

// Integration flow: customer places orders (numbering, pricing, snapshots),
// staff walks the lifecycle, customer cancels a pending order.
#[tokio::test]
async fn order_lifecycle_flow() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests.");
        return Ok(());
    };

    let owner_id = seed_principal(&state, Role::RestaurantOwner).await?;
    let customer_id = seed_principal(&state, Role::Customer).await?;
    let (foodcourt_id, restaurant_id) = seed_restaurant(&state, owner_id, 1000).await?;
    let table_id = seed_table(&state, foodcourt_id).await?;
    let product_id = seed_product(&state, restaurant_id, 750).await?;

    let customer = auth(customer_id, Role::Customer);
    let owner = auth(owner_id, Role::RestaurantOwner);

    // First order: base item plus a variant-priced item.
    let created = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id,
            table_id: Some(table_id),
            delivery_type: DeliveryType::DineIn,
            customer_name: "Ada".into(),
            customer_phone: "+100000001".into(),
            special_instructions: None,
            items: vec![
                CreateOrderItem {
                    product_id,
                    variant_label: None,
                    quantity: 1,
                    special_instructions: None,
                },
                CreateOrderItem {
                    product_id,
                    variant_label: Some("large".into()),
                    quantity: 1,
                    special_instructions: Some("no onions".into()),
                },
            ],
        },
    )
    .await?
    .data
    .unwrap();

    assert_eq!(created.order.total_minor, 750 + 1000);
    assert_eq!(created.order.status, OrderStatus::Pending);
    assert_eq!(created.order.customer_principal_id, Some(customer_id));
    assert!(created.order.order_number.ends_with("-001"));
    assert_eq!(created.items.len(), 2);
    assert_eq!(created.items[1].unit_price_minor, 1000);

    // Second order the same local day continues the sequence.
    let second = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id,
            table_id: None,
            delivery_type: DeliveryType::Takeaway,
            customer_name: "Ada".into(),
            customer_phone: "+100000001".into(),
            special_instructions: None,
            items: vec![CreateOrderItem {
                product_id,
                variant_label: None,
                quantity: 2,
                special_instructions: None,
            }],
        },
    )
    .await?
    .data
    .unwrap();
    assert!(second.order.order_number.ends_with("-002"));

    // Unknown variant is rejected.
    let err = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id,
            table_id: None,
            delivery_type: DeliveryType::Takeaway,
            customer_name: "Ada".into(),
            customer_phone: "+100000001".into(),
            special_instructions: None,
            items: vec![CreateOrderItem {
                product_id,
                variant_label: Some("mega".into()),
                quantity: 1,
                special_instructions: None,
            }],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ValidationFailed(_)));

    // Customers may not drive the lifecycle.
    let err = order_service::transition_status(
        &state,
        &customer,
        created.order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Preparing,
            estimated_minutes: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Staff walk Pending -> Preparing -> Ready -> Completed.
    let order = order_service::transition_status(
        &state,
        &owner,
        created.order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Preparing,
            estimated_minutes: Some(10),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(order.status, OrderStatus::Preparing);
    assert_eq!(order.estimated_minutes, Some(10));

    for status in [OrderStatus::Ready, OrderStatus::Completed] {
        order_service::transition_status(
            &state,
            &owner,
            created.order.id,
            UpdateOrderStatusRequest {
                status,
                estimated_minutes: None,
            },
        )
        .await?;
    }

    // Terminal orders accept nothing further.
    let err = order_service::transition_status(
        &state,
        &owner,
        created.order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Preparing,
            estimated_minutes: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::IllegalTransition { .. }));

    // Customer cancels their own pending order.
    let cancelled = order_service::cancel_order(
        &state,
        &customer,
        second.order.id,
        CancelOrderRequest {
            reason: "changed my mind".into(),
            refund: false,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Events landed in the outbox in order.
    let kinds: Vec<String> = outbox::Entity::find()
        .filter(outbox::Column::AggregateId.eq(created.order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|row| row.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            "order_created",
            "order_status_changed",
            "order_status_changed",
            "order_status_changed"
        ]
    );

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

    // Clean tables between runs.
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, order_number_counters, refunds, payments, \
         processed_webhooks, shifts, invite_tokens, employees, dining_tables, products, \
         restaurants, foodcourts, sessions, outbox, leases, audit_logs, principals \
         RESTART IDENTITY CASCADE",
    ))
    .await?;

    let config = test_config(database_url);
    Ok(Some(AppState::new(orm, config)?))
}

fn test_config(database_url: String) -> AppConfig {
    AppConfig {
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
    }
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
) -> anyhow::Result<(Uuid, Uuid)> {
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
        name: Set("Noodle Bar".into()),
        timezone: Set(None),
        commission_rate_bps: Set(commission_rate_bps),
        published: Set(true),
        location: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok((foodcourt_id, restaurant_id))
}

async fn seed_table(state: &AppState, foodcourt_id: Uuid) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    dining_tables::ActiveModel {
        id: Set(id),
        foodcourt_id: Set(foodcourt_id),
        label: Set("T1".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
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
        name: Set("Ramen".into()),
        base_price_minor: Set(base_price_minor),
        available: Set(true),
        variants: Set(Some(serde_json::json!([
            { "label": "large", "price_modifier_minor": 250 }
        ]))),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(id)
}

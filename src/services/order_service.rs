use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    authz::{self, Resource, Verb},
    catalog, db,
    dto::orders::{
        BulkStatusItem, BulkStatusRequest, BulkStatusResult, CancelOrderRequest,
        CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest,
    },
    entity::{
        dining_tables, employees, foodcourts, order_items, order_number_counters, orders, payments,
        restaurants,
    },
    error::{AppError, AppResult},
    events::{self, DomainEvent},
    middleware::auth::AuthPrincipal,
    models::{DeliveryType, Order, OrderItem, OrderStatus, PaymentStatus, Role},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::payment_service,
    state::AppState,
};

/// Create an order inside one serializable transaction: validate
/// restaurant/table/items, price from the catalog snapshot, allocate the
/// per-day order number under a row lock, insert the aggregate and append
/// `OrderCreated`.
pub async fn create_order(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let auth = *auth;
    let default_tz = state.config.default_timezone;

    let created = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        Box::pin(async move { create_order_in_tx(txn, &auth, payload, default_tz).await })
    })
    .await?;

    Ok(ApiResponse::ok("Order created", created))
}

async fn create_order_in_tx(
    txn: &DatabaseTransaction,
    auth: &AuthPrincipal,
    payload: CreateOrderRequest,
    default_tz: Tz,
) -> AppResult<OrderWithItems> {
    let restaurant = restaurants::Entity::find_by_id(payload.restaurant_id)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let foodcourt = foodcourts::Entity::find_by_id(restaurant.foodcourt_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("restaurant without foodcourt")))?;

    if !restaurant.published || !foodcourt.active {
        return Err(AppError::ValidationFailed(
            "restaurant is not accepting orders".into(),
        ));
    }

    authz::authorize(
        txn,
        auth,
        Verb::CreateOrder,
        Resource::Restaurant {
            restaurant_id: restaurant.id,
        },
    )
    .await?;

    if let Some(table_id) = payload.table_id {
        let table = dining_tables::Entity::find_by_id(table_id).one(txn).await?;
        let belongs = table
            .map(|t| t.foodcourt_id == restaurant.foodcourt_id)
            .unwrap_or(false);
        if !belongs {
            return Err(AppError::ValidationFailed(
                "table does not belong to the restaurant's foodcourt".into(),
            ));
        }
    }

    if payload.customer_name.trim().is_empty() {
        return Err(AppError::ValidationFailed("customer name is required".into()));
    }
    if payload.customer_phone.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "customer phone is required".into(),
        ));
    }
    if payload.items.is_empty() {
        return Err(AppError::ValidationFailed("order has no items".into()));
    }

    let mut priced_items = Vec::with_capacity(payload.items.len());
    let mut total_minor: i64 = 0;
    for item in &payload.items {
        if item.quantity < 1 {
            return Err(AppError::ValidationFailed(
                "item quantity must be at least 1".into(),
            ));
        }
        let snapshot = catalog::load_product(txn, restaurant.id, item.product_id)
            .await?
            .filter(|p| p.available)
            .ok_or_else(|| {
                AppError::ValidationFailed(format!("product {} is unavailable", item.product_id))
            })?;
        let unit_price_minor = snapshot.unit_price_minor(item.variant_label.as_deref())?;
        let line_total_minor = unit_price_minor * item.quantity as i64;
        total_minor += line_total_minor;
        priced_items.push((item.clone(), snapshot, unit_price_minor, line_total_minor));
    }

    if total_minor <= 0 {
        return Err(AppError::ValidationFailed(
            "order total must be positive".into(),
        ));
    }

    // Customers always own their orders; staff-entered orders are walk-ins.
    let customer_principal_id = (auth.role == Role::Customer).then_some(auth.id);

    let tz = restaurant
        .timezone
        .as_deref()
        .and_then(|s| s.parse::<Tz>().ok())
        .unwrap_or(default_tz);
    let local_date = Utc::now().with_timezone(&tz).date_naive();
    let sequence = allocate_order_number(txn, restaurant.id, local_date).await?;
    let order_number = format_order_number(local_date, sequence);

    let order_id = Uuid::new_v4();
    let order = orders::ActiveModel {
        id: Set(order_id),
        order_number: Set(order_number.clone()),
        restaurant_id: Set(restaurant.id),
        table_id: Set(payload.table_id),
        customer_principal_id: Set(customer_principal_id),
        customer_name: Set(payload.customer_name.trim().to_string()),
        customer_phone: Set(payload.customer_phone.trim().to_string()),
        delivery_type: Set(payload.delivery_type.as_str().to_string()),
        total_minor: Set(total_minor),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        estimated_minutes: Set(None),
        special_instructions: Set(payload.special_instructions.clone()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(priced_items.len());
    for (request, snapshot, unit_price_minor, line_total_minor) in priced_items {
        let row = order_items::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(snapshot.id),
            product_name: Set(snapshot.name),
            variant_label: Set(request.variant_label),
            quantity: Set(request.quantity),
            unit_price_minor: Set(unit_price_minor),
            line_total_minor: Set(line_total_minor),
            special_instructions: Set(request.special_instructions),
        }
        .insert(txn)
        .await?;
        items.push(order_item_from_entity(row));
    }

    events::append(
        txn,
        &DomainEvent::OrderCreated {
            order_id,
            restaurant_id: restaurant.id,
            order_number,
            total_minor,
        },
    )
    .await?;

    Ok(OrderWithItems {
        order: order_from_entity(order)?,
        items,
    })
}

/// Increment the per-(restaurant, local day) counter under a row lock. The
/// counter row and the order row commit together, so a crash cannot leave a
/// gap in the sequence.
async fn allocate_order_number(
    txn: &DatabaseTransaction,
    restaurant_id: Uuid,
    local_date: NaiveDate,
) -> AppResult<i32> {
    let counter = order_number_counters::Entity::find_by_id((restaurant_id, local_date))
        .lock(LockType::Update)
        .one(txn)
        .await?;

    match counter {
        Some(row) => {
            let next = row.value + 1;
            let mut active: order_number_counters::ActiveModel = row.into();
            active.value = Set(next);
            active.update(txn).await?;
            Ok(next)
        }
        None => {
            order_number_counters::ActiveModel {
                restaurant_id: Set(restaurant_id),
                local_date: Set(local_date),
                value: Set(1),
            }
            .insert(txn)
            .await?;
            Ok(1)
        }
    }
}

fn format_order_number(local_date: NaiveDate, sequence: i32) -> String {
    format!("{}-{:03}", local_date.format("%Y%m%d"), sequence)
}

/// Move an order along the lifecycle. Cancellation carries a reason and a
/// refund decision, so it goes through `cancel_order` instead.
pub async fn transition_status(
    state: &AppState,
    auth: &AuthPrincipal,
    order_id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    let auth = *auth;

    let updated = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        Box::pin(async move {
            let order = orders::Entity::find_by_id(order_id)
                .lock(LockType::Update)
                .one(txn)
                .await?
                .ok_or(AppError::NotFound)?;
            let from = parse_status(&order.status)?;

            authz::authorize(
                txn,
                &auth,
                Verb::TransitionOrder,
                Resource::Order {
                    restaurant_id: order.restaurant_id,
                    customer_principal_id: order.customer_principal_id,
                    status: from,
                },
            )
            .await?;

            if let Some(est) = payload.estimated_minutes {
                if est < 0 {
                    return Err(AppError::ValidationFailed(
                        "estimated minutes must not be negative".into(),
                    ));
                }
            }

            let to = payload.status;
            if to == OrderStatus::Cancelled {
                return Err(AppError::ValidationFailed(
                    "cancellation requires the cancel operation with a reason".into(),
                ));
            }
            if !from.can_transition_to(to) {
                return Err(AppError::IllegalTransition {
                    from: from.as_str().to_string(),
                    to: to.as_str().to_string(),
                });
            }

            let mut active: orders::ActiveModel = order.into();
            active.status = Set(to.as_str().to_string());
            if payload.estimated_minutes.is_some() {
                active.estimated_minutes = Set(payload.estimated_minutes);
            }
            active.updated_at = Set(Utc::now().into());
            let updated = active.update(txn).await?;

            events::append(
                txn,
                &DomainEvent::OrderStatusChanged {
                    order_id,
                    from,
                    to,
                    estimated_minutes: payload.estimated_minutes,
                },
            )
            .await?;

            Ok(updated)
        })
    })
    .await?;

    Ok(ApiResponse::ok(
        "Order status updated",
        order_from_entity(updated)?,
    ))
}

/// Cancel an order. When a completed payment exists and `refund` was
/// requested, the refund and the cancellation commit together; a provider
/// failure rejects the whole cancellation with `RefundFailed`.
pub async fn cancel_order(
    state: &AppState,
    auth: &AuthPrincipal,
    order_id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    let auth = *auth;
    let providers = state.providers.clone();

    let cancelled = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        let providers = providers.clone();
        Box::pin(async move {
            let order = orders::Entity::find_by_id(order_id)
                .lock(LockType::Update)
                .one(txn)
                .await?
                .ok_or(AppError::NotFound)?;
            let from = parse_status(&order.status)?;

            authz::authorize(
                txn,
                &auth,
                Verb::CancelOrder,
                Resource::Order {
                    restaurant_id: order.restaurant_id,
                    customer_principal_id: order.customer_principal_id,
                    status: from,
                },
            )
            .await?;

            let reason = payload.reason.trim();
            if reason.is_empty() {
                return Err(AppError::ValidationFailed(
                    "cancellation reason is required".into(),
                ));
            }
            if from.is_terminal() {
                return Err(AppError::IllegalTransition {
                    from: from.as_str().to_string(),
                    to: OrderStatus::Cancelled.as_str().to_string(),
                });
            }

            let payment = payments::Entity::find()
                .filter(payments::Column::OrderId.eq(order_id))
                .one(txn)
                .await?;

            if let Some(payment) = payment {
                let status = PaymentStatus::parse(&payment.status).ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("unknown payment status"))
                })?;
                if status == PaymentStatus::Completed && payload.refund {
                    let remaining =
                        payment_service::remaining_refundable(txn, &payment).await?;
                    payment_service::execute_refund(txn, &providers, payment, remaining, reason)
                        .await
                        .map_err(|err| match err {
                            AppError::ProviderUnavailable(msg) | AppError::RefundFailed(msg) => {
                                AppError::RefundFailed(msg)
                            }
                            other => other,
                        })?;
                }
            }

            let mut active: orders::ActiveModel = order.into();
            active.status = Set(OrderStatus::Cancelled.as_str().to_string());
            active.updated_at = Set(Utc::now().into());
            let updated = active.update(txn).await?;

            events::append(
                txn,
                &DomainEvent::OrderCancelled {
                    order_id,
                    reason: reason.to_string(),
                },
            )
            .await?;

            Ok(updated)
        })
    })
    .await?;

    Ok(ApiResponse::ok(
        "Order cancelled",
        order_from_entity(cancelled)?,
    ))
}

/// Transition a batch of orders, each in its own transaction. Failures are
/// reported per order and do not affect the rest of the batch.
pub async fn bulk_update_status(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: BulkStatusRequest,
) -> AppResult<ApiResponse<BulkStatusResult>> {
    if payload.order_ids.is_empty() {
        return Err(AppError::ValidationFailed("no order ids given".into()));
    }

    let mut items = Vec::with_capacity(payload.order_ids.len());
    for order_id in payload.order_ids {
        let request = UpdateOrderStatusRequest {
            status: payload.status,
            estimated_minutes: payload.estimated_minutes,
        };
        match transition_status(state, auth, order_id, request).await {
            Ok(_) => items.push(BulkStatusItem {
                order_id,
                ok: true,
                code: None,
                message: None,
            }),
            Err(err) => items.push(BulkStatusItem {
                order_id,
                ok: false,
                code: Some(err.code().to_string()),
                message: Some(err.to_string()),
            }),
        }
    }

    Ok(ApiResponse::ok("Bulk update finished", BulkStatusResult { items }))
}

pub async fn list_orders(
    state: &AppState,
    auth: &AuthPrincipal,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, per_page, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    match auth.role {
        Role::Superadmin => {}
        Role::RestaurantOwner => {
            let restaurant_ids: Vec<Uuid> = restaurants::Entity::find()
                .filter(restaurants::Column::OwnerPrincipalId.eq(auth.id))
                .all(&state.orm)
                .await?
                .into_iter()
                .map(|r| r.id)
                .collect();
            condition = condition.add(orders::Column::RestaurantId.is_in(restaurant_ids));
        }
        Role::Employee => {
            let restaurant_ids: Vec<Uuid> = employees::Entity::find()
                .filter(employees::Column::PrincipalId.eq(auth.id))
                .filter(employees::Column::Active.eq(true))
                .all(&state.orm)
                .await?
                .into_iter()
                .map(|e| e.restaurant_id)
                .collect();
            condition = condition.add(orders::Column::RestaurantId.is_in(restaurant_ids));
        }
        Role::Customer => {
            condition = condition.add(orders::Column::CustomerPrincipalId.eq(auth.id));
        }
    }

    if let Some(status) = query.status {
        condition = condition.add(orders::Column::Status.eq(status.as_str()));
    }

    let mut finder = orders::Entity::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(orders::Column::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(orders::Column::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let rows = finder
        .limit(per_page as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(order_from_entity(row)?);
    }

    let meta = Meta::new(page, per_page, total);
    Ok(ApiResponse::success("Ok", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    auth: &AuthPrincipal,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = orders::Entity::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let status = parse_status(&order.status)?;

    authz::authorize(
        &state.orm,
        auth,
        Verb::ReadOrder,
        Resource::Order {
            restaurant_id: order.restaurant_id,
            customer_principal_id: order.customer_principal_id,
            status,
        },
    )
    .await?;

    let items = order_items::Entity::find()
        .filter(order_items::Column::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::ok(
        "Ok",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
        },
    ))
}

fn parse_status(raw: &str) -> AppResult<OrderStatus> {
    OrderStatus::parse(raw)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown order status '{raw}'")))
}

pub fn order_from_entity(model: orders::Model) -> AppResult<Order> {
    let status = parse_status(&model.status)?;
    let delivery_type = DeliveryType::parse(&model.delivery_type)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown delivery type")))?;
    Ok(Order {
        id: model.id,
        order_number: model.order_number,
        restaurant_id: model.restaurant_id,
        table_id: model.table_id,
        customer_principal_id: model.customer_principal_id,
        customer_name: model.customer_name,
        customer_phone: model.customer_phone,
        delivery_type,
        total_minor: model.total_minor,
        status,
        estimated_minutes: model.estimated_minutes,
        special_instructions: model.special_instructions,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub fn order_item_from_entity(model: order_items::Model) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        product_name: model.product_name,
        variant_label: model.variant_label,
        quantity: model.quantity,
        unit_price_minor: model.unit_price_minor,
        line_total_minor: model.line_total_minor,
        special_instructions: model.special_instructions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_number_format_is_padded() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(format_order_number(date, 1), "20250307-001");
        assert_eq!(format_order_number(date, 42), "20250307-042");
        assert_eq!(format_order_number(date, 999), "20250307-999");
        // Padding grows past three digits without truncation.
        assert_eq!(format_order_number(date, 1000), "20250307-1000");
    }
}

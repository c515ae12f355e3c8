use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QuerySelect, Set, Statement,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    authz::{self, Resource, Verb},
    db,
    dto::payments::{
        CashPaymentRequest, CreatePaymentRequest, PaymentWithRefunds, RefundRequest,
        TerminalPaymentRequest,
    },
    entity::{orders, payments, refunds, restaurants},
    error::{AppError, AppResult},
    events::{self, DomainEvent},
    middleware::auth::AuthPrincipal,
    models::{OrderStatus, Payment, PaymentMethod, PaymentStatus, Refund},
    providers::{PaymentDraft, ProviderRegistry, WebhookEvent, WebhookEventKind},
    response::ApiResponse,
    state::AppState,
};

/// Commission in minor units: `floor(amount × rate)` with the rate held as
/// basis points, so the whole computation stays in integers.
pub fn commission_for(amount_minor: i64, rate_bps: i32) -> i64 {
    amount_minor * rate_bps as i64 / 10_000
}

/// Open an asynchronous card payment. The pending row, the provider call and
/// the `PaymentCreated` event share one transaction: a provider failure rolls
/// everything back.
pub async fn create_payment(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: CreatePaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    if payload.method.is_synchronous() {
        return Err(AppError::ValidationFailed(
            "cash and terminal payments settle via their own operations".into(),
        ));
    }

    let auth = *auth;
    let providers = state.providers.clone();

    let payment = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        let providers = providers.clone();
        Box::pin(async move {
            let (order, restaurant) = load_payable_order(txn, payload.order_id).await?;

            authz::authorize(
                txn,
                &auth,
                Verb::CreatePayment,
                Resource::Order {
                    restaurant_id: order.restaurant_id,
                    customer_principal_id: order.customer_principal_id,
                    status: OrderStatus::parse(&order.status).unwrap_or(OrderStatus::Pending),
                },
            )
            .await?;

            let inserted = insert_payment_row(
                txn,
                &order,
                &restaurant,
                payload.method,
                PaymentStatus::Pending,
                None,
            )
            .await?;

            let adapter = providers.for_method(payload.method).ok_or_else(|| {
                AppError::ProviderUnavailable("payment provider is not configured".into())
            })?;
            let draft = PaymentDraft {
                payment_id: inserted.id,
                order_id: order.id,
                amount_minor: inserted.amount_minor,
                currency: inserted.currency.clone(),
                description: format!("Order {}", order.order_number),
                return_url: payload.return_url.clone(),
            };
            let outcome = adapter.create_charge(&draft).await?;

            let mut active: payments::ActiveModel = inserted.into();
            active.provider_ref = Set(Some(outcome.provider_ref));
            active.redirect_url = Set(outcome.redirect_url);
            active.updated_at = Set(Utc::now().into());
            let updated = active.update(txn).await?;

            events::append(
                txn,
                &DomainEvent::PaymentCreated {
                    payment_id: updated.id,
                    order_id: order.id,
                    amount_minor: updated.amount_minor,
                    method: payload.method,
                },
            )
            .await?;

            Ok(updated)
        })
    })
    .await?;

    Ok(ApiResponse::ok("Payment created", payment_from_entity(payment)?))
}

/// Record a cash payment taken at the counter; settles at insertion.
pub async fn create_cash_payment(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: CashPaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    let auth = *auth;

    let payment = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        Box::pin(async move {
            let (order, restaurant) = load_payable_order(txn, payload.order_id).await?;

            authz::authorize(
                txn,
                &auth,
                Verb::ProcessCashOrTerminal,
                Resource::Restaurant {
                    restaurant_id: order.restaurant_id,
                },
            )
            .await?;

            if payload.amount_received_minor < order.total_minor {
                return Err(AppError::ValidationFailed(
                    "received cash is less than the order total".into(),
                ));
            }
            let change_given_minor = payload.amount_received_minor - order.total_minor;
            let metadata = serde_json::json!({
                "amount_received_minor": payload.amount_received_minor,
                "change_given_minor": change_given_minor,
                "processed_by_principal_id": auth.id,
            });

            let inserted = insert_payment_row(
                txn,
                &order,
                &restaurant,
                PaymentMethod::Cash,
                PaymentStatus::Completed,
                Some(metadata),
            )
            .await?;

            settle_events(txn, &inserted, PaymentMethod::Cash).await?;

            Ok(inserted)
        })
    })
    .await?;

    Ok(ApiResponse::ok(
        "Cash payment recorded",
        payment_from_entity(payment)?,
    ))
}

/// Record a card-terminal payment; settles at insertion.
pub async fn create_terminal_payment(
    state: &AppState,
    auth: &AuthPrincipal,
    payload: TerminalPaymentRequest,
) -> AppResult<ApiResponse<Payment>> {
    let auth = *auth;

    let payment = db::serializable(&state.orm, move |txn| {
        let payload = payload.clone();
        Box::pin(async move {
            let (order, restaurant) = load_payable_order(txn, payload.order_id).await?;

            authz::authorize(
                txn,
                &auth,
                Verb::ProcessCashOrTerminal,
                Resource::Restaurant {
                    restaurant_id: order.restaurant_id,
                },
            )
            .await?;

            if payload.terminal_tx_id.trim().is_empty() || payload.terminal_id.trim().is_empty() {
                return Err(AppError::ValidationFailed(
                    "terminal transaction and terminal ids are required".into(),
                ));
            }
            let metadata = serde_json::json!({
                "terminal_tx_id": payload.terminal_tx_id,
                "terminal_id": payload.terminal_id,
                "card_last4": payload.card_last4,
                "card_brand": payload.card_brand,
                "processed_by_principal_id": auth.id,
            });

            let inserted = insert_payment_row(
                txn,
                &order,
                &restaurant,
                PaymentMethod::Terminal,
                PaymentStatus::Completed,
                Some(metadata),
            )
            .await?;

            settle_events(txn, &inserted, PaymentMethod::Terminal).await?;

            Ok(inserted)
        })
    })
    .await?;

    Ok(ApiResponse::ok(
        "Terminal payment recorded",
        payment_from_entity(payment)?,
    ))
}

/// Full or partial refund of a completed payment.
pub async fn refund_payment(
    state: &AppState,
    auth: &AuthPrincipal,
    payment_id: Uuid,
    payload: RefundRequest,
) -> AppResult<ApiResponse<PaymentWithRefunds>> {
    let reason = payload.reason.trim().to_string();
    if reason.is_empty() {
        return Err(AppError::ValidationFailed("refund reason is required".into()));
    }

    let auth = *auth;
    let providers = state.providers.clone();
    let amount_request = payload.amount_minor;

    let updated = db::serializable(&state.orm, move |txn| {
        let providers = providers.clone();
        let reason = reason.clone();
        Box::pin(async move {
            let payment = payments::Entity::find_by_id(payment_id)
                .lock(LockType::Update)
                .one(txn)
                .await?
                .ok_or(AppError::NotFound)?;
            let order = orders::Entity::find_by_id(payment.order_id)
                .one(txn)
                .await?
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("payment without order")))?;

            authz::authorize(
                txn,
                &auth,
                Verb::RefundPayment,
                Resource::Restaurant {
                    restaurant_id: order.restaurant_id,
                },
            )
            .await?;

            let remaining = remaining_refundable(txn, &payment).await?;
            let amount = amount_request.unwrap_or(remaining);
            execute_refund(txn, &providers, payment, amount, &reason).await
        })
    })
    .await?;

    if let Err(err) = log_audit(
        state,
        Some(auth.id),
        "payment_refund",
        Some("payments"),
        Some(serde_json::json!({ "payment_id": payment_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let refund_rows = refunds::Entity::find()
        .filter(refunds::Column::PaymentId.eq(payment_id))
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::ok(
        "Refund recorded",
        PaymentWithRefunds {
            payment: payment_from_entity(updated)?,
            refunds: refund_rows.into_iter().map(refund_from_entity).collect(),
        },
    ))
}

/// Amount still refundable: the original charge minus prior refunds.
pub async fn remaining_refundable(
    txn: &DatabaseTransaction,
    payment: &payments::Model,
) -> AppResult<i64> {
    let refunded: i64 = refunds::Entity::find()
        .filter(refunds::Column::PaymentId.eq(payment.id))
        .all(txn)
        .await?
        .iter()
        .map(|r| r.amount_minor)
        .sum();
    Ok(payment.amount_minor - refunded)
}

/// Shared refund executor used by the refund endpoint and order
/// cancellation. Runs inside the caller's transaction; the provider call
/// happens before any row is written, so a provider failure aborts cleanly.
pub async fn execute_refund(
    txn: &DatabaseTransaction,
    providers: &ProviderRegistry,
    payment: payments::Model,
    amount_minor: i64,
    reason: &str,
) -> AppResult<payments::Model> {
    let status = PaymentStatus::parse(&payment.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown payment status")))?;
    if status != PaymentStatus::Completed {
        return Err(AppError::ValidationFailed(
            "payment is not in a refundable state".into(),
        ));
    }

    let remaining = remaining_refundable(txn, &payment).await?;
    if amount_minor <= 0 || amount_minor > remaining {
        return Err(AppError::ValidationFailed(format!(
            "refund amount must be between 1 and {remaining}"
        )));
    }

    let method = PaymentMethod::parse(&payment.method)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown payment method")))?;

    // Cash and terminal refunds are handed back physically; only card
    // refunds go through a provider.
    let provider_refund_ref = if method.is_synchronous() {
        None
    } else {
        let provider_ref = payment
            .provider_ref
            .clone()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("payment missing provider ref")))?;
        let adapter = providers.for_method(method).ok_or_else(|| {
            AppError::ProviderUnavailable("payment provider is not configured".into())
        })?;
        Some(
            adapter
                .refund(&provider_ref, amount_minor, reason)
                .await?
                .refund_ref,
        )
    };

    refunds::ActiveModel {
        id: Set(Uuid::new_v4()),
        payment_id: Set(payment.id),
        amount_minor: Set(amount_minor),
        reason: Set(reason.to_string()),
        provider_refund_ref: Set(provider_refund_ref),
        created_at: NotSet,
    }
    .insert(txn)
    .await?;

    let payment_id = payment.id;
    let fully_refunded = amount_minor == remaining;
    let mut active: payments::ActiveModel = payment.into();
    if fully_refunded {
        // Full refund reverses the frozen split for payout accounting.
        active.status = Set(PaymentStatus::Refunded.as_str().to_string());
        active.commission_minor = Set(0);
        active.net_minor = Set(0);
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(txn).await?;

    events::append(
        txn,
        &DomainEvent::PaymentRefunded {
            payment_id,
            amount_minor,
        },
    )
    .await?;

    Ok(updated)
}

/// Outcome of a verified webhook; all variants answer HTTP 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    UnknownReference,
    AlreadyTerminal,
}

/// Apply a verified provider event. Idempotency is enforced by the
/// `(provider, provider_event_id)` ledger inside the same transaction as the
/// state change; replays are no-ops.
pub async fn apply_webhook_event(
    state: &AppState,
    provider_slug: &str,
    event: WebhookEvent,
) -> AppResult<WebhookOutcome> {
    let provider_slug = provider_slug.to_string();

    db::serializable(&state.orm, move |txn| {
        let provider_slug = provider_slug.clone();
        let event = event.clone();
        Box::pin(async move {
            let backend = txn.get_database_backend();
            let inserted = txn
                .execute(Statement::from_sql_and_values(
                    backend,
                    "INSERT INTO processed_webhooks (provider, provider_event_id) \
                     VALUES ($1, $2) ON CONFLICT DO NOTHING",
                    [provider_slug.clone().into(), event.event_id.clone().into()],
                ))
                .await?;
            if inserted.rows_affected() == 0 {
                return Ok(WebhookOutcome::Duplicate);
            }

            let payment = payments::Entity::find()
                .filter(payments::Column::ProviderRef.eq(event.provider_ref.clone()))
                .lock(LockType::Update)
                .one(txn)
                .await?;
            let Some(payment) = payment else {
                tracing::warn!(
                    provider = %provider_slug,
                    provider_ref = %event.provider_ref,
                    "webhook for unknown payment reference"
                );
                return Ok(WebhookOutcome::UnknownReference);
            };

            let status = PaymentStatus::parse(&payment.status)
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown payment status")))?;

            match (event.kind, status) {
                (WebhookEventKind::ChargeSucceeded, PaymentStatus::Pending) => {
                    let payment_id = payment.id;
                    let order_id = payment.order_id;
                    let amount_minor = payment.amount_minor;
                    let mut active: payments::ActiveModel = payment.into();
                    active.status = Set(PaymentStatus::Completed.as_str().to_string());
                    active.updated_at = Set(Utc::now().into());
                    active.update(txn).await?;

                    events::append(
                        txn,
                        &DomainEvent::PaymentSettled {
                            payment_id,
                            order_id,
                            amount_minor,
                        },
                    )
                    .await?;
                    Ok(WebhookOutcome::Processed)
                }
                (WebhookEventKind::ChargeFailed, PaymentStatus::Pending) => {
                    let payment_id = payment.id;
                    let reason = event
                        .reason
                        .clone()
                        .unwrap_or_else(|| "declined by provider".to_string());
                    let mut active: payments::ActiveModel = payment.into();
                    active.status = Set(PaymentStatus::Failed.as_str().to_string());
                    active.updated_at = Set(Utc::now().into());
                    active.update(txn).await?;

                    events::append(txn, &DomainEvent::PaymentFailed { payment_id, reason })
                        .await?;
                    Ok(WebhookOutcome::Processed)
                }
                (WebhookEventKind::RefundSucceeded, PaymentStatus::Completed) => {
                    // Provider-side refund we have not recorded yet.
                    let amount = event.amount_minor.unwrap_or(payment.amount_minor);
                    let payment_id = payment.id;
                    let remaining = remaining_refundable(txn, &payment).await?;
                    if amount <= 0 || amount > remaining {
                        tracing::warn!(
                            payment_id = %payment_id,
                            amount,
                            remaining,
                            "ignoring refund webhook outside refundable range"
                        );
                        return Ok(WebhookOutcome::AlreadyTerminal);
                    }

                    refunds::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        payment_id: Set(payment_id),
                        amount_minor: Set(amount),
                        reason: Set("provider refund".to_string()),
                        provider_refund_ref: Set(Some(event.event_id.clone())),
                        created_at: NotSet,
                    }
                    .insert(txn)
                    .await?;

                    let fully = amount == remaining;
                    let mut active: payments::ActiveModel = payment.into();
                    if fully {
                        active.status = Set(PaymentStatus::Refunded.as_str().to_string());
                        active.commission_minor = Set(0);
                        active.net_minor = Set(0);
                    }
                    active.updated_at = Set(Utc::now().into());
                    active.update(txn).await?;

                    events::append(
                        txn,
                        &DomainEvent::PaymentRefunded {
                            payment_id,
                            amount_minor: amount,
                        },
                    )
                    .await?;
                    Ok(WebhookOutcome::Processed)
                }
                // Replays against a terminal payment leave it unchanged.
                _ => Ok(WebhookOutcome::AlreadyTerminal),
            }
        })
    })
    .await
}

pub async fn get_payment(
    state: &AppState,
    auth: &AuthPrincipal,
    id: Uuid,
) -> AppResult<ApiResponse<PaymentWithRefunds>> {
    let payment = payments::Entity::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let order = orders::Entity::find_by_id(payment.order_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("payment without order")))?;

    authz::authorize(
        &state.orm,
        auth,
        Verb::ReadOrder,
        Resource::Order {
            restaurant_id: order.restaurant_id,
            customer_principal_id: order.customer_principal_id,
            status: OrderStatus::parse(&order.status).unwrap_or(OrderStatus::Pending),
        },
    )
    .await?;

    let refund_rows = refunds::Entity::find()
        .filter(refunds::Column::PaymentId.eq(payment.id))
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::ok(
        "Ok",
        PaymentWithRefunds {
            payment: payment_from_entity(payment)?,
            refunds: refund_rows.into_iter().map(refund_from_entity).collect(),
        },
    ))
}

/// Load the order for a new payment along with its restaurant. Rejects
/// cancelled orders and orders that already carry a payment.
async fn load_payable_order(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> AppResult<(orders::Model, restaurants::Model)> {
    let order = orders::Entity::find_by_id(order_id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.status == OrderStatus::Cancelled.as_str() {
        return Err(AppError::ValidationFailed(
            "cancelled orders cannot be paid".into(),
        ));
    }

    let existing = payments::Entity::find()
        .filter(payments::Column::OrderId.eq(order_id))
        .one(txn)
        .await?;
    if existing.is_some() {
        return Err(AppError::PaymentAlreadyExists);
    }

    let restaurant = restaurants::Entity::find_by_id(order.restaurant_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order without restaurant")))?;

    Ok((order, restaurant))
}

/// Insert a payment with the commission split frozen from the restaurant's
/// current rate. The unique index on `order_id` backstops concurrent
/// creations.
async fn insert_payment_row(
    txn: &DatabaseTransaction,
    order: &orders::Model,
    restaurant: &restaurants::Model,
    method: PaymentMethod,
    status: PaymentStatus,
    metadata: Option<serde_json::Value>,
) -> AppResult<payments::Model> {
    let commission_minor = commission_for(order.total_minor, restaurant.commission_rate_bps);
    let net_minor = order.total_minor - commission_minor;

    let result = payments::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        amount_minor: Set(order.total_minor),
        currency: Set("USD".to_string()),
        method: Set(method.as_str().to_string()),
        status: Set(status.as_str().to_string()),
        commission_minor: Set(commission_minor),
        net_minor: Set(net_minor),
        provider_ref: NotSet,
        redirect_url: NotSet,
        provider_metadata: Set(metadata),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await;

    match result {
        Ok(model) => Ok(model),
        Err(err) => {
            let err = AppError::Db(err);
            if err.is_unique_violation() {
                Err(AppError::PaymentAlreadyExists)
            } else {
                Err(err)
            }
        }
    }
}

async fn settle_events(
    txn: &DatabaseTransaction,
    payment: &payments::Model,
    method: PaymentMethod,
) -> AppResult<()> {
    events::append(
        txn,
        &DomainEvent::PaymentCreated {
            payment_id: payment.id,
            order_id: payment.order_id,
            amount_minor: payment.amount_minor,
            method,
        },
    )
    .await?;
    events::append(
        txn,
        &DomainEvent::PaymentSettled {
            payment_id: payment.id,
            order_id: payment.order_id,
            amount_minor: payment.amount_minor,
        },
    )
    .await?;
    Ok(())
}

pub fn payment_from_entity(model: payments::Model) -> AppResult<Payment> {
    let method = PaymentMethod::parse(&model.method)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown payment method")))?;
    let status = PaymentStatus::parse(&model.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown payment status")))?;
    Ok(Payment {
        id: model.id,
        order_id: model.order_id,
        amount_minor: model.amount_minor,
        currency: model.currency,
        method,
        status,
        commission_minor: model.commission_minor,
        net_minor: model.net_minor,
        provider_ref: model.provider_ref,
        redirect_url: model.redirect_url,
        provider_metadata: model.provider_metadata,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub fn refund_from_entity(model: refunds::Model) -> Refund {
    Refund {
        id: model.id,
        payment_id: model.payment_id,
        amount_minor: model.amount_minor,
        reason: model.reason,
        provider_refund_ref: model.provider_refund_ref,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_floors_toward_zero() {
        // 10% of 1099 is 109.9, floored to 109.
        assert_eq!(commission_for(1099, 1000), 109);
        assert_eq!(1099 - commission_for(1099, 1000), 990);
    }

    #[test]
    fn commission_at_rate_bounds() {
        assert_eq!(commission_for(1500, 0), 0);
        assert_eq!(commission_for(1500, 10_000), 1500);
        assert_eq!(commission_for(1500, 1000), 150);
    }

    #[test]
    fn commission_and_net_sum_to_amount() {
        for amount in [1i64, 99, 1099, 150_000] {
            for bps in [0, 1, 250, 999, 1000, 5000, 10_000] {
                let commission = commission_for(amount, bps);
                let net = amount - commission;
                assert_eq!(commission + net, amount);
                assert!(commission >= 0);
                assert!(net >= 0);
            }
        }
    }
}

use async_trait::async_trait;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entity::outbox,
    error::{AppError, AppResult},
    models::{OrderStatus, PaymentMethod},
};

/// Domain events the core emits. Serialized into the outbox as JSON in the
/// same transaction as the state change that produced them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderCreated {
        order_id: Uuid,
        restaurant_id: Uuid,
        order_number: String,
        total_minor: i64,
    },
    OrderStatusChanged {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        estimated_minutes: Option<i32>,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: String,
    },
    PaymentCreated {
        payment_id: Uuid,
        order_id: Uuid,
        amount_minor: i64,
        method: PaymentMethod,
    },
    PaymentSettled {
        payment_id: Uuid,
        order_id: Uuid,
        amount_minor: i64,
    },
    PaymentFailed {
        payment_id: Uuid,
        reason: String,
    },
    PaymentRefunded {
        payment_id: Uuid,
        amount_minor: i64,
    },
    ShiftStarted {
        shift_id: Uuid,
        employee_id: Uuid,
    },
    ShiftEnded {
        shift_id: Uuid,
        employee_id: Uuid,
        minutes_worked: i64,
        pay_minor: Option<i64>,
    },
    ShiftMissed {
        shift_id: Uuid,
        employee_id: Uuid,
    },
    InviteConsumed {
        invite_id: Uuid,
        restaurant_id: Uuid,
        employee_id: Uuid,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated { .. } => "order_created",
            DomainEvent::OrderStatusChanged { .. } => "order_status_changed",
            DomainEvent::OrderCancelled { .. } => "order_cancelled",
            DomainEvent::PaymentCreated { .. } => "payment_created",
            DomainEvent::PaymentSettled { .. } => "payment_settled",
            DomainEvent::PaymentFailed { .. } => "payment_failed",
            DomainEvent::PaymentRefunded { .. } => "payment_refunded",
            DomainEvent::ShiftStarted { .. } => "shift_started",
            DomainEvent::ShiftEnded { .. } => "shift_ended",
            DomainEvent::ShiftMissed { .. } => "shift_missed",
            DomainEvent::InviteConsumed { .. } => "invite_consumed",
        }
    }

    /// The aggregate this event belongs to; events from the same aggregate
    /// are delivered in outbox sequence order.
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            DomainEvent::OrderCreated { order_id, .. }
            | DomainEvent::OrderStatusChanged { order_id, .. }
            | DomainEvent::OrderCancelled { order_id, .. } => *order_id,
            DomainEvent::PaymentCreated { payment_id, .. }
            | DomainEvent::PaymentSettled { payment_id, .. }
            | DomainEvent::PaymentFailed { payment_id, .. }
            | DomainEvent::PaymentRefunded { payment_id, .. } => *payment_id,
            DomainEvent::ShiftStarted { shift_id, .. }
            | DomainEvent::ShiftEnded { shift_id, .. }
            | DomainEvent::ShiftMissed { shift_id, .. } => *shift_id,
            DomainEvent::InviteConsumed { invite_id, .. } => *invite_id,
        }
    }
}

/// Append an event to the outbox. Must be called with the same connection
/// (transaction) as the business write it belongs to.
pub async fn append<C: ConnectionTrait>(conn: &C, event: &DomainEvent) -> AppResult<Uuid> {
    let event_id = Uuid::new_v4();
    let payload = serde_json::to_value(event)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    outbox::ActiveModel {
        seq: NotSet,
        event_id: Set(event_id),
        aggregate_id: Set(event.aggregate_id()),
        kind: Set(event.kind().to_string()),
        payload: Set(payload),
        created_at: NotSet,
        published_at: NotSet,
    }
    .insert(conn)
    .await?;

    Ok(event_id)
}

/// A row drained from the outbox, ready for delivery.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub seq: i64,
    pub aggregate_id: Uuid,
    pub event: DomainEvent,
}

impl EventEnvelope {
    pub fn from_row(row: outbox::Model) -> AppResult<Self> {
        let event: DomainEvent = serde_json::from_value(row.payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;
        Ok(Self {
            event_id: row.event_id,
            seq: row.seq,
            aggregate_id: row.aggregate_id,
            event,
        })
    }
}

/// Outbox consumers. Delivery is at-least-once; implementations must be
/// idempotent keyed by `envelope.event_id`.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()>;
}

/// Notification fan-out consumer. The core emits and forgets; this stub is
/// where push channels (bot messages, kitchen displays) hook in.
pub struct NotificationFanout;

#[async_trait]
impl EventSubscriber for NotificationFanout {
    fn name(&self) -> &'static str {
        "notification_fanout"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        tracing::info!(
            event_id = %envelope.event_id,
            kind = envelope.event.kind(),
            aggregate_id = %envelope.aggregate_id,
            "notification dispatched"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payloads_round_trip_through_json() {
        let order_id = Uuid::new_v4();
        let event = DomainEvent::OrderStatusChanged {
            order_id,
            from: OrderStatus::Pending,
            to: OrderStatus::Preparing,
            estimated_minutes: Some(15),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "order_status_changed");
        let back: DomainEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn aggregate_id_follows_the_owning_aggregate() {
        let payment_id = Uuid::new_v4();
        let event = DomainEvent::PaymentSettled {
            payment_id,
            order_id: Uuid::new_v4(),
            amount_minor: 1500,
        };
        assert_eq!(event.aggregate_id(), payment_id);
        assert_eq!(event.kind(), "payment_settled");
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
};
use uuid::Uuid;

use crate::{
    entity::outbox,
    events::{EventEnvelope, EventSubscriber},
    state::AppState,
    tasks::TickHandler,
};

const LEASE_NAME: &str = "outbox_dispatcher";
const LEASE_TTL_SECS: i64 = 30;
const BATCH_SIZE: u64 = 100;

/// Drains the outbox in commit (`seq`) order and delivers each event to all
/// subscribers with at-least-once semantics. A singleton lease keeps at most
/// one dispatcher active across replicas.
pub struct OutboxDispatcher {
    state: AppState,
    holder: Uuid,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl OutboxDispatcher {
    pub fn new(state: AppState, subscribers: Vec<Arc<dyn EventSubscriber>>) -> Self {
        Self {
            state,
            holder: Uuid::new_v4(),
            subscribers,
        }
    }

    /// Acquire or renew the dispatcher lease. The conditional upsert only
    /// succeeds for the current holder or after the previous lease expired.
    async fn acquire_lease(&self) -> anyhow::Result<bool> {
        let expires_at = Utc::now() + chrono::Duration::seconds(LEASE_TTL_SECS);
        let backend = self.state.orm.get_database_backend();
        let result = self
            .state
            .orm
            .execute(Statement::from_sql_and_values(
                backend,
                r#"INSERT INTO leases (name, holder, expires_at)
                   VALUES ($1, $2, $3)
                   ON CONFLICT (name) DO UPDATE
                   SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
                   WHERE leases.holder = EXCLUDED.holder OR leases.expires_at < now()"#,
                [
                    LEASE_NAME.into(),
                    self.holder.into(),
                    expires_at.into(),
                ],
            ))
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl TickHandler for OutboxDispatcher {
    fn name(&self) -> &'static str {
        "outbox_dispatcher"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn tick(&self) -> anyhow::Result<()> {
        if !self.acquire_lease().await? {
            return Ok(());
        }

        let rows = outbox::Entity::find()
            .filter(outbox::Column::PublishedAt.is_null())
            .order_by_asc(outbox::Column::Seq)
            .limit(BATCH_SIZE)
            .all(&self.state.orm)
            .await?;

        for row in rows {
            let envelope = EventEnvelope::from_row(row)?;

            for subscriber in &self.subscribers {
                if let Err(err) = subscriber.handle(&envelope).await {
                    // Stop the batch so per-aggregate ordering is preserved;
                    // the row stays unpublished and is retried next tick.
                    tracing::warn!(
                        subscriber = subscriber.name(),
                        event_id = %envelope.event_id,
                        error = %err,
                        "event delivery failed, will retry"
                    );
                    return Ok(());
                }
            }

            outbox::Entity::update_many()
                .col_expr(
                    outbox::Column::PublishedAt,
                    Expr::value(Utc::now()),
                )
                .filter(outbox::Column::Seq.eq(envelope.seq))
                .exec(&self.state.orm)
                .await?;
        }

        Ok(())
    }
}

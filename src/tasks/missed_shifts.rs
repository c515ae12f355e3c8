use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::{
    db,
    entity::shifts,
    events::{self, DomainEvent},
    models::ShiftStatus,
    state::AppState,
    tasks::TickHandler,
};

const GRACE_MINUTES: i64 = 15;

/// Marks Scheduled shifts whose start has passed the grace window with no
/// clock-in as no-shows and emits `ShiftMissed` for each.
pub struct MissedShiftSweeper {
    state: AppState,
}

impl MissedShiftSweeper {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl TickHandler for MissedShiftSweeper {
    fn name(&self) -> &'static str {
        "missed_shift_sweeper"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let cutoff = Utc::now() - chrono::Duration::minutes(GRACE_MINUTES);

        let stale = shifts::Entity::find()
            .filter(shifts::Column::Status.eq(ShiftStatus::Scheduled.as_str()))
            .filter(shifts::Column::ScheduledStart.lt(cutoff))
            .filter(shifts::Column::ActualStart.is_null())
            .all(&self.state.orm)
            .await?;

        if stale.is_empty() {
            return Ok(());
        }

        tracing::info!(count = stale.len(), "sweeping missed shifts");

        for shift in stale {
            let shift_id = shift.id;
            let employee_id = shift.employee_id;
            let result = db::serializable(&self.state.orm, move |txn| {
                Box::pin(async move {
                    // Re-check inside the transaction; a concurrent clock-in
                    // may have activated the shift since the scan.
                    let Some(current) = shifts::Entity::find_by_id(shift_id).one(txn).await? else {
                        return Ok(());
                    };
                    if current.status != ShiftStatus::Scheduled.as_str()
                        || current.actual_start.is_some()
                    {
                        return Ok(());
                    }

                    let mut active: shifts::ActiveModel = current.into();
                    active.status = Set(ShiftStatus::Cancelled.as_str().to_string());
                    active.notes = Set(Some("no-show".to_string()));
                    active.update(txn).await?;

                    events::append(
                        txn,
                        &DomainEvent::ShiftMissed {
                            shift_id,
                            employee_id,
                        },
                    )
                    .await?;

                    Ok(())
                })
            })
            .await;

            if let Err(err) = result {
                tracing::error!(shift_id = %shift_id, error = %err, "failed to sweep shift");
            }
        }

        Ok(())
    }
}

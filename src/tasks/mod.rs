pub mod missed_shifts;
pub mod outbox_dispatcher;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{middleware::rate_limit::RateLimiter, state::AppState};

/// A periodic job driven by the shared ticker. Handlers must be idempotent;
/// a failed tick is logged and retried on the next due tick.
#[async_trait]
pub trait TickHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn interval(&self) -> Duration;
    async fn tick(&self) -> anyhow::Result<()>;
}

/// Single wall-clock ticker that drives all background work: outbox
/// dispatch, missed-shift sweeping, rate-limit window cleanup.
pub struct Ticker {
    handlers: Vec<Arc<dyn TickHandler>>,
    shutdown: CancellationToken,
}

impl Ticker {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            handlers: Vec::new(),
            shutdown,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn TickHandler>) {
        self.handlers.push(handler);
    }

    pub async fn run(self) {
        tracing::info!(handlers = self.handlers.len(), "background ticker started");
        let mut last_run: Vec<Option<Instant>> = vec![None; self.handlers.len()];
        let mut clock = tokio::time::interval(Duration::from_millis(500));
        clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = clock.tick() => {
                    for (idx, handler) in self.handlers.iter().enumerate() {
                        let due = last_run[idx]
                            .map(|t| t.elapsed() >= handler.interval())
                            .unwrap_or(true);
                        if !due {
                            continue;
                        }
                        last_run[idx] = Some(Instant::now());
                        if let Err(err) = handler.tick().await {
                            tracing::error!(handler = handler.name(), error = %err, "tick failed");
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("background ticker received shutdown signal");
                    return;
                }
            }
        }
    }
}

/// Evicts stale rate-limit windows.
pub struct RateLimiterCleanup {
    limiter: RateLimiter,
}

impl RateLimiterCleanup {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl TickHandler for RateLimiterCleanup {
    fn name(&self) -> &'static str {
        "rate_limiter_cleanup"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(300)
    }

    async fn tick(&self) -> anyhow::Result<()> {
        self.limiter.cleanup();
        Ok(())
    }
}

/// Wire up the standard background jobs and spawn the ticker.
pub fn spawn_background_tasks(
    state: AppState,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut ticker = Ticker::new(shutdown);
    ticker.register(Arc::new(outbox_dispatcher::OutboxDispatcher::new(
        state.clone(),
        vec![Arc::new(crate::events::NotificationFanout)],
    )));
    ticker.register(Arc::new(missed_shifts::MissedShiftSweeper::new(
        state.clone(),
    )));
    ticker.register(Arc::new(RateLimiterCleanup::new(state.rate_limiter.clone())));

    tokio::spawn(ticker.run())
}

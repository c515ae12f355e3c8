use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, middleware::rate_limit::RateLimiter, providers::ProviderRegistry};

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub providers: Arc<ProviderRegistry>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(orm: DatabaseConnection, config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let providers = Arc::new(ProviderRegistry::from_config(&config)?);
        let rate_limiter = RateLimiter::new(config.rate_limit_per_minute);
        Ok(Self {
            orm,
            config,
            providers,
            rate_limiter,
        })
    }
}

pub mod psp_a;
pub mod psp_b;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::{config::AppConfig, error::AppResult, models::PaymentMethod};

pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything an adapter needs to open a charge. Durable state lives on the
/// payment row; adapters are stateless.
#[derive(Debug, Clone)]
pub struct PaymentDraft {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub return_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub provider_ref: String,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    ChargeSucceeded,
    ChargeFailed,
    RefundSucceeded,
}

/// A provider webhook after signature verification.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_id: String,
    pub kind: WebhookEventKind,
    pub provider_ref: String,
    pub amount_minor: Option<i64>,
    pub reason: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Path segment used on the webhook endpoint.
    fn slug(&self) -> &'static str;

    fn method(&self) -> PaymentMethod;

    async fn create_charge(&self, draft: &PaymentDraft) -> AppResult<ChargeOutcome>;

    async fn refund(
        &self,
        provider_ref: &str,
        amount_minor: i64,
        reason: &str,
    ) -> AppResult<RefundOutcome>;

    /// Verify raw webhook bytes against provider headers and decode the
    /// event. Signature mismatch is `InvalidWebhookSignature`.
    fn verify_webhook(&self, raw: &[u8], headers: &HeaderMap) -> AppResult<WebhookEvent>;
}

/// Card providers keyed by webhook slug. Cash and terminal payments settle
/// synchronously and never reach an adapter.
pub struct ProviderRegistry {
    by_slug: HashMap<&'static str, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()?;

        let mut by_slug: HashMap<&'static str, Arc<dyn PaymentProvider>> = HashMap::new();
        let psp_a = Arc::new(psp_a::PspA::new(http.clone(), config.psp_a_secret.clone()));
        let psp_b = Arc::new(psp_b::PspB::new(
            http,
            config.psp_b_shop_id.clone(),
            config.psp_b_secret.clone(),
        ));
        by_slug.insert(psp_a.slug(), psp_a);
        by_slug.insert(psp_b.slug(), psp_b);

        Ok(Self { by_slug })
    }

    pub fn by_slug(&self, slug: &str) -> Option<Arc<dyn PaymentProvider>> {
        self.by_slug.get(slug).cloned()
    }

    pub fn for_method(&self, method: PaymentMethod) -> Option<Arc<dyn PaymentProvider>> {
        self.by_slug
            .values()
            .find(|p| p.method() == method)
            .cloned()
    }
}

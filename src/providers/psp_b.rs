use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::PaymentMethod,
    providers::{ChargeOutcome, PaymentDraft, PaymentProvider, RefundOutcome, WebhookEvent,
        WebhookEventKind},
};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-psp-b-signature";
const DEFAULT_BASE_URL: &str = "https://api.psp-b.example";

/// Card PSP B: shop-scoped REST API with Basic auth, idempotence keys on
/// charge creation and HMAC-signed webhooks.
pub struct PspB {
    http: reqwest::Client,
    shop_id: String,
    secret: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    confirmation_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    id: String,
    event: String,
    provider_ref: String,
    amount_minor: Option<i64>,
    reason: Option<String>,
}

impl PspB {
    pub fn new(http: reqwest::Client, shop_id: String, secret: String) -> Self {
        Self {
            http,
            shop_id,
            secret,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[async_trait]
impl PaymentProvider for PspB {
    fn slug(&self) -> &'static str {
        "psp-b"
    }

    fn method(&self) -> PaymentMethod {
        PaymentMethod::CardPspB
    }

    async fn create_charge(&self, draft: &PaymentDraft) -> AppResult<ChargeOutcome> {
        let body = serde_json::json!({
            "amount": { "value": draft.amount_minor, "currency": draft.currency },
            "description": draft.description,
            "metadata": { "payment_id": draft.payment_id, "order_id": draft.order_id },
            "confirmation": { "type": "redirect", "return_url": draft.return_url },
        });

        let response = self
            .http
            .post(format!("{}/v3/payments", self.base_url))
            .basic_auth(&self.shop_id, Some(&self.secret))
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("psp-b: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "psp-b returned {}",
                response.status()
            )));
        }

        let payment: PaymentResponse = response
            .json()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("psp-b: {e}")))?;

        Ok(ChargeOutcome {
            provider_ref: payment.id,
            redirect_url: payment.confirmation_url,
        })
    }

    async fn refund(
        &self,
        provider_ref: &str,
        amount_minor: i64,
        reason: &str,
    ) -> AppResult<RefundOutcome> {
        let body = serde_json::json!({
            "payment_id": provider_ref,
            "amount": { "value": amount_minor },
            "description": reason,
        });

        let response = self
            .http
            .post(format!("{}/v3/refunds", self.base_url))
            .basic_auth(&self.shop_id, Some(&self.secret))
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("psp-b: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "psp-b refund returned {}",
                response.status()
            )));
        }

        let refund: RefundResponse = response
            .json()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("psp-b: {e}")))?;

        Ok(RefundOutcome {
            refund_ref: refund.id,
        })
    }

    fn verify_webhook(&self, raw: &[u8], headers: &HeaderMap) -> AppResult<WebhookEvent> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::InvalidWebhookSignature)?;
        let signature = hex::decode(signature).map_err(|_| AppError::InvalidWebhookSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(raw);
        mac.verify_slice(&signature)
            .map_err(|_| AppError::InvalidWebhookSignature)?;

        let payload: WebhookPayload =
            serde_json::from_slice(raw).map_err(|_| AppError::InvalidWebhookSignature)?;

        let kind = match payload.event.as_str() {
            "charge.succeeded" => WebhookEventKind::ChargeSucceeded,
            "charge.failed" | "charge.canceled" => WebhookEventKind::ChargeFailed,
            "refund.succeeded" => WebhookEventKind::RefundSucceeded,
            other => {
                return Err(AppError::ValidationFailed(format!(
                    "unsupported psp-b event '{other}'"
                )));
            }
        };

        Ok(WebhookEvent {
            event_id: payload.id,
            kind,
            provider_ref: payload.provider_ref,
            amount_minor: payload.amount_minor,
            reason: payload.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn provider() -> PspB {
        PspB::new(reqwest::Client::new(), "shop-1".into(), "b-secret".into())
    }

    fn sign(raw: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(b"b-secret").unwrap();
        mac.update(raw);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn refund_event_decodes() {
        let raw = serde_json::to_vec(&serde_json::json!({
            "id": "evt_9",
            "event": "refund.succeeded",
            "provider_ref": "pay_77",
            "amount_minor": 500,
        }))
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sign(&raw)).unwrap());

        let event = provider().verify_webhook(&raw, &headers).unwrap();
        assert_eq!(event.kind, WebhookEventKind::RefundSucceeded);
        assert_eq!(event.amount_minor, Some(500));
    }

    #[test]
    fn wrong_header_name_is_rejected() {
        let raw = br#"{"id":"evt_9","event":"refund.succeeded","provider_ref":"pay_77"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-psp-a-signature",
            HeaderValue::from_str(&sign(raw)).unwrap(),
        );

        assert!(matches!(
            provider().verify_webhook(raw, &headers),
            Err(AppError::InvalidWebhookSignature)
        ));
    }
}

use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::{
    error::{AppError, AppResult},
    models::PaymentMethod,
    providers::{ChargeOutcome, PaymentDraft, PaymentProvider, RefundOutcome, WebhookEvent,
        WebhookEventKind},
};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-psp-a-signature";
const DEFAULT_BASE_URL: &str = "https://api.psp-a.example";

/// Card PSP A: payment-intent flow with a hosted redirect page and
/// HMAC-signed webhooks for settlement.
pub struct PspA {
    http: reqwest::Client,
    secret: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    provider_ref: String,
    amount_minor: Option<i64>,
    reason: Option<String>,
}

impl PspA {
    pub fn new(http: reqwest::Client, secret: String) -> Self {
        Self {
            http,
            secret,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

}

#[async_trait]
impl PaymentProvider for PspA {
    fn slug(&self) -> &'static str {
        "psp-a"
    }

    fn method(&self) -> PaymentMethod {
        PaymentMethod::CardPspA
    }

    async fn create_charge(&self, draft: &PaymentDraft) -> AppResult<ChargeOutcome> {
        let body = serde_json::json!({
            "amount": draft.amount_minor,
            "currency": draft.currency,
            "description": draft.description,
            "metadata": { "payment_id": draft.payment_id, "order_id": draft.order_id },
            "return_url": draft.return_url,
        });

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("psp-a: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "psp-a returned {}",
                response.status()
            )));
        }

        let intent: IntentResponse = response
            .json()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("psp-a: {e}")))?;

        Ok(ChargeOutcome {
            provider_ref: intent.id,
            redirect_url: intent.redirect_url,
        })
    }

    async fn refund(
        &self,
        provider_ref: &str,
        amount_minor: i64,
        reason: &str,
    ) -> AppResult<RefundOutcome> {
        let body = serde_json::json!({
            "payment_intent": provider_ref,
            "amount": amount_minor,
            "reason": reason,
        });

        let response = self
            .http
            .post(format!("{}/v1/refunds", self.base_url))
            .bearer_auth(&self.secret)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("psp-a: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "psp-a refund returned {}",
                response.status()
            )));
        }

        let refund: RefundResponse = response
            .json()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("psp-a: {e}")))?;

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

        let kind = match payload.kind.as_str() {
            "charge.succeeded" => WebhookEventKind::ChargeSucceeded,
            "charge.failed" | "charge.canceled" => WebhookEventKind::ChargeFailed,
            "refund.succeeded" => WebhookEventKind::RefundSucceeded,
            other => {
                return Err(AppError::ValidationFailed(format!(
                    "unsupported psp-a event '{other}'"
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

    fn provider() -> PspA {
        PspA::new(reqwest::Client::new(), "whsec-test".into())
    }

    fn sign_payload(secret: &str, raw: &[u8]) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(raw);
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_headers(raw: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&sign_payload("whsec-test", raw)).unwrap(),
        );
        headers
    }

    #[test]
    fn valid_signature_decodes_event() {
        let raw = serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": "charge.succeeded",
            "provider_ref": "pi_123",
            "amount_minor": 1500,
        }))
        .unwrap();

        let event = provider().verify_webhook(&raw, &signed_headers(&raw)).unwrap();
        assert_eq!(event.kind, WebhookEventKind::ChargeSucceeded);
        assert_eq!(event.provider_ref, "pi_123");
        assert_eq!(event.event_id, "evt_1");
    }

    #[test]
    fn tampered_body_is_rejected() {
        let raw = br#"{"id":"evt_1","type":"charge.succeeded","provider_ref":"pi_123"}"#;
        let headers = signed_headers(raw);
        let tampered = br#"{"id":"evt_1","type":"charge.succeeded","provider_ref":"pi_999"}"#;

        assert!(matches!(
            provider().verify_webhook(tampered, &headers),
            Err(AppError::InvalidWebhookSignature)
        ));
    }

    #[test]
    fn missing_signature_is_rejected() {
        let raw = br#"{"id":"evt_1","type":"charge.succeeded","provider_ref":"pi_123"}"#;
        assert!(matches!(
            provider().verify_webhook(raw, &HeaderMap::new()),
            Err(AppError::InvalidWebhookSignature)
        ));
    }

    #[test]
    fn canceled_maps_to_charge_failed() {
        let raw = serde_json::to_vec(&serde_json::json!({
            "id": "evt_2",
            "type": "charge.canceled",
            "provider_ref": "pi_123",
            "reason": "expired",
        }))
        .unwrap();

        let event = provider().verify_webhook(&raw, &signed_headers(&raw)).unwrap();
        assert_eq!(event.kind, WebhookEventKind::ChargeFailed);
        assert_eq!(event.reason.as_deref(), Some("expired"));
    }
}

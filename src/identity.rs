use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

const KEY_DERIVATION_TAG: &[u8] = b"SessionAuth";
const MAX_ENVELOPE_AGE_HOURS: i64 = 24;

/// Validated contents of a signed identity-provider envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEnvelope {
    pub external_user_id: String,
    pub display_name: Option<String>,
    pub issued_at: DateTime<Utc>,
}

/// Validate a signed `key=value` envelope.
///
/// The envelope is `&`-separated `key=value` pairs. The `hash` field carries
/// a hex HMAC-SHA256 over the remaining pairs sorted by key and joined with
/// `\n`, keyed by `HMAC-SHA256("SessionAuth", provider_secret)`. Signature
/// comparison is constant-time via `Mac::verify_slice`.
pub fn validate_envelope(
    raw: &str,
    provider_secret: &str,
    now: DateTime<Utc>,
) -> AppResult<IdentityEnvelope> {
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    let mut signature_hex: Option<&str> = None;

    for field in raw.split('&').filter(|f| !f.is_empty()) {
        let (key, value) = field.split_once('=').ok_or(AppError::Unauthenticated)?;
        if key == "hash" {
            signature_hex = Some(value);
        } else {
            pairs.push((key, value));
        }
    }

    let signature_hex = signature_hex.ok_or(AppError::Unauthenticated)?;
    let signature = hex::decode(signature_hex).map_err(|_| AppError::Unauthenticated)?;

    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let check_string = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut mac = HmacSha256::new_from_slice(derived_key(provider_secret).as_slice())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;
    mac.update(check_string.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| AppError::Unauthenticated)?;

    let issued_at = pairs
        .iter()
        .find(|(k, _)| *k == "issued_at")
        .and_then(|(_, v)| v.parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or(AppError::Unauthenticated)?;

    if now - issued_at > Duration::hours(MAX_ENVELOPE_AGE_HOURS) {
        return Err(AppError::Unauthenticated);
    }

    let external_user_id = pairs
        .iter()
        .find(|(k, _)| *k == "user_id")
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
        .ok_or(AppError::Unauthenticated)?;

    let display_name = pairs
        .iter()
        .find(|(k, _)| *k == "name")
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty());

    Ok(IdentityEnvelope {
        external_user_id,
        display_name,
        issued_at,
    })
}

fn derived_key(provider_secret: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(KEY_DERIVATION_TAG)
        .expect("HMAC accepts any key length");
    mac.update(provider_secret.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Sign an envelope the way the identity provider would. Used by tests and
/// local tooling.
pub fn sign_envelope(fields: &[(&str, &str)], provider_secret: &str) -> String {
    let mut sorted: Vec<(&str, &str)> = fields.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let check_string = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut mac = HmacSha256::new_from_slice(derived_key(provider_secret).as_slice())
        .expect("HMAC accepts any key length");
    mac.update(check_string.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let mut encoded = fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>();
    encoded.push(format!("hash={signature}"));
    encoded.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-provider-secret";

    fn issued_now(now: DateTime<Utc>) -> String {
        now.timestamp().to_string()
    }

    #[test]
    fn valid_envelope_round_trips() {
        let now = Utc::now();
        let issued = issued_now(now);
        let raw = sign_envelope(
            &[("user_id", "42"), ("name", "Alice"), ("issued_at", &issued)],
            SECRET,
        );

        let envelope = validate_envelope(&raw, SECRET, now).expect("valid envelope");
        assert_eq!(envelope.external_user_id, "42");
        assert_eq!(envelope.display_name.as_deref(), Some("Alice"));
    }

    #[test]
    fn tampered_field_is_rejected() {
        let now = Utc::now();
        let issued = issued_now(now);
        let raw = sign_envelope(&[("user_id", "42"), ("issued_at", &issued)], SECRET);
        let tampered = raw.replace("user_id=42", "user_id=43");

        assert!(matches!(
            validate_envelope(&tampered, SECRET, now),
            Err(AppError::Unauthenticated)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let issued = issued_now(now);
        let raw = sign_envelope(&[("user_id", "42"), ("issued_at", &issued)], SECRET);

        assert!(validate_envelope(&raw, "other-secret", now).is_err());
    }

    #[test]
    fn stale_envelope_is_rejected() {
        let now = Utc::now();
        let stale = (now - Duration::hours(25)).timestamp().to_string();
        let raw = sign_envelope(&[("user_id", "42"), ("issued_at", &stale)], SECRET);

        assert!(validate_envelope(&raw, SECRET, now).is_err());
    }

    #[test]
    fn missing_issued_at_is_rejected() {
        let now = Utc::now();
        let raw = sign_envelope(&[("user_id", "42")], SECRET);

        assert!(validate_envelope(&raw, SECRET, now).is_err());
    }

    #[test]
    fn missing_hash_is_rejected() {
        let now = Utc::now();
        assert!(validate_envelope("user_id=42&issued_at=0", SECRET, now).is_err());
    }
}

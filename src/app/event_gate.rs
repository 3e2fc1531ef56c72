//! Authenticity check for inbound completion webhooks.
//!
//! Signing follows the Standard Webhooks scheme: the sender computes
//! `base64(HMAC-SHA256(secret, "{id}.{timestamp}.{body}"))` and sends it as one
//! or more space separated `v1,<signature>` entries. Every failure collapses into
//! the same [`EventRejected`] value.

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::constants::{
    SVIX_ID_HEADER, SVIX_SIGNATURE_HEADER, SVIX_TIMESTAMP_HEADER, WEBHOOK_ID_HEADER,
    WEBHOOK_SECRET_PREFIX, WEBHOOK_SIGNATURE_HEADER, WEBHOOK_SIGNATURE_VERSION,
    WEBHOOK_TIMESTAMP_HEADER,
};
use crate::error::{EventRejected, QuickpitchError};

type HmacSha256 = Hmac<Sha256>;

/// An event whose signature and timestamp checked out. The body is still untrusted
/// business input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEvent {
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
    pub body: Vec<u8>,
}

pub struct EventGate {
    key: Vec<u8>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for EventGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventGate")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl EventGate {
    /// Accepts `whsec_<base64>` secrets or a raw shared string.
    pub fn new(secret: &str, tolerance_secs: i64) -> Result<Self, QuickpitchError> {
        let key = match secret.strip_prefix(WEBHOOK_SECRET_PREFIX) {
            Some(encoded) => STANDARD.decode(encoded).map_err(|e| {
                QuickpitchError::Config(format!("webhook secret is not valid base64: {e}"))
            })?,
            None => secret.as_bytes().to_vec(),
        };
        if key.is_empty() {
            return Err(QuickpitchError::Config("webhook secret is empty".to_string()));
        }
        Ok(Self {
            key,
            tolerance_secs: tolerance_secs.max(0),
        })
    }

    pub fn verify(&self, body: &[u8], headers: &HeaderMap) -> Result<VerifiedEvent, EventRejected> {
        self.verify_at(body, headers, Utc::now())
    }

    pub fn verify_at(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<VerifiedEvent, EventRejected> {
        let id = header(headers, WEBHOOK_ID_HEADER, SVIX_ID_HEADER).ok_or(EventRejected)?;
        let timestamp =
            header(headers, WEBHOOK_TIMESTAMP_HEADER, SVIX_TIMESTAMP_HEADER).ok_or(EventRejected)?;
        let signatures =
            header(headers, WEBHOOK_SIGNATURE_HEADER, SVIX_SIGNATURE_HEADER).ok_or(EventRejected)?;
        if id.is_empty() {
            return Err(EventRejected);
        }

        let seconds: i64 = timestamp.trim().parse().map_err(|_| EventRejected)?;
        let sent_at = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or(EventRejected)?;
        if (now - sent_at).num_seconds().abs() > self.tolerance_secs {
            return Err(EventRejected);
        }

        let matched = signatures.split_whitespace().any(|entry| {
            let Some((version, encoded)) = entry.split_once(',') else {
                return false;
            };
            if version != WEBHOOK_SIGNATURE_VERSION {
                return false;
            }
            let Ok(expected) = STANDARD.decode(encoded) else {
                return false;
            };
            match self.mac(id, timestamp, body) {
                // verify_slice compares in constant time
                Some(mac) => mac.verify_slice(&expected).is_ok(),
                None => false,
            }
        });
        if !matched {
            return Err(EventRejected);
        }

        Ok(VerifiedEvent {
            message_id: id.to_string(),
            sent_at,
            body: body.to_vec(),
        })
    }

    /// Produces a `v1,<signature>` header value, as a sender would.
    pub fn sign(&self, id: &str, timestamp: i64, body: &[u8]) -> Result<String, QuickpitchError> {
        let mac = self
            .mac(id, &timestamp.to_string(), body)
            .ok_or_else(|| QuickpitchError::internal("failed to initialize hmac"))?;
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("{WEBHOOK_SIGNATURE_VERSION},{signature}"))
    }

    fn mac(&self, id: &str, timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Some(mac)
    }
}

fn header<'a>(headers: &'a HeaderMap, primary: &str, alias: &str) -> Option<&'a str> {
    headers
        .get(primary)
        .or_else(|| headers.get(alias))
        .and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
    const BODY: &[u8] = br#"{"submissionId":"s1","objectKey":"k1.pdf"}"#;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn signed_headers(gate: &EventGate, id: &str, ts: i64, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(WEBHOOK_ID_HEADER, HeaderValue::from_str(id).unwrap());
        headers.insert(WEBHOOK_TIMESTAMP_HEADER, HeaderValue::from_str(&ts.to_string()).unwrap());
        let sig = gate.sign(id, ts, body).unwrap();
        headers.insert(WEBHOOK_SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        headers
    }

    #[test]
    fn test_accepts_valid_signature() {
        let gate = EventGate::new(SECRET, 300).unwrap();
        let ts = now().timestamp();
        let headers = signed_headers(&gate, "msg_1", ts, BODY);
        let event = gate.verify_at(BODY, &headers, now()).unwrap();
        assert_eq!(event.message_id, "msg_1");
        assert_eq!(event.body, BODY);
    }

    #[test]
    fn test_rejects_tampered_body() {
        let gate = EventGate::new(SECRET, 300).unwrap();
        let headers = signed_headers(&gate, "msg_1", now().timestamp(), BODY);
        let tampered = br#"{"submissionId":"s2","objectKey":"k1.pdf"}"#;
        assert_eq!(gate.verify_at(tampered, &headers, now()), Err(EventRejected));
    }

    #[test]
    fn test_rejects_tampered_signature() {
        let gate = EventGate::new(SECRET, 300).unwrap();
        let mut headers = signed_headers(&gate, "msg_1", now().timestamp(), BODY);
        headers.insert(
            WEBHOOK_SIGNATURE_HEADER,
            HeaderValue::from_static("v1,AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
        );
        assert_eq!(gate.verify_at(BODY, &headers, now()), Err(EventRejected));
    }

    #[test]
    fn test_rejects_stale_and_future_timestamps() {
        let gate = EventGate::new(SECRET, 300).unwrap();
        let stale = signed_headers(&gate, "msg_1", now().timestamp() - 301, BODY);
        let future = signed_headers(&gate, "msg_1", now().timestamp() + 301, BODY);
        assert_eq!(gate.verify_at(BODY, &stale, now()), Err(EventRejected));
        assert_eq!(gate.verify_at(BODY, &future, now()), Err(EventRejected));

        let edge = signed_headers(&gate, "msg_1", now().timestamp() - 300, BODY);
        assert!(gate.verify_at(BODY, &edge, now()).is_ok());
    }

    #[test]
    fn test_rejects_missing_or_malformed_headers() {
        let gate = EventGate::new(SECRET, 300).unwrap();
        let full = signed_headers(&gate, "msg_1", now().timestamp(), BODY);

        for name in [WEBHOOK_ID_HEADER, WEBHOOK_TIMESTAMP_HEADER, WEBHOOK_SIGNATURE_HEADER] {
            let mut headers = full.clone();
            headers.remove(name);
            assert_eq!(gate.verify_at(BODY, &headers, now()), Err(EventRejected));
        }

        let mut headers = full.clone();
        headers.insert(WEBHOOK_TIMESTAMP_HEADER, HeaderValue::from_static("yesterday"));
        assert_eq!(gate.verify_at(BODY, &headers, now()), Err(EventRejected));
    }

    #[test]
    fn test_rejects_other_secret() {
        let sender = EventGate::new("some-other-secret", 300).unwrap();
        let gate = EventGate::new(SECRET, 300).unwrap();
        let headers = signed_headers(&sender, "msg_1", now().timestamp(), BODY);
        assert_eq!(gate.verify_at(BODY, &headers, now()), Err(EventRejected));
    }

    #[test]
    fn test_accepts_any_matching_entry_and_svix_headers() {
        let gate = EventGate::new(SECRET, 300).unwrap();
        let ts = now().timestamp();
        let good = gate.sign("msg_9", ts, BODY).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(SVIX_ID_HEADER, HeaderValue::from_static("msg_9"));
        headers.insert(SVIX_TIMESTAMP_HEADER, HeaderValue::from_str(&ts.to_string()).unwrap());
        headers.insert(
            SVIX_SIGNATURE_HEADER,
            HeaderValue::from_str(&format!("v0,bogus v1,not-base64!! {good}")).unwrap(),
        );
        assert!(gate.verify_at(BODY, &headers, now()).is_ok());
    }

    #[test]
    fn test_secret_parsing() {
        assert!(EventGate::new("whsec_!!!", 300).is_err());
        assert!(EventGate::new("", 300).is_err());
        assert!(EventGate::new("plain-shared-secret", 300).is_ok());
    }
}

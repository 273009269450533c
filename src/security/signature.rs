//! Request signature verification (HMAC-SHA256 over timestamp + body).
//!
//! Two header schemes are accepted:
//! - Slack: `X-Slack-Signature: v0=<hex>` over `v0:{timestamp}:{body}`,
//!   timestamp in `X-Slack-Request-Timestamp`.
//! - Generic webhook signer: `X-Signature: sha256=<hex>` over
//!   `{timestamp}.{body}`, timestamp in `X-Signature-Timestamp`.
//!
//! The timestamp window is checked before the MAC, so a replayed request is
//! rejected without touching the secret.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::config::Secret;
use crate::handler::InboundRequest;

type HmacSha256 = Hmac<Sha256>;

pub const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
pub const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-signature";
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "x-signature-timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature or timestamp header is missing")]
    Missing,

    #[error("signature does not match")]
    Mismatch,

    #[error("request timestamp is outside the allowed window")]
    StaleTimestamp,
}

/// Header layout that produced a valid signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    Slack,
    Webhook,
}

impl SignatureScheme {
    fn headers(self) -> (&'static str, &'static str) {
        match self {
            Self::Slack => (SLACK_SIGNATURE_HEADER, SLACK_TIMESTAMP_HEADER),
            Self::Webhook => (WEBHOOK_SIGNATURE_HEADER, WEBHOOK_TIMESTAMP_HEADER),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Slack => "v0=",
            Self::Webhook => "sha256=",
        }
    }

    fn feed(self, mac: &mut HmacSha256, timestamp: &str, body: &[u8]) {
        match self {
            Self::Slack => {
                mac.update(b"v0:");
                mac.update(timestamp.as_bytes());
                mac.update(b":");
            }
            Self::Webhook => {
                mac.update(timestamp.as_bytes());
                mac.update(b".");
            }
        }
        mac.update(body);
    }
}

/// An [`InboundRequest`] whose signature has been checked.
///
/// Only [`SignatureVerifier::verify`] constructs one.
#[derive(Debug, Clone)]
pub struct VerifiedRequest {
    request: InboundRequest,
    timestamp: i64,
    scheme: SignatureScheme,
}

impl VerifiedRequest {
    pub fn request(&self) -> &InboundRequest {
        &self.request
    }

    pub fn body(&self) -> &[u8] {
        &self.request.body
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }
}

/// Verifies signed requests against one shared signing secret.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Secret,
    skew: Duration,
}

impl SignatureVerifier {
    pub fn new(secret: Secret, skew: Duration) -> Self {
        Self { secret, skew }
    }

    /// Verify `request` at wall-clock time `now` (unix seconds).
    pub fn verify(
        &self,
        request: InboundRequest,
        now: i64,
    ) -> Result<VerifiedRequest, SignatureError> {
        let scheme = if request.header(SLACK_SIGNATURE_HEADER).is_some() {
            SignatureScheme::Slack
        } else if request.header(WEBHOOK_SIGNATURE_HEADER).is_some() {
            SignatureScheme::Webhook
        } else {
            return Err(SignatureError::Missing);
        };
        let (signature_header, timestamp_header) = scheme.headers();

        let signature = request
            .header(signature_header)
            .ok_or(SignatureError::Missing)?;
        let raw_timestamp = request
            .header(timestamp_header)
            .map(str::trim)
            .filter(|ts| !ts.is_empty())
            .ok_or(SignatureError::Missing)?;
        let timestamp: i64 = raw_timestamp
            .parse()
            .map_err(|_| SignatureError::Mismatch)?;

        if now.abs_diff(timestamp) > self.skew.as_secs() {
            return Err(SignatureError::StaleTimestamp);
        }

        if !self.signature_matches(scheme, raw_timestamp, &request.body, signature) {
            return Err(SignatureError::Mismatch);
        }

        Ok(VerifiedRequest {
            request,
            timestamp,
            scheme,
        })
    }

    fn signature_matches(
        &self,
        scheme: SignatureScheme,
        timestamp: &str,
        body: &[u8],
        signature: &str,
    ) -> bool {
        let Some(hex_sig) = signature.trim().strip_prefix(scheme.prefix()) else {
            return false;
        };
        let Ok(expected) = hex::decode(hex_sig) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.expose().as_bytes()) else {
            return false;
        };
        scheme.feed(&mut mac, timestamp, body);

        // Constant-time comparison
        mac.verify_slice(&expected).is_ok()
    }
}

/// Produce the header value a signer would send. Used by tests and by
/// operators replaying requests against a local gateway.
pub fn sign(secret: &str, scheme: SignatureScheme, timestamp: i64, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => return String::new(),
    };
    scheme.feed(&mut mac, &timestamp.to_string(), body);
    format!(
        "{}{}",
        scheme.prefix(),
        hex::encode(mac.finalize().into_bytes())
    )
}

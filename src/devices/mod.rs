//! Device back-ends reached over the network.
//!
//! Every back-end implements [`DeviceClient`] and reports failures as a
//! [`DeviceFailure`] kind. Retrying and deadlines belong to the handler;
//! a client makes exactly one attempt per call.

pub mod ifttt;
pub mod remo;
pub mod router;

#[cfg(feature = "compute-ec2")]
pub mod ec2;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::commands::Command;

pub use ifttt::IftttClient;
pub use remo::RemoClient;
pub use router::DeviceRouter;

#[cfg(feature = "compute-ec2")]
pub use ec2::Ec2Client;

/// Why a device call did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceFailure {
    #[error("device call timed out")]
    Timeout,

    #[error("device API rejected the credentials")]
    AuthRejected,

    #[error("device API is unreachable")]
    Unreachable,

    #[error("device API returned an unexpected response")]
    MalformedResponse,

    #[error("target is not allowed or not configured")]
    TargetRejected,
}

impl DeviceFailure {
    /// Transient failures that may succeed on another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::Unreachable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::AuthRejected => "auth_rejected",
            Self::Unreachable => "unreachable",
            Self::MalformedResponse => "malformed_response",
            Self::TargetRejected => "target_rejected",
        }
    }
}

/// Sensor and state snapshot of one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceReading {
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub illuminance: Option<f64>,
    /// Lifecycle state for compute instances (`running`, `stopped`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceOutcome {
    pub summary: String,
    pub readings: Vec<DeviceReading>,
    /// The device was already in the requested state.
    pub no_op: bool,
}

impl DeviceOutcome {
    pub fn done(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    pub fn unchanged(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            no_op: true,
            ..Self::default()
        }
    }

    /// First reported room temperature, if any device has one.
    pub fn temperature(&self) -> Option<f64> {
        self.readings.iter().find_map(|reading| reading.temperature)
    }
}

pub type DeviceActionResult = Result<DeviceOutcome, DeviceFailure>;

/// A network-reachable device back-end.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Back-end name used in logs.
    fn name(&self) -> &str;

    /// Perform one attempt of `command`.
    async fn execute(&self, command: &Command) -> DeviceActionResult;
}

/// Shared HTTP client for the device and chat APIs.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()?)
}

/// Map a non-success HTTP status to a failure kind.
pub(crate) fn classify_status(status: StatusCode) -> DeviceFailure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DeviceFailure::AuthRejected,
        StatusCode::NOT_FOUND | StatusCode::TOO_MANY_REQUESTS => DeviceFailure::Unreachable,
        s if s.is_server_error() => DeviceFailure::Unreachable,
        _ => DeviceFailure::MalformedResponse,
    }
}

/// Map a transport error to a failure kind and log it.
///
/// The URL is stripped before logging: some back-ends carry the key in the path.
pub(crate) fn classify_transport(backend: &str, err: reqwest::Error) -> DeviceFailure {
    let failure = if err.is_timeout() {
        DeviceFailure::Timeout
    } else if err.is_decode() {
        DeviceFailure::MalformedResponse
    } else if let Some(status) = err.status() {
        classify_status(status)
    } else {
        DeviceFailure::Unreachable
    };
    let err = err.without_url();
    tracing::warn!(backend, failure = failure.as_str(), error = %err, "device request failed");
    failure
}

/// Check the response status, logging and classifying failures.
pub(crate) fn check_status(
    backend: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, DeviceFailure> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let failure = classify_status(status);
    tracing::warn!(backend, %status, failure = failure.as_str(), "device API returned an error status");
    Err(failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), DeviceFailure::AuthRejected);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), DeviceFailure::AuthRejected);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), DeviceFailure::Unreachable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), DeviceFailure::Unreachable);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), DeviceFailure::Unreachable);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE), DeviceFailure::Unreachable);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), DeviceFailure::MalformedResponse);
        assert_eq!(classify_status(StatusCode::CONFLICT), DeviceFailure::MalformedResponse);
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(DeviceFailure::Timeout.is_retryable());
        assert!(DeviceFailure::Unreachable.is_retryable());
        assert!(!DeviceFailure::AuthRejected.is_retryable());
        assert!(!DeviceFailure::MalformedResponse.is_retryable());
        assert!(!DeviceFailure::TargetRejected.is_retryable());
    }

    #[test]
    fn outcome_temperature_skips_devices_without_sensor() {
        let outcome = DeviceOutcome {
            summary: "2 devices".into(),
            readings: vec![
                DeviceReading {
                    device: "hub".into(),
                    ..DeviceReading::default()
                },
                DeviceReading {
                    device: "living".into(),
                    temperature: Some(24.5),
                    ..DeviceReading::default()
                },
            ],
            no_op: false,
        };
        assert_eq!(outcome.temperature(), Some(24.5));
    }

    #[tokio::test]
    async fn connection_refused_is_unreachable() {
        let client = http_client(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let err = client.get("http://127.0.0.1:9/").send().await.unwrap_err();
        assert_eq!(classify_transport("test", err), DeviceFailure::Unreachable);
    }
}

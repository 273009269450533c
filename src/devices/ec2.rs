//! EC2 instance start/stop for one configured instance.
//!
//! Only `StartInstances`, `StopInstances` and `DescribeInstances` are called,
//! and only for the configured instance id.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::config::http::HttpResponse;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::InstanceStateName;

use super::{DeviceActionResult, DeviceClient, DeviceFailure, DeviceOutcome, DeviceReading};
use crate::commands::{Command, DeviceKind};
use crate::config::ComputeConfig;

/// Error code returned when the instance is already transitioning or in the target state.
const INCORRECT_INSTANCE_STATE: &str = "IncorrectInstanceState";

pub struct Ec2Client {
    client: aws_sdk_ec2::Client,
    instance_id: String,
}

enum Failure {
    AlreadyInState,
    Failed(DeviceFailure),
}

impl Ec2Client {
    pub fn new(client: aws_sdk_ec2::Client, instance_id: impl Into<String>) -> Self {
        Self {
            client,
            instance_id: instance_id.into(),
        }
    }

    /// Build from the ambient AWS credentials of the function role.
    pub async fn from_env(config: &ComputeConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::new(aws_sdk_ec2::Client::new(&shared), config.instance_id.clone())
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn start(&self) -> DeviceActionResult {
        match self
            .client
            .start_instances()
            .instance_ids(&self.instance_id)
            .send()
            .await
        {
            Ok(output) => {
                let already_running = output.starting_instances().iter().any(|change| {
                    change.previous_state().and_then(|s| s.name())
                        == Some(&InstanceStateName::Running)
                });
                Ok(outcome("instance starting", already_running))
            }
            Err(err) => match classify(&err) {
                Failure::AlreadyInState => Ok(outcome("instance already starting", true)),
                Failure::Failed(failure) => Err(failure),
            },
        }
    }

    async fn stop(&self) -> DeviceActionResult {
        match self
            .client
            .stop_instances()
            .instance_ids(&self.instance_id)
            .send()
            .await
        {
            Ok(output) => {
                let already_stopped = output.stopping_instances().iter().any(|change| {
                    change.previous_state().and_then(|s| s.name())
                        == Some(&InstanceStateName::Stopped)
                });
                Ok(outcome("instance stopping", already_stopped))
            }
            Err(err) => match classify(&err) {
                Failure::AlreadyInState => Ok(outcome("instance already stopped", true)),
                Failure::Failed(failure) => Err(failure),
            },
        }
    }

    async fn describe(&self) -> Result<Vec<DeviceReading>, DeviceFailure> {
        let output = self
            .client
            .describe_instances()
            .instance_ids(&self.instance_id)
            .send()
            .await
            .map_err(|err| match classify(&err) {
                Failure::AlreadyInState => DeviceFailure::MalformedResponse,
                Failure::Failed(failure) => failure,
            })?;

        Ok(output
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .map(|instance| DeviceReading {
                device: instance
                    .instance_id()
                    .unwrap_or(self.instance_id.as_str())
                    .to_owned(),
                state: instance
                    .state()
                    .and_then(|state| state.name())
                    .map(|name| name.as_str().to_owned()),
                ..DeviceReading::default()
            })
            .collect())
    }
}

fn outcome(summary: &str, no_op: bool) -> DeviceOutcome {
    if no_op {
        DeviceOutcome::unchanged(summary)
    } else {
        DeviceOutcome::done(summary)
    }
}

fn classify<E>(err: &SdkError<E, HttpResponse>) -> Failure
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let failure = match err {
        SdkError::TimeoutError(_) => DeviceFailure::Timeout,
        SdkError::DispatchFailure(dispatch) if dispatch.is_timeout() => DeviceFailure::Timeout,
        SdkError::DispatchFailure(_) => DeviceFailure::Unreachable,
        SdkError::ResponseError(_) => DeviceFailure::MalformedResponse,
        SdkError::ServiceError(service) => {
            let code = service.err().code().unwrap_or_default();
            if code == INCORRECT_INSTANCE_STATE {
                return Failure::AlreadyInState;
            }
            match (code, service.raw().status().as_u16()) {
                ("UnauthorizedOperation" | "AuthFailure", _) => DeviceFailure::AuthRejected,
                (_, 401 | 403) => DeviceFailure::AuthRejected,
                (_, 404 | 429) => DeviceFailure::Unreachable,
                (_, status) if status >= 500 => DeviceFailure::Unreachable,
                _ => DeviceFailure::MalformedResponse,
            }
        }
        _ => DeviceFailure::Unreachable,
    };
    tracing::warn!(backend = "ec2", failure = failure.as_str(), error = %err, "ec2 request failed");
    Failure::Failed(failure)
}

#[async_trait]
impl DeviceClient for Ec2Client {
    fn name(&self) -> &str {
        "ec2"
    }

    async fn execute(&self, command: &Command) -> DeviceActionResult {
        match command {
            Command::PowerOn { target, .. } if target.kind == DeviceKind::Instance => {
                self.start().await
            }
            Command::PowerOff { target } if target.kind == DeviceKind::Instance => {
                self.stop().await
            }
            Command::ListDevices => {
                let readings = self.describe().await?;
                Ok(DeviceOutcome {
                    summary: format!("{} instances", readings.len()),
                    readings,
                    no_op: false,
                })
            }
            other => {
                tracing::warn!(command = other.name(), "command not supported by ec2");
                Err(DeviceFailure::TargetRejected)
            }
        }
    }
}

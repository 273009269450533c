//! IFTTT maker-webhook trigger, used for the bath heater.

use async_trait::async_trait;

use super::{check_status, classify_transport, DeviceActionResult, DeviceClient, DeviceFailure, DeviceOutcome};
use crate::commands::{Command, DeviceKind};
use crate::config::{IftttConfig, Secret};

pub struct IftttClient {
    api_key: Secret,
    event: String,
    api_base: String,
    client: reqwest::Client,
}

impl IftttClient {
    pub fn new(config: &IftttConfig, client: reqwest::Client) -> Self {
        Self {
            api_key: config.api_key.clone(),
            event: config.bath_heater_event.clone(),
            api_base: config.api_base.clone(),
            client,
        }
    }

    async fn trigger(&self) -> DeviceActionResult {
        // The key is part of the path; this URL must never be logged.
        let url = format!(
            "{}/trigger/{}/with/key/{}",
            self.api_base,
            self.event,
            self.api_key.expose()
        );

        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| classify_transport(self.name(), e))?;
        check_status(self.name(), resp)?;

        tracing::info!(event = %self.event, "maker event triggered");
        Ok(DeviceOutcome::done("bath heater on"))
    }
}

#[async_trait]
impl DeviceClient for IftttClient {
    fn name(&self) -> &str {
        "ifttt"
    }

    async fn execute(&self, command: &Command) -> DeviceActionResult {
        match command {
            Command::PowerOn { target, .. } if target.kind == DeviceKind::BathHeater => {
                self.trigger().await
            }
            other => {
                tracing::warn!(command = other.name(), "command not supported by ifttt");
                Err(DeviceFailure::TargetRejected)
            }
        }
    }
}

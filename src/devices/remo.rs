//! Nature Remo cloud API client (air-conditioner control and room sensors).

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    check_status, classify_transport, DeviceActionResult, DeviceClient, DeviceFailure,
    DeviceOutcome, DeviceReading,
};
use crate::commands::{AirconMode, Command, DeviceKind};
use crate::config::{RemoConfig, Secret};

/// `button` value that switches the air-conditioner off.
const POWER_OFF_BUTTON: &str = "power-off";

#[derive(Debug, Deserialize)]
struct RemoDevice {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    newest_events: NewestEvents,
}

#[derive(Debug, Default, Deserialize)]
struct NewestEvents {
    #[serde(default)]
    te: Option<SensorValue>,
    #[serde(default)]
    hu: Option<SensorValue>,
    #[serde(default)]
    il: Option<SensorValue>,
}

#[derive(Debug, Deserialize)]
struct SensorValue {
    val: f64,
}

impl From<RemoDevice> for DeviceReading {
    fn from(device: RemoDevice) -> Self {
        let events = device.newest_events;
        Self {
            device: if device.name.is_empty() {
                device.id
            } else {
                device.name
            },
            temperature: events.te.map(|v| v.val),
            humidity: events.hu.map(|v| v.val),
            illuminance: events.il.map(|v| v.val),
            state: None,
        }
    }
}

/// Drives one air-conditioner appliance and reads the hub sensors.
pub struct RemoClient {
    token: Secret,
    appliance_id: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl RemoClient {
    pub fn new(config: &RemoConfig, client: reqwest::Client) -> Self {
        Self {
            token: config.token.clone(),
            appliance_id: config.appliance_id.clone(),
            api_base: config.api_base.clone(),
            client,
        }
    }

    /// Configured appliance id, used by the router's allow-list.
    pub fn appliance_id(&self) -> Option<&str> {
        self.appliance_id.as_deref()
    }

    async fn update_aircon(&self, form: &[(&str, &str)], summary: &str) -> DeviceActionResult {
        let Some(appliance_id) = &self.appliance_id else {
            tracing::warn!("no air-conditioner appliance configured");
            return Err(DeviceFailure::TargetRejected);
        };
        let url = format!("{}/1/appliances/{appliance_id}/aircon_settings", self.api_base);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose())
            .form(form)
            .send()
            .await
            .map_err(|e| classify_transport(self.name(), e))?;
        check_status(self.name(), resp)?;

        tracing::info!(appliance_id = %appliance_id, "aircon settings updated");
        Ok(DeviceOutcome::done(summary))
    }

    /// Newest sensor readings of every hub on the account.
    pub async fn readings(&self) -> Result<Vec<DeviceReading>, DeviceFailure> {
        let url = format!("{}/1/devices", self.api_base);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose())
            .send()
            .await
            .map_err(|e| classify_transport(self.name(), e))?;
        let resp = check_status(self.name(), resp)?;

        let devices: Vec<RemoDevice> = resp
            .json()
            .await
            .map_err(|e| classify_transport(self.name(), e))?;
        Ok(devices.into_iter().map(DeviceReading::from).collect())
    }
}

#[async_trait]
impl DeviceClient for RemoClient {
    fn name(&self) -> &str {
        "remo"
    }

    async fn execute(&self, command: &Command) -> DeviceActionResult {
        match command {
            Command::PowerOn { target, mode } if target.kind == DeviceKind::AirConditioner => {
                let mode = mode.unwrap_or(AirconMode::Cool);
                self.update_aircon(
                    &[("operation_mode", mode.as_str())],
                    &format!("air-conditioner on ({})", mode.as_str()),
                )
                .await
            }
            Command::PowerOff { target } if target.kind == DeviceKind::AirConditioner => {
                self.update_aircon(&[("button", POWER_OFF_BUTTON)], "air-conditioner off")
                    .await
            }
            Command::ListDevices => {
                let readings = self.readings().await?;
                Ok(DeviceOutcome {
                    summary: format!("{} devices", readings.len()),
                    readings,
                    no_op: false,
                })
            }
            other => {
                tracing::warn!(command = other.name(), "command not supported by remo");
                Err(DeviceFailure::TargetRejected)
            }
        }
    }
}

//! Dispatches commands to the back-end configured for each device kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{DeviceActionResult, DeviceClient, DeviceFailure, DeviceOutcome, IftttClient, RemoClient};
use crate::commands::{Command, DeviceKind, DeviceTarget};
use crate::config::Config;

struct Route {
    /// The only id a caller may name for this kind. `None` means callers may not name one.
    allowed_id: Option<String>,
    client: Arc<dyn DeviceClient>,
}

/// Routes by target kind and enforces the id allow-list.
#[derive(Default)]
pub struct DeviceRouter {
    routes: HashMap<DeviceKind, Route>,
    /// Back-ends queried, in order, for `ListDevices`.
    inventory: Vec<Arc<dyn DeviceClient>>,
}

impl DeviceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn route(
        mut self,
        kind: DeviceKind,
        allowed_id: Option<String>,
        client: Arc<dyn DeviceClient>,
    ) -> Self {
        self.routes.insert(kind, Route { allowed_id, client });
        self
    }

    #[must_use]
    pub fn inventory(mut self, client: Arc<dyn DeviceClient>) -> Self {
        self.inventory.push(client);
        self
    }

    /// Wire every back-end that has credentials in `config`.
    pub async fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let remo = Arc::new(RemoClient::new(&config.remo, http.clone()));
        let mut router = Self::new()
            .route(
                DeviceKind::AirConditioner,
                remo.appliance_id().map(str::to_owned),
                remo.clone(),
            )
            .inventory(remo);

        if let Some(ifttt) = &config.ifttt {
            router = router.route(
                DeviceKind::BathHeater,
                None,
                Arc::new(IftttClient::new(ifttt, http)),
            );
        }

        #[cfg(feature = "compute-ec2")]
        if let Some(compute) = &config.compute {
            let ec2 = Arc::new(super::Ec2Client::from_env(compute).await);
            router = router
                .route(
                    DeviceKind::Instance,
                    Some(ec2.instance_id().to_owned()),
                    ec2.clone(),
                )
                .inventory(ec2);
        }
        #[cfg(not(feature = "compute-ec2"))]
        if config.compute.is_some() {
            tracing::warn!("INSTANCE_ID is set but compute-ec2 support is not compiled in");
        }

        router
    }

    fn resolve(&self, target: &DeviceTarget) -> Result<&Route, DeviceFailure> {
        let Some(route) = self.routes.get(&target.kind) else {
            tracing::warn!(kind = %target.kind, "no back-end configured");
            return Err(DeviceFailure::TargetRejected);
        };
        if let Some(requested) = &target.id {
            if route.allowed_id.as_deref() != Some(requested.as_str()) {
                tracing::warn!(kind = %target.kind, "requested target is not allow-listed");
                return Err(DeviceFailure::TargetRejected);
            }
        }
        Ok(route)
    }

    async fn list(&self, command: &Command) -> DeviceActionResult {
        if self.inventory.is_empty() {
            return Err(DeviceFailure::TargetRejected);
        }
        let mut readings = Vec::new();
        for client in &self.inventory {
            let outcome = client.execute(command).await?;
            readings.extend(outcome.readings);
        }
        Ok(DeviceOutcome {
            summary: format!("{} devices", readings.len()),
            readings,
            no_op: false,
        })
    }
}

#[async_trait]
impl DeviceClient for DeviceRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn execute(&self, command: &Command) -> DeviceActionResult {
        match command {
            Command::ListDevices => self.list(command).await,
            Command::PowerOn { target, .. } | Command::PowerOff { target } => {
                let route = self.resolve(target)?;
                tracing::debug!(backend = route.client.name(), command = command.name(), "dispatching");
                route.client.execute(command).await
            }
            _ => Err(DeviceFailure::TargetRejected),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::commands::AirconMode;
    use crate::devices::DeviceReading;

    struct Recorder {
        name: &'static str,
        calls: AtomicUsize,
    }

    impl Recorder {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DeviceClient for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self, _command: &Command) -> DeviceActionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DeviceOutcome {
                summary: self.name.into(),
                readings: vec![DeviceReading {
                    device: self.name.into(),
                    temperature: Some(21.0),
                    ..DeviceReading::default()
                }],
                no_op: false,
            })
        }
    }

    fn power_on(kind: DeviceKind, id: Option<&str>) -> Command {
        Command::PowerOn {
            target: DeviceTarget::new(kind).with_id(id.map(str::to_owned)),
            mode: Some(AirconMode::Cool),
        }
    }

    #[tokio::test]
    async fn dispatches_by_kind() {
        let aircon = Recorder::new("aircon");
        let heater = Recorder::new("heater");
        let router = DeviceRouter::new()
            .route(DeviceKind::AirConditioner, Some("ac-1".into()), aircon.clone())
            .route(DeviceKind::BathHeater, None, heater.clone());

        router.execute(&power_on(DeviceKind::BathHeater, None)).await.unwrap();
        assert_eq!(heater.calls.load(Ordering::SeqCst), 1);
        assert_eq!(aircon.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn allow_listed_id_passes() {
        let aircon = Recorder::new("aircon");
        let router = DeviceRouter::new().route(DeviceKind::AirConditioner, Some("ac-1".into()), aircon.clone());
        assert!(router.execute(&power_on(DeviceKind::AirConditioner, Some("ac-1"))).await.is_ok());
        assert_eq!(aircon.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn foreign_id_is_rejected_without_a_call() {
        let instance = Recorder::new("instance");
        let router = DeviceRouter::new().route(DeviceKind::Instance, Some("i-0good".into()), instance.clone());
        let command = Command::PowerOff {
            target: DeviceTarget::new(DeviceKind::Instance).with_id(Some("i-0evil".into())),
        };
        assert_eq!(router.execute(&command).await, Err(DeviceFailure::TargetRejected));
        assert_eq!(instance.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn id_for_kind_without_allow_list_is_rejected() {
        let heater = Recorder::new("heater");
        let router = DeviceRouter::new().route(DeviceKind::BathHeater, None, heater.clone());
        assert_eq!(
            router.execute(&power_on(DeviceKind::BathHeater, Some("anything"))).await,
            Err(DeviceFailure::TargetRejected)
        );
        assert_eq!(heater.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unconfigured_kind_is_rejected() {
        let router = DeviceRouter::new();
        assert_eq!(
            router.execute(&power_on(DeviceKind::Instance, None)).await,
            Err(DeviceFailure::TargetRejected)
        );
        assert_eq!(router.execute(&Command::ListDevices).await, Err(DeviceFailure::TargetRejected));
    }

    #[tokio::test]
    async fn list_merges_inventory_readings() {
        let router = DeviceRouter::new()
            .inventory(Recorder::new("remo"))
            .inventory(Recorder::new("ec2"));
        let outcome = router.execute(&Command::ListDevices).await.unwrap();
        assert_eq!(outcome.readings.len(), 2);
        assert_eq!(outcome.readings[1].device, "ec2");
        assert_eq!(outcome.summary, "2 devices");
    }

    #[tokio::test]
    async fn non_device_commands_are_rejected() {
        let router = DeviceRouter::new().inventory(Recorder::new("remo"));
        assert_eq!(router.execute(&Command::Cancel).await, Err(DeviceFailure::TargetRejected));
    }
}

//! Request orchestration: verify, parse, execute, format.
//!
//! [`Handler::handle`] always produces an [`OutboundResponse`]. It owns the
//! invocation deadline, runs each device attempt on its own task so an
//! overrunning call can be abandoned, and retries transient failures while
//! the budget allows.

pub mod request;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use crate::channels::{Notification, Notifier, SlackNotifier};
use crate::commands::{Command, CommandParser};
use crate::config::{Config, Deployment, Policy};
use crate::devices::{self, DeviceActionResult, DeviceClient, DeviceFailure, DeviceRouter};
use crate::security::SignatureVerifier;

pub use request::{InboundRequest, OutboundResponse};
pub use response::ResponseFormatter;

// ── Stage machine ───────────────────────────────────────────────────

/// Progress of one invocation. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Verifying,
    Parsing,
    Executing,
    Formatting,
    Responded,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded | Self::Failed)
    }

    /// `Failed` is reachable from any non-terminal stage; every other
    /// move must go strictly forward and may skip stages.
    pub fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next > self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid stage transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: Stage,
    pub to: Stage,
}

#[derive(Debug)]
struct StageTracker {
    stage: Stage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) -> Result<(), InvalidTransition> {
        if !self.stage.can_advance_to(next) {
            return Err(InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        tracing::debug!(from = ?self.stage, to = ?next, "stage");
        self.stage = next;
        Ok(())
    }
}

// ── Device execution ────────────────────────────────────────────────

enum Execution {
    Finished {
        result: DeviceActionResult,
        attempts: u32,
    },
    /// Not enough budget left for even the first attempt.
    BudgetExhausted,
    Panicked,
}

enum Attempt {
    Completed(DeviceActionResult),
    Panicked,
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// The webhook handler for one deployment.
pub struct Handler {
    deployment: Deployment,
    policy: Policy,
    verifier: SignatureVerifier,
    parser: CommandParser,
    formatter: ResponseFormatter,
    device: Arc<dyn DeviceClient>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Clock,
}

impl Handler {
    pub fn new(
        config: &Config,
        device: Arc<dyn DeviceClient>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            deployment: config.deployment,
            policy: config.policy.clone(),
            verifier: SignatureVerifier::new(config.signing_secret.clone(), config.policy.signature_skew),
            parser: CommandParser::from_config(config),
            formatter: ResponseFormatter::new(config),
            device,
            notifier,
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
        }
    }

    /// Wire the real back-ends and the Slack notifier from `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = devices::http_client(config.policy.device_timeout)?;
        let router = DeviceRouter::from_config(config, http.clone()).await;
        let notifier = config
            .slack
            .as_ref()
            .map(|slack| Arc::new(SlackNotifier::from_config(slack, http.clone())) as Arc<dyn Notifier>);
        Ok(Self::new(config, Arc::new(router), notifier))
    }

    /// Replace the wall clock (unix seconds) used for signature freshness.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn deployment(&self) -> Deployment {
        self.deployment
    }

    /// Decide the response for `request`. The returned notification, if
    /// any, has not been sent yet; see [`Handler::deliver`].
    ///
    /// `platform_deadline` is the time the platform will kill the
    /// invocation, relative to now.
    pub async fn handle(
        &self,
        request: InboundRequest,
        platform_deadline: Option<Duration>,
    ) -> OutboundResponse {
        let deadline = self.deadline(platform_deadline);
        let span = self.invocation_span(&request);
        self.decide(request, deadline).instrument(span).await
    }

    /// Decide the response, then send its notification before returning.
    /// The notification only gets the time left before the deadline, less
    /// the format reserve; past that it is dropped.
    pub async fn handle_and_notify(
        &self,
        request: InboundRequest,
        platform_deadline: Option<Duration>,
    ) -> OutboundResponse {
        let deadline = self.deadline(platform_deadline);
        let span = self.invocation_span(&request);
        async move {
            let mut response = self.decide(request, deadline).await;
            if let Some(notification) = response.notification.take() {
                let budget = deadline
                    .saturating_duration_since(Instant::now())
                    .saturating_sub(self.policy.format_reserve);
                self.deliver_within(notification, budget).await;
            }
            response
        }
        .instrument(span)
        .await
    }

    /// Send a notification. Failures are logged and otherwise ignored.
    pub async fn deliver(&self, notification: Option<Notification>) {
        let (Some(notification), Some(notifier)) = (notification, &self.notifier) else {
            return;
        };
        log_delivery(notifier.as_ref(), notifier.notify(&notification).await);
    }

    async fn deliver_within(&self, notification: Notification, budget: Duration) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if budget.is_zero() {
            tracing::warn!(notifier = notifier.name(), "no time left before the deadline, notification dropped");
            return;
        }
        match tokio::time::timeout(budget, notifier.notify(&notification)).await {
            Ok(result) => log_delivery(notifier.as_ref(), result),
            Err(_) => tracing::warn!(
                notifier = notifier.name(),
                budget_ms = budget.as_millis() as u64,
                "notification abandoned at the deadline"
            ),
        }
    }

    fn deadline(&self, platform_deadline: Option<Duration>) -> Instant {
        let budget = platform_deadline.map_or(self.policy.handler_deadline, |platform| {
            platform.min(self.policy.handler_deadline)
        });
        Instant::now() + budget
    }

    fn invocation_span(&self, request: &InboundRequest) -> tracing::Span {
        tracing::info_span!(
            "invocation",
            request_id = %uuid::Uuid::new_v4(),
            deployment = %self.deployment,
            method = %request.method,
        )
    }

    async fn decide(&self, request: InboundRequest, deadline: Instant) -> OutboundResponse {
        let mut tracker = StageTracker::new();
        let response = match self.run(&mut tracker, request, deadline).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "handler state machine violated");
                response::internal_error()
            }
        };
        tracing::info!(status = response.status, stage = ?tracker.stage, "responded");
        response
    }

    async fn run(
        &self,
        tracker: &mut StageTracker,
        request: InboundRequest,
        deadline: Instant,
    ) -> Result<OutboundResponse, InvalidTransition> {
        tracker.advance(Stage::Verifying)?;
        if !request.is_post() {
            tracker.advance(Stage::Failed)?;
            return Ok(response::method_not_allowed());
        }
        let verified = match self.verifier.verify(request, (self.clock)()) {
            Ok(verified) => verified,
            Err(e) => {
                tracing::warn!(reason = %e, "signature rejected");
                tracker.advance(Stage::Failed)?;
                return Ok(response::signature_rejected(e));
            }
        };

        tracker.advance(Stage::Parsing)?;
        let parsed = self.parser.parse(&verified);
        tracing::info!(command = parsed.command.name(), interactive = parsed.interaction.is_some(), "parsed");

        let result = if parsed.command.needs_device() {
            tracker.advance(Stage::Executing)?;
            match self.execute(&parsed.command, deadline).await {
                Execution::Finished { result, attempts } => {
                    match &result {
                        Ok(outcome) => tracing::info!(attempts, no_op = outcome.no_op, summary = %outcome.summary, "device call succeeded"),
                        Err(failure) => tracing::warn!(attempts, failure = failure.as_str(), "device call failed"),
                    }
                    Some(result)
                }
                Execution::BudgetExhausted => {
                    tracker.advance(Stage::Failed)?;
                    return Ok(self.formatter.failure(DeviceFailure::Timeout));
                }
                Execution::Panicked => {
                    tracker.advance(Stage::Failed)?;
                    return Ok(response::internal_error());
                }
            }
        } else {
            None
        };

        tracker.advance(Stage::Formatting)?;
        let response = self.formatter.format(&parsed, result);
        tracker.advance(if response.status < 400 {
            Stage::Responded
        } else {
            Stage::Failed
        })?;
        Ok(response)
    }

    async fn execute(&self, command: &Command, deadline: Instant) -> Execution {
        let mut attempts = 0;
        let mut last_failure = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let budget = remaining.saturating_sub(self.policy.format_reserve);
            if budget < self.policy.min_call_budget {
                tracing::warn!(
                    attempts,
                    remaining_ms = remaining.as_millis() as u64,
                    "not enough time left for a device call"
                );
                return match last_failure {
                    Some(failure) => Execution::Finished {
                        result: Err(failure),
                        attempts,
                    },
                    None => Execution::BudgetExhausted,
                };
            }

            attempts += 1;
            let timeout = budget.min(self.policy.device_timeout);
            match self.attempt(command, timeout).await {
                Attempt::Panicked => return Execution::Panicked,
                Attempt::Completed(Err(failure))
                    if failure.is_retryable() && attempts <= self.policy.device_max_retries =>
                {
                    tracing::info!(attempts, failure = failure.as_str(), "retrying device call");
                    last_failure = Some(failure);
                }
                Attempt::Completed(result) => return Execution::Finished { result, attempts },
            }
        }
    }

    /// One device call on its own task, abandoned once `timeout` elapses.
    async fn attempt(&self, command: &Command, timeout: Duration) -> Attempt {
        let device = Arc::clone(&self.device);
        let command = command.clone();
        let mut task = tokio::spawn(async move { device.execute(&command).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => Attempt::Completed(result),
            Ok(Err(e)) if e.is_panic() => {
                tracing::error!("device call panicked");
                Attempt::Panicked
            }
            Ok(Err(_)) => Attempt::Completed(Err(DeviceFailure::Timeout)),
            Err(_) => {
                task.abort();
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "device call abandoned");
                Attempt::Completed(Err(DeviceFailure::Timeout))
            }
        }
    }
}

fn log_delivery(notifier: &dyn Notifier, result: anyhow::Result<()>) {
    match result {
        Ok(()) => tracing::info!(notifier = notifier.name(), "notification sent"),
        Err(e) => tracing::warn!(notifier = notifier.name(), error = %e, "notification failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::{RemoConfig, Secret, SlackConfig, UnknownCommandPolicy};
    use crate::devices::{DeviceOutcome, DeviceReading};
    use crate::security::signature::{sign, SignatureScheme};

    const SECRET: &str = "handler-test-secret";
    const NOW: i64 = 1_700_000_000;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail(DeviceFailure),
        Hang,
        Slow(Duration),
        Panic,
        /// Already-stopped devices report success without a state change.
        Idempotent,
    }

    struct FakeDevice {
        behavior: Behavior,
        calls: AtomicUsize,
        powered: Mutex<bool>,
    }

    impl FakeDevice {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
                powered: Mutex::new(true),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeviceClient for FakeDevice {
        fn name(&self) -> &str {
            "fake"
        }

        async fn execute(&self, command: &Command) -> DeviceActionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(DeviceOutcome {
                    summary: "done".into(),
                    readings: vec![DeviceReading {
                        device: "living".into(),
                        temperature: Some(22.04),
                        ..DeviceReading::default()
                    }],
                    no_op: false,
                }),
                Behavior::Fail(failure) => Err(failure),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(DeviceOutcome::done("late"))
                }
                Behavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(DeviceOutcome::done("slow but done"))
                }
                Behavior::Panic => panic!("device exploded"),
                Behavior::Idempotent => {
                    let mut powered = self.powered.lock().unwrap();
                    let was_on = *powered;
                    if matches!(command, Command::PowerOff { .. }) {
                        *powered = false;
                    }
                    Ok(if was_on {
                        DeviceOutcome::done("stopping")
                    } else {
                        DeviceOutcome::unchanged("already stopped")
                    })
                }
            }
        }
    }

    struct FakeNotifier {
        fail: bool,
        delay: Option<Duration>,
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        fn name(&self) -> &str {
            "fake"
        }

        async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                anyhow::bail!("chat API down");
            }
            Ok(())
        }
    }

    fn config(deployment: Deployment) -> Config {
        Config {
            deployment,
            signing_secret: Secret::new(SECRET),
            remo: RemoConfig {
                token: Secret::new("t"),
                appliance_id: Some("ac-1".into()),
                api_base: "http://remo".into(),
            },
            ifttt: None,
            slack: Some(SlackConfig {
                bot_oauth: Secret::new("xoxb"),
                bot_id: "UBOT".into(),
                channel_id: "CHOME".into(),
                api_base: "http://slack".into(),
            }),
            compute: None,
            policy: Policy::default(),
        }
    }

    fn handler(config: &Config, device: Arc<FakeDevice>) -> Handler {
        Handler::new(config, device, None).with_clock(|| NOW)
    }

    fn signed(body: &str) -> InboundRequest {
        InboundRequest::new("POST", body.as_bytes().to_vec())
            .with_header("X-Signature", &sign(SECRET, SignatureScheme::Webhook, NOW, body.as_bytes()))
            .with_header("X-Signature-Timestamp", &NOW.to_string())
    }

    fn json_body(response: &OutboundResponse) -> serde_json::Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[test]
    fn stage_guard_is_forward_only() {
        assert!(Stage::Received.can_advance_to(Stage::Verifying));
        assert!(Stage::Parsing.can_advance_to(Stage::Formatting));
        assert!(Stage::Executing.can_advance_to(Stage::Failed));
        assert!(!Stage::Parsing.can_advance_to(Stage::Verifying));
        assert!(!Stage::Parsing.can_advance_to(Stage::Parsing));
        assert!(!Stage::Responded.can_advance_to(Stage::Failed));
        assert!(!Stage::Failed.can_advance_to(Stage::Failed));

        let mut tracker = StageTracker::new();
        tracker.advance(Stage::Verifying).unwrap();
        assert_eq!(
            tracker.advance(Stage::Received),
            Err(InvalidTransition {
                from: Stage::Verifying,
                to: Stage::Received
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_webhook_succeeds() {
        let device = FakeDevice::new(Behavior::Succeed);
        let handler = handler(&config(Deployment::AcControl), device.clone());
        let response = handler.handle(signed(r#"{"action":"on"}"#), None).await;
        assert_eq!(response.status, 200);
        assert_eq!(json_body(&response)["command"], "power_on");
        assert_eq!(device.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_power_off_is_retried_once_then_times_out() {
        let device = FakeDevice::new(Behavior::Hang);
        let handler = handler(&config(Deployment::AcControl), device.clone());
        let started = Instant::now();
        let response = handler.handle(signed(r#"{"action":"off"}"#), None).await;
        assert_eq!(response.status, 504);
        assert_eq!(device.calls(), 2);
        assert!(started.elapsed() <= Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_signature_never_reaches_device() {
        let device = FakeDevice::new(Behavior::Succeed);
        let handler = handler(&config(Deployment::AcControl), device.clone());
        let request = InboundRequest::new("POST", br#"{"action":"on"}"#.to_vec())
            .with_header("X-Signature", "sha256=00ff")
            .with_header("X-Signature-Timestamp", &NOW.to_string());
        let response = handler.handle(request, None).await;
        assert_eq!(response.status, 401);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_request_never_reaches_device() {
        let device = FakeDevice::new(Behavior::Succeed);
        let handler = Handler::new(&config(Deployment::AcControl), device.clone(), None)
            .with_clock(|| NOW + 3600);
        let response = handler.handle(signed(r#"{"action":"on"}"#), None).await;
        assert_eq!(response.status, 403);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_signature_is_rejected() {
        let device = FakeDevice::new(Behavior::Succeed);
        let handler = handler(&config(Deployment::AcControl), device.clone());
        let request = InboundRequest::new("POST", br#"{"action":"on"}"#.to_vec());
        assert_eq!(handler.handle(request, None).await.status, 401);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_post_is_rejected_before_verification() {
        let device = FakeDevice::new(Behavior::Succeed);
        let handler = handler(&config(Deployment::AcControl), device.clone());
        let request = InboundRequest::new("GET", Vec::new());
        assert_eq!(handler.handle(request, None).await.status, 405);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_command_follows_policy() {
        let device = FakeDevice::new(Behavior::Succeed);
        let mut cfg = config(Deployment::AcControl);
        let response = handler(&cfg, device.clone())
            .handle(signed(r#"{"hello":"world"}"#), None)
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(json_body(&response)["ignored"], true);

        cfg.policy.unknown_command = UnknownCommandPolicy::Reject;
        let response = handler(&cfg, device.clone())
            .handle(signed(r#"{"hello":"world"}"#), None)
            .await;
        assert_eq!(response.status, 400);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn power_off_twice_reaches_same_state() {
        let device = FakeDevice::new(Behavior::Idempotent);
        let handler = handler(&config(Deployment::AcControl), device.clone());
        let first = handler.handle(signed(r#"{"action":"off"}"#), None).await;
        let second = handler.handle(signed(r#"{"action":"off"}"#), None).await;
        assert_eq!(first.status, 200);
        assert_eq!(second.status, 200);
        assert_eq!(json_body(&second)["no_op"], true);
        assert!(!*device.powered.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn auth_rejection_is_not_retried() {
        let device = FakeDevice::new(Behavior::Fail(DeviceFailure::AuthRejected));
        let handler = handler(&config(Deployment::AcControl), device.clone());
        let response = handler.handle(signed(r#"{"action":"on"}"#), None).await;
        assert_eq!(response.status, 502);
        assert_eq!(device.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_is_retried_up_to_the_limit() {
        let device = FakeDevice::new(Behavior::Fail(DeviceFailure::Unreachable));
        let mut cfg = config(Deployment::AcControl);
        cfg.policy.device_max_retries = 2;
        let response = handler(&cfg, device.clone())
            .handle(signed(r#"{"action":"on"}"#), None)
            .await;
        assert_eq!(response.status, 502);
        assert_eq!(device.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn short_platform_deadline_skips_device_call() {
        let device = FakeDevice::new(Behavior::Succeed);
        let handler = handler(&config(Deployment::AcControl), device.clone());
        // 600ms left: 500ms reserve leaves less than the 250ms minimum.
        let response = handler
            .handle(signed(r#"{"action":"on"}"#), Some(Duration::from_millis(600)))
            .await;
        assert_eq!(response.status, 504);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn platform_deadline_caps_attempt_timeout() {
        let device = FakeDevice::new(Behavior::Hang);
        let handler = handler(&config(Deployment::AcControl), device.clone());
        let started = Instant::now();
        let response = handler
            .handle(signed(r#"{"action":"on"}"#), Some(Duration::from_secs(2)))
            .await;
        assert_eq!(response.status, 504);
        // The first attempt uses the whole 1.5s budget; nothing is left for a retry.
        assert_eq!(device.calls(), 1);
        assert!(started.elapsed() <= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_device_is_internal_error() {
        let device = FakeDevice::new(Behavior::Panic);
        let handler = handler(&config(Deployment::AcControl), device.clone());
        let response = handler.handle(signed(r#"{"action":"on"}"#), None).await;
        assert_eq!(response.status, 500);
        assert_eq!(device.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn url_verification_is_answered_without_device() {
        let device = FakeDevice::new(Behavior::Succeed);
        let handler = handler(&config(Deployment::LaborService), device.clone());
        let response = handler
            .handle(signed(r#"{"type":"url_verification","challenge":"abc123"}"#), None)
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "abc123");
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mention_posts_menu_and_failed_notification_keeps_200() {
        let device = FakeDevice::new(Behavior::Succeed);
        let notifier = Arc::new(FakeNotifier {
            fail: true,
            delay: None,
            sent: Mutex::new(Vec::new()),
        });
        let handler = Handler::new(
            &config(Deployment::LaborService),
            device.clone(),
            Some(notifier.clone()),
        )
        .with_clock(|| NOW);

        let body = serde_json::json!({
            "type": "event_callback",
            "event": { "type": "app_mention", "user": "U1", "text": "<@UBOT> hey", "channel": "CHOME" }
        })
        .to_string();
        let response = handler.handle_and_notify(signed(&body), None).await;

        assert_eq!(response.status, 200);
        assert_eq!(device.calls(), 1);
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "CHOME");
        assert_eq!(
            sent[0].message.attachments[0].text.as_deref(),
            Some("BEEP! ROOM TEMPERATURE: 22.0℃ ..MAY I HELP YOU?")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_notification_does_not_outlive_platform_deadline() {
        let device = FakeDevice::new(Behavior::Slow(Duration::from_millis(1500)));
        let notifier = Arc::new(FakeNotifier {
            fail: false,
            delay: Some(Duration::from_secs(8)),
            sent: Mutex::new(Vec::new()),
        });
        let handler = Handler::new(
            &config(Deployment::LaborService),
            device.clone(),
            Some(notifier.clone()),
        )
        .with_clock(|| NOW);

        let body = serde_json::json!({
            "type": "event_callback",
            "event": { "type": "app_mention", "user": "U1", "text": "<@UBOT> hi", "channel": "CHOME" }
        })
        .to_string();
        let platform = Duration::from_secs(3);
        let started = Instant::now();
        let response = handler.handle_and_notify(signed(&body), Some(platform)).await;

        assert_eq!(response.status, 200);
        assert!(started.elapsed() <= platform, "returned after {:?}", started.elapsed());
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}

//! Environment-backed configuration, read once per process.
//!
//! The infrastructure layer injects every value from the parameter store as
//! an environment variable. [`Config::from_env`] reads them at cold start and
//! the resulting struct is shared read-only for the lifetime of the process.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_REMO_API_BASE: &str = "https://api.nature.global";
pub const DEFAULT_IFTTT_API_BASE: &str = "https://maker.ifttt.com";
pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";
pub const DEFAULT_BATH_HEATER_EVENT: &str = "bath_heater_on";

/// Allowed clock skew for signed requests (5 minutes).
pub const DEFAULT_SIGNATURE_SKEW_SECS: u64 = 300;
/// Per-attempt budget for outbound device calls.
pub const DEFAULT_DEVICE_TIMEOUT_MS: u64 = 8_000;
/// Matches the function timeout provisioned for both stacks.
pub const DEFAULT_HANDLER_DEADLINE_MS: u64 = 10_000;
pub const DEFAULT_FORMAT_RESERVE_MS: u64 = 500;
pub const DEFAULT_MIN_CALL_BUDGET_MS: u64 = 250;
pub const DEFAULT_DEVICE_MAX_RETRIES: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// A credential that must never reach logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Arc<str>);

impl Secret {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Which of the two stacks this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// Slack button callbacks and generic webhooks driving the appliances.
    AcControl,
    /// Slack Events API: answers mentions with the room temperature menu.
    LaborService,
}

impl Deployment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AcControl => "ac-control",
            Self::LaborService => "labor-service",
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Deployment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ac-control" | "ac_control" => Ok(Self::AcControl),
            "labor-service" | "labor_service" => Ok(Self::LaborService),
            other => Err(ConfigError::Invalid {
                name: "DEPLOYMENT",
                reason: format!("unknown deployment '{other}' (expected ac-control or labor-service)"),
            }),
        }
    }
}

/// What to answer when a verified request carries no recognised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownCommandPolicy {
    /// 200 with a no-op acknowledgement.
    Acknowledge,
    /// 400.
    Reject,
}

impl FromStr for UnknownCommandPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acknowledge" | "ack" => Ok(Self::Acknowledge),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::Invalid {
                name: "UNKNOWN_COMMAND_POLICY",
                reason: format!("expected acknowledge or reject, got '{other}'"),
            }),
        }
    }
}

/// Retry, timeout and status-mapping policy for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub signature_skew: Duration,
    pub device_timeout: Duration,
    pub handler_deadline: Duration,
    /// Budget kept aside after the device call for building the response.
    pub format_reserve: Duration,
    /// Below this, a device attempt is not started at all.
    pub min_call_budget: Duration,
    /// Extra attempts after `Timeout`/`Unreachable`.
    pub device_max_retries: u32,
    pub unknown_command: UnknownCommandPolicy,
    /// 502 or 403.
    pub auth_rejected_status: u16,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            signature_skew: Duration::from_secs(DEFAULT_SIGNATURE_SKEW_SECS),
            device_timeout: Duration::from_millis(DEFAULT_DEVICE_TIMEOUT_MS),
            handler_deadline: Duration::from_millis(DEFAULT_HANDLER_DEADLINE_MS),
            format_reserve: Duration::from_millis(DEFAULT_FORMAT_RESERVE_MS),
            min_call_budget: Duration::from_millis(DEFAULT_MIN_CALL_BUDGET_MS),
            device_max_retries: DEFAULT_DEVICE_MAX_RETRIES,
            unknown_command: UnknownCommandPolicy::Acknowledge,
            auth_rejected_status: 502,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoConfig {
    pub token: Secret,
    /// Air-conditioner appliance driven by the power commands.
    pub appliance_id: Option<String>,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct IftttConfig {
    pub api_key: Secret,
    pub bath_heater_event: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_oauth: Secret,
    pub bot_id: String,
    pub channel_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct ComputeConfig {
    pub instance_id: String,
}

/// Immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub deployment: Deployment,
    pub signing_secret: Secret,
    pub remo: RemoConfig,
    pub ifttt: Option<IftttConfig>,
    pub slack: Option<SlackConfig>,
    pub compute: Option<ComputeConfig>,
    pub policy: Policy,
}

impl Config {
    /// Load from process environment variables.
    pub fn from_env(deployment: Deployment) -> Result<Self, ConfigError> {
        Self::from_lookup(deployment, |key| std::env::var(key).ok())
    }

    /// Load from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(deployment: Deployment, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let signing_secret = Secret::new(require("SIGNING_SECRETS")?);

        let remo = RemoConfig {
            token: Secret::new(require("REMO_TOKEN")?),
            appliance_id: match deployment {
                Deployment::AcControl => Some(require("APPLIANCE_ID")?),
                Deployment::LaborService => get("APPLIANCE_ID"),
            },
            api_base: trim_base(get("REMO_API_BASE").unwrap_or_else(|| DEFAULT_REMO_API_BASE.into())),
        };

        let ifttt = get("IFTTT_API_KEY").map(|api_key| IftttConfig {
            api_key: Secret::new(api_key),
            bath_heater_event: get("IFTTT_BATH_HEATER_EVENT")
                .unwrap_or_else(|| DEFAULT_BATH_HEATER_EVENT.into()),
            api_base: trim_base(
                get("IFTTT_API_BASE").unwrap_or_else(|| DEFAULT_IFTTT_API_BASE.into()),
            ),
        });

        let slack_api_base =
            trim_base(get("SLACK_API_BASE").unwrap_or_else(|| DEFAULT_SLACK_API_BASE.into()));
        let slack = match deployment {
            Deployment::LaborService => Some(SlackConfig {
                bot_oauth: Secret::new(require("BOT_OAUTH")?),
                bot_id: require("BOT_ID")?,
                channel_id: require("CHANNEL_ID")?,
                api_base: slack_api_base,
            }),
            // Optional here: with a bot token the outcome is also reported to the channel.
            Deployment::AcControl => match (get("BOT_OAUTH"), get("CHANNEL_ID")) {
                (Some(bot_oauth), Some(channel_id)) => Some(SlackConfig {
                    bot_oauth: Secret::new(bot_oauth),
                    bot_id: get("BOT_ID").unwrap_or_default(),
                    channel_id,
                    api_base: slack_api_base,
                }),
                _ => None,
            },
        };

        let compute = get("INSTANCE_ID").map(|instance_id| ComputeConfig { instance_id });

        let defaults = Policy::default();
        let policy = Policy {
            signature_skew: Duration::from_secs(parse_or(
                &get,
                "SIGNATURE_SKEW_SECS",
                DEFAULT_SIGNATURE_SKEW_SECS,
            )?),
            device_timeout: Duration::from_millis(parse_or(
                &get,
                "DEVICE_TIMEOUT_MS",
                DEFAULT_DEVICE_TIMEOUT_MS,
            )?),
            handler_deadline: Duration::from_millis(parse_or(
                &get,
                "HANDLER_DEADLINE_MS",
                DEFAULT_HANDLER_DEADLINE_MS,
            )?),
            format_reserve: Duration::from_millis(parse_or(
                &get,
                "FORMAT_RESERVE_MS",
                DEFAULT_FORMAT_RESERVE_MS,
            )?),
            min_call_budget: Duration::from_millis(parse_or(
                &get,
                "MIN_CALL_BUDGET_MS",
                DEFAULT_MIN_CALL_BUDGET_MS,
            )?),
            device_max_retries: parse_or(&get, "DEVICE_MAX_RETRIES", DEFAULT_DEVICE_MAX_RETRIES)?,
            unknown_command: match get("UNKNOWN_COMMAND_POLICY") {
                Some(raw) => raw.parse()?,
                None => defaults.unknown_command,
            },
            auth_rejected_status: match parse_or(&get, "AUTH_REJECTED_STATUS", 502_u16)? {
                status @ (403 | 502) => status,
                other => {
                    return Err(ConfigError::Invalid {
                        name: "AUTH_REJECTED_STATUS",
                        reason: format!("expected 403 or 502, got {other}"),
                    })
                }
            },
        };

        if policy.device_timeout.is_zero() || policy.handler_deadline.is_zero() {
            return Err(ConfigError::Invalid {
                name: "DEVICE_TIMEOUT_MS",
                reason: "timeouts must be greater than zero".into(),
            });
        }

        Ok(Self {
            deployment,
            signing_secret,
            remo,
            ifttt,
            slack,
            compute,
            policy,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name: key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_owned()
}

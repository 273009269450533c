//! Command parsing: turns a verified request body into a [`Command`].
//!
//! Parsing is total. Every body, including invalid UTF-8 and malformed
//! JSON, yields a command; unrecognised shapes become [`Command::Unknown`]
//! and never reach a device.

use std::fmt;

use serde::Deserialize;

use crate::channels::slack::{EventEnvelope, InteractionCallback, Message};
use crate::config::Config;
use crate::security::VerifiedRequest;

// ── Button / action identifiers ─────────────────────────────────────

pub const ACTION_AC_ON: &str = "ac_on";
pub const ACTION_HEATER_ON: &str = "heater_on";
pub const ACTION_BATH_HEATER_ON: &str = "bath_heater_on";
pub const ACTION_AC_OFF: &str = "ac_off";
pub const ACTION_CANCEL: &str = "cancel";

const MENTION_GREETINGS: &[&str] = &["hey", "hi"];

// ── Command model ───────────────────────────────────────────────────

/// Kind of device a command is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    AirConditioner,
    BathHeater,
    Instance,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AirConditioner => "air_conditioner",
            Self::BathHeater => "bath_heater",
            Self::Instance => "instance",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device selector. `id` is whatever the caller sent and is untrusted
/// until the router checks it against configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub kind: DeviceKind,
    pub id: Option<String>,
}

impl DeviceTarget {
    pub fn new(kind: DeviceKind) -> Self {
        Self { kind, id: None }
    }

    #[must_use]
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id.filter(|id| !id.trim().is_empty());
        self
    }
}

/// Air-conditioner operation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirconMode {
    Cool,
    Warm,
}

impl AirconMode {
    /// Value of the bridge's `operation_mode` form field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cool => "cool",
            Self::Warm => "warm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PowerOn {
        target: DeviceTarget,
        mode: Option<AirconMode>,
    },
    PowerOff {
        target: DeviceTarget,
    },
    ListDevices,
    /// "Never mind" from the menu. Acknowledged without any device call.
    Cancel,
    /// Events API endpoint handshake.
    UrlVerification {
        challenge: String,
    },
    Unknown {
        reason: String,
    },
}

impl Command {
    /// Stable name used in logs and generic webhook responses.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PowerOn { .. } => "power_on",
            Self::PowerOff { .. } => "power_off",
            Self::ListDevices => "list_devices",
            Self::Cancel => "cancel",
            Self::UrlVerification { .. } => "url_verification",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Whether answering this command requires a device call.
    pub fn needs_device(&self) -> bool {
        matches!(
            self,
            Self::PowerOn { .. } | Self::PowerOff { .. } | Self::ListDevices
        )
    }

    pub fn target(&self) -> Option<&DeviceTarget> {
        match self {
            Self::PowerOn { target, .. } | Self::PowerOff { target } => Some(target),
            _ => None,
        }
    }

    fn unknown(reason: impl Into<String>) -> Self {
        Self::Unknown {
            reason: reason.into(),
        }
    }

    fn power_on(kind: DeviceKind, mode: Option<AirconMode>) -> Self {
        Self::PowerOn {
            target: DeviceTarget::new(kind),
            mode,
        }
    }
}

/// Slack interactive-message context kept for the in-place reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    /// Identifier of the clicked button.
    pub action: String,
    pub original_message: Message,
    pub response_url: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub command: Command,
    /// Present only for Slack interactive callbacks.
    pub interaction: Option<Interaction>,
}

impl ParsedCommand {
    fn plain(command: Command) -> Self {
        Self {
            command,
            interaction: None,
        }
    }
}

// ── Parser ──────────────────────────────────────────────────────────

/// Generic signed-webhook body.
#[derive(Debug, Deserialize)]
struct WebhookBody {
    action: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    instance_id: Option<String>,
}

/// Maps request bodies to commands for one deployment.
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    bot_id: Option<String>,
    channel_id: Option<String>,
}

impl CommandParser {
    pub fn new(bot_id: Option<String>, channel_id: Option<String>) -> Self {
        Self {
            bot_id: bot_id.filter(|id| !id.is_empty()),
            channel_id: channel_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        match &config.slack {
            Some(slack) => Self::new(Some(slack.bot_id.clone()), Some(slack.channel_id.clone())),
            None => Self::default(),
        }
    }

    pub fn parse(&self, request: &VerifiedRequest) -> ParsedCommand {
        self.parse_body(request.body())
    }

    /// Parse a raw body. Shapes are tried in a fixed order: interactive
    /// form payload, url_verification, event_callback, generic webhook.
    pub fn parse_body(&self, body: &[u8]) -> ParsedCommand {
        let Ok(text) = std::str::from_utf8(body) else {
            return ParsedCommand::plain(Command::unknown("body is not valid UTF-8"));
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ParsedCommand::plain(Command::unknown("empty body"));
        }

        if !trimmed.starts_with('{') {
            return parse_form(trimmed);
        }

        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => return ParsedCommand::plain(Command::unknown(format!("invalid JSON: {e}"))),
        };

        match value.get("type").and_then(serde_json::Value::as_str) {
            Some("url_verification") | Some("event_callback") => {
                ParsedCommand::plain(self.parse_event(value))
            }
            _ => ParsedCommand::plain(parse_webhook(value)),
        }
    }

    fn parse_event(&self, value: serde_json::Value) -> Command {
        let envelope: EventEnvelope = match serde_json::from_value(value) {
            Ok(envelope) => envelope,
            Err(e) => return Command::unknown(format!("malformed event envelope: {e}")),
        };

        if envelope.kind == "url_verification" {
            return match envelope.challenge {
                Some(challenge) => Command::UrlVerification { challenge },
                None => Command::unknown("url_verification without challenge"),
            };
        }

        let Some(event) = envelope.event else {
            return Command::unknown("event_callback without event");
        };
        if event.kind != "app_mention" {
            return Command::unknown(format!("unsupported event type '{}'", event.kind));
        }
        let (Some(bot_id), Some(channel_id)) = (&self.bot_id, &self.channel_id) else {
            return Command::unknown("bot is not configured for events");
        };
        if !event.text.starts_with(&format!("<@{bot_id}> ")) {
            return Command::unknown("mention is not addressed to this bot");
        }
        if &event.channel != channel_id {
            return Command::unknown("mention is from another channel");
        }

        match event.text.split_whitespace().nth(1) {
            Some(word) if MENTION_GREETINGS.contains(&word) => Command::ListDevices,
            _ => Command::unknown("unsupported mention text"),
        }
    }
}

fn parse_form(body: &str) -> ParsedCommand {
    let fields: Vec<(String, String)> = match serde_urlencoded::from_str(body) {
        Ok(fields) => fields,
        Err(e) => return ParsedCommand::plain(Command::unknown(format!("invalid form body: {e}"))),
    };
    let Some((_, payload)) = fields.into_iter().find(|(key, _)| key == "payload") else {
        return ParsedCommand::plain(Command::unknown("form body without payload"));
    };
    let callback: InteractionCallback = match serde_json::from_str(&payload) {
        Ok(callback) => callback,
        Err(e) => {
            return ParsedCommand::plain(Command::unknown(format!(
                "invalid interaction payload: {e}"
            )))
        }
    };

    let Some(action) = callback
        .actions
        .first()
        .and_then(|action| action.identifier())
        .map(str::to_owned)
    else {
        return ParsedCommand::plain(Command::unknown("interaction without action"));
    };

    let command = match action.as_str() {
        ACTION_AC_ON => Command::power_on(DeviceKind::AirConditioner, Some(AirconMode::Cool)),
        ACTION_HEATER_ON => Command::power_on(DeviceKind::AirConditioner, Some(AirconMode::Warm)),
        ACTION_BATH_HEATER_ON => Command::power_on(DeviceKind::BathHeater, None),
        ACTION_AC_OFF => Command::PowerOff {
            target: DeviceTarget::new(DeviceKind::AirConditioner),
        },
        ACTION_CANCEL => Command::Cancel,
        other => Command::unknown(format!("unsupported action '{other}'")),
    };

    ParsedCommand {
        command,
        interaction: Some(Interaction {
            action,
            original_message: callback.original_message.unwrap_or_default(),
            response_url: callback.response_url,
            user_id: callback.user.map(|user| user.id),
        }),
    }
}

fn parse_webhook(value: serde_json::Value) -> Command {
    let body: WebhookBody = match serde_json::from_value(value) {
        Ok(body) => body,
        Err(_) => return Command::unknown("unrecognised request shape"),
    };
    let id = body.target.or(body.instance_id);
    let target = |kind| DeviceTarget::new(kind).with_id(id.clone());

    match body.action.trim().to_ascii_lowercase().as_str() {
        "on" | "cool" => Command::PowerOn {
            target: target(DeviceKind::AirConditioner),
            mode: Some(AirconMode::Cool),
        },
        "heat" | "warm" => Command::PowerOn {
            target: target(DeviceKind::AirConditioner),
            mode: Some(AirconMode::Warm),
        },
        "off" => Command::PowerOff {
            target: target(DeviceKind::AirConditioner),
        },
        ACTION_BATH_HEATER_ON => Command::PowerOn {
            target: target(DeviceKind::BathHeater),
            mode: None,
        },
        "start" => Command::PowerOn {
            target: target(DeviceKind::Instance),
            mode: None,
        },
        "stop" => Command::PowerOff {
            target: target(DeviceKind::Instance),
        },
        "list" | "status" => Command::ListDevices,
        ACTION_CANCEL => Command::Cancel,
        other => Command::unknown(format!("unsupported action '{other}'")),
    }
}

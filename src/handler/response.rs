//! Maps command outcomes to HTTP answers and chat notifications.

use serde_json::json;

use super::OutboundResponse;
use crate::channels::slack::{
    Attachment, AttachmentAction, AttachmentField, Message, BOT_ICON_EMOJI, BOT_USERNAME,
};
use crate::channels::Notification;
use crate::commands::{
    AirconMode, Command, DeviceKind, Interaction, ParsedCommand, ACTION_AC_OFF, ACTION_AC_ON,
    ACTION_BATH_HEATER_ON, ACTION_CANCEL, ACTION_HEATER_ON,
};
use crate::config::{Config, Deployment, UnknownCommandPolicy};
use crate::devices::{DeviceActionResult, DeviceFailure, DeviceOutcome};
use crate::security::SignatureError;

pub const TITLE_AC_ON: &str = "OK, TURN ON AN AIR-CONDITIONER!!";
pub const TITLE_HEATER_ON: &str = "OK, TURN ON A HEATER!!";
pub const TITLE_BATH_HEATER_ON: &str = "OK, TURN ON THE BATH HEATER!!";
pub const TITLE_OFF: &str = "OK, TURN OFF...";
pub const TITLE_CANCEL: &str = ":bb8-flame: MAY THE FORCE BE WITH YOU.";

const MENU_COLOR: &str = "#f9a41b";
const MENU_CALLBACK_ID: &str = "server";

/// Builds every [`OutboundResponse`] the handler returns.
#[derive(Debug, Clone)]
pub struct ResponseFormatter {
    deployment: Deployment,
    unknown_command: UnknownCommandPolicy,
    auth_rejected_status: u16,
    /// Channel for notifications; `None` when no bot token is configured.
    notify_channel: Option<String>,
}

impl ResponseFormatter {
    pub fn new(config: &Config) -> Self {
        Self {
            deployment: config.deployment,
            unknown_command: config.policy.unknown_command,
            auth_rejected_status: config.policy.auth_rejected_status,
            notify_channel: config.slack.as_ref().map(|slack| slack.channel_id.clone()),
        }
    }

    /// Format the answer for `parsed`. `result` is `None` when the command
    /// needed no device call.
    pub fn format(&self, parsed: &ParsedCommand, result: Option<DeviceActionResult>) -> OutboundResponse {
        let command = &parsed.command;
        match (command, result) {
            (Command::UrlVerification { challenge }, _) => OutboundResponse::text(200, challenge.clone()),
            (Command::Unknown { reason }, _) => self.unknown(reason, parsed.interaction.is_some()),
            (Command::Cancel, _) => match &parsed.interaction {
                Some(interaction) => replace_original(interaction, TITLE_CANCEL),
                None => OutboundResponse::json(
                    200,
                    &json!({ "ok": true, "command": command.name(), "message": "cancelled" }),
                ),
            },
            (_, None) => {
                tracing::error!(command = command.name(), "device command formatted without a result");
                internal_error()
            }
            (_, Some(Err(failure))) => {
                let notification = if self.reports_webhook_commands(parsed) {
                    self.notification(format!(":warning: {} failed: {failure}", command.name()))
                } else {
                    None
                };
                self.failure(failure).with_notification(notification)
            }
            (_, Some(Ok(outcome))) => self.success(parsed, &outcome),
        }
    }

    fn success(&self, parsed: &ParsedCommand, outcome: &DeviceOutcome) -> OutboundResponse {
        let command = &parsed.command;
        if let Some(interaction) = &parsed.interaction {
            return replace_original(interaction, &confirmation_title(command, outcome));
        }

        let mut body = json!({
            "ok": true,
            "command": command.name(),
            "message": outcome.summary,
        });
        if outcome.no_op {
            body["no_op"] = json!(true);
        }
        if matches!(command, Command::ListDevices) {
            body["readings"] = json!(outcome.readings);
        }

        let notification = match (self.deployment, command) {
            (Deployment::LaborService, Command::ListDevices) => self
                .notify_channel
                .as_ref()
                .map(|channel| Notification::new(channel.clone(), menu_message(outcome.temperature()))),
            _ if self.reports_webhook_commands(parsed) => {
                self.notification(format!("{}: {}", confirmation_title(command, outcome), outcome.summary))
            }
            _ => None,
        };

        OutboundResponse::json(200, &body).with_notification(notification)
    }

    fn unknown(&self, reason: &str, interactive: bool) -> OutboundResponse {
        tracing::info!(reason, policy = ?self.unknown_command, "ignoring unrecognised command");
        match self.unknown_command {
            // Slack treats any JSON body on a button callback as a replacement
            // message; an empty 200 leaves the original menu in place.
            UnknownCommandPolicy::Acknowledge if interactive => OutboundResponse::text(200, ""),
            UnknownCommandPolicy::Acknowledge => {
                OutboundResponse::json(200, &json!({ "ok": true, "ignored": true }))
            }
            UnknownCommandPolicy::Reject => OutboundResponse::error(400, "unrecognised command"),
        }
    }

    pub fn failure_status(&self, failure: DeviceFailure) -> u16 {
        match failure {
            DeviceFailure::AuthRejected => self.auth_rejected_status,
            DeviceFailure::Timeout => 504,
            DeviceFailure::Unreachable => 502,
            DeviceFailure::MalformedResponse => 500,
            DeviceFailure::TargetRejected => 403,
        }
    }

    pub fn failure(&self, failure: DeviceFailure) -> OutboundResponse {
        OutboundResponse::error(self.failure_status(failure), &failure.to_string())
    }

    /// Generic webhooks on ac-control are echoed to the channel. Slack
    /// interactions are not: the replaced message already lands there.
    fn reports_webhook_commands(&self, parsed: &ParsedCommand) -> bool {
        self.deployment == Deployment::AcControl && parsed.interaction.is_none()
    }

    fn notification(&self, text: String) -> Option<Notification> {
        self.notify_channel.as_ref().map(|channel| {
            Notification::new(
                channel.clone(),
                Message {
                    text,
                    username: Some(BOT_USERNAME.into()),
                    icon_emoji: Some(BOT_ICON_EMOJI.into()),
                    ..Message::default()
                },
            )
        })
    }
}

pub fn signature_rejected(err: SignatureError) -> OutboundResponse {
    match err {
        SignatureError::Missing | SignatureError::Mismatch => {
            OutboundResponse::error(401, "invalid signature")
        }
        SignatureError::StaleTimestamp => OutboundResponse::error(403, "stale request"),
    }
}

pub fn method_not_allowed() -> OutboundResponse {
    OutboundResponse::error(405, "method not allowed")
}

pub fn internal_error() -> OutboundResponse {
    OutboundResponse::error(500, "internal error")
}

fn confirmation_title(command: &Command, outcome: &DeviceOutcome) -> String {
    match command {
        Command::PowerOn { target, mode } => match (target.kind, mode) {
            (DeviceKind::AirConditioner, Some(AirconMode::Warm)) => TITLE_HEATER_ON.into(),
            (DeviceKind::AirConditioner, _) => TITLE_AC_ON.into(),
            (DeviceKind::BathHeater, _) => TITLE_BATH_HEATER_ON.into(),
            (DeviceKind::Instance, _) => format!("OK, {}.", outcome.summary.to_uppercase()),
        },
        Command::PowerOff { target } if target.kind == DeviceKind::AirConditioner => TITLE_OFF.into(),
        Command::Cancel => TITLE_CANCEL.into(),
        _ => format!("OK, {}.", outcome.summary.to_uppercase()),
    }
}

/// Reply that replaces the clicked message: buttons removed, one
/// confirmation field added.
fn replace_original(interaction: &Interaction, title: &str) -> OutboundResponse {
    let mut message = interaction.original_message.clone();
    message.text = String::new();
    message.response_type = Some("in_channel".into());
    message.replace_original = Some(true);
    if message.attachments.is_empty() {
        message.attachments.push(Attachment::default());
    }
    let first = &mut message.attachments[0];
    first.actions.clear();
    first.fields = vec![AttachmentField {
        title: title.into(),
        value: String::new(),
        short: false,
    }];

    match serde_json::to_value(&message) {
        Ok(body) => OutboundResponse::json(200, &body),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize replacement message");
            internal_error()
        }
    }
}

/// The labor-service greeting: room temperature plus the action buttons.
pub fn menu_message(temperature: Option<f64>) -> Message {
    let temperature = temperature.map_or_else(|| "--".to_owned(), |t| format!("{t:.1}"));
    Message {
        text: String::new(),
        username: Some(BOT_USERNAME.into()),
        icon_emoji: Some(BOT_ICON_EMOJI.into()),
        attachments: vec![Attachment {
            color: Some(MENU_COLOR.into()),
            callback_id: Some(MENU_CALLBACK_ID.into()),
            text: Some(format!("BEEP! ROOM TEMPERATURE: {temperature}℃ ..MAY I HELP YOU?")),
            actions: vec![
                AttachmentAction::button(ACTION_AC_ON, "冷房をつけて", "primary"),
                AttachmentAction::button(ACTION_HEATER_ON, "暖房をつけて", "danger"),
                AttachmentAction::button(ACTION_BATH_HEATER_ON, "浴室の暖房をつけて", "danger"),
                AttachmentAction::button(ACTION_AC_OFF, "エアコンを消して", "default"),
                AttachmentAction::button(ACTION_CANCEL, "やっぱり大丈夫", "default"),
            ],
            ..Attachment::default()
        }],
        ..Message::default()
    }
}

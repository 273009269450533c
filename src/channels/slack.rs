use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::{Notification, Notifier};
use crate::config::{Secret, SlackConfig};

/// Bot persona used for the menu message.
pub const BOT_USERNAME: &str = "R2-D2";
pub const BOT_ICON_EMOJI: &str = ":r2d2:";

/// A Slack message as posted by `chat.postMessage` or returned in
/// `original_message` of an interactive callback.
///
/// Fields this crate does not touch are kept in `extra` so a replaced
/// message round-trips untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_original: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Always serialized: an empty list is how buttons are removed.
    #[serde(default)]
    pub actions: Vec<AttachmentAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentAction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl AttachmentAction {
    pub fn button(name: &str, text: &str, style: &str) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            kind: "button".into(),
            style: Some(style.into()),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentField {
    pub title: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub short: bool,
}

/// Payload of an interactive-message callback (`payload=` form field).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InteractionCallback {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub callback_id: String,
    #[serde(default)]
    pub actions: Vec<InteractionAction>,
    #[serde(default)]
    pub original_message: Option<Message>,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub user: Option<IdRef>,
    #[serde(default)]
    pub channel: Option<IdRef>,
}

/// One clicked action. Legacy attachments carry `name`, Block Kit carries `action_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InteractionAction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl InteractionAction {
    pub fn identifier(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.action_id.as_deref())
            .or(self.value.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of an Events API request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: Option<MessageEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts notifications through the Slack Web API with the bot token.
pub struct SlackNotifier {
    bot_token: Secret,
    api_base: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(bot_token: Secret, api_base: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            bot_token,
            api_base: api_base.into(),
            client,
        }
    }

    pub fn from_config(config: &SlackConfig, client: reqwest::Client) -> Self {
        Self::new(config.bot_oauth.clone(), config.api_base.clone(), client)
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let url = format!("{}/chat.postMessage", self.api_base);

        let mut body = serde_json::to_value(&notification.message)?;
        if let Some(object) = body.as_object_mut() {
            object.insert(
                "channel".into(),
                serde_json::Value::String(notification.channel.clone()),
            );
        }

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.bot_token.expose())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Slack API error: {status}");
        }

        // Slack reports most failures as HTTP 200 with ok=false.
        let api: ApiResponse = resp.json().await?;
        if !api.ok {
            anyhow::bail!(
                "Slack chat.postMessage failed: {}",
                api.error.as_deref().unwrap_or("unknown_error")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_callback_parses_legacy_attachment_action() {
        let payload = serde_json::json!({
            "type": "interactive_message",
            "callback_id": "server",
            "actions": [{ "name": "ac_on", "type": "button", "value": "" }],
            "original_message": {
                "text": "",
                "bot_id": "B1",
                "attachments": [{
                    "id": 1,
                    "color": "f9a41b",
                    "text": "BEEP!",
                    "actions": [{ "name": "ac_on", "text": "冷房をつけて", "type": "button" }]
                }]
            },
            "user": { "id": "U1", "name": "luke" },
            "channel": { "id": "C1", "name": "home" }
        });
        let callback: InteractionCallback = serde_json::from_value(payload).unwrap();
        assert_eq!(callback.actions[0].identifier(), Some("ac_on"));
        let original = callback.original_message.unwrap();
        assert_eq!(original.extra["bot_id"], "B1");
        assert_eq!(original.attachments[0].extra["id"], 1);
        assert_eq!(callback.channel.unwrap().id, "C1");
    }

    #[test]
    fn block_kit_action_uses_action_id() {
        let action: InteractionAction =
            serde_json::from_value(serde_json::json!({ "action_id": "ac_off" })).unwrap();
        assert_eq!(action.identifier(), Some("ac_off"));
    }

    #[test]
    fn empty_action_has_no_identifier() {
        let action = InteractionAction::default();
        assert_eq!(action.identifier(), None);
    }

    #[test]
    fn message_round_trip_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "text": "hi",
            "ts": "1700000000.000100",
            "attachments": [{ "fallback": "menu", "actions": [] }]
        });
        let message: Message = serde_json::from_value(raw.clone()).unwrap();
        let back = serde_json::to_value(&message).unwrap();
        assert_eq!(back["ts"], "1700000000.000100");
        assert_eq!(back["attachments"][0]["fallback"], "menu");
        assert!(back.get("replace_original").is_none());
    }

    #[test]
    fn event_envelope_parses_app_mention() {
        let envelope: EventEnvelope = serde_json::from_value(serde_json::json!({
            "type": "event_callback",
            "event": { "type": "app_mention", "user": "U1", "text": "<@UBOT> hey", "channel": "C1" }
        }))
        .unwrap();
        let event = envelope.event.unwrap();
        assert_eq!(event.kind, "app_mention");
        assert_eq!(event.channel, "C1");
    }

    #[test]
    fn button_helper_sets_type() {
        let button = AttachmentAction::button("cancel", "やっぱり大丈夫", "default");
        let value = serde_json::to_value(&button).unwrap();
        assert_eq!(value["type"], "button");
        assert_eq!(value["name"], "cancel");
        assert!(value.get("value").is_none());
    }
}

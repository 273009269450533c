use async_trait::async_trait;

use super::slack::Message;

/// A chat message to post once the HTTP answer is decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Destination channel id.
    pub channel: String,
    pub message: Message,
}

impl Notification {
    pub fn new(channel: impl Into<String>, message: Message) -> Self {
        Self {
            channel: channel.into(),
            message,
        }
    }
}

/// Outbound chat side channel (bot API).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Human-readable notifier name
    fn name(&self) -> &str;

    /// Post a notification to its channel
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

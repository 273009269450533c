//! Chat side channel: Slack wire types and the bot-API notifier.

pub mod slack;
pub mod traits;

pub use slack::{
    Attachment, AttachmentAction, AttachmentField, EventEnvelope, InteractionCallback, Message,
    SlackNotifier,
};
pub use traits::{Notification, Notifier};

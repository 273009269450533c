#![warn(clippy::all)]
#![forbid(unsafe_code)]

//! Webhook handlers that drive a home air-conditioner from Slack.
//!
//! Two deployments share this crate:
//! - `ac-control` answers Slack button callbacks and signed JSON webhooks
//!   by switching the air-conditioner (Nature Remo), the bath heater
//!   (IFTTT) or an EC2 instance.
//! - `labor-service` answers Slack mentions with the room temperature and
//!   a menu of actions.

pub mod channels;
pub mod commands;
pub mod config;
pub mod devices;
pub mod gateway;
pub mod handler;
pub mod lambda;
pub mod security;
pub mod telemetry;

pub use config::{Config, Deployment};
pub use handler::{Handler, InboundRequest, OutboundResponse};

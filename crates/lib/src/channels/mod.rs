//! Communication channels (Telegram).
//!
//! Channel trait and registry so the gateway can start/stop the connector and
//! deliver replies. Inbound messages are queued for the gateway's processor.

mod inbound;
mod registry;
mod telegram;

pub use inbound::InboundMessage;
pub use registry::{ChannelHandle, ChannelRegistry};
pub use telegram::{TelegramChannel, TelegramUpdate};

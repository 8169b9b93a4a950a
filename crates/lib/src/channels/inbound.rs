//! Inbound message from a channel: delivered to the gateway for relaying.

/// A text message from a channel conversation, to be answered with one reply.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: String,
    pub conversation_id: String,
    pub text: String,
}

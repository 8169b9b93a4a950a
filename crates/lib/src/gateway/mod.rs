//! Gateway: health HTTP listener, optional Telegram webhook receiver, and the
//! process driver wiring the channel connector to the message relay.

mod server;

pub use server::run_gateway;

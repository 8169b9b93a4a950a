//! Eva core library — config, Telegram channel, assistant-service client,
//! and the message relay used by the CLI.

pub mod assistant;
pub mod bootstrap;
pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod relay;

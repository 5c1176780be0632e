mod client;
pub mod frames;

pub use client::{ChannelEvent, RealtimeClient, RealtimeConfig, HEARTBEAT_INTERVAL};

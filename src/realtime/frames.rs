//! Wire frames for the pub/sub cable protocol.
//!
//! Every outbound frame echoes the channel identifier: a JSON object
//! serialized to an opaque string, exactly as the backend hands it back.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{RawMessage, UserStatusMap};

pub const ROOM_CHANNEL: &str = "RoomChannel";

/// Builds the opaque identifier string carried on every frame.
pub fn channel_identifier(pubsub_token: &str, account_id: i64) -> String {
    json!({
        "channel": ROOM_CHANNEL,
        "pubsub_token": pubsub_token,
        "account_id": account_id,
    })
    .to_string()
}

/// Subscription handshake, sent once per connection right after open.
pub fn subscribe_frame(identifier: &str) -> String {
    json!({
        "command": "subscribe",
        "identifier": identifier,
    })
    .to_string()
}

/// Presence heartbeat. Fire-and-forget; keeps the visitor marked online
/// server-side.
pub fn presence_frame(identifier: &str) -> String {
    json!({
        "command": "message",
        "identifier": identifier,
        "data": json!({ "action": "update_presence" }).to_string(),
    })
    .to_string()
}

/// The two inbound event shapes the widget cares about. Everything else on
/// the channel (welcome, ping, confirm_subscription, ...) is ignored.
#[derive(Debug)]
pub enum InboundEvent {
    MessageCreated(RawMessage),
    PresenceUpdate(UserStatusMap),
}

#[derive(Deserialize)]
struct InboundFrame {
    #[serde(default)]
    message: Option<InboundMessage>,
}

#[derive(Deserialize)]
struct InboundMessage {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Demuxes one raw text frame. Returns `None` for frames that fail to parse
/// or carry an event tag we do not handle; both are dropped silently.
pub fn parse_inbound(text: &str) -> Option<InboundEvent> {
    let frame: InboundFrame = serde_json::from_str(text).ok()?;
    let message = frame.message?;
    let data = message.data?;
    match message.event.as_deref() {
        Some("message.created") => serde_json::from_value(data)
            .ok()
            .map(InboundEvent::MessageCreated),
        Some("presence.update") => {
            let users = data.get("users")?.clone();
            serde_json::from_value(users)
                .ok()
                .map(InboundEvent::PresenceUpdate)
        }
        _ => None,
    }
}

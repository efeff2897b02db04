//! Message-builder helpers (§6/§8.8): construct the well-known JSON
//! envelopes so callers never hand-assemble the wire format.

use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub fn build_login_message(username: &str, password: &str, platform: &str) -> Value {
    json!({
        "type": "login",
        "username": username,
        "password": password,
        "version": "1.0.0",
        "platform": platform,
    })
}

pub fn build_move_message(position: Vec3, rotation: Vec3, timestamp_millis: u64) -> Value {
    json!({
        "type": "move",
        "position": { "x": position.x, "y": position.y, "z": position.z },
        "rotation": { "x": rotation.x, "y": rotation.y, "z": rotation.z },
        "timestamp": timestamp_millis,
    })
}

pub fn build_chat_message(message: &str, channel: &str) -> Value {
    json!({
        "type": "chat",
        "message": message,
        "channel": channel,
    })
}

pub fn build_interact_message(entity_id: u64, action: &str) -> Value {
    json!({
        "type": "interact",
        "entity_id": entity_id,
        "action": action,
    })
}

pub fn build_inventory_message(item_id: &str, quantity: i64, action: &str) -> Value {
    json!({
        "type": "inventory",
        "item_id": item_id,
        "quantity": quantity,
        "action": action,
    })
}

pub(crate) fn build_heartbeat_message(seq: u32, t_millis: u64) -> Value {
    json!({ "type": "heartbeat", "seq": seq, "t": t_millis })
}

pub(crate) fn build_heartbeat_echo(seq: u32, t_millis: u64, t_echo_millis: u64) -> Value {
    json!({ "type": "heartbeat", "seq": seq, "t": t_millis, "t_echo": t_echo_millis })
}

pub(crate) fn build_ack_message(seq: u32) -> Value {
    json!({ "type": "ack", "seq": seq })
}

/// Extracts the envelope's `type` field, if present and a string.
pub fn message_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_message_carries_fixed_version() {
        let msg = build_login_message("alice", "hunter2", "desktop");
        assert_eq!(msg["type"], "login");
        assert_eq!(msg["version"], "1.0.0");
        assert_eq!(msg["platform"], "desktop");
    }

    #[test]
    fn message_type_reads_type_field() {
        let msg = build_chat_message("hi", "global");
        assert_eq!(message_type(&msg), Some("chat"));
    }
}

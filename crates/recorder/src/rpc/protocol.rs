//! Debug-controller wire types.
//!
//! One JSON object per text frame. Outbound commands always carry a
//! correlation id; inbound frames are either a reply (has an id) or an
//! event (has a method, no id).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id. Monotonically increasing per channel, first id is 1.
pub type CommandId = u64;

/// Remote object every command addresses. The debug controller is a
/// singleton on the server side.
pub const CONTROLLER_GUID: &str = "DebugController";

/// Outbound command frame.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    pub id: CommandId,
    pub guid: &'static str,
    pub method: String,
    pub params: Value,
    pub metadata: Value,
}

impl Command {
    pub fn new(id: CommandId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            guid: CONTROLLER_GUID,
            method: method.into(),
            params,
            metadata: Value::Object(Default::default()),
        }
    }
}

/// Reply to a command.
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub id: CommandId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteErrorPayload>,
}

/// Error payload carried by a failed reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteErrorPayload {
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Unsolicited event notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Inbound frame. A frame with an id is a reply even if it also carries a
/// method; a frame with neither fails to parse and is dropped as unroutable.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    Reply(Reply),
    Event(Event),
}

/// Remote-side recorder modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecorderMode {
    Inspecting,
    Recording,
    None,
    AssertingText,
    #[serde(rename = "recording-inspecting")]
    RecordingInspecting,
    Standby,
    AssertingVisibility,
    AssertingValue,
    AssertingSnapshot,
}

/// Typed payload of the `sourceChanged` event. Deserialization doubles as
/// shape validation; payloads that do not match are dropped by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceChangedEvent {
    pub text: String,
    pub header: String,
    pub footer: String,
    pub actions: Vec<String>,
}

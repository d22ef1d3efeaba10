use crate::sensor::Published;
use laundry_core::ApplianceKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw state a door sensor reports while the door is closed.
pub const DOOR_CLOSED: &str = "off";
/// Raw state a door sensor reports while the door is open.
pub const DOOR_OPEN: &str = "on";

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn v1() -> Self {
        Self { major: 1, minor: 0 }
    }

    pub fn is_supported(&self) -> bool {
        self.major == 1
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct StateMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub protocol_version: ProtocolVersion,
    pub sequence: u64,
    pub entity: String,
    pub appliance: ApplianceKind,
    pub state: Published,
    pub unix_us: u64,
}

impl StateMsg {
    pub fn new(sequence: u64, appliance: ApplianceKind, state: Published, unix_us: u64) -> Self {
        Self {
            msg_type: "state",
            protocol_version: ProtocolVersion::v1(),
            sequence,
            entity: appliance.entity_id(),
            appliance,
            state,
            unix_us,
        }
    }

    /// One newline-terminated line, ready for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

#[derive(Debug, Deserialize)]
pub struct HelloMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// New raw value of an appliance's power sensor.
#[derive(Debug, Deserialize)]
pub struct PowerMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub appliance: ApplianceKind,
    pub state: String,
}

/// State change of an appliance's door sensor.
#[derive(Debug, Deserialize)]
pub struct DoorMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub appliance: ApplianceKind,
    #[serde(default)]
    pub old_state: Option<String>,
    pub new_state: String,
}

impl DoorMsg {
    /// Only a closed-to-open transition counts as the door being opened.
    pub fn is_opening(&self) -> bool {
        self.old_state.as_deref() == Some(DOOR_CLOSED) && self.new_state == DOOR_OPEN
    }
}

#[derive(Debug)]
pub enum IncomingMessage {
    Hello(HelloMsg),
    Power(PowerMsg),
    Door(DoorMsg),
}

impl IncomingMessage {
    pub fn parse(line: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        let msg_type = value.get("type")?.as_str()?;
        match msg_type {
            "power" => serde_json::from_value(value).ok().map(IncomingMessage::Power),
            "door" => serde_json::from_value(value).ok().map(IncomingMessage::Door),
            "hello" => serde_json::from_value(value)
                .ok()
                .map(IncomingMessage::Hello),
            _ => None,
        }
    }
}

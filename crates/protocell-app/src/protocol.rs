//! Text frames exchanged with a viewer.
//!
//! Clients send the literal `ping` or a control envelope
//! `{"type": "control", "command": ...}`. The server answers `pong`, status
//! and save frames, and one render frame per paced tick (see
//! [`crate::render`]).

use protocell_core::{Tick, WorldSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// A command applied by the session ticker between frames.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Start,
    Stop,
    /// Switches speed mode; a missing or non-boolean flag keeps the current mode.
    Speed { max_speed: Option<bool> },
    Save,
    /// Replaces the session's world with a submitted snapshot.
    Load { state: Option<Box<Value>> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Ping,
    Control(ControlCommand),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed client frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported frame type `{0}`")]
    UnsupportedType(String),
    #[error("unknown control command `{0}`")]
    UnknownCommand(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    max_speed: Value,
    #[serde(default)]
    state: Option<Value>,
}

pub fn parse_client_message(raw: &str) -> Result<ClientMessage, ProtocolError> {
    if raw.trim() == PING {
        return Ok(ClientMessage::Ping);
    }
    let envelope: Envelope = serde_json::from_str(raw)?;
    if envelope.kind != "control" {
        return Err(ProtocolError::UnsupportedType(envelope.kind));
    }
    let command = match envelope.command.as_deref() {
        Some("start") => ControlCommand::Start,
        Some("stop") => ControlCommand::Stop,
        Some("speed") => ControlCommand::Speed {
            max_speed: envelope.max_speed.as_bool(),
        },
        Some("save") => ControlCommand::Save,
        Some("load") => ControlCommand::Load {
            state: envelope.state.map(Box::new),
        },
        other => {
            return Err(ProtocolError::UnknownCommand(
                other.unwrap_or_default().to_owned(),
            ));
        }
    };
    Ok(ClientMessage::Control(command))
}

/// Machine-readable reason attached to a status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A load carried no state.
    InvalidState,
    /// The submitted state could not be decoded into a world.
    LoadFailed,
    /// A scheduled snapshot could not be written.
    PersistFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub running: bool,
    pub max_speed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_tick: Option<Tick>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFrame {
    pub filename: String,
    pub state: WorldSnapshot,
}

impl SaveFrame {
    #[must_use]
    pub fn new(state: WorldSnapshot) -> Self {
        Self {
            filename: format!("world_state_tick_{}.json", state.tick.0),
            state,
        }
    }
}

/// Typed server frames. Render frames are sent untagged and live in
/// [`crate::render`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Status(StatusFrame),
    Save(SaveFrame),
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn control(raw: &str) -> ControlCommand {
        match parse_client_message(raw).expect("parse") {
            ClientMessage::Control(command) => command,
            other => panic!("expected control message, got {other:?}"),
        }
    }

    #[test]
    fn ping_is_a_bare_literal() {
        assert_eq!(parse_client_message("ping").expect("ping"), ClientMessage::Ping);
        assert_eq!(parse_client_message(" ping\n").expect("ping"), ClientMessage::Ping);
        assert!(parse_client_message("pong").is_err());
    }

    #[test]
    fn control_envelopes_map_to_commands() {
        assert_eq!(
            control(r#"{"type":"control","command":"start"}"#),
            ControlCommand::Start
        );
        assert_eq!(
            control(r#"{"type":"control","command":"stop"}"#),
            ControlCommand::Stop
        );
        assert_eq!(
            control(r#"{"type":"control","command":"speed","max_speed":true}"#),
            ControlCommand::Speed {
                max_speed: Some(true)
            }
        );
        assert_eq!(
            control(r#"{"type":"control","command":"speed","max_speed":"yes"}"#),
            ControlCommand::Speed { max_speed: None }
        );
        assert_eq!(
            control(r#"{"type":"control","command":"load","state":null}"#),
            ControlCommand::Load { state: None }
        );
        assert_eq!(
            control(r#"{"type":"control","command":"load","state":{"tick":3}}"#),
            ControlCommand::Load {
                state: Some(Box::new(json!({"tick": 3})))
            }
        );
    }

    #[test]
    fn unknown_frames_are_rejected() {
        assert!(matches!(
            parse_client_message(r#"{"type":"chat","command":"start"}"#),
            Err(ProtocolError::UnsupportedType(kind)) if kind == "chat"
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"control","command":"reset"}"#),
            Err(ProtocolError::UnknownCommand(name)) if name == "reset"
        ));
        assert!(matches!(
            parse_client_message("{not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn status_frames_omit_absent_fields() {
        let plain = ServerFrame::Status(StatusFrame {
            running: true,
            max_speed: false,
            error: None,
            loaded_tick: None,
        });
        let value: Value = serde_json::from_str(&plain.to_json().expect("encode")).expect("json");
        assert_eq!(value, json!({"type": "status", "running": true, "max_speed": false}));

        let failed = ServerFrame::Status(StatusFrame {
            running: false,
            max_speed: true,
            error: Some(ErrorCode::LoadFailed),
            loaded_tick: Some(Tick(40)),
        });
        let value: Value = serde_json::from_str(&failed.to_json().expect("encode")).expect("json");
        assert_eq!(value["error"], "load_failed");
        assert_eq!(value["loaded_tick"], 40);
    }
}

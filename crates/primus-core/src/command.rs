//! Command messages exchanged between instances.
//!
//! A command is carried in a frame tagged [`COMMAND_FRAME_TAG`] whose payload
//! is a versioned JSON record:
//!
//! ```text
//! { "version": 1, "timestamp": ..., "sender_id": ..., "id": {...},
//!   "kind": <i32>, "arguments": [...], "option": {...} | null }
//! ```
//!
//! Payloads with any other version are rejected so the receiving client can
//! log and drop them.

use crate::identity::AppIdentity;
use crate::transport::{encode_frame, Frame};
use crate::{PrimusError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame type tag for command payloads.
pub const COMMAND_FRAME_TAG: i32 = 1;

/// Current command payload version.
pub const COMMAND_VERSION: i32 = 1;

/// Closed set of command kinds, encoded on the wire as `i32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum CommandKind {
    Request,
    Accepted,
    Denied,
    Abort,
    Alive,
    Raise,
    Identify,
    IdentifyServer,
    Killed,
    Unlock,
    GeometryRequest,
    Geometry,
    Option,
}

impl CommandKind {
    pub const ALL: [CommandKind; 13] = [
        CommandKind::Request,
        CommandKind::Accepted,
        CommandKind::Denied,
        CommandKind::Abort,
        CommandKind::Alive,
        CommandKind::Raise,
        CommandKind::Identify,
        CommandKind::IdentifyServer,
        CommandKind::Killed,
        CommandKind::Unlock,
        CommandKind::GeometryRequest,
        CommandKind::Geometry,
        CommandKind::Option,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Request => "request",
            CommandKind::Accepted => "accepted",
            CommandKind::Denied => "denied",
            CommandKind::Abort => "abort",
            CommandKind::Alive => "alive",
            CommandKind::Raise => "raise",
            CommandKind::Identify => "identify",
            CommandKind::IdentifyServer => "identify_server",
            CommandKind::Killed => "killed",
            CommandKind::Unlock => "unlock",
            CommandKind::GeometryRequest => "geometry_request",
            CommandKind::Geometry => "geometry",
            CommandKind::Option => "option",
        }
    }
}

impl From<CommandKind> for i32 {
    fn from(kind: CommandKind) -> Self {
        kind as i32
    }
}

impl TryFrom<i32> for CommandKind {
    type Error = PrimusError;

    fn try_from(value: i32) -> Result<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|index| CommandKind::ALL.get(index).copied())
            .ok_or(PrimusError::UnknownCommandKind(value))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional key/value attached to a command, used by `Option` and the
/// geometry commands the surrounding application relays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub timestamp: DateTime<Utc>,
    /// Id of the local client that decoded this command. Only meaningful in
    /// the receiving process; it is overwritten on every receipt.
    pub sender_id: u32,
    pub id: AppIdentity,
    pub kind: CommandKind,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub option: Option<CommandOption>,
}

#[derive(Serialize)]
struct WireCommandRef<'a> {
    version: i32,
    #[serde(flatten)]
    command: &'a Command,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: i32,
}

impl Command {
    /// New command stamped with the current time.
    pub fn new(kind: CommandKind, id: AppIdentity) -> Self {
        Self {
            timestamp: Utc::now(),
            sender_id: 0,
            id,
            kind,
            arguments: Vec::new(),
            option: None,
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.option = Some(CommandOption {
            key: key.into(),
            value,
        });
        self
    }

    /// Serialize to the versioned JSON payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&WireCommandRef {
            version: COMMAND_VERSION,
            command: self,
        })?)
    }

    /// Parse a versioned JSON payload.
    ///
    /// Fails with `UnsupportedVersion` for any version other than
    /// [`COMMAND_VERSION`] and with `InvalidIdentity` when the carried identity
    /// is not valid.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let header: VersionHeader = serde_json::from_slice(payload)?;
        if header.version != COMMAND_VERSION {
            return Err(PrimusError::UnsupportedVersion {
                version: header.version,
                expected: COMMAND_VERSION,
            });
        }

        let command: Command = serde_json::from_slice(payload)?;
        if !command.id.is_valid() {
            return Err(PrimusError::InvalidIdentity {
                name: command.id.name,
                user: command.id.user,
            });
        }
        Ok(command)
    }

    /// Encode as a complete command frame.
    pub fn to_frame(&self) -> Result<Bytes> {
        Ok(encode_frame(COMMAND_FRAME_TAG, &self.to_payload()?))
    }

    /// Decode a frame. Returns `Ok(None)` for frames that are not commands.
    pub fn from_frame(frame: &Frame) -> Result<Option<Self>> {
        if frame.tag != COMMAND_FRAME_TAG {
            return Ok(None);
        }
        Self::from_payload(&frame.payload).map(Some)
    }
}

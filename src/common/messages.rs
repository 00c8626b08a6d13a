//! # Message Protocol
//!
//! Defines the envelope exchanged between the task server and its clients.
//!
//! Every frame on the wire is one [`Message`]:
//! - [`Message::Request`] names a command and carries an opaque payload. Clients
//!   send requests to the server, and the server pushes requests to clients
//!   (the current task list, login outcomes).
//! - [`Message::Response`] is the generic OK/Error answer to a request, tagged
//!   with the command it answers.
//!
//! Messages are serialized to JSON and sent over TCP with a 4-byte length prefix.
//! Payload bytes travel as base64 strings inside the JSON body.

use serde::{Deserialize, Serialize};

/// Command that replaces the shared task list and is broadcast to other clients.
pub const CMD_TASKS: &str = "tasks";
/// Command carrying a batch of files to store as backups.
pub const CMD_BACKUP: &str = "backup";
/// Command carrying credentials; the server answers with a login-state request.
pub const CMD_LOGIN: &str = "Login";

/// Outcome reported in a [`Message::Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Error")]
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "Error",
        }
    }
}

/// Core message enum for all communication between server and clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Message {
    /// **Command Packet**
    ///
    /// # Fields
    /// - `command`: handler name (`tasks`, `backup`, `Login`)
    /// - `data`: command-specific payload
    Request {
        command: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    /// **Response Packet**
    ///
    /// Sent by the server after every request it processes, including
    /// requests naming an unknown command.
    ///
    /// # Fields
    /// - `status`: OK or Error
    /// - `correlates_to`: the command of the request being answered
    Response { status: Status, correlates_to: String },
}

impl Message {
    /// Build a request for `command` with the given payload.
    pub fn request(command: impl Into<String>, data: Vec<u8>) -> Self {
        Message::Request {
            command: command.into(),
            data,
        }
    }

    /// Build the generic response to `command`.
    pub fn response(status: Status, command: impl Into<String>) -> Self {
        Message::Response {
            status,
            correlates_to: command.into(),
        }
    }

    /// Serialize a message to JSON bytes for transmission over the network.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a message from JSON bytes received from the network.
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Serde adapter storing `Vec<u8>` as a standard base64 string.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

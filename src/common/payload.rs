//! # Command Payloads
//!
//! Byte encodings of the data carried inside [`Message::Request`](super::messages::Message):
//!
//! | Command  | Payload                                                     |
//! |----------|-------------------------------------------------------------|
//! | `tasks`  | [`TaskList`]: JSON array of opaque task records             |
//! | `backup` | [`BackupBatch`]: JSON array of `{name, content(base64)}`    |
//! | `Login`  | [`LoginRequest`]: UTF-8 `"<user> &*&*& <password>"`         |
//!
//! Decoding never panics; malformed input becomes a [`PayloadError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::messages::base64_bytes;

/// Separator between username and password in a login payload.
pub const LOGIN_SEPARATOR: &str = " &*&*& ";

/// Errors produced while decoding a command payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("login payload must have 2 fields, found {0}")]
    MalformedLogin(usize),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backup batch has {count} files, limit is {max}")]
    TooManyFiles { count: usize, max: usize },
}

/// The shared task list. Records are opaque JSON values; only their order
/// and content matter to the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskList(Vec<serde_json::Value>);

impl TaskList {
    pub fn new(records: Vec<serde_json::Value>) -> Self {
        Self(records)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode a `tasks` payload. Anything but a JSON array is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Name declared by the client; may contain a path
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

/// Ordered collection of files submitted with one `backup` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupBatch(Vec<FileRecord>);

impl BackupBatch {
    pub fn new(files: Vec<FileRecord>) -> Self {
        Self(files)
    }

    pub fn into_files(self) -> Vec<FileRecord> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode a `backup` payload holding at most `max_files` records.
    pub fn from_bytes(bytes: &[u8], max_files: usize) -> Result<Self, PayloadError> {
        let batch: BackupBatch = serde_json::from_slice(bytes)?;
        if batch.len() > max_files {
            return Err(PayloadError::TooManyFiles {
                count: batch.len(),
                max: max_files,
            });
        }
        Ok(batch)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Decoded `Login` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Split the payload on [`LOGIN_SEPARATOR`]; exactly two fields are required.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(bytes)?;
        let fields: Vec<&str> = text.split(LOGIN_SEPARATOR).collect();

        match fields.as_slice() {
            [username, password] => Ok(Self::new(*username, *password)),
            _ => Err(PayloadError::MalformedLogin(fields.len())),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}{}{}", self.username, LOGIN_SEPARATOR, self.password).into_bytes()
    }
}

/// Text carried by the server's `Login` state message.
pub fn login_state_bytes(logged_in: bool) -> Vec<u8> {
    if logged_in {
        b"True".to_vec()
    } else {
        b"False".to_vec()
    }
}

/// Parse a `Login` state message; accepts any letter case.
pub fn parse_login_state(bytes: &[u8]) -> Option<bool> {
    let text = std::str::from_utf8(bytes).ok()?;
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

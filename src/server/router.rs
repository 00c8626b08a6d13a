//! # Command Router
//!
//! Maps command names to [`CommandHandler`]s. The table is filled once at
//! startup and then only read, so dispatch needs no locking.
//!
//! Dispatch runs at most one handler per packet and never retries. A command
//! with no registered handler yields [`CommandResult::Failure`] without
//! touching any state.

use async_trait::async_trait;
use log::warn;
use std::collections::HashMap;
use std::sync::Arc;

use super::registry::{ConnectionId, Outbound};
use crate::common::messages::{Message, Status};

/// Outcome of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Success,
    Failure,
}

impl CommandResult {
    pub fn status(self) -> Status {
        match self {
            CommandResult::Success => Status::Ok,
            CommandResult::Failure => Status::Error,
        }
    }
}

impl From<bool> for CommandResult {
    fn from(ok: bool) -> Self {
        if ok {
            CommandResult::Success
        } else {
            CommandResult::Failure
        }
    }
}

/// The connection a command arrived on.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: ConnectionId,
    /// Queue for messages addressed to this connection only
    pub outbound: Outbound,
}

impl Caller {
    /// Queue a message for the caller.
    ///
    /// Returns false if the connection is gone or its queue is full.
    pub fn send(&self, message: Message) -> bool {
        self.outbound.try_send(message).is_ok()
    }
}

/// Logic bound to one command name.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, data: Vec<u8>, caller: &Caller) -> CommandResult;
}

#[derive(Default, Clone)]
pub struct CommandRouter {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `command`, replacing any previous binding.
    pub fn register(&mut self, command: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(command.into(), handler);
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub async fn dispatch(&self, command: &str, data: Vec<u8>, caller: &Caller) -> CommandResult {
        match self.handlers.get(command) {
            Some(handler) => handler.handle(data, caller).await,
            None => {
                warn!("-> Command not found! ({}) from {}", command, caller.id);
                CommandResult::Failure
            }
        }
    }
}

//! # Task Client
//!
//! Minimal client for the task server, used by the `client` binary and the
//! integration tests.
//!
//! The server pushes `tasks` requests at any time (on connect, and whenever
//! another client replaces the list). [`TaskClient::call`] keeps any such
//! message it reads while waiting for its response, and
//! [`TaskClient::next_message`] hands those out first.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut client = TaskClient::connect("127.0.0.1:1708").await?;
//! let initial = client.next_task_list().await?;
//! let logged_in = client.login("root", "123456").await?;
//! ```

use anyhow::{bail, Result};
use std::collections::VecDeque;
use tokio::net::TcpStream;

use crate::common::connection::Connection;
use crate::common::messages::{Message, Status, CMD_BACKUP, CMD_LOGIN, CMD_TASKS};
use crate::common::payload::{parse_login_state, BackupBatch, LoginRequest, TaskList};

pub struct TaskClient {
    conn: Connection,
    /// Messages read while waiting for a response
    pending: VecDeque<Message>,
}

impl TaskClient {
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address).await?;
        Ok(Self {
            conn: Connection::new(stream),
            pending: VecDeque::new(),
        })
    }

    /// Send a raw request without waiting for anything.
    pub async fn send(&mut self, command: &str, data: Vec<u8>) -> Result<()> {
        self.conn
            .write_message(&Message::request(command, data))
            .await
    }

    /// Next message from the server; `None` once the connection is closed.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(message));
        }
        self.conn.read_message().await
    }

    /// Wait for the next `tasks` push, skipping anything else.
    pub async fn next_task_list(&mut self) -> Result<TaskList> {
        loop {
            match self.next_message().await? {
                Some(Message::Request { command, data }) if command == CMD_TASKS => {
                    return Ok(TaskList::from_bytes(&data)?);
                }
                Some(_) => continue,
                None => bail!("connection closed while waiting for tasks"),
            }
        }
    }

    /// Send a request and wait for the response correlating to it.
    ///
    /// Server-initiated requests read in the meantime are queued for
    /// [`TaskClient::next_message`].
    pub async fn call(&mut self, command: &str, data: Vec<u8>) -> Result<Status> {
        self.send(command, data).await?;

        loop {
            match self.conn.read_message().await? {
                Some(Message::Response {
                    status,
                    correlates_to,
                }) if correlates_to == command => return Ok(status),
                Some(other) => self.pending.push_back(other),
                None => bail!("connection closed while waiting for '{}' response", command),
            }
        }
    }

    /// Replace the shared task list.
    pub async fn push_tasks(&mut self, tasks: &TaskList) -> Result<Status> {
        self.call(CMD_TASKS, tasks.to_bytes()?).await
    }

    /// Upload files for backup.
    pub async fn backup(&mut self, batch: &BackupBatch) -> Result<Status> {
        self.call(CMD_BACKUP, batch.to_bytes()?).await
    }

    /// Check credentials. Returns the server's verdict.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<bool> {
        let payload = LoginRequest::new(username, password).to_bytes();
        if self.call(CMD_LOGIN, payload).await? == Status::Error {
            bail!("server rejected the login request");
        }

        // The state message is queued before the response, so it is pending now
        let position = self.pending.iter().position(
            |m| matches!(m, Message::Request { command, .. } if command == CMD_LOGIN),
        );
        match position.and_then(|i| self.pending.remove(i)) {
            Some(Message::Request { data, .. }) => match parse_login_state(&data) {
                Some(state) => Ok(state),
                None => bail!("unreadable login state {:?}", String::from_utf8_lossy(&data)),
            },
            _ => bail!("server sent no login state"),
        }
    }
}

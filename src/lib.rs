//! # tasksync
//!
//! A small TCP service keeping one shared task list consistent across every
//! connected client, checking logins, and storing uploaded backup files.
//!
//! - [`common`]: wire messages, framing, payload encodings, configuration
//! - [`server`]: stores, command router, connection handling
//! - [`client`]: a thin client used by the CLI and the tests

pub mod client;
pub mod common;
pub mod server;

pub use common::messages::Message;
pub use server::{ServerCore, ServerMiddleware};

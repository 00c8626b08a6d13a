//! # Common Components
//!
//! Shared utilities and data structures used by both client and server components.
//!
//! ## Modules
//!
//! - [`messages`]: Request/response envelope exchanged over the wire
//! - [`connection`]: TCP connection abstraction with message framing
//! - [`payload`]: Encodings of the task list, backup batches, and login credentials
//! - [`config`]: Configuration parsing utilities

pub mod messages;
pub mod connection;
pub mod payload;
pub mod config;

//! # Client Components
//!
//! ## Core Client ([`client`])
//! Connects to the task server, sends commands, and collects the requests the
//! server pushes (task list updates, login outcomes).

pub mod client;

pub use client::TaskClient;

//! # Server Components
//!
//! ## Server Core ([`server`])
//! Owns the shared state and binds the `tasks`, `backup` and `Login` handlers.
//!
//! ## Server Middleware ([`middleware`])
//! Accepts TCP connections, pushes the current task list to newcomers, and
//! feeds inbound requests to the [`CommandRouter`].
//!
//! The remaining modules are the pieces the core is built from.

pub mod backup;
pub mod credentials;
pub mod middleware;
pub mod persist;
pub mod registry;
pub mod router;
pub mod server;
pub mod tasks;

pub use middleware::ServerMiddleware;
pub use registry::{ConnectionId, ConnectionRegistry};
pub use router::{Caller, CommandHandler, CommandResult, CommandRouter};
pub use server::ServerCore;

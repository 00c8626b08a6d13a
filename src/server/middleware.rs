//! # Server Middleware - Connection Handling
//!
//! The middleware layer owns the network side of the task server:
//!
//! ## Core Responsibilities
//!
//! ### 1. Listening
//! - Binds the configured TCP address; a bind failure is fatal
//! - Accepts connections forever, one task per connection
//!
//! ### 2. Connection Lifecycle
//! - Registers each new connection in the [`ConnectionRegistry`](super::registry::ConnectionRegistry)
//! - Pushes the current task list before reading any command
//! - Unregisters the connection when the peer goes away or the stream breaks
//!
//! ### 3. Command Dispatch
//! - Feeds every inbound request to the [`CommandRouter`]
//! - Answers every request with an OK/Error response
//!
//! ## Message Flow
//!
//! ```text
//! Client connects        -> Server (register, push "tasks" with current list)
//! Client -> Server       (Request "tasks" | "backup" | "Login")
//! Server -> Router       (dispatch to handler)
//! Handler -> others      (Request "tasks", on task updates)
//! Handler -> Client      (Request "Login" with True/False, on login)
//! Server -> Client       (Response OK | Error)
//! ```
//!
//! Each connection has two tasks: the reader runs commands one after another,
//! and a writer drains the connection's outbound queue onto the socket. The
//! queue is bounded by `limits.outbound_queue`; a client that lets it fill up
//! is disconnected.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use super::router::{Caller, CommandRouter};
use super::server::ServerCore;
use crate::common::config::ServerConfig;
use crate::common::connection::Connection;
use crate::common::messages::{Message, CMD_TASKS};

/// Network front end wrapping a [`ServerCore`].
///
/// # Example
/// ```ignore
/// let (core, _) = ServerCore::open(&config).await?;
/// let middleware = Arc::new(ServerMiddleware::new(config, Arc::new(core)));
/// middleware.run().await?;
/// ```
pub struct ServerMiddleware {
    core: Arc<ServerCore>,
    router: CommandRouter,
    config: ServerConfig,
}

impl ServerMiddleware {
    pub fn new(config: ServerConfig, core: Arc<ServerCore>) -> Self {
        let router = core.router();
        Self {
            core,
            router,
            config,
        }
    }

    pub fn core(&self) -> &ServerCore {
        &self.core
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let address = &self.config.server.address;
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind {}", address))?;

        info!("📡 Task server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind, then accept connections until the process stops.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections on an already bound listener, forever.
    ///
    /// Per-connection failures never reach this loop.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    debug!("🔗 Accepted connection from {}", addr);

                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_connection(socket, addr).await;
                    });
                }
                Err(e) => {
                    error!("❌ Accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Run one client connection to completion.
    async fn handle_connection(&self, socket: TcpStream, addr: SocketAddr) {
        let conn = Connection::with_max_frame(socket, self.config.limits.max_frame_bytes);
        let (mut reader, mut writer) = conn.into_split();

        let (tx, mut rx) = mpsc::channel::<Message>(self.config.limits.outbound_queue.max(1));
        let writer_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = writer.write_message(&message).await {
                    debug!("❌ Write to {} failed: {}", addr, e);
                    break;
                }
            }
        });

        // Registering under the task read lock means a concurrent update is
        // either already in the pushed snapshot or broadcast to us afterwards
        let (id, mut evicted) = {
            let current = self.core.tasks().read().await;
            let (id, evicted) = self.core.registry().register(tx.clone()).await;
            match current.to_bytes() {
                Ok(bytes) => {
                    if let Err(e) = tx.try_send(Message::request(CMD_TASKS, bytes)) {
                        debug!("❌ Initial task push to {} failed: {}", id, e);
                    }
                }
                Err(e) => error!("❌ Cannot encode task list for {}: {}", id, e),
            }
            (id, evicted)
        };
        info!("-> New connection {} from {}", id, addr);

        let caller = Caller { id, outbound: tx };

        loop {
            let inbound = tokio::select! {
                _ = &mut evicted => {
                    debug!("🔌 Connection {} dropped by the registry", id);
                    break;
                }
                inbound = reader.read_message() => inbound,
            };

            match inbound {
                Ok(Some(Message::Request { command, data })) => {
                    debug!("📥 {} sent '{}' ({} bytes)", id, command, data.len());

                    let result = self.router.dispatch(&command, data, &caller).await;
                    if !caller.send(Message::response(result.status(), command)) {
                        warn!("⚠️  Connection {} is not keeping up, closing", id);
                        break;
                    }
                }
                Ok(Some(Message::Response {
                    status,
                    correlates_to,
                })) => {
                    debug!(
                        "📨 {} answered '{}' with {}",
                        id,
                        correlates_to,
                        status.as_str()
                    );
                }
                Ok(None) => {
                    debug!("🔌 Connection {} closed", id);
                    break;
                }
                Err(e) => {
                    warn!("⚠️  Connection {} failed: {}", id, e);
                    break;
                }
            }
        }

        self.core.registry().unregister(id).await;
        // The writer may be stuck on a peer that stopped reading
        writer_task.abort();
    }
}

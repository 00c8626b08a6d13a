//! # TCP Connection Abstraction
//!
//! Provides a wrapper around TCP streams with message framing for the task
//! sync protocol.
//!
//! ## Wire Protocol
//!
//! Messages are sent with a 4-byte length prefix (big-endian) followed by JSON data:
//! ```text
//! [4 bytes: message length] [N bytes: JSON message data]
//! ```
//!
//! The server splits each connection into a [`FrameReader`] and a
//! [`FrameWriter`] so that one task can read commands while another drains
//! the outbound queue (responses and broadcasts).

use anyhow::Result;
use log::error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::messages::Message;

/// Default maximum frame size (64MB) to prevent memory exhaustion attacks.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// TCP connection wrapper with message framing support.
pub struct Connection {
    /// Underlying TCP stream
    stream: TcpStream,
    /// Frames announcing a larger body are refused
    max_frame_bytes: usize,
}

impl Connection {
    /// Create a new Connection from an existing TCP stream.
    ///
    /// # Example
    /// ```ignore
    /// let stream = TcpStream::connect("127.0.0.1:1708").await?;
    /// let mut conn = Connection::new(stream);
    /// ```
    pub fn new(stream: TcpStream) -> Self {
        Self::with_max_frame(stream, DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a Connection that refuses frames larger than `max_frame_bytes`.
    pub fn with_max_frame(stream: TcpStream, max_frame_bytes: usize) -> Self {
        Self {
            stream,
            max_frame_bytes,
        }
    }

    /// Read a message from the connection.
    ///
    /// # Returns
    /// - `Ok(Some(Message))`: Successfully read and deserialized a message
    /// - `Ok(None)`: Connection closed, frame too large, or undecodable frame
    /// - `Err`: I/O error in the middle of a frame
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        read_frame(&mut self.stream, self.max_frame_bytes).await
    }

    /// Write a message to the connection and flush it.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        write_frame(&mut self.stream, message).await
    }

    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (
            FrameReader {
                half: read,
                max_frame_bytes: self.max_frame_bytes,
            },
            FrameWriter { half: write },
        )
    }
}

/// Read half of a split [`Connection`].
pub struct FrameReader {
    half: OwnedReadHalf,
    max_frame_bytes: usize,
}

impl FrameReader {
    /// Same contract as [`Connection::read_message`].
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        read_frame(&mut self.half, self.max_frame_bytes).await
    }
}

/// Write half of a split [`Connection`].
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        write_frame(&mut self.half, message).await
    }
}

async fn read_frame<R>(reader: &mut R, max_frame_bytes: usize) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    // First, read 4-byte length prefix that tells us the message size
    let mut length_buf = [0u8; 4];

    match reader.read_exact(&mut length_buf).await {
        Ok(_) => {
            let length = u32::from_be_bytes(length_buf) as usize;

            if length > max_frame_bytes {
                error!(
                    "❌ Message too large: {} bytes (max: {} bytes)",
                    length, max_frame_bytes
                );
                return Ok(None);
            }

            let mut data = vec![0u8; length];
            reader.read_exact(&mut data).await?;

            match Message::from_bytes(&data) {
                Ok(msg) => Ok(Some(msg)),
                Err(e) => {
                    error!("❌ Failed to deserialize message: {}", e);
                    Ok(None)
                }
            }
        }
        Err(_) => Ok(None), // Connection closed cleanly
    }
}

async fn write_frame<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = message.to_bytes()?;
    let length = u32::try_from(data.len())?;

    // Send: [4 bytes length][message data]
    writer.write_all(&length.to_be_bytes()).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;

    Ok(())
}

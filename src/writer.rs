//! Dedicated writer task: the "send bytes" primitive.
//!
//! Encoded commands are handed to a task owning the transport's write half
//! through an mpsc channel. Each command is written whole and flushed on
//! its own; commands are never coalesced, so every link-layer write carries
//! exactly one frame.
//!
//! # Architecture
//!
//! ```text
//! Reader actor ─► mpsc::Sender<OutboundCommand> ─► Writer Task ─► AsyncWrite
//! ```

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ReaderError, Result};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// One encoded frame ready for the transport.
#[derive(Debug, Clone)]
pub struct OutboundCommand {
    pub bytes: Bytes,
}

impl OutboundCommand {
    #[inline]
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the command queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending commands to the writer task. Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundCommand>,
}

impl WriterHandle {
    /// Queue a command, waiting for channel capacity.
    pub async fn send(&self, command: OutboundCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ReaderError::ConnectionClosed)
    }
}

/// Spawn the writer task and return a handle for sending commands.
///
/// The `JoinHandle` resolves when every `WriterHandle` is dropped, or with
/// the first I/O error.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer));

    let handle = WriterHandle { tx };

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundCommand>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        if let Err(e) = write_command(&mut writer, &command).await {
            tracing::warn!("Writer stopped: {}", e);
            return Err(e);
        }
    }
    Ok(())
}

async fn write_command<W>(writer: &mut W, command: &OutboundCommand) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&command.bytes).await?;
    writer.flush().await?;
    tracing::trace!(bytes = command.size(), "Command written");
    Ok(())
}

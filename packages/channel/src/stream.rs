//! Channel over an async byte stream.
//!
//! Messages are framed as `[4-byte BE length][JSON payload]`, so any pair of
//! pipes (child stdio, a socket) can carry the channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use trustbridge_model::Message;

use crate::error::{ChannelError, Result};
use crate::listeners::Listeners;
use crate::DuplexChannel;

/// Largest accepted frame payload.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write one framed message.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ChannelError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. Returns `None` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(ChannelError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(serde_json::from_slice(&payload)?))
}

/// A duplex channel over a reader/writer pair.
///
/// A pump task reads frames and dispatches them to the listeners until the
/// reader reaches end of stream or fails; [`closed`](StreamChannel::closed)
/// resolves at that point.
pub struct StreamChannel {
    writer: Mutex<BoxedWriter>,
    listeners: Arc<Listeners>,
    closed: watch::Receiver<bool>,
    pump: Option<JoinHandle<()>>,
}

impl StreamChannel {
    /// Wrap a reader and writer. Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let listeners = Arc::new(Listeners::new());
        let (closed_tx, closed_rx) = watch::channel(false);
        let pump = tokio::spawn(Self::pump(reader, listeners.clone(), closed_tx));

        Self {
            writer: Mutex::new(Box::new(writer)),
            listeners,
            closed: closed_rx,
            pump: Some(pump),
        }
    }

    /// Channel over this process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    async fn pump<R>(mut reader: R, listeners: Arc<Listeners>, closed: watch::Sender<bool>)
    where
        R: AsyncRead + Unpin,
    {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(message)) => {
                    listeners.dispatch(&message);
                }
                Ok(None) => {
                    tracing::debug!("stream channel reached end of stream");
                    break;
                }
                // The whole frame was consumed, so the stream is still aligned.
                Err(ChannelError::Codec(e)) => {
                    tracing::warn!(error = %e, "skipping undecodable frame");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stream channel read failed");
                    break;
                }
            }
        }
        listeners.clear();
        let _ = closed.send(true);
    }

    /// Whether the inbound side has stopped.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve once the inbound side has stopped.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[async_trait]
impl DuplexChannel for StreamChannel {
    async fn send(&self, message: Message) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match write_frame(&mut *writer, &message).await {
            Err(ChannelError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                Err(ChannelError::Closed)
            }
            other => other,
        }
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }
}

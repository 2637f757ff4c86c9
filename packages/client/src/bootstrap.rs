//! Starting the privileged process.
//!
//! The proxy runs as a child process and speaks the stream protocol over its
//! stdin and stdout. Its stderr is left attached to ours for logs.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::{Child, Command};
use trustbridge_channel::{ChannelError, ChannelStatus, DuplexChannel, StreamChannel};

/// A running proxy process and the channel to it.
///
/// The process is killed when this handle is dropped.
pub struct ProxyProcess {
    child: Child,
    channel: Arc<StreamChannel>,
}

impl ProxyProcess {
    /// Start `program` with `args` and connect to it.
    ///
    /// Spawn failures are reported as [`ChannelError::Open`] with the status
    /// that best describes them. Must be called from within a tokio runtime.
    pub fn spawn<I, S>(program: &Path, args: I) -> Result<Self, ChannelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let status = ChannelStatus::from_io_error(&e);
                tracing::warn!(program = %program.display(), error = %e, %status, "proxy could not be started");
                ChannelError::Open(status)
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ChannelError::Open(ChannelStatus::ServiceUnavailable));
        };
        tracing::info!(pid = child.id(), program = %program.display(), "proxy started");

        Ok(Self {
            child,
            channel: Arc::new(StreamChannel::new(stdout, stdin)),
        })
    }

    pub fn channel(&self) -> Arc<dyn DuplexChannel> {
        self.channel.clone()
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the proxy has stopped talking.
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Kill the proxy and wait for it to exit.
    pub async fn shutdown(mut self) -> std::io::Result<()> {
        self.child.kill().await?;
        tracing::info!("proxy stopped");
        Ok(())
    }
}

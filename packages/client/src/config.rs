//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// How long a call waits for its response by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`BridgeClient`](crate::BridgeClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hard deadline for a single call, measured from the send.
    pub timeout: Duration,

    /// Directory `*_from_file` calls resolve their paths against.
    pub content_root: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            content_root: installed_content_root(),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_content_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.content_root = Some(root.into());
        self
    }
}

/// The directory holding the running executable.
fn installed_content_root() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.content_root.is_some());
    }

    #[test]
    fn builders() {
        let config = ClientConfig::default()
            .with_timeout(Duration::from_millis(50))
            .with_content_root("/srv/snippets");
        assert_eq!(config.timeout, Duration::from_millis(50));
        assert_eq!(config.content_root, Some(PathBuf::from("/srv/snippets")));
    }
}

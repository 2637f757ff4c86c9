//! Collaborators supplied by the process hosting the engine.
//!
//! The engine never owns a UI surface or a process table. Whatever must run
//! on the UI thread goes through a [`UiDispatcher`]; programs are started by
//! a [`ProgramLauncher`] and their windows renamed by a [`WindowLabeler`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{EngineError, Result};

/// A unit of work handed to a [`UiDispatcher`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs on the thread that owns the host's UI surface.
pub trait UiDispatcher: Send + Sync {
    /// Queue `job`. It must run exactly once.
    fn dispatch(&self, job: Job);
}

/// Starts a compiled program as a new process.
pub trait ProgramLauncher: Send + Sync {
    /// Launch the program stored at `artifact`. Returns the new process id.
    fn launch(&self, artifact: &Path) -> Result<u32>;
}

/// Renames the primary window of a launched program.
pub trait WindowLabeler: Send + Sync {
    /// Best effort: returns false when the process has no window (yet).
    fn relabel(&self, pid: u32, label: &str) -> bool;
}

/// Launches programs by running `<program> run <artifact>`.
#[derive(Debug, Clone)]
pub struct RunnerLauncher {
    program: Option<PathBuf>,
}

impl RunnerLauncher {
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }
}

impl ProgramLauncher for RunnerLauncher {
    fn launch(&self, artifact: &Path) -> Result<u32> {
        let program = self.program.as_ref().ok_or(EngineError::NoRunner)?;
        let child = tokio::process::Command::new(program)
            .arg("run")
            .arg(artifact)
            .stdin(Stdio::null())
            // Our stdout may be the channel.
            .stdout(Stdio::null())
            .spawn()
            .map_err(EngineError::Launch)?;
        let pid = child.id().unwrap_or_default();
        tracing::info!(pid, program = %program.display(), artifact = %artifact.display(), "program launched");
        Ok(pid)
    }
}

/// Labeler for hosts without windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWindows;

impl WindowLabeler for NoWindows {
    fn relabel(&self, pid: u32, label: &str) -> bool {
        tracing::debug!(pid, label, "no window to relabel");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_without_runner() {
        let launcher = RunnerLauncher::new(None);
        assert!(matches!(
            launcher.launch(Path::new("program.tbp")),
            Err(EngineError::NoRunner)
        ));
    }

    #[tokio::test]
    async fn missing_runner_is_a_launch_error() {
        let launcher = RunnerLauncher::new(Some(PathBuf::from("/nonexistent/trustbridge-runner")));
        assert!(matches!(
            launcher.launch(Path::new("program.tbp")),
            Err(EngineError::Launch(_))
        ));
    }

    #[test]
    fn no_windows_never_relabels() {
        assert!(!NoWindows.relabel(1, "x"));
    }
}

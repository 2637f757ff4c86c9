//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Namespaces every script imports.
pub const DEFAULT_USINGS: &[&str] = &[
    "System",
    "System.Text",
    "System.Linq",
    "System.Threading.Tasks",
    "System.Collections.Generic",
];

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory every script switches to before its own code runs.
    pub working_dir: Option<PathBuf>,

    /// Where compiled MainProgram artifacts are written.
    pub artifact_dir: PathBuf,

    /// Imports merged into every script's own.
    pub default_usings: Vec<String>,

    /// Libraries loaded for every script.
    pub default_references: Vec<PathBuf>,

    /// Pause between launching a program and relabeling its window.
    pub settle_delay: Duration,

    /// Label given to launched programs' windows.
    pub display_name: String,

    /// Statements a script may execute before it is aborted.
    pub step_budget: Option<u64>,

    /// Executable invoked as `<runner> run <artifact>` to launch programs.
    pub runner: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().ok(),
            artifact_dir: default_artifact_dir(),
            default_usings: DEFAULT_USINGS.iter().map(|s| s.to_string()).collect(),
            default_references: Vec::new(),
            settle_delay: Duration::from_millis(100),
            display_name: "TrustBridge Program".to_string(),
            step_budget: None,
            runner: std::env::current_exe().ok(),
        }
    }
}

/// `<user cache dir>/trustbridge/programs`, or the same under the temp dir.
pub fn default_artifact_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("trustbridge")
        .join("programs")
}

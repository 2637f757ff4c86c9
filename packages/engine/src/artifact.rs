//! MainProgram artifacts.
//!
//! A program that compiled is written to disk as a JSON artifact and started
//! in its own process, which compiles it again and calls `Main`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trustbridge_script::{compile, CompileOptions, CompiledUnit, RunLimits, RunOutcome, UnitKind, Value};
use uuid::Uuid;

use crate::diagnostics::normalize;
use crate::error::{EngineError, Result};

/// File extension of program artifacts.
pub const ARTIFACT_EXTENSION: &str = "tbp";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramArtifact {
    pub version: u32,
    pub source: String,
    pub usings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    pub display_name: String,
}

impl ProgramArtifact {
    pub fn new(source: impl Into<String>, usings: Vec<String>, display_name: impl Into<String>) -> Self {
        Self {
            version: FORMAT_VERSION,
            source: source.into(),
            usings,
            working_dir: None,
            display_name: display_name.into(),
        }
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Write to a fresh `MainProgram-<uuid>.tbp` file in `dir`, creating
    /// `dir` if needed.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("MainProgram-{}.{}", Uuid::new_v4(), ARTIFACT_EXTENSION));
        let artifact_error = |source| EngineError::Artifact {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(artifact_error)?;
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, bytes).map_err(artifact_error)?;
        tracing::debug!(path = %path.display(), "program artifact written");
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| EngineError::Artifact {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read and delete. Each artifact is launched exactly once, so the
    /// launched process takes it off the disk.
    pub fn take(path: &Path) -> Result<Self> {
        let artifact = Self::read(path);
        if let Err(error) = std::fs::remove_file(path) {
            tracing::warn!(%error, path = %path.display(), "program artifact not removed");
        }
        artifact
    }

    pub fn compile(&self) -> Result<CompiledUnit> {
        let options = CompileOptions::default().with_imports(self.usings.iter().cloned());
        let compilation = compile(&self.source, UnitKind::Program, &options);
        compilation
            .unit
            .ok_or_else(|| EngineError::Compilation(normalize(&compilation.diagnostics)))
    }

    /// Compile and call `Main`, from the artifact's working directory.
    pub fn run(&self, limits: &RunLimits) -> Result<RunOutcome> {
        let unit = self.compile()?;
        if let Some(dir) = &self.working_dir {
            std::env::set_current_dir(dir).map_err(|source| EngineError::Artifact {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(unit.run(None, limits))
    }
}

/// Process exit code for the value `Main` returned.
pub fn exit_code(value: &Value) -> i32 {
    match value {
        Value::Int32(code) => *code,
        _ => 0,
    }
}

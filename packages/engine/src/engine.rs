//! The execution engine.
//!
//! ```text
//!  ExecutionRequest
//!        │
//!        ├── Script ──▶ libraries ─▶ declare ─▶ compile ─▶ populate ─▶ run ─▶ convert ─▶ serialize
//!        │
//!        └── MainProgram ──▶ compile ─▶ artifact ─▶ launch ─▶ settle ─▶ relabel
//!        │
//!        ▼
//!  ExecutionResult
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::Instrument;
use trustbridge_model::{
    CompilationResult, Diagnostic, ErrorDescriptor, ExecutionRequest, ExecutionResult, ProgramKind,
};
use trustbridge_script::{
    codes, compile, load_library, parse, resolve_type_name, CompileOptions, CompiledUnit, Library,
    LibraryError, RunLimits, RunOutcome, RuntimeError, ScriptDiagnostic, UnitKind, Value,
};

use crate::artifact::ProgramArtifact;
use crate::carrier;
use crate::config::EngineConfig;
use crate::diagnostics::{normalize, normalize_one};
use crate::error::CarrierError;
use crate::host::{NoWindows, ProgramLauncher, RunnerLauncher, UiDispatcher, WindowLabeler};

/// Compiles and runs execution requests.
///
/// One engine serves every request of a privileged process. Libraries
/// loaded from reference paths are kept for the engine's lifetime.
pub struct ExecutionEngine {
    config: EngineConfig,
    dispatcher: Option<Arc<dyn UiDispatcher>>,
    launcher: Arc<dyn ProgramLauncher>,
    labeler: Arc<dyn WindowLabeler>,
    references: Mutex<HashMap<PathBuf, Arc<Library>>>,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let launcher = Arc::new(RunnerLauncher::new(config.runner.clone()));
        Self {
            config,
            dispatcher: None,
            launcher,
            labeler: Arc::new(NoWindows),
            references: Mutex::new(HashMap::new()),
        }
    }

    /// Run scripts through `dispatcher` instead of the blocking pool.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn UiDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProgramLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_labeler(mut self, labeler: Arc<dyn WindowLabeler>) -> Self {
        self.labeler = labeler;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle one request. Every failure is reported inside the result.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let call_id = request.call_id;
        let span = tracing::info_span!(
            "execute",
            call_id = %call_id.map(|id| id.to_string()).unwrap_or_default(),
            kind = %request.kind
        );

        async move {
            tracing::info!("request received");
            let result = match request.kind {
                ProgramKind::Script => self.execute_script(request).await,
                ProgramKind::MainProgram => self.execute_main_program(request).await,
            };
            tracing::info!(
                compiled = result.compiled_successfully(),
                success = result.success(),
                "request finished"
            );
            result.with_call_id(call_id)
        }
        .instrument(span)
        .await
    }

    async fn execute_script(&self, request: ExecutionRequest) -> ExecutionResult {
        let libraries = match self.libraries(&request.references) {
            Ok(libraries) => libraries,
            Err(diagnostics) => {
                return ExecutionResult::compiled(CompilationResult::from_diagnostics(diagnostics))
            }
        };

        let declared = if request.parameters.is_empty() {
            None
        } else {
            match carrier::declare(&request.parameters, &libraries) {
                Ok(declared) => Some(declared),
                Err(error) => return self.undeclarable(request.code, error).await,
            }
        };

        let mut options = CompileOptions {
            libraries: libraries.clone(),
            ..CompileOptions::default()
        }
        .with_imports(merge(&self.config.default_usings, &request.usings));
        if let Some(prelude) = self.prelude() {
            options = options.with_prelude(prelude);
        }
        if let Some(declared) = &declared {
            options = options.with_globals(declared.ty().clone());
        }

        let code = request.code;
        let compilation = match blocking(move || compile(&code, UnitKind::Script, &options)).await {
            Ok(compilation) => compilation,
            Err(error) => return ExecutionResult::failed(error),
        };
        let result = ExecutionResult::compiled(CompilationResult::from_diagnostics(normalize(
            &compilation.diagnostics,
        )));
        let Some(unit) = compilation.unit else {
            tracing::debug!("script did not compile");
            return result;
        };

        let globals = match declared.map(|declared| declared.populate(&request.parameters)) {
            None => None,
            Some(Ok(carrier)) => Some(carrier.into_parts().1),
            Some(Err(error)) => return result.with_error(carrier_error(error)),
        };

        let value = match self.run(unit, globals).await {
            Ok(value) => value,
            Err(error) => return result.with_error(error),
        };

        match request.return_type_name.as_deref().filter(|name| !name.is_empty()) {
            None => result,
            Some(type_name) => match serialize_as(value, type_name, &libraries) {
                Ok(payload) => result.with_value(type_name, payload),
                Err(error) => result.with_error(error),
            },
        }
    }

    /// A script whose parameters could not be declared. Syntax errors still
    /// take precedence over the declaration failure.
    async fn undeclarable(&self, code: String, error: CarrierError) -> ExecutionResult {
        tracing::debug!(%error, "carrier not declared");
        let diagnostics = match blocking(move || parse(&code).1).await {
            Ok(diagnostics) => diagnostics,
            Err(error) => return ExecutionResult::failed(error),
        };
        let result = ExecutionResult::compiled(CompilationResult::from_diagnostics(normalize(
            &diagnostics,
        )));
        if diagnostics.iter().any(ScriptDiagnostic::is_error) {
            return result;
        }
        result.with_error(carrier_error(error))
    }

    async fn execute_main_program(&self, request: ExecutionRequest) -> ExecutionResult {
        let options = CompileOptions::default().with_imports(self.config.default_usings.iter().cloned());
        let code = request.code.clone();
        let compilation = match blocking(move || compile(&code, UnitKind::Program, &options)).await {
            Ok(compilation) => compilation,
            Err(error) => return ExecutionResult::failed(error),
        };
        let result = ExecutionResult::compiled(CompilationResult::from_diagnostics(normalize(
            &compilation.diagnostics,
        )));
        if compilation.unit.is_none() {
            tracing::debug!("program did not compile");
            return result;
        }

        let artifact = ProgramArtifact::new(
            request.code,
            self.config.default_usings.clone(),
            self.config.display_name.clone(),
        )
        .with_working_dir(self.config.working_dir.clone());

        let launched = artifact.write_to(&self.config.artifact_dir).and_then(|path| {
            self.launcher.launch(&path).inspect_err(|_| {
                if let Err(error) = std::fs::remove_file(&path) {
                    tracing::debug!(%error, path = %path.display(), "artifact not removed");
                }
            })
        });
        let pid = match launched {
            Ok(pid) => pid,
            Err(error) => {
                tracing::warn!(%error, "program launch failed");
                return result.with_error(ErrorDescriptor::execution(error.to_string()));
            }
        };

        tokio::time::sleep(self.config.settle_delay).await;
        if !self.labeler.relabel(pid, &self.config.display_name) {
            tracing::debug!(pid, "program window not relabeled");
        }
        result
    }

    /// Standard library, default references and `references`, in that
    /// order. Failures come back as diagnostics.
    fn libraries(&self, references: &[String]) -> Result<Vec<Arc<Library>>, Vec<Diagnostic>> {
        let mut libraries = vec![Library::standard()];
        let mut diagnostics = Vec::new();

        let paths = self
            .config
            .default_references
            .iter()
            .cloned()
            .chain(references.iter().map(|r| self.resolve_reference(r)));
        for path in paths {
            match self.reference(&path, &libraries) {
                Ok(library) => {
                    if !libraries.iter().any(|l| Arc::ptr_eq(l, &library)) {
                        libraries.push(library);
                    }
                }
                Err(mut errors) => diagnostics.append(&mut errors),
            }
        }

        if diagnostics.is_empty() {
            Ok(libraries)
        } else {
            Err(diagnostics)
        }
    }

    fn resolve_reference(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        match &self.config.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn reference(&self, path: &Path, loaded: &[Arc<Library>]) -> Result<Arc<Library>, Vec<Diagnostic>> {
        let canonical = path.canonicalize().map_err(|e| {
            vec![Diagnostic::error(
                codes::LIBRARY_NOT_FOUND,
                format!("library '{}' could not be found: {}", path.display(), e),
            )]
        })?;

        let mut cache = self.references.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(library) = cache.get(&canonical) {
            return Ok(library.clone());
        }

        let library = load_library(&canonical, loaded).map_err(library_diagnostics)?;
        tracing::info!(path = %canonical.display(), namespace = library.name(), "library loaded");
        let library = Arc::new(library);
        cache.insert(canonical, library.clone());
        Ok(library)
    }

    fn prelude(&self) -> Option<String> {
        let dir = self.config.working_dir.as_ref()?;
        let dir = dir.to_string_lossy().replace('"', "\"\"");
        Some(format!("System.IO.Directory.SetCurrentDirectory(@\"{}\");", dir))
    }
}

/// Run CPU-bound front-end work off the async threads.
async fn blocking<T, F>(job: F) -> Result<T, ErrorDescriptor>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ErrorDescriptor::execution("compiler panicked").with_detail(e.to_string()))
}

fn merge(defaults: &[String], extra: &[String]) -> Vec<String> {
    let mut merged = defaults.to_vec();
    for item in extra {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}

fn serialize_as(value: Value, type_name: &str, libraries: &[Arc<Library>]) -> Result<String, ErrorDescriptor> {
    let ty = resolve_type_name(libraries, type_name)
        .ok_or_else(|| ErrorDescriptor::type_resolution(type_name))?;
    let converted = value
        .convert(&ty)
        .map_err(|e| ErrorDescriptor::execution(e.to_string()))?;
    let json = converted
        .to_json()
        .map_err(|e| ErrorDescriptor::execution(e.to_string()))?;
    serde_json::to_string(&json).map_err(|e| ErrorDescriptor::execution(e.to_string()))
}

fn runtime_error(error: RuntimeError) -> ErrorDescriptor {
    let detail = match error.line {
        Some(line) => format!("{} at line {}", error.kind, line),
        None => error.kind.to_string(),
    };
    ErrorDescriptor::execution(error.message).with_detail(detail)
}

fn carrier_error(error: CarrierError) -> ErrorDescriptor {
    match error {
        CarrierError::UnknownType { type_name } => ErrorDescriptor::type_resolution(type_name),
        other => ErrorDescriptor::execution(other.to_string()),
    }
}

fn library_diagnostics(error: LibraryError) -> Vec<Diagnostic> {
    match error {
        LibraryError::Io { path, source } => vec![Diagnostic::error(
            codes::LIBRARY_NOT_FOUND,
            format!("library '{}' could not be read: {}", path.display(), source),
        )],
        LibraryError::Invalid { path, diagnostics } => {
            let mut normalized = vec![Diagnostic::error(
                codes::LIBRARY_INVALID,
                format!("library '{}' does not compile", path.display()),
            )];
            normalized.extend(diagnostics.iter().filter(|d| d.is_error()).map(normalize_one));
            normalized
        }
    }
}

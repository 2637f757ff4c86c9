use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use trustbridge_engine::{
    EngineConfig, EngineError, ExecutionEngine, Job, ProgramArtifact, ProgramLauncher, UiDispatcher,
    WindowLabeler,
};
use trustbridge_model::{CallId, DiagnosticKind, ErrorKind, ExecutionRequest, Parameter};

fn engine() -> ExecutionEngine {
    ExecutionEngine::new(EngineConfig {
        working_dir: None,
        ..EngineConfig::default()
    })
}

#[tokio::test]
async fn script_with_parameters_returns_serialized_value() {
    let call_id = CallId::new();
    let request = ExecutionRequest::script("return a + b;")
        .with_call_id(call_id)
        .with_parameter(Parameter::new("a", "System.Int32", "2"))
        .with_parameter(Parameter::new("b", "System.Int32", "3"))
        .with_return_type("System.Int32");

    let result = engine().execute(request).await;

    assert_eq!(result.call_id, Some(call_id));
    assert!(result.compiled_successfully());
    assert!(result.success(), "unexpected error: {:?}", result.execution_error);
    assert_eq!(result.return_type_name.as_deref(), Some("System.Int32"));
    assert_eq!(result.serialized_result.as_deref(), Some("5"));
}

#[tokio::test]
async fn script_without_return_type_has_no_payload() {
    let result = engine()
        .execute(ExecutionRequest::script("Console.WriteLine(\"side effect\");"))
        .await;
    assert!(result.compiled_successfully());
    assert!(result.success());
    assert!(result.serialized_result.is_none());
    assert!(!result.has_return_type());
}

#[tokio::test]
async fn array_and_string_parameters() {
    let request = ExecutionRequest::script("String.Join(sep, names).ToUpper()")
        .with_parameter(Parameter::new("names", "System.String[]", r#"["ada","grace"]"#))
        .with_parameter(Parameter::new("sep", "string", r#"", ""#))
        .with_return_type("System.String");

    let result = engine().execute(request).await;
    assert!(result.success(), "{:?}", result);
    assert_eq!(result.serialized_result.as_deref(), Some(r#""ADA, GRACE""#));
}

#[tokio::test]
async fn compile_errors_are_not_execution_errors() {
    let result = engine().execute(ExecutionRequest::script("return (1 + ;")).await;

    let compilation = result.compilation_result.as_ref().unwrap();
    assert!(!compilation.success);
    assert!(!compilation.diagnostics.is_empty());
    assert!(result.execution_error.is_none());
    assert!(result.serialized_result.is_none());
}

#[tokio::test]
async fn errors_are_listed_before_warnings() {
    let result = engine()
        .execute(ExecutionRequest::script("int unused = 1;\nvar x = missing;"))
        .await;

    let diagnostics = &result.compilation_result.unwrap().diagnostics;
    assert_eq!(diagnostics[0].kind, DiagnosticKind::Error);
    assert!(diagnostics[0].description.starts_with("(2,"));
    let first_warning = diagnostics
        .iter()
        .position(|d| d.kind == DiagnosticKind::Warning)
        .unwrap();
    assert!(diagnostics[first_warning..]
        .iter()
        .all(|d| d.kind == DiagnosticKind::Warning));
}

#[tokio::test]
async fn unknown_parameter_type_is_a_type_resolution_error() {
    let request = ExecutionRequest::script("return 1;")
        .with_parameter(Parameter::new("w", "Acme.Widget", "{}"));

    let result = engine().execute(request).await;

    assert!(result.compiled_successfully());
    let error = result.execution_error.unwrap();
    assert_eq!(error.kind, ErrorKind::TypeResolution);
    assert_eq!(error.type_name.as_deref(), Some("Acme.Widget"));
}

#[tokio::test]
async fn syntax_errors_outrank_an_unknown_parameter_type() {
    let request = ExecutionRequest::script("this does not parse")
        .with_parameter(Parameter::new("w", "Acme.Widget", "{}"));

    let result = engine().execute(request).await;

    assert!(!result.compiled_successfully());
    assert!(result.execution_error.is_none());
}

#[tokio::test]
async fn compile_errors_outrank_a_bad_parameter_value() {
    let request = ExecutionRequest::script("this does not parse")
        .with_parameter(Parameter::new("a", "System.Int32", "\"oops\""));

    let result = engine().execute(request).await;

    assert!(!result.compiled_successfully());
    assert!(result.execution_error.is_none());
}

#[tokio::test]
async fn bad_parameter_value_fails_after_compiling() {
    let request = ExecutionRequest::script("return a;")
        .with_parameter(Parameter::new("a", "System.Int32", "\"oops\""))
        .with_return_type("int");

    let result = engine().execute(request).await;

    assert!(result.compiled_successfully());
    assert_eq!(result.execution_error.unwrap().kind, ErrorKind::Execution);
}

#[tokio::test]
async fn deeply_nested_script_is_a_compile_error() {
    let depth = 3000;
    let code = format!("return {}1{};", "(".repeat(depth), ")".repeat(depth));

    let result = engine()
        .execute(ExecutionRequest::script(code).with_return_type("int"))
        .await;

    assert!(!result.compiled_successfully());
    assert!(result.execution_error.is_none());
    let diagnostics = result.compilation_result.unwrap().diagnostics;
    assert_eq!(diagnostics[0].code, trustbridge_script::codes::NESTING_TOO_DEEP);
}

#[tokio::test]
async fn unknown_return_type_is_a_type_resolution_error() {
    let result = engine()
        .execute(ExecutionRequest::script("return 1;").with_return_type("Acme.Widget"))
        .await;
    assert!(result.compiled_successfully());
    assert_eq!(result.execution_error.unwrap().kind, ErrorKind::TypeResolution);
}

#[tokio::test]
async fn runtime_failure_is_an_execution_error() {
    let result = engine()
        .execute(ExecutionRequest::script("int zero = 0;\nreturn 10 / zero;").with_return_type("int"))
        .await;

    assert!(result.compiled_successfully());
    let error = result.execution_error.unwrap();
    assert_eq!(error.kind, ErrorKind::Execution);
    assert_eq!(error.detail.as_deref(), Some("DivideByZero at line 2"));
    assert!(result.serialized_result.is_none());
}

#[tokio::test]
async fn step_budget_aborts_runaway_scripts() {
    let engine = ExecutionEngine::new(EngineConfig {
        working_dir: None,
        step_budget: Some(10_000),
        ..EngineConfig::default()
    });
    let result = engine
        .execute(ExecutionRequest::script("while (true) { }"))
        .await;
    assert_eq!(result.execution_error.unwrap().kind, ErrorKind::Execution);
}

#[tokio::test]
async fn referenced_libraries_provide_types_and_functions() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("geometry.tsl"),
        r#"
        namespace Shapes.Geometry;
        public struct Rect { double W; double H; }
        public static double Area(Rect r) { return r.W * r.H; }
        "#,
    )
    .unwrap();

    let engine = ExecutionEngine::new(EngineConfig {
        working_dir: None,
        ..EngineConfig::default()
    });
    let reference = dir.path().join("geometry.tsl");
    let request = ExecutionRequest::script("Area(r)")
        .with_reference(reference.to_string_lossy())
        .with_using("Shapes.Geometry")
        .with_parameter(Parameter::new("r", "Shapes.Geometry.Rect", r#"{"W":2,"H":3.5}"#))
        .with_return_type("System.Double");

    let result = engine.execute(request.clone()).await;
    assert!(result.success(), "{:?}", result);
    assert_eq!(result.serialized_result.as_deref(), Some("7.0"));

    // Loaded once, served from cache afterwards.
    let again = engine.execute(request).await;
    assert_eq!(again.serialized_result.as_deref(), Some("7.0"));
}

#[tokio::test]
async fn missing_reference_fails_compilation() {
    let result = engine()
        .execute(ExecutionRequest::script("return 1;").with_reference("/nonexistent/lib.tsl"))
        .await;

    let compilation = result.compilation_result.unwrap();
    assert!(!compilation.success);
    assert_eq!(compilation.diagnostics[0].code, "E3001");
    assert!(result.execution_error.is_none());
}

#[tokio::test]
async fn scripts_run_in_the_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let expected = dir.path().canonicalize().unwrap();
    let engine = ExecutionEngine::new(EngineConfig {
        working_dir: Some(expected.clone()),
        ..EngineConfig::default()
    });

    let result = engine
        .execute(
            ExecutionRequest::script("System.IO.Directory.GetCurrentDirectory()")
                .with_return_type("string"),
        )
        .await;
    let payload: String = serde_json::from_str(result.serialized_result.as_deref().unwrap()).unwrap();
    assert_eq!(PathBuf::from(payload), expected);
}

struct InlineDispatcher {
    jobs: Mutex<usize>,
}

impl UiDispatcher for InlineDispatcher {
    fn dispatch(&self, job: Job) {
        *self.jobs.lock().unwrap() += 1;
        std::thread::spawn(job);
    }
}

#[tokio::test]
async fn scripts_go_through_the_dispatcher() {
    let dispatcher = Arc::new(InlineDispatcher { jobs: Mutex::new(0) });
    let engine = engine().with_dispatcher(dispatcher.clone());

    let result = engine
        .execute(ExecutionRequest::script("6 * 7").with_return_type("int"))
        .await;
    assert_eq!(result.serialized_result.as_deref(), Some("42"));
    assert_eq!(*dispatcher.jobs.lock().unwrap(), 1);
}

#[derive(Default)]
struct RecordingLauncher {
    launched: Mutex<Vec<PathBuf>>,
}

impl ProgramLauncher for RecordingLauncher {
    fn launch(&self, artifact: &Path) -> trustbridge_engine::Result<u32> {
        self.launched.lock().unwrap().push(artifact.to_path_buf());
        Ok(4242)
    }
}

#[derive(Default)]
struct RecordingLabeler {
    labels: Mutex<Vec<(u32, String)>>,
}

impl WindowLabeler for RecordingLabeler {
    fn relabel(&self, pid: u32, label: &str) -> bool {
        self.labels.lock().unwrap().push((pid, label.to_string()));
        true
    }
}

fn program_engine(
    artifact_dir: &Path,
) -> (ExecutionEngine, Arc<RecordingLauncher>, Arc<RecordingLabeler>) {
    let launcher = Arc::new(RecordingLauncher::default());
    let labeler = Arc::new(RecordingLabeler::default());
    let engine = ExecutionEngine::new(EngineConfig {
        working_dir: None,
        artifact_dir: artifact_dir.to_path_buf(),
        settle_delay: Duration::from_millis(1),
        display_name: "Test Program".to_string(),
        ..EngineConfig::default()
    })
    .with_launcher(launcher.clone())
    .with_labeler(labeler.clone());
    (engine, launcher, labeler)
}

#[tokio::test]
async fn main_program_is_written_launched_and_labeled() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, launcher, labeler) = program_engine(dir.path());
    let source = "static int Main() { Console.WriteLine(\"hi\"); return 0; }";

    let result = engine.execute(ExecutionRequest::main_program(source)).await;

    assert!(result.compiled_successfully());
    assert!(result.success(), "{:?}", result.execution_error);
    assert!(result.serialized_result.is_none());

    let launched = launcher.launched.lock().unwrap().clone();
    assert_eq!(launched.len(), 1);
    assert!(launched[0].starts_with(dir.path()));
    let artifact = ProgramArtifact::read(&launched[0]).unwrap();
    assert_eq!(artifact.source, source);
    assert_eq!(artifact.display_name, "Test Program");

    assert_eq!(
        *labeler.labels.lock().unwrap(),
        vec![(4242, "Test Program".to_string())]
    );
}

#[tokio::test]
async fn main_program_that_does_not_compile_is_not_launched() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, launcher, labeler) = program_engine(dir.path());

    let result = engine
        .execute(ExecutionRequest::main_program("static void Start() { }"))
        .await;

    assert!(!result.compiled_successfully());
    assert!(launcher.launched.lock().unwrap().is_empty());
    assert!(labeler.labels.lock().unwrap().is_empty());
}

struct FailingLauncher;

impl ProgramLauncher for FailingLauncher {
    fn launch(&self, _artifact: &Path) -> trustbridge_engine::Result<u32> {
        Err(EngineError::NoRunner)
    }
}

#[tokio::test]
async fn launch_failure_is_an_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _, labeler) = program_engine(dir.path());
    let engine = engine.with_launcher(Arc::new(FailingLauncher));

    let result = engine
        .execute(ExecutionRequest::main_program("static void Main() { }"))
        .await;

    assert!(result.compiled_successfully());
    assert_eq!(result.execution_error.unwrap().kind, ErrorKind::Execution);
    assert!(labeler.labels.lock().unwrap().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

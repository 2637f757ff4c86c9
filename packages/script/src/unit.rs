//! Compiling source text into runnable units.

use std::path::PathBuf;
use std::sync::Arc;

use crate::check::{self, UnitKind};
use crate::diagnostic::{codes, ScriptDiagnostic, Span};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::interp::Machine;
use crate::ir::{FunctionTable, Stmt};
use crate::library::Library;
use crate::parser;
use crate::types::StructType;
use crate::value::Value;

/// Inputs to a compilation besides the source text.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub imports: Vec<String>,
    pub libraries: Vec<Arc<Library>>,
    pub globals: Option<Arc<StructType>>,
    pub prelude: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            imports: Vec::new(),
            libraries: vec![Library::standard()],
            globals: None,
            prelude: None,
        }
    }
}

impl CompileOptions {
    /// Namespaces imported as if by `using` directives.
    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports.extend(imports.into_iter().map(Into::into));
        self
    }

    pub fn with_library(mut self, library: Arc<Library>) -> Self {
        self.libraries.push(library);
        self
    }

    /// Fields of `globals` are visible to a script as variables.
    pub fn with_globals(mut self, globals: Arc<StructType>) -> Self {
        self.globals = Some(globals);
        self
    }

    /// Statements run before the script's own, in the same scope.
    pub fn with_prelude(mut self, prelude: impl Into<String>) -> Self {
        self.prelude = Some(prelude.into());
        self
    }
}

/// Outcome of [`compile`]. `unit` is present when no diagnostic is an error.
#[derive(Debug)]
pub struct Compilation {
    pub diagnostics: Vec<ScriptDiagnostic>,
    pub unit: Option<CompiledUnit>,
}

impl Compilation {
    pub fn succeeded(&self) -> bool {
        self.unit.is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ScriptDiagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

#[derive(Debug)]
pub struct CompiledUnit {
    kind: UnitKind,
    code: Arc<FunctionTable>,
    body: Vec<Stmt>,
    frame_size: usize,
    entry: Option<usize>,
    globals: Option<Arc<StructType>>,
}

/// Limits applied to one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    /// Statements and loop iterations allowed before the run is aborted.
    pub step_budget: Option<u64>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub result: Result<Value, RuntimeError>,
    /// Lines written to the console during the run.
    pub console: Vec<String>,
}

impl CompiledUnit {
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn globals(&self) -> Option<&Arc<StructType>> {
        self.globals.as_ref()
    }

    /// Run a script's statements, or a program's `Main`.
    ///
    /// A script compiled with globals reads its variables from `globals`,
    /// which must be an instance of that struct. Missing globals run with
    /// zero values.
    pub fn run(&self, globals: Option<&Value>, limits: &RunLimits) -> RunOutcome {
        let mut machine = Machine::new(limits.step_budget);
        let result = match self.kind {
            UnitKind::Program => match self.entry {
                Some(entry) => machine.call_function(&self.code, entry, Vec::new()),
                None => Err(RuntimeError::new(
                    RuntimeErrorKind::InvalidOperation,
                    "program has no entry point",
                )),
            },
            UnitKind::Library => Err(RuntimeError::new(
                RuntimeErrorKind::InvalidOperation,
                "a library cannot be run",
            )),
            UnitKind::Script => self
                .script_frame(globals)
                .and_then(|frame| machine.run_body(&self.code, &self.body, frame)),
        };
        RunOutcome {
            result,
            console: machine.into_console(),
        }
    }

    fn script_frame(&self, globals: Option<&Value>) -> Result<Vec<Value>, RuntimeError> {
        let mut frame = vec![Value::Void; self.frame_size];
        let Some(ty) = &self.globals else {
            return Ok(frame);
        };

        let fields = match globals {
            None => ty.fields().iter().map(|f| Value::default_for(&f.ty)).collect(),
            Some(Value::Struct(value)) if Arc::ptr_eq(&value.ty, ty) || value.ty == *ty => {
                value.fields.clone()
            }
            Some(other) => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::InvalidArgument,
                    format!("expected globals of type {}, found {}", ty.name(), other.type_name()),
                ))
            }
        };
        for (slot, value) in frame.iter_mut().zip(fields) {
            *slot = value;
        }
        Ok(frame)
    }
}

/// Parse and check `source` as a unit of `kind`.
pub fn compile(source: &str, kind: UnitKind, options: &CompileOptions) -> Compilation {
    let (unit, mut diagnostics) = parser::parse(source);

    let prelude = match (&options.prelude, kind) {
        (Some(prelude), UnitKind::Script) => {
            let (prelude, prelude_diagnostics) = parser::parse(prelude);
            diagnostics.extend(prelude_diagnostics);
            prelude.statements
        }
        _ => Vec::new(),
    };

    if diagnostics.iter().any(ScriptDiagnostic::is_error) {
        return Compilation {
            diagnostics,
            unit: None,
        };
    }

    let (lowered, checked) = check::check(
        &unit,
        &prelude,
        kind,
        &options.imports,
        options.globals.as_ref(),
        &options.libraries,
    );
    diagnostics.extend(checked);

    let failed = diagnostics.iter().any(ScriptDiagnostic::is_error);
    tracing::trace!(?kind, diagnostics = diagnostics.len(), failed, "compiled unit");
    let unit = (!failed).then(|| CompiledUnit {
        kind,
        code: Arc::new(lowered.table),
        body: lowered.body,
        frame_size: lowered.frame_size,
        entry: lowered.entry,
        globals: options.globals.clone(),
    });
    Compilation { diagnostics, unit }
}

/// Compile a library source. Its namespace comes from its `namespace`
/// declaration.
pub fn compile_library(
    source: &str,
    path: Option<PathBuf>,
    dependencies: &[Arc<Library>],
) -> Result<Library, Vec<ScriptDiagnostic>> {
    let (unit, mut diagnostics) = parser::parse(source);
    if diagnostics.iter().any(ScriptDiagnostic::is_error) {
        return Err(diagnostics);
    }

    let mut libraries = vec![Library::standard()];
    libraries.extend(dependencies.iter().cloned());
    let (lowered, checked) = check::check(&unit, &[], UnitKind::Library, &[], None, &libraries);
    diagnostics.extend(checked);
    if diagnostics.iter().any(ScriptDiagnostic::is_error) {
        return Err(diagnostics);
    }

    let Some(namespace) = lowered.namespace else {
        return Err(vec![ScriptDiagnostic::error(
            codes::LIBRARY_INVALID,
            Span::default(),
            "library declares no namespace",
        )]);
    };
    Ok(Library::scripted(
        namespace,
        path,
        lowered.types,
        Arc::new(lowered.table),
        lowered.functions,
    ))
}

/// Compile a fragment holding exactly one struct declaration, resolving
/// field types against `libraries`.
pub fn compile_struct(
    fragment: &str,
    libraries: &[Arc<Library>],
) -> Result<Arc<StructType>, Vec<ScriptDiagnostic>> {
    let (unit, mut diagnostics) = parser::parse(fragment);
    if diagnostics.iter().any(ScriptDiagnostic::is_error) {
        return Err(diagnostics);
    }
    let (ty, checked) = check::check_struct(&unit, libraries);
    diagnostics.extend(checked);
    match ty {
        Some(ty) if !diagnostics.iter().any(ScriptDiagnostic::is_error) => Ok(ty),
        _ => Err(diagnostics),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Type};

    fn run_script(source: &str) -> RunOutcome {
        let compilation = compile(source, UnitKind::Script, &CompileOptions::default().with_imports(["System"]));
        let errors: Vec<String> = compilation.errors().map(|d| d.to_string()).collect();
        let unit = compilation.unit.unwrap_or_else(|| panic!("compile failed: {:?}", errors));
        unit.run(None, &RunLimits::default())
    }

    #[test]
    fn trailing_expression_is_the_result() {
        let outcome = run_script("var x = 20;\nx * 2 + 2");
        assert_eq!(outcome.result.unwrap(), Value::Int32(42));
    }

    #[test]
    fn script_without_value_returns_void() {
        let outcome = run_script("Console.WriteLine(\"hi\");");
        assert_eq!(outcome.result.unwrap(), Value::Void);
        assert_eq!(outcome.console, vec!["hi"]);
    }

    #[test]
    fn globals_are_variables() {
        let globals = StructType::with_fields(
            "Globals",
            vec![
                Field {
                    name: "a".into(),
                    ty: Type::Int32,
                },
                Field {
                    name: "b".into(),
                    ty: Type::String,
                },
            ],
        );
        let options = CompileOptions::default().with_globals(globals.clone());
        let compilation = compile("b + a", UnitKind::Script, &options);
        let unit = compilation.unit.unwrap();

        let value = Value::Struct(crate::value::StructValue {
            ty: globals,
            fields: vec![Value::Int32(7), Value::String("n".into())],
        });
        let outcome = unit.run(Some(&value), &RunLimits::default());
        assert_eq!(outcome.result.unwrap(), Value::String("n7".into()));
    }

    #[test]
    fn prelude_runs_first() {
        let options = CompileOptions::default()
            .with_imports(["System"])
            .with_prelude("Console.WriteLine(\"first\");");
        let unit = compile("Console.WriteLine(\"second\");", UnitKind::Script, &options)
            .unit
            .unwrap();
        let outcome = unit.run(None, &RunLimits::default());
        assert_eq!(outcome.console, vec!["first", "second"]);
    }

    #[test]
    fn program_runs_main() {
        let source = "using System;\nstatic void Main() { Console.WriteLine(\"main\"); }";
        let unit = compile(source, UnitKind::Program, &CompileOptions::default())
            .unit
            .unwrap();
        let outcome = unit.run(None, &RunLimits::default());
        assert_eq!(outcome.result.unwrap(), Value::Void);
        assert_eq!(outcome.console, vec!["main"]);
    }

    #[test]
    fn step_budget_stops_loops() {
        let unit = compile("while (true) { }", UnitKind::Script, &CompileOptions::default())
            .unit
            .unwrap();
        let outcome = unit.run(
            None,
            &RunLimits {
                step_budget: Some(1_000),
            },
        );
        assert_eq!(
            outcome.result.unwrap_err().kind,
            RuntimeErrorKind::StepBudgetExhausted
        );
    }

    #[test]
    fn struct_fragment() {
        let ty = compile_struct(
            "struct Carrier { int a; string[] b; }",
            &[Library::standard()],
        )
        .unwrap();
        assert_eq!(ty.name(), "Carrier");
        assert_eq!(ty.fields().len(), 2);
        assert_eq!(ty.fields()[1].ty, Type::array_of(Type::String));

        let errors = compile_struct("struct Carrier { Widget w; }", &[Library::standard()]).unwrap_err();
        assert_eq!(errors[0].code, codes::UNKNOWN_TYPE);
    }
}

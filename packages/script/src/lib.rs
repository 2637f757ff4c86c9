//! TrustScript: a small statically typed language with C#-style syntax.
//!
//! Source is parsed into a syntax tree, checked against the standard library
//! and any referenced script libraries, lowered to a resolved form and run
//! by a tree-walking interpreter.
//!
//! ```
//! use trustbridge_script::{compile, CompileOptions, RunLimits, UnitKind, Value};
//!
//! let options = CompileOptions::default().with_imports(["System"]);
//! let unit = compile("Math.Max(3, 4) * 2", UnitKind::Script, &options)
//!     .unit
//!     .unwrap();
//! let outcome = unit.run(None, &RunLimits::default());
//! assert_eq!(outcome.result.unwrap(), Value::Int32(8));
//! ```

pub mod ast;
mod builtins;
mod check;
pub mod diagnostic;
pub mod error;
mod interp;
pub mod ir;
pub mod lexer;
pub mod library;
pub mod parser;
pub mod types;
mod unit;
pub mod value;

pub use check::UnitKind;
pub use diagnostic::{codes, ScriptDiagnostic, Severity, Span};
pub use error::{LibraryError, RuntimeError, RuntimeErrorKind, ValueError};
pub use interp::{MAX_CALL_DEPTH, MAX_EVAL_DEPTH};
pub use lexer::{is_keyword, tokenize};
pub use library::{alias, load_library, resolve_type_name, Library};
pub use parser::{parse, MAX_NESTING_DEPTH};
pub use types::{Field, StructType, Type};
pub use unit::{
    compile, compile_library, compile_struct, Compilation, CompileOptions, CompiledUnit, RunLimits,
    RunOutcome,
};
pub use value::{StructValue, Value};

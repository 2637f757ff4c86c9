//! Libraries: named collections of types and functions that units resolve
//! names against. The standard library is built in; script libraries are
//! compiled from source files given as references.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::error::{LibraryError, RuntimeError};
use crate::ir::FunctionTable;
use crate::types::Type;
use crate::value::Value;

/// Parameter and return types of one call, as decided by a native's check.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
}

pub type CheckFn = fn(&[Type]) -> Result<Signature, String>;
pub type CallFn = fn(&mut NativeContext<'_>, Vec<Value>) -> Result<Value, RuntimeError>;

/// A function implemented by the host.
///
/// `check` validates argument types at compile time; arguments reach `call`
/// already widened to the signature it returned.
pub struct NativeFunction {
    pub name: &'static str,
    pub check: CheckFn,
    pub call: CallFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "native {}", self.name)
    }
}

/// What natives can reach while a unit runs.
pub struct NativeContext<'a> {
    pub console: &'a mut Console,
}

/// Captured console output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Console {
    lines: Vec<String>,
    partial: String,
}

impl Console {
    pub fn write(&mut self, text: &str) {
        let mut parts = text.split('\n');
        if let Some(first) = parts.next() {
            self.partial.push_str(first);
        }
        for part in parts {
            self.lines.push(std::mem::take(&mut self.partial));
            self.partial.push_str(part);
        }
    }

    pub fn write_line(&mut self, text: &str) {
        self.write(text);
        self.lines.push(std::mem::take(&mut self.partial));
    }

    pub fn into_lines(mut self) -> Vec<String> {
        if !self.partial.is_empty() {
            self.lines.push(std::mem::take(&mut self.partial));
        }
        self.lines
    }
}

/// A resolved function of a library.
#[derive(Debug, Clone)]
pub enum FunctionRef {
    Native(&'static NativeFunction),
    Script(Arc<FunctionTable>, usize),
}

#[derive(Debug)]
pub struct Library {
    name: String,
    path: Option<PathBuf>,
    namespaces: BTreeSet<String>,
    types: Vec<(String, Type)>,
    natives: HashMap<&'static str, &'static NativeFunction>,
    code: Arc<FunctionTable>,
    functions: HashMap<String, usize>,
}

lazy_static! {
    static ref STANDARD: Arc<Library> = Arc::new(crate::builtins::standard_library());
}

impl Library {
    /// The built-in standard library.
    pub fn standard() -> Arc<Library> {
        STANDARD.clone()
    }

    pub(crate) fn native(
        name: impl Into<String>,
        types: Vec<(String, Type)>,
        natives: &'static [NativeFunction],
    ) -> Self {
        let namespaces = natives
            .iter()
            .filter_map(|f| {
                let mut parts: Vec<&str> = f.name.split('.').collect();
                parts.truncate(parts.len().saturating_sub(2));
                (!parts.is_empty()).then(|| parts.join("."))
            })
            .collect();

        Self {
            name: name.into(),
            path: None,
            namespaces,
            types,
            natives: natives.iter().map(|f| (f.name, f)).collect(),
            code: Arc::new(FunctionTable::default()),
            functions: HashMap::new(),
        }
    }

    pub(crate) fn scripted(
        namespace: String,
        path: Option<PathBuf>,
        types: Vec<(String, Type)>,
        code: Arc<FunctionTable>,
        functions: HashMap<String, usize>,
    ) -> Self {
        Self {
            name: namespace.clone(),
            path,
            namespaces: BTreeSet::from([namespace]),
            types,
            natives: HashMap::new(),
            code,
            functions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }

    /// Whether `namespace` or one of its children is declared here.
    pub fn declares_namespace(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|ns| {
            ns == namespace
                || ns
                    .strip_prefix(namespace)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn types(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    pub fn find_type(&self, full_name: &str) -> Option<Type> {
        self.types
            .iter()
            .find(|(name, _)| name == full_name)
            .map(|(_, ty)| ty.clone())
    }

    pub fn find_function(&self, full_name: &str) -> Option<FunctionRef> {
        if let Some(native) = self.natives.get(full_name) {
            return Some(FunctionRef::Native(*native));
        }
        self.functions
            .get(full_name)
            .map(|index| FunctionRef::Script(self.code.clone(), *index))
    }
}

/// Built-in keyword aliases for the primitive types.
pub fn alias(name: &str) -> Option<Type> {
    Some(match name {
        "int" => Type::Int32,
        "long" => Type::Int64,
        "double" => Type::Double,
        "bool" => Type::Boolean,
        "string" => Type::String,
        _ => return None,
    })
}

/// Find a type by name across `libraries`, in order.
///
/// Accepts keyword aliases and a trailing `[]`. A name without a dot also
/// matches a type whose simple name it is.
pub fn resolve_type_name(libraries: &[Arc<Library>], name: &str) -> Option<Type> {
    let name = name.trim();
    if let Some(element) = name.strip_suffix("[]") {
        return resolve_type_name(libraries, element).map(Type::array_of);
    }
    if let Some(ty) = alias(name) {
        return Some(ty);
    }
    if let Some(ty) = libraries.iter().find_map(|lib| lib.find_type(name)) {
        return Some(ty);
    }
    if name.contains('.') {
        return None;
    }
    libraries.iter().find_map(|lib| {
        lib.types()
            .find(|(full, _)| full.rsplit('.').next() == Some(name))
            .map(|(_, ty)| ty.clone())
    })
}

/// Compile the library source at `path` against `dependencies`.
pub fn load_library(path: &Path, dependencies: &[Arc<Library>]) -> Result<Library, LibraryError> {
    let source = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "compiling library");
    crate::unit::compile_library(&source, Some(path.to_path_buf()), dependencies).map_err(
        |diagnostics| LibraryError::Invalid {
            path: path.to_path_buf(),
            diagnostics,
        },
    )
}

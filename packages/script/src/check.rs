//! Name resolution, type checking and lowering to [`ir`](crate::ir).
//!
//! A name `P` used in a unit is looked up as `P`, then `N.P` for the unit's
//! own namespace `N`, then `I.P` for every imported namespace `I`. Exactly
//! one candidate must exist.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::ast::{self, AssignOp, ExprKind, Literal, StmtKind, TypeExpr, TypeExprKind};
use crate::builtins;
use crate::diagnostic::{codes, ScriptDiagnostic, Span};
use crate::ir;
use crate::library::{self, FunctionRef, Library};
use crate::parser::MAX_NESTING_DEPTH;
use crate::types::{Field, StructType, Type};
use crate::value::Value;

/// What a compilation unit is allowed to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Top-level statements, optionally ending in a value.
    Script,
    /// Declarations only, with a `Main` entry point.
    Program,
    /// A `namespace` declaration followed by declarations.
    Library,
}

pub(crate) struct Lowered {
    pub table: ir::FunctionTable,
    pub body: Vec<ir::Stmt>,
    pub frame_size: usize,
    pub entry: Option<usize>,
    pub namespace: Option<String>,
    pub types: Vec<(String, Type)>,
    pub functions: HashMap<String, usize>,
}

/// Check `unit` and lower it.
///
/// `prelude` statements run before the unit's own statements, in the same
/// scope. `globals` fields are visible to a script as variables.
pub(crate) fn check(
    unit: &ast::CompilationUnit,
    prelude: &[ast::Stmt],
    kind: UnitKind,
    imports: &[String],
    globals: Option<&Arc<StructType>>,
    libraries: &[Arc<Library>],
) -> (Lowered, Vec<ScriptDiagnostic>) {
    let mut checker = Checker::new(kind, libraries);
    checker.namespace_declaration(unit);
    for import in imports {
        checker.import(import, Span::default());
    }
    for using in &unit.usings {
        checker.import(&using.namespace, using.span);
    }

    checker.declare_structs(&unit.structs);
    let registered = checker.declare_functions(&unit.functions);
    checker.top_level_statements(unit);
    let entry = match kind {
        UnitKind::Program => checker.entry_point(),
        _ => None,
    };

    let mut table = ir::FunctionTable::default();
    for (decl, index) in unit.functions.iter().zip(registered) {
        if let Some(index) = index {
            let function = checker.lower_function(decl, index);
            table.functions.push(function);
        }
    }

    let (body, frame_size) = match kind {
        UnitKind::Script => checker.lower_script(prelude, &unit.statements, globals),
        _ => (Vec::new(), 0),
    };

    let lowered = Lowered {
        table,
        body,
        frame_size,
        entry,
        types: checker
            .type_order
            .iter()
            .filter_map(|name| {
                let ty = checker.local_types.get(name)?;
                Some((name.clone(), Type::Struct(ty.clone())))
            })
            .collect(),
        functions: checker.local_functions.clone(),
        namespace: checker.namespace.clone(),
    };
    (lowered, checker.diagnostics)
}

/// Check a unit that must consist of exactly one struct declaration.
pub(crate) fn check_struct(
    unit: &ast::CompilationUnit,
    libraries: &[Arc<Library>],
) -> (Option<Arc<StructType>>, Vec<ScriptDiagnostic>) {
    let mut checker = Checker::new(UnitKind::Library, libraries);
    if unit.structs.len() != 1
        || !unit.functions.is_empty()
        || !unit.statements.is_empty()
        || !unit.usings.is_empty()
        || unit.namespace.is_some()
    {
        checker.error(
            codes::MISPLACED_ITEM,
            Span::default(),
            "expected exactly one struct declaration",
        );
        return (None, checker.diagnostics);
    }
    checker.declare_structs(&unit.structs);
    let ty = checker
        .type_order
        .first()
        .and_then(|name| checker.local_types.get(name))
        .cloned();
    (ty, checker.diagnostics)
}

struct Signature {
    name: String,
    params: Vec<Type>,
    ret: Type,
}

enum Target {
    Local(usize),
    Library(FunctionRef),
}

#[derive(Clone)]
enum Returns {
    /// Top level of a script: any value, or none.
    Script,
    Value(Type),
}

struct Local {
    name: String,
    slot: usize,
    ty: Type,
    span: Span,
    used: bool,
}

struct Frame {
    scopes: Vec<Vec<Local>>,
    next_slot: usize,
    returns: Returns,
    loop_depth: usize,
}

impl Frame {
    fn new(returns: Returns) -> Self {
        Self {
            scopes: vec![Vec::new()],
            next_slot: 0,
            returns,
            loop_depth: 0,
        }
    }
}

type Typed = (ir::Expr, Type);

struct Checker<'a> {
    kind: UnitKind,
    libraries: &'a [Arc<Library>],
    namespace: Option<String>,
    imports: Vec<String>,
    local_types: HashMap<String, Arc<StructType>>,
    type_order: Vec<String>,
    local_functions: HashMap<String, usize>,
    signatures: Vec<Signature>,
    diagnostics: Vec<ScriptDiagnostic>,
    frame: Frame,
    depth: usize,
}

impl<'a> Checker<'a> {
    fn new(kind: UnitKind, libraries: &'a [Arc<Library>]) -> Self {
        Self {
            kind,
            libraries,
            namespace: None,
            imports: Vec::new(),
            local_types: HashMap::new(),
            type_order: Vec::new(),
            local_functions: HashMap::new(),
            signatures: Vec::new(),
            diagnostics: Vec::new(),
            frame: Frame::new(Returns::Script),
            depth: 0,
        }
    }

    fn error(&mut self, code: &'static str, span: Span, message: impl Into<String>) {
        self.diagnostics.push(ScriptDiagnostic::error(code, span, message));
    }

    fn warning(&mut self, code: &'static str, span: Span, message: impl Into<String>) {
        self.diagnostics.push(ScriptDiagnostic::warning(code, span, message));
    }

    // Declarations

    fn namespace_declaration(&mut self, unit: &ast::CompilationUnit) {
        match (&unit.namespace, self.kind) {
            (Some(ns), UnitKind::Library) => self.namespace = Some(ns.name.clone()),
            (None, UnitKind::Library) => self.error(
                codes::MISPLACED_ITEM,
                Span::new(1, 1),
                "a library must start with a namespace declaration",
            ),
            (Some(ns), _) => self.error(
                codes::MISPLACED_ITEM,
                ns.span,
                "namespace declarations are only allowed in libraries",
            ),
            (None, _) => {}
        }
    }

    fn namespace_exists(&self, namespace: &str) -> bool {
        let own = self.namespace.as_deref().is_some_and(|own| {
            own == namespace
                || own
                    .strip_prefix(namespace)
                    .is_some_and(|rest| rest.starts_with('.'))
        });
        own || self
            .libraries
            .iter()
            .any(|lib| lib.declares_namespace(namespace))
    }

    fn import(&mut self, namespace: &str, span: Span) {
        if !self.namespace_exists(namespace) {
            self.error(
                codes::UNKNOWN_NAMESPACE,
                span,
                format!(
                    "the type or namespace name '{}' could not be found (are you missing a reference?)",
                    namespace
                ),
            );
            return;
        }
        if !self.imports.iter().any(|i| i == namespace) {
            self.imports.push(namespace.to_string());
        }
    }

    fn qualify(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, name),
            None => name.to_string(),
        }
    }

    fn candidates(&self, name: &str) -> Vec<String> {
        let mut candidates = vec![name.to_string()];
        if let Some(ns) = &self.namespace {
            candidates.push(format!("{}.{}", ns, name));
        }
        for import in &self.imports {
            candidates.push(format!("{}.{}", import, name));
        }
        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert(c.clone()));
        candidates
    }

    fn declare_structs(&mut self, structs: &[ast::StructDecl]) {
        let mut declared = Vec::new();
        for decl in structs {
            let full = self.qualify(&decl.name);
            if self.local_types.contains_key(&full) {
                self.error(
                    codes::DUPLICATE_DEFINITION,
                    decl.span,
                    format!("the type '{}' is already defined", full),
                );
                continue;
            }
            self.local_types.insert(full.clone(), StructType::new(full.clone()));
            self.type_order.push(full.clone());
            declared.push((full, decl));
        }

        for (full, decl) in &declared {
            let mut fields: Vec<Field> = Vec::new();
            for field in &decl.fields {
                let ty = self.resolve_type(&field.ty);
                if ty.is_void() {
                    self.error(
                        codes::TYPE_MISMATCH,
                        field.span,
                        format!("field '{}' cannot be of type void", field.name),
                    );
                }
                if fields.iter().any(|f| f.name == field.name) {
                    self.error(
                        codes::DUPLICATE_DEFINITION,
                        field.span,
                        format!("the type '{}' already contains a definition for '{}'", full, field.name),
                    );
                    continue;
                }
                fields.push(Field {
                    name: field.name.clone(),
                    ty,
                });
            }
            if let Some(ty) = self.local_types.get(full) {
                ty.define(fields);
            }
        }

        for (full, decl) in &declared {
            let Some(ty) = self.local_types.get(full).cloned() else {
                continue;
            };
            if let Some(field) = cycle_through(full, &ty, &mut HashSet::new()) {
                self.error(
                    codes::RECURSIVE_STRUCT,
                    decl.span,
                    format!(
                        "struct member '{}.{}' causes a cycle in the struct layout",
                        full, field
                    ),
                );
            }
        }
    }

    fn declare_functions(&mut self, functions: &[ast::FunctionDecl]) -> Vec<Option<usize>> {
        let mut registered = Vec::new();
        for decl in functions {
            let full = self.qualify(&decl.name);
            if self.local_functions.contains_key(&full) {
                self.error(
                    codes::DUPLICATE_DEFINITION,
                    decl.span,
                    format!("a function named '{}' is already defined", full),
                );
                registered.push(None);
                continue;
            }

            let mut params = Vec::new();
            let mut names = HashSet::new();
            for param in &decl.params {
                let ty = self.resolve_type(&param.ty);
                if ty.is_void() {
                    self.error(
                        codes::TYPE_MISMATCH,
                        param.span,
                        format!("parameter '{}' cannot be of type void", param.name),
                    );
                }
                if !names.insert(param.name.as_str()) {
                    self.error(
                        codes::DUPLICATE_DEFINITION,
                        param.span,
                        format!("the parameter name '{}' is a duplicate", param.name),
                    );
                }
                params.push(ty);
            }
            let ret = self.resolve_type(&decl.return_type);

            let index = self.signatures.len();
            self.signatures.push(Signature {
                name: full.clone(),
                params,
                ret,
            });
            self.local_functions.insert(full, index);
            registered.push(Some(index));
        }
        registered
    }

    fn top_level_statements(&mut self, unit: &ast::CompilationUnit) {
        let what = match self.kind {
            UnitKind::Script => return,
            UnitKind::Program => "a program",
            UnitKind::Library => "a library",
        };
        if let Some(first) = unit.statements.first() {
            self.error(
                codes::MISPLACED_ITEM,
                first.span,
                format!("top-level statements are not allowed in {}", what),
            );
        }
    }

    fn entry_point(&mut self) -> Option<usize> {
        let Some(&index) = self.local_functions.get("Main") else {
            self.error(
                codes::MISSING_MAIN,
                Span::default(),
                "program does not contain a 'Main' function suitable for an entry point",
            );
            return None;
        };
        let sig = &self.signatures[index];
        let suitable = sig.params.is_empty() && matches!(sig.ret, Type::Void | Type::Int32);
        if !suitable {
            self.error(
                codes::MISSING_MAIN,
                Span::default(),
                "'Main' must take no parameters and return void or int",
            );
            return None;
        }
        Some(index)
    }

    // Resolution

    fn resolve_type(&mut self, ty: &TypeExpr) -> Type {
        match &ty.kind {
            TypeExprKind::Void => Type::Void,
            TypeExprKind::Array(element) => {
                let element = self.resolve_type(element);
                if element.is_void() {
                    self.error(codes::TYPE_MISMATCH, ty.span, "arrays of void are not allowed");
                    return Type::Error;
                }
                Type::array_of(element)
            }
            TypeExprKind::Named(name) => match self.lookup_type(name) {
                Ok(ty) => ty,
                Err((code, message)) => {
                    self.error(code, ty.span, message);
                    Type::Error
                }
            },
        }
    }

    fn lookup_type(&self, name: &str) -> Result<Type, (&'static str, String)> {
        if let Some(ty) = library::alias(name) {
            return Ok(ty);
        }
        let mut found: Vec<(String, Type)> = Vec::new();
        for candidate in self.candidates(name) {
            if let Some(ty) = self.local_types.get(&candidate) {
                found.push((candidate, Type::Struct(ty.clone())));
            } else if let Some(ty) = self.libraries.iter().find_map(|lib| lib.find_type(&candidate)) {
                found.push((candidate, ty));
            }
        }
        match found.len() {
            0 => Err((
                codes::UNKNOWN_TYPE,
                format!(
                    "the type or namespace name '{}' could not be found (are you missing a using directive or a reference?)",
                    name
                ),
            )),
            1 => Ok(found.remove(0).1),
            _ => Err((
                codes::AMBIGUOUS_REFERENCE,
                format!(
                    "'{}' is an ambiguous reference between '{}' and '{}'",
                    name, found[0].0, found[1].0
                ),
            )),
        }
    }

    fn lookup_function(&self, name: &str) -> Result<Target, (&'static str, String)> {
        let mut found: Vec<(String, Target)> = Vec::new();
        for candidate in self.candidates(name) {
            if let Some(index) = self.local_functions.get(&candidate) {
                found.push((candidate, Target::Local(*index)));
            } else if let Some(f) = self
                .libraries
                .iter()
                .find_map(|lib| lib.find_function(&candidate))
            {
                found.push((candidate, Target::Library(f)));
            }
        }
        match found.len() {
            0 => Err((
                codes::UNKNOWN_FUNCTION,
                format!("the name '{}' does not exist in the current context", name),
            )),
            1 => Ok(found.remove(0).1),
            _ => Err((
                codes::AMBIGUOUS_REFERENCE,
                format!(
                    "the call is ambiguous between '{}' and '{}'",
                    found[0].0, found[1].0
                ),
            )),
        }
    }

    // Frames and locals

    fn begin_frame(&mut self, returns: Returns) -> Frame {
        std::mem::replace(&mut self.frame, Frame::new(returns))
    }

    fn end_frame(&mut self, previous: Frame) -> usize {
        while !self.frame.scopes.is_empty() {
            self.pop_scope();
        }
        let size = self.frame.next_slot;
        self.frame = previous;
        size
    }

    fn push_scope(&mut self) {
        self.frame.scopes.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        let Some(scope) = self.frame.scopes.pop() else {
            return;
        };
        for local in scope.into_iter().filter(|l| !l.used) {
            self.warning(
                codes::UNUSED_VARIABLE,
                local.span,
                format!("the variable '{}' is assigned but its value is never used", local.name),
            );
        }
    }

    fn declare_local(&mut self, name: &str, ty: Type, span: Span, used: bool) -> usize {
        if self.frame.scopes.iter().flatten().any(|l| l.name == name) {
            self.error(
                codes::DUPLICATE_DEFINITION,
                span,
                format!("a local variable named '{}' is already defined in this scope", name),
            );
        }
        let slot = self.frame.next_slot;
        self.frame.next_slot += 1;
        if let Some(scope) = self.frame.scopes.last_mut() {
            scope.push(Local {
                name: name.to_string(),
                slot,
                ty,
                span,
                used,
            });
        }
        slot
    }

    fn find_local(&mut self, name: &str, mark_used: bool) -> Option<(usize, Type)> {
        let local = self
            .frame
            .scopes
            .iter_mut()
            .rev()
            .flat_map(|scope| scope.iter_mut().rev())
            .find(|l| l.name == name)?;
        if mark_used {
            local.used = true;
        }
        Some((local.slot, local.ty.clone()))
    }

    fn is_local(&self, name: &str) -> bool {
        self.frame.scopes.iter().flatten().any(|l| l.name == name)
    }

    /// A chain of names whose head is not a variable, such as `Math.Max`.
    fn is_path(&self, expr: &ast::Expr) -> bool {
        expr.dotted_path().is_some() && expr.path_head().is_some_and(|head| !self.is_local(head))
    }

    // Bodies

    fn lower_function(&mut self, decl: &ast::FunctionDecl, index: usize) -> ir::Function {
        let (name, params, ret) = {
            let sig = &self.signatures[index];
            (sig.name.clone(), sig.params.clone(), sig.ret.clone())
        };

        let previous = self.begin_frame(Returns::Value(ret.clone()));
        for (param, ty) in decl.params.iter().zip(&params) {
            self.declare_local(&param.name, ty.clone(), param.span, true);
        }
        let body = self.lower_stmts(&decl.body);
        let frame_size = self.end_frame(previous);

        ir::Function {
            name,
            params,
            ret,
            frame_size,
            body,
        }
    }

    fn lower_script(
        &mut self,
        prelude: &[ast::Stmt],
        stmts: &[ast::Stmt],
        globals: Option<&Arc<StructType>>,
    ) -> (Vec<ir::Stmt>, usize) {
        let previous = self.begin_frame(Returns::Script);
        if let Some(globals) = globals {
            for field in globals.fields() {
                self.declare_local(&field.name, field.ty.clone(), Span::default(), true);
            }
        }
        let mut body = self.lower_stmts(prelude);
        body.extend(self.lower_stmts(stmts));
        let frame_size = self.end_frame(previous);
        (body, frame_size)
    }

    fn lower_block(&mut self, stmts: &[ast::Stmt]) -> Vec<ir::Stmt> {
        self.push_scope();
        let lowered = self.lower_stmts(stmts);
        self.pop_scope();
        lowered
    }

    fn lower_stmts(&mut self, stmts: &[ast::Stmt]) -> Vec<ir::Stmt> {
        let mut lowered = Vec::with_capacity(stmts.len());
        let mut terminated = false;
        let mut warned = false;
        for stmt in stmts {
            if terminated && !warned {
                self.warning(codes::UNREACHABLE_CODE, stmt.span, "unreachable code detected");
                warned = true;
            }
            lowered.push(self.lower_stmt(stmt));
            if matches!(
                stmt.kind,
                StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue | StmtKind::Throw(_)
            ) {
                terminated = true;
            }
        }
        lowered
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt) -> ir::Stmt {
        let line = stmt.span.line;
        let kind = match &stmt.kind {
            StmtKind::VarDecl { ty, name, init } => {
                let (value, ty) = match (ty, init) {
                    (Some(ty), Some(init)) => {
                        let ty = self.resolve_type(ty);
                        self.reject_void_variable(&ty, stmt.span);
                        let value = self.lower_value(init);
                        (self.coerce(value, &ty, init.span), ty)
                    }
                    (Some(ty), None) => {
                        let ty = self.resolve_type(ty);
                        self.reject_void_variable(&ty, stmt.span);
                        (ir::Expr::Default(ty.clone()), ty)
                    }
                    (None, Some(init)) => self.lower_value(init),
                    (None, None) => (ir::Expr::Const(Value::Void), Type::Error),
                };
                let slot = self.declare_local(name, ty, stmt.span, false);
                ir::StmtKind::Let { slot, value }
            }

            StmtKind::Assign { target, op, value } => self.lower_assign(target, *op, value, stmt.span),

            StmtKind::Expr(expr) => {
                if !matches!(expr.kind, ExprKind::Call { .. } | ExprKind::NewStruct { .. }) {
                    self.error(
                        codes::INVALID_STATEMENT,
                        expr.span,
                        "only assignment, call, increment, decrement and new object expressions can be used as a statement",
                    );
                }
                let (value, _) = self.lower_expr(expr);
                ir::StmtKind::Expr(value)
            }

            StmtKind::Trailing(expr) => {
                let (value, ty) = self.lower_expr(expr);
                if ty.is_void() {
                    ir::StmtKind::Expr(value)
                } else {
                    ir::StmtKind::Return(Some(value))
                }
            }

            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.lower_condition(cond);
                let then_body = self.lower_block(then_branch);
                let else_body = match else_branch {
                    Some(stmts) => self.lower_block(stmts),
                    None => Vec::new(),
                };
                ir::StmtKind::If {
                    cond,
                    then_body,
                    else_body,
                }
            }

            StmtKind::While { cond, body } => {
                let cond = self.lower_condition(cond);
                let body = self.lower_loop_body(body);
                ir::StmtKind::Loop {
                    cond: Some(cond),
                    body,
                    step: Vec::new(),
                }
            }

            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.push_scope();
                let init = init.as_deref().map(|s| self.lower_stmt(s));
                let cond = cond.as_ref().map(|c| self.lower_condition(c));
                let step: Vec<ir::Stmt> = step.as_deref().map(|s| self.lower_stmt(s)).into_iter().collect();
                let body = self.lower_loop_body(body);
                self.pop_scope();

                let looped = ir::Stmt {
                    kind: ir::StmtKind::Loop { cond, body, step },
                    line,
                };
                ir::StmtKind::Block(init.into_iter().chain(std::iter::once(looped)).collect())
            }

            StmtKind::Foreach {
                ty,
                name,
                iterable,
                body,
            } => {
                let (iterable_ir, iterable_ty) = self.lower_value(iterable);
                let element = match &iterable_ty {
                    Type::Array(element) => (**element).clone(),
                    Type::String => Type::String,
                    Type::Error => Type::Error,
                    other => {
                        self.error(
                            codes::TYPE_MISMATCH,
                            iterable.span,
                            format!("foreach statement cannot operate on values of type '{}'", other),
                        );
                        Type::Error
                    }
                };
                let variable = match ty {
                    Some(ty) => {
                        let declared = self.resolve_type(ty);
                        if !declared.accepts(&element) {
                            self.error(
                                codes::TYPE_MISMATCH,
                                ty.span,
                                format!("cannot convert type '{}' to '{}'", element, declared),
                            );
                        }
                        declared
                    }
                    None => element,
                };

                self.push_scope();
                let slot = self.declare_local(name, variable.clone(), stmt.span, true);
                let body = self.lower_loop_body(body);
                self.pop_scope();

                ir::StmtKind::Foreach {
                    slot,
                    element: variable,
                    iterable: iterable_ir,
                    body,
                }
            }

            StmtKind::Return(value) => self.lower_return(value.as_ref(), stmt.span),

            StmtKind::Break | StmtKind::Continue => {
                if self.frame.loop_depth == 0 {
                    self.error(
                        codes::MISPLACED_JUMP,
                        stmt.span,
                        "no enclosing loop out of which to break or continue",
                    );
                }
                if matches!(stmt.kind, StmtKind::Break) {
                    ir::StmtKind::Break
                } else {
                    ir::StmtKind::Continue
                }
            }

            StmtKind::Throw(value) => {
                let (value, _) = self.lower_value(value);
                ir::StmtKind::Throw(value)
            }

            StmtKind::Block(stmts) => ir::StmtKind::Block(self.lower_block(stmts)),
        };
        ir::Stmt { kind, line }
    }

    fn reject_void_variable(&mut self, ty: &Type, span: Span) {
        if ty.is_void() {
            self.error(codes::TYPE_MISMATCH, span, "a variable cannot be of type void");
        }
    }

    fn lower_loop_body(&mut self, body: &[ast::Stmt]) -> Vec<ir::Stmt> {
        self.frame.loop_depth += 1;
        let lowered = self.lower_block(body);
        self.frame.loop_depth -= 1;
        lowered
    }

    fn lower_condition(&mut self, cond: &ast::Expr) -> ir::Expr {
        let value = self.lower_value(cond);
        self.coerce(value, &Type::Boolean, cond.span)
    }

    fn lower_return(&mut self, value: Option<&ast::Expr>, span: Span) -> ir::StmtKind {
        let returns = self.frame.returns.clone();
        match (returns, value) {
            (Returns::Script, None) => ir::StmtKind::Return(None),
            (Returns::Script, Some(value)) => {
                let (value, _) = self.lower_value(value);
                ir::StmtKind::Return(Some(value))
            }
            (Returns::Value(ret), None) => {
                if !ret.is_void() && !ret.is_error() {
                    self.error(
                        codes::RETURN_MISMATCH,
                        span,
                        format!("an object of a type convertible to '{}' is required", ret),
                    );
                }
                ir::StmtKind::Return(None)
            }
            (Returns::Value(ret), Some(value)) => {
                if ret.is_void() {
                    self.error(
                        codes::RETURN_MISMATCH,
                        value.span,
                        "a function returning void cannot return a value",
                    );
                    let (value, _) = self.lower_expr(value);
                    return ir::StmtKind::Return(Some(value));
                }
                let lowered = self.lower_value(value);
                ir::StmtKind::Return(Some(self.coerce(lowered, &ret, value.span)))
            }
        }
    }

    fn lower_assign(
        &mut self,
        target: &ast::Expr,
        op: AssignOp,
        value: &ast::Expr,
        span: Span,
    ) -> ir::StmtKind {
        let place = self.lower_place(target);
        let (rhs, rhs_ty) = self.lower_value(value);
        let Some((place, target_ty)) = place else {
            return ir::StmtKind::Expr(rhs);
        };

        let binary = match op {
            AssignOp::Assign => {
                let value = self.coerce((rhs, rhs_ty), &target_ty, value.span);
                return ir::StmtKind::Assign {
                    place,
                    op: None,
                    value,
                };
            }
            AssignOp::Add => ir::BinaryOp::Add,
            AssignOp::Sub => ir::BinaryOp::Sub,
            AssignOp::Mul => ir::BinaryOp::Mul,
            AssignOp::Div => ir::BinaryOp::Div,
            AssignOp::Rem => ir::BinaryOp::Rem,
        };

        if target_ty.is_error() || rhs_ty.is_error() {
            return ir::StmtKind::Assign {
                place,
                op: Some(binary),
                value: rhs,
            };
        }

        if binary == ir::BinaryOp::Add && target_ty == Type::String {
            return ir::StmtKind::Assign {
                place,
                op: Some(ir::BinaryOp::Concat),
                value: rhs,
            };
        }

        if !target_ty.is_numeric() || !rhs_ty.is_numeric() {
            self.error(
                codes::INVALID_OPERANDS,
                span,
                format!(
                    "operator '{}=' cannot be applied to operands of type '{}' and '{}'",
                    symbol(binary),
                    target_ty,
                    rhs_ty
                ),
            );
            return ir::StmtKind::Expr(rhs);
        }

        let value = self.coerce((rhs, rhs_ty), &target_ty, value.span);
        ir::StmtKind::Assign {
            place,
            op: Some(binary),
            value,
        }
    }

    fn lower_place(&mut self, target: &ast::Expr) -> Option<(ir::Place, Type)> {
        if !self.enter(target.span) {
            return None;
        }
        let place = self.lower_place_at_depth(target);
        self.depth -= 1;
        place
    }

    fn lower_place_at_depth(&mut self, target: &ast::Expr) -> Option<(ir::Place, Type)> {
        match &target.kind {
            ExprKind::Name(name) => match self.find_local(name, false) {
                Some((slot, ty)) => Some((
                    ir::Place {
                        slot,
                        steps: Vec::new(),
                    },
                    ty,
                )),
                None => {
                    self.error(
                        codes::UNKNOWN_NAME,
                        target.span,
                        format!("the name '{}' does not exist in the current context", name),
                    );
                    None
                }
            },
            ExprKind::Member { object, name } => {
                let (mut place, ty) = self.lower_place(object)?;
                match &ty {
                    Type::Struct(s) => match s.field(name) {
                        Some((index, field)) => {
                            let field_ty = field.ty.clone();
                            place.steps.push(ir::PlaceStep::Field(index));
                            Some((place, field_ty))
                        }
                        None => {
                            self.unknown_member(&ty, name, target.span);
                            None
                        }
                    },
                    Type::Error => None,
                    _ => {
                        self.error(
                            codes::INVALID_ASSIGNMENT_TARGET,
                            target.span,
                            format!("'{}' of type '{}' cannot be assigned to", name, ty),
                        );
                        None
                    }
                }
            }
            ExprKind::Index { object, index } => {
                let (mut place, ty) = self.lower_place(object)?;
                let index = self.lower_index(index);
                match ty {
                    Type::Array(element) => {
                        place.steps.push(ir::PlaceStep::Index(index));
                        Some((place, *element))
                    }
                    Type::Error => None,
                    other => {
                        self.error(
                            codes::INVALID_ASSIGNMENT_TARGET,
                            target.span,
                            format!("elements of type '{}' cannot be assigned to", other),
                        );
                        None
                    }
                }
            }
            _ => {
                self.error(
                    codes::INVALID_ASSIGNMENT_TARGET,
                    target.span,
                    "the left-hand side of an assignment must be a variable, field or element",
                );
                None
            }
        }
    }

    // Expressions

    fn unknown_member(&mut self, ty: &Type, name: &str, span: Span) {
        self.error(
            codes::UNKNOWN_MEMBER,
            span,
            format!("'{}' does not contain a definition for '{}'", ty, name),
        );
    }

    fn coerce(&mut self, (expr, from): Typed, to: &Type, span: Span) -> ir::Expr {
        if !to.accepts(&from) {
            self.error(
                codes::TYPE_MISMATCH,
                span,
                format!("cannot implicitly convert type '{}' to '{}'", from, to),
            );
            return expr;
        }
        widen(expr, &from, to)
    }

    /// An expression that must produce a value.
    fn lower_value(&mut self, expr: &ast::Expr) -> Typed {
        let (lowered, ty) = self.lower_expr(expr);
        if ty.is_void() {
            self.error(codes::VOID_VALUE, expr.span, "an expression of type void has no value");
            return (lowered, Type::Error);
        }
        (lowered, ty)
    }

    fn lower_index(&mut self, index: &ast::Expr) -> ir::Expr {
        let value = self.lower_value(index);
        self.coerce(value, &Type::Int32, index.span)
    }

    /// Go one expression level deeper, unless that is too deep.
    ///
    /// Operator and member chains nest without parser recursion, so the
    /// parser's bound does not cover them.
    fn enter(&mut self, span: Span) -> bool {
        if self.depth >= MAX_NESTING_DEPTH {
            self.error(
                codes::NESTING_TOO_DEEP,
                span,
                format!("expression is nested more than {} levels deep", MAX_NESTING_DEPTH),
            );
            return false;
        }
        self.depth += 1;
        true
    }

    fn lower_expr(&mut self, expr: &ast::Expr) -> Typed {
        if !self.enter(expr.span) {
            return poisoned();
        }
        let typed = self.lower_expr_at_depth(expr);
        self.depth -= 1;
        typed
    }

    fn lower_expr_at_depth(&mut self, expr: &ast::Expr) -> Typed {
        match &expr.kind {
            ExprKind::Literal(literal) => match literal {
                Literal::Int32(v) => (ir::Expr::Const(Value::Int32(*v)), Type::Int32),
                Literal::Int64(v) => (ir::Expr::Const(Value::Int64(*v)), Type::Int64),
                Literal::Double(v) => (ir::Expr::Const(Value::Double(*v)), Type::Double),
                Literal::Boolean(v) => (ir::Expr::Const(Value::Boolean(*v)), Type::Boolean),
                Literal::String(v) => (ir::Expr::Const(Value::String(v.clone())), Type::String),
            },

            ExprKind::Name(name) => match self.find_local(name, true) {
                Some((slot, ty)) => (ir::Expr::Local(slot), ty),
                None => {
                    self.error(
                        codes::UNKNOWN_NAME,
                        expr.span,
                        format!("the name '{}' does not exist in the current context", name),
                    );
                    poisoned()
                }
            },

            ExprKind::Member { object, name } => {
                if self.is_path(object) {
                    let path = expr.dotted_path().unwrap_or_default();
                    self.error(
                        codes::UNKNOWN_NAME,
                        expr.span,
                        format!("the name '{}' does not exist in the current context", path),
                    );
                    return poisoned();
                }
                let (object_ir, ty) = self.lower_value(object);
                match &ty {
                    Type::Struct(s) => match s.field(name) {
                        Some((index, field)) => (
                            ir::Expr::Field {
                                object: Box::new(object_ir),
                                index,
                            },
                            field.ty.clone(),
                        ),
                        None => {
                            self.unknown_member(&ty, name, expr.span);
                            poisoned()
                        }
                    },
                    Type::String | Type::Array(_) if name == "Length" => {
                        (ir::Expr::Length(Box::new(object_ir)), Type::Int32)
                    }
                    Type::Error => poisoned(),
                    _ => {
                        self.unknown_member(&ty, name, expr.span);
                        poisoned()
                    }
                }
            }

            ExprKind::Index { object, index } => {
                let (object_ir, ty) = self.lower_value(object);
                let index_ir = self.lower_index(index);
                let element = match &ty {
                    Type::Array(element) => (**element).clone(),
                    Type::String => Type::String,
                    Type::Error => return poisoned(),
                    other => {
                        self.error(
                            codes::INVALID_OPERANDS,
                            expr.span,
                            format!("cannot apply indexing with [] to a value of type '{}'", other),
                        );
                        return poisoned();
                    }
                };
                (
                    ir::Expr::Index {
                        object: Box::new(object_ir),
                        index: Box::new(index_ir),
                    },
                    element,
                )
            }

            ExprKind::Call { callee, args } => self.lower_call(callee, args),

            ExprKind::Unary { op, operand } => {
                let (operand_ir, ty) = self.lower_value(operand);
                if ty.is_error() {
                    return poisoned();
                }
                let (op, ok) = match op {
                    ast::UnaryOp::Neg => (ir::UnaryOp::Neg, ty.is_numeric()),
                    ast::UnaryOp::Not => (ir::UnaryOp::Not, ty == Type::Boolean),
                };
                if !ok {
                    let symbol = if op == ir::UnaryOp::Neg { "-" } else { "!" };
                    self.error(
                        codes::INVALID_OPERANDS,
                        expr.span,
                        format!("operator '{}' cannot be applied to operand of type '{}'", symbol, ty),
                    );
                    return poisoned();
                }
                (
                    ir::Expr::Unary {
                        op,
                        operand: Box::new(operand_ir),
                    },
                    ty,
                )
            }

            ExprKind::Binary { op, left, right } => self.lower_binary(*op, left, right, expr.span),

            ExprKind::NewStruct { ty, fields } => self.lower_new_struct(ty, fields, expr.span),

            ExprKind::NewArray { element, items } => {
                let lowered: Vec<(Typed, Span)> = items
                    .iter()
                    .map(|item| (self.lower_value(item), item.span))
                    .collect();

                let element = match element {
                    Some(element) => self.resolve_type(element),
                    None => self.best_type(&lowered, expr.span),
                };
                let items = lowered
                    .into_iter()
                    .map(|(item, span)| self.coerce(item, &element, span))
                    .collect();
                (ir::Expr::NewArray(items), Type::array_of(element))
            }

            ExprKind::NewArrayOfLength { element, length } => {
                let element = self.resolve_type(element);
                let length = self.lower_index(length);
                (
                    ir::Expr::NewArrayOfLength {
                        element: element.clone(),
                        length: Box::new(length),
                    },
                    Type::array_of(element),
                )
            }
        }
    }

    fn best_type(&mut self, items: &[(Typed, Span)], span: Span) -> Type {
        let mut best: Option<Type> = None;
        for ((_, ty), _) in items {
            best = match best {
                None => Some(ty.clone()),
                Some(current) if current.accepts(ty) => Some(current),
                Some(current) if ty.accepts(&current) => Some(ty.clone()),
                Some(_) => {
                    best = None;
                    break;
                }
            };
        }
        match best {
            Some(ty) => ty,
            None => {
                self.error(
                    codes::TYPE_MISMATCH,
                    span,
                    "no best type found for implicitly-typed array",
                );
                Type::Error
            }
        }
    }

    fn lower_new_struct(&mut self, ty: &TypeExpr, fields: &[ast::FieldInit], span: Span) -> Typed {
        let resolved = self.resolve_type(ty);
        let s = match &resolved {
            Type::Struct(s) => s.clone(),
            Type::Error => return poisoned(),
            other if fields.is_empty() && !other.is_void() => {
                return (ir::Expr::Default(other.clone()), other.clone());
            }
            other => {
                self.error(
                    codes::TYPE_MISMATCH,
                    span,
                    format!("'{}' does not support object initializers", other),
                );
                return poisoned();
            }
        };

        let mut inits: Vec<(usize, ir::Expr)> = Vec::new();
        for init in fields {
            let value = self.lower_value(&init.value);
            let Some((index, field)) = s.field(&init.name) else {
                self.unknown_member(&resolved, &init.name, init.span);
                continue;
            };
            if inits.iter().any(|(i, _)| *i == index) {
                self.error(
                    codes::DUPLICATE_DEFINITION,
                    init.span,
                    format!("member '{}' is initialized more than once", init.name),
                );
                continue;
            }
            let field_ty = field.ty.clone();
            let value = self.coerce(value, &field_ty, init.value.span);
            inits.push((index, value));
        }

        (
            ir::Expr::NewStruct {
                ty: s,
                inits,
            },
            resolved,
        )
    }

    fn lower_binary(&mut self, op: ast::BinaryOp, left: &ast::Expr, right: &ast::Expr, span: Span) -> Typed {
        let (l, lt) = self.lower_value(left);
        let (r, rt) = self.lower_value(right);
        if lt.is_error() || rt.is_error() {
            return poisoned();
        }

        let invalid = |checker: &mut Self| {
            checker.error(
                codes::INVALID_OPERANDS,
                span,
                format!(
                    "operator '{}' cannot be applied to operands of type '{}' and '{}'",
                    op.symbol(),
                    lt,
                    rt
                ),
            );
            poisoned()
        };
        let binary = |op: ir::BinaryOp, l: ir::Expr, r: ir::Expr| ir::Expr::Binary {
            op,
            left: Box::new(l),
            right: Box::new(r),
        };

        use ast::BinaryOp as B;
        match op {
            B::Add if lt == Type::String || rt == Type::String => {
                (binary(ir::BinaryOp::Concat, l, r), Type::String)
            }
            B::Add | B::Sub | B::Mul | B::Div | B::Rem => {
                let Some(common) = Type::common_numeric(&lt, &rt) else {
                    return invalid(self);
                };
                let op = match op {
                    B::Add => ir::BinaryOp::Add,
                    B::Sub => ir::BinaryOp::Sub,
                    B::Mul => ir::BinaryOp::Mul,
                    B::Div => ir::BinaryOp::Div,
                    _ => ir::BinaryOp::Rem,
                };
                (
                    binary(op, widen(l, &lt, &common), widen(r, &rt, &common)),
                    common,
                )
            }
            B::Lt | B::Le | B::Gt | B::Ge => {
                let Some(common) = Type::common_numeric(&lt, &rt) else {
                    return invalid(self);
                };
                let op = match op {
                    B::Lt => ir::BinaryOp::Lt,
                    B::Le => ir::BinaryOp::Le,
                    B::Gt => ir::BinaryOp::Gt,
                    _ => ir::BinaryOp::Ge,
                };
                (
                    binary(op, widen(l, &lt, &common), widen(r, &rt, &common)),
                    Type::Boolean,
                )
            }
            B::Eq | B::NotEq => {
                let op = if op == B::Eq {
                    ir::BinaryOp::Eq
                } else {
                    ir::BinaryOp::NotEq
                };
                if let Some(common) = Type::common_numeric(&lt, &rt) {
                    return (
                        binary(op, widen(l, &lt, &common), widen(r, &rt, &common)),
                        Type::Boolean,
                    );
                }
                if lt != rt {
                    return invalid(self);
                }
                (binary(op, l, r), Type::Boolean)
            }
            B::And | B::Or => {
                if lt != Type::Boolean || rt != Type::Boolean {
                    return invalid(self);
                }
                let op = if op == B::And {
                    ir::BinaryOp::And
                } else {
                    ir::BinaryOp::Or
                };
                (binary(op, l, r), Type::Boolean)
            }
        }
    }

    fn lower_call(&mut self, callee: &ast::Expr, args: &[ast::Expr]) -> Typed {
        if let ExprKind::Member { object, name } = &callee.kind {
            if !self.is_path(object) {
                return self.lower_method_call(object, name, args, callee.span);
            }
        }

        let lowered: Vec<(Typed, Span)> = args
            .iter()
            .map(|arg| (self.lower_value(arg), arg.span))
            .collect();

        let Some(path) = callee.dotted_path() else {
            self.error(
                codes::UNKNOWN_FUNCTION,
                callee.span,
                "expression cannot be called",
            );
            return poisoned();
        };

        let target = match self.lookup_function(&path) {
            Ok(target) => target,
            Err((code, message)) => {
                self.error(code, callee.span, message);
                return poisoned();
            }
        };

        match target {
            Target::Local(index) => {
                let (params, ret) = {
                    let sig = &self.signatures[index];
                    (sig.params.clone(), sig.ret.clone())
                };
                let args = self.fixed_arguments(&path, &params, lowered, callee.span);
                (
                    ir::Expr::Call {
                        callee: ir::Callee::Local(index),
                        args,
                    },
                    ret,
                )
            }
            Target::Library(FunctionRef::Script(table, index)) => {
                let (params, ret) = {
                    let f = &table.functions[index];
                    (f.params.clone(), f.ret.clone())
                };
                let args = self.fixed_arguments(&path, &params, lowered, callee.span);
                (
                    ir::Expr::Call {
                        callee: ir::Callee::Library(table, index),
                        args,
                    },
                    ret,
                )
            }
            Target::Library(FunctionRef::Native(native)) => {
                self.native_call(native, &path, lowered, callee.span)
            }
        }
    }

    fn lower_method_call(
        &mut self,
        object: &ast::Expr,
        name: &str,
        args: &[ast::Expr],
        span: Span,
    ) -> Typed {
        let receiver = self.lower_value(object);
        let mut lowered: Vec<(Typed, Span)> = args
            .iter()
            .map(|arg| (self.lower_value(arg), arg.span))
            .collect();
        if receiver.1.is_error() {
            return poisoned();
        }

        let Some(native) = builtins::instance_method(&receiver.1, name) else {
            let ty = receiver.1.clone();
            self.unknown_member(&ty, name, span);
            return poisoned();
        };
        let display = format!("{}.{}", receiver.1, name);
        lowered.insert(0, (receiver, object.span));
        self.native_call(native, &display, lowered, span)
    }

    fn native_call(
        &mut self,
        native: &'static library::NativeFunction,
        display: &str,
        lowered: Vec<(Typed, Span)>,
        span: Span,
    ) -> Typed {
        let types: Vec<Type> = lowered.iter().map(|((_, ty), _)| ty.clone()).collect();
        match (native.check)(&types) {
            Ok(signature) => {
                let args = lowered
                    .into_iter()
                    .zip(&signature.params)
                    .map(|((arg, span), param)| self.coerce(arg, param, span))
                    .collect();
                (
                    ir::Expr::Call {
                        callee: ir::Callee::Native(native),
                        args,
                    },
                    signature.ret,
                )
            }
            Err(message) => {
                if !types.iter().any(Type::is_error) {
                    self.error(
                        codes::ARGUMENT_MISMATCH,
                        span,
                        format!("'{}' {}", display, message),
                    );
                }
                poisoned()
            }
        }
    }

    fn fixed_arguments(
        &mut self,
        name: &str,
        params: &[Type],
        lowered: Vec<(Typed, Span)>,
        span: Span,
    ) -> Vec<ir::Expr> {
        if lowered.len() != params.len() {
            self.error(
                codes::ARGUMENT_MISMATCH,
                span,
                format!(
                    "'{}' takes {} argument(s) but {} were supplied",
                    name,
                    params.len(),
                    lowered.len()
                ),
            );
        }
        lowered
            .into_iter()
            .zip(params)
            .map(|((arg, span), param)| self.coerce(arg, param, span))
            .collect()
    }
}

fn poisoned() -> Typed {
    (ir::Expr::Const(Value::Void), Type::Error)
}

fn widen(expr: ir::Expr, from: &Type, to: &Type) -> ir::Expr {
    if from != to && from.is_numeric() && to.is_numeric() {
        ir::Expr::Widen {
            value: Box::new(expr),
            to: to.clone(),
        }
    } else {
        expr
    }
}

fn symbol(op: ir::BinaryOp) -> &'static str {
    match op {
        ir::BinaryOp::Add | ir::BinaryOp::Concat => "+",
        ir::BinaryOp::Sub => "-",
        ir::BinaryOp::Mul => "*",
        ir::BinaryOp::Div => "/",
        ir::BinaryOp::Rem => "%",
        _ => "?",
    }
}

/// The field through which `ty` contains the struct named `target` by value.
fn cycle_through(target: &str, ty: &StructType, visited: &mut HashSet<String>) -> Option<String> {
    for field in ty.fields() {
        if let Type::Struct(inner) = &field.ty {
            if inner.name() == target {
                return Some(field.name.clone());
            }
            if visited.insert(inner.name().to_string())
                && cycle_through(target, inner, visited).is_some()
            {
                return Some(field.name.clone());
            }
        }
    }
    None
}

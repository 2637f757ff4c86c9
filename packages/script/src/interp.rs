//! Tree-walking interpreter over the lowered form.

use std::sync::Arc;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::ir::{BinaryOp, Callee, Expr, FunctionTable, PlaceStep, Stmt, StmtKind, UnaryOp};
use crate::library::{Console, NativeContext};
use crate::types::Type;
use crate::value::{Numbers, StructValue, Value};

/// Nesting limit for calls between script functions.
pub const MAX_CALL_DEPTH: usize = 64;

/// Nesting limit for blocks and expressions being evaluated, across calls.
pub const MAX_EVAL_DEPTH: usize = 512;

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

enum Step {
    Field(usize),
    Index(i32),
}

pub(crate) struct Machine {
    console: Console,
    steps_left: Option<u64>,
    depth: usize,
    nesting: usize,
}

impl Machine {
    pub fn new(step_budget: Option<u64>) -> Self {
        Self {
            console: Console::default(),
            steps_left: step_budget,
            depth: 0,
            nesting: 0,
        }
    }

    pub fn into_console(self) -> Vec<String> {
        self.console.into_lines()
    }

    /// Run top-level statements in `frame`. The value of the first `return`
    /// reached is the result.
    pub fn run_body(
        &mut self,
        code: &Arc<FunctionTable>,
        body: &[Stmt],
        mut frame: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match self.exec_block(code, &mut frame, body)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Void),
        }
    }

    pub fn call_function(
        &mut self,
        code: &Arc<FunctionTable>,
        index: usize,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let function = code.functions.get(index).ok_or_else(|| {
            RuntimeError::new(RuntimeErrorKind::InvalidOperation, "call to an unknown function")
        })?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::new(
                RuntimeErrorKind::StackOverflow,
                format!("call depth exceeded {} in '{}'", MAX_CALL_DEPTH, function.name),
            ));
        }

        let mut frame = vec![Value::Void; function.frame_size.max(args.len())];
        for (slot, arg) in args.into_iter().enumerate() {
            frame[slot] = arg;
        }

        self.depth += 1;
        let flow = self.exec_block(code, &mut frame, &function.body);
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            _ if function.ret.is_void() => Ok(Value::Void),
            _ => Err(RuntimeError::new(
                RuntimeErrorKind::MissingReturn,
                format!("'{}' ended without returning a value", function.name),
            )),
        }
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        match &mut self.steps_left {
            None => Ok(()),
            Some(0) => Err(RuntimeError::new(
                RuntimeErrorKind::StepBudgetExhausted,
                "execution step budget exhausted",
            )),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
        }
    }

    fn nested<T>(
        &mut self,
        run: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        if self.nesting >= MAX_EVAL_DEPTH {
            return Err(RuntimeError::new(
                RuntimeErrorKind::StackOverflow,
                format!("evaluation nested more than {} levels deep", MAX_EVAL_DEPTH),
            ));
        }
        self.nesting += 1;
        let result = run(self);
        self.nesting -= 1;
        result
    }

    fn exec_block(
        &mut self,
        code: &Arc<FunctionTable>,
        frame: &mut Vec<Value>,
        body: &[Stmt],
    ) -> Result<Flow, RuntimeError> {
        self.nested(|machine| machine.exec_stmts(code, frame, body))
    }

    fn exec_stmts(
        &mut self,
        code: &Arc<FunctionTable>,
        frame: &mut Vec<Value>,
        body: &[Stmt],
    ) -> Result<Flow, RuntimeError> {
        for stmt in body {
            self.tick().map_err(|e| e.at_line(stmt.line))?;
            let flow = self
                .exec_stmt(code, frame, stmt)
                .map_err(|e| e.at_line(stmt.line))?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(
        &mut self,
        code: &Arc<FunctionTable>,
        frame: &mut Vec<Value>,
        stmt: &Stmt,
    ) -> Result<Flow, RuntimeError> {
        match &stmt.kind {
            StmtKind::Let { slot, value } => {
                let value = self.eval(code, frame, value)?;
                *slot_mut(frame, *slot)? = value;
            }

            StmtKind::Assign { place, op, value } => {
                let mut steps = Vec::with_capacity(place.steps.len());
                for step in &place.steps {
                    steps.push(match step {
                        PlaceStep::Field(index) => Step::Field(*index),
                        PlaceStep::Index(index) => Step::Index(self.eval_int(code, frame, index)?),
                    });
                }
                let value = self.eval(code, frame, value)?;
                let target = walk(slot_mut(frame, place.slot)?, &steps)?;
                *target = match op {
                    None => value,
                    Some(op) => binary(*op, std::mem::replace(target, Value::Void), value)?,
                };
            }

            StmtKind::Expr(expr) => {
                self.eval(code, frame, expr)?;
            }

            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let body = if self.eval_bool(code, frame, cond)? {
                    then_body
                } else {
                    else_body
                };
                return self.exec_block(code, frame, body);
            }

            StmtKind::Loop { cond, body, step } => loop {
                if let Some(cond) = cond {
                    if !self.eval_bool(code, frame, cond)? {
                        break;
                    }
                }
                match self.exec_block(code, frame, body)? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
                if let Flow::Return(value) = self.exec_block(code, frame, step)? {
                    return Ok(Flow::Return(value));
                }
                self.tick()?;
            },

            StmtKind::Foreach {
                slot,
                element,
                iterable,
                body,
            } => {
                let items = match self.eval(code, frame, iterable)? {
                    Value::Array(items) => items,
                    Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                    other => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::InvalidOperation,
                            format!("cannot iterate over {}", other.type_name()),
                        ))
                    }
                };
                for item in items {
                    self.tick()?;
                    *slot_mut(frame, *slot)? = item.widen(element);
                    match self.exec_block(code, frame, body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }

            StmtKind::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(code, frame, value)?,
                    None => Value::Void,
                };
                return Ok(Flow::Return(value));
            }

            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),

            StmtKind::Throw(value) => {
                let value = self.eval(code, frame, value)?;
                return Err(RuntimeError::new(RuntimeErrorKind::Thrown, value.to_string()));
            }

            StmtKind::Block(body) => return self.exec_block(code, frame, body),
        }
        Ok(Flow::Normal)
    }

    fn eval_bool(
        &mut self,
        code: &Arc<FunctionTable>,
        frame: &[Value],
        expr: &Expr,
    ) -> Result<bool, RuntimeError> {
        self.eval(code, frame, expr)?
            .as_bool()
            .ok_or_else(|| invalid_operand("a condition"))
    }

    fn eval_int(
        &mut self,
        code: &Arc<FunctionTable>,
        frame: &[Value],
        expr: &Expr,
    ) -> Result<i32, RuntimeError> {
        match self.eval(code, frame, expr)? {
            Value::Int32(v) => Ok(v),
            _ => Err(invalid_operand("an index")),
        }
    }

    fn eval(
        &mut self,
        code: &Arc<FunctionTable>,
        frame: &[Value],
        expr: &Expr,
    ) -> Result<Value, RuntimeError> {
        self.nested(|machine| machine.evaluate(code, frame, expr))
    }

    fn evaluate(
        &mut self,
        code: &Arc<FunctionTable>,
        frame: &[Value],
        expr: &Expr,
    ) -> Result<Value, RuntimeError> {
        Ok(match expr {
            Expr::Const(value) => value.clone(),
            Expr::Default(ty) => Value::default_for(ty),
            Expr::Local(slot) => frame
                .get(*slot)
                .cloned()
                .ok_or_else(|| invalid_operand("a variable"))?,

            Expr::Field { object, index } => match self.eval(code, frame, object)? {
                Value::Struct(StructValue { mut fields, .. }) if *index < fields.len() => {
                    fields.swap_remove(*index)
                }
                _ => return Err(invalid_operand("a field access")),
            },

            Expr::Index { object, index } => {
                let object = self.eval(code, frame, object)?;
                let index = self.eval_int(code, frame, index)?;
                match object {
                    Value::Array(mut items) => {
                        let at = bounded(index, items.len())?;
                        items.swap_remove(at)
                    }
                    Value::String(s) => {
                        let at = bounded(index, s.chars().count())?;
                        s.chars()
                            .nth(at)
                            .map(|c| Value::String(c.to_string()))
                            .ok_or_else(out_of_range)?
                    }
                    _ => return Err(invalid_operand("an index access")),
                }
            }

            Expr::Length(object) => {
                let len = match self.eval(code, frame, object)? {
                    Value::Array(items) => items.len(),
                    Value::String(s) => s.chars().count(),
                    _ => return Err(invalid_operand("Length")),
                };
                Value::Int32(i32::try_from(len).map_err(|_| overflow())?)
            }

            Expr::Call { callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(code, frame, arg)?);
                }
                match callee {
                    Callee::Native(native) => {
                        let mut context = NativeContext {
                            console: &mut self.console,
                        };
                        (native.call)(&mut context, values)?
                    }
                    Callee::Local(index) => self.call_function(code, *index, values)?,
                    Callee::Library(table, index) => self.call_function(table, *index, values)?,
                }
            }

            Expr::Unary { op, operand } => {
                let value = self.eval(code, frame, operand)?;
                match (op, value) {
                    (UnaryOp::Neg, Value::Int32(v)) => Value::Int32(v.checked_neg().ok_or_else(overflow)?),
                    (UnaryOp::Neg, Value::Int64(v)) => Value::Int64(v.checked_neg().ok_or_else(overflow)?),
                    (UnaryOp::Neg, Value::Double(v)) => Value::Double(-v),
                    (UnaryOp::Not, Value::Boolean(v)) => Value::Boolean(!v),
                    _ => return Err(invalid_operand("a unary operator")),
                }
            }

            Expr::Binary { op, left, right } => {
                let left = self.eval(code, frame, left)?;
                match (op, &left) {
                    (BinaryOp::And, Value::Boolean(false)) => return Ok(left),
                    (BinaryOp::Or, Value::Boolean(true)) => return Ok(left),
                    _ => {}
                }
                let right = self.eval(code, frame, right)?;
                binary(*op, left, right)?
            }

            Expr::Widen { value, to } => self.eval(code, frame, value)?.widen(to),

            Expr::NewStruct { ty, inits } => {
                let mut value = match Value::default_for(&Type::Struct(ty.clone())) {
                    Value::Struct(s) => s,
                    _ => return Err(invalid_operand("a struct initializer")),
                };
                for (index, init) in inits {
                    let init = self.eval(code, frame, init)?;
                    if let Some(field) = value.fields.get_mut(*index) {
                        *field = init;
                    }
                }
                Value::Struct(value)
            }

            Expr::NewArray(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(code, frame, item)?);
                }
                Value::Array(values)
            }

            Expr::NewArrayOfLength { element, length } => {
                let length = self.eval_int(code, frame, length)?;
                let length = usize::try_from(length).map_err(|_| overflow())?;
                Value::Array(vec![Value::default_for(element); length])
            }
        })
    }
}

fn slot_mut(frame: &mut [Value], slot: usize) -> Result<&mut Value, RuntimeError> {
    frame.get_mut(slot).ok_or_else(|| invalid_operand("a variable"))
}

fn walk<'v>(mut target: &'v mut Value, steps: &[Step]) -> Result<&'v mut Value, RuntimeError> {
    for step in steps {
        target = match (step, target) {
            (Step::Field(index), Value::Struct(s)) => s
                .fields
                .get_mut(*index)
                .ok_or_else(|| invalid_operand("a field access"))?,
            (Step::Index(index), Value::Array(items)) => {
                let at = bounded(*index, items.len())?;
                &mut items[at]
            }
            _ => return Err(invalid_operand("an assignment")),
        };
    }
    Ok(target)
}

fn bounded(index: i32, len: usize) -> Result<usize, RuntimeError> {
    usize::try_from(index)
        .ok()
        .filter(|at| *at < len)
        .ok_or_else(out_of_range)
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Concat => return Ok(Value::String(format!("{}{}", left, right))),
        BinaryOp::And | BinaryOp::Or => {
            return match (left, right) {
                (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(match op {
                    BinaryOp::And => l && r,
                    _ => l || r,
                })),
                _ => Err(invalid_operand("a logical operator")),
            }
        }
        BinaryOp::Eq | BinaryOp::NotEq => {
            let equal = match Numbers::of(&left, &right) {
                Some(Numbers::Int32(l, r)) => l == r,
                Some(Numbers::Int64(l, r)) => l == r,
                Some(Numbers::Double(l, r)) => l == r,
                None => left == right,
            };
            return Ok(Value::Boolean(equal == (op == BinaryOp::Eq)));
        }
        _ => {}
    }

    let numbers = Numbers::of(&left, &right).ok_or_else(|| invalid_operand("an arithmetic operator"))?;
    Ok(match numbers {
        Numbers::Int32(l, r) => match compare(op, &l, &r) {
            Some(result) => Value::Boolean(result),
            None => Value::Int32(integer(op, l, r)?),
        },
        Numbers::Int64(l, r) => match compare(op, &l, &r) {
            Some(result) => Value::Boolean(result),
            None => Value::Int64(integer(op, l, r)?),
        },
        Numbers::Double(l, r) => match compare(op, &l, &r) {
            Some(result) => Value::Boolean(result),
            None => Value::Double(match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Rem => l % r,
                _ => return Err(invalid_operand("an arithmetic operator")),
            }),
        },
    })
}

fn compare<T: PartialOrd>(op: BinaryOp, l: &T, r: &T) -> Option<bool> {
    Some(match op {
        BinaryOp::Lt => l < r,
        BinaryOp::Le => l <= r,
        BinaryOp::Gt => l > r,
        BinaryOp::Ge => l >= r,
        _ => return None,
    })
}

trait Checked: Sized + Copy + PartialEq + Default {
    fn add(self, other: Self) -> Option<Self>;
    fn sub(self, other: Self) -> Option<Self>;
    fn mul(self, other: Self) -> Option<Self>;
    fn div(self, other: Self) -> Option<Self>;
    fn rem(self, other: Self) -> Option<Self>;
}

macro_rules! checked {
    ($($t:ty),*) => {$(
        impl Checked for $t {
            fn add(self, other: Self) -> Option<Self> { self.checked_add(other) }
            fn sub(self, other: Self) -> Option<Self> { self.checked_sub(other) }
            fn mul(self, other: Self) -> Option<Self> { self.checked_mul(other) }
            fn div(self, other: Self) -> Option<Self> { self.checked_div(other) }
            fn rem(self, other: Self) -> Option<Self> { self.checked_rem(other) }
        }
    )*};
}

checked!(i32, i64);

fn integer<T: Checked>(op: BinaryOp, l: T, r: T) -> Result<T, RuntimeError> {
    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && r == T::default() {
        return Err(RuntimeError::new(
            RuntimeErrorKind::DivideByZero,
            "attempted to divide by zero",
        ));
    }
    let result = match op {
        BinaryOp::Add => l.add(r),
        BinaryOp::Sub => l.sub(r),
        BinaryOp::Mul => l.mul(r),
        BinaryOp::Div => l.div(r),
        BinaryOp::Rem => l.rem(r),
        _ => return Err(invalid_operand("an arithmetic operator")),
    };
    result.ok_or_else(overflow)
}

fn overflow() -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::Overflow,
        "arithmetic operation resulted in an overflow",
    )
}

fn out_of_range() -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::IndexOutOfRange,
        "index was outside the bounds of the array",
    )
}

fn invalid_operand(what: &str) -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::InvalidOperation,
        format!("invalid operand for {}", what),
    )
}

//! The standard library's native functions and the instance methods of
//! built-in types.

use std::path::Path;
use std::time::Duration;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::library::{Library, NativeContext, NativeFunction, Signature};
use crate::types::Type;
use crate::value::Value;

pub(crate) fn standard_library() -> Library {
    let types = vec![
        ("System.Int32".to_string(), Type::Int32),
        ("System.Int64".to_string(), Type::Int64),
        ("System.Double".to_string(), Type::Double),
        ("System.Boolean".to_string(), Type::Boolean),
        ("System.String".to_string(), Type::String),
    ];
    Library::native("System", types, STANDARD_FUNCTIONS)
}

/// Method `name` on a value of type `receiver`. The receiver is the first
/// argument of the returned native.
pub(crate) fn instance_method(receiver: &Type, name: &str) -> Option<&'static NativeFunction> {
    if name == "ToString" {
        return Some(&TO_STRING);
    }
    let methods: &'static [NativeFunction] = match receiver {
        Type::String => STRING_METHODS,
        _ => return None,
    };
    methods
        .iter()
        .find(|f| f.name.rsplit('.').next() == Some(name))
}

macro_rules! native {
    ($name:literal, $check:ident, $call:ident) => {
        NativeFunction {
            name: $name,
            check: $check,
            call: $call,
        }
    };
}

static STANDARD_FUNCTIONS: &[NativeFunction] = &[
    native!("System.Math.Abs", sig_numeric_unary, math_abs),
    native!("System.Math.Max", sig_numeric_binary, math_max),
    native!("System.Math.Min", sig_numeric_binary, math_min),
    native!("System.Math.Pow", sig_double_binary, math_pow),
    native!("System.Math.Sqrt", sig_double_unary, math_sqrt),
    native!("System.Math.Floor", sig_double_unary, math_floor),
    native!("System.Math.Ceiling", sig_double_unary, math_ceiling),
    native!("System.Math.Round", sig_double_unary, math_round),
    native!("System.Console.WriteLine", sig_write, console_write_line),
    native!("System.Console.Write", sig_write, console_write),
    native!("System.Convert.ToInt32", sig_to_int32, convert_to_int32),
    native!("System.Convert.ToInt64", sig_to_int64, convert_to_int64),
    native!("System.Convert.ToDouble", sig_to_double, convert_to_double),
    native!("System.Convert.ToBoolean", sig_to_boolean, convert_to_boolean),
    native!("System.Convert.ToString", sig_to_string, convert_to_string),
    native!("System.String.Join", sig_string_join, string_join),
    native!("System.String.Concat", sig_concat, string_concat),
    native!("System.String.IsNullOrEmpty", sig_string_to_bool, string_is_null_or_empty),
    native!("System.Environment.GetEnvironmentVariable", sig_string_to_string, environment_variable),
    native!("System.Environment.MachineName", sig_none_to_string, environment_machine_name),
    native!("System.Environment.ProcessId", sig_none_to_int32, process_current_id),
    native!("System.Text.Strings.Reverse", sig_string_to_string, strings_reverse),
    native!("System.Text.Strings.Repeat", sig_string_int_to_string, strings_repeat),
    native!("System.Text.Strings.PadLeft", sig_string_int_to_string, strings_pad_left),
    native!("System.Linq.Enumerable.Range", sig_range, enumerable_range),
    native!("System.Linq.Enumerable.Sum", sig_numeric_fold, enumerable_sum),
    native!("System.Linq.Enumerable.Min", sig_numeric_fold, enumerable_min),
    native!("System.Linq.Enumerable.Max", sig_numeric_fold, enumerable_max),
    native!("System.Linq.Enumerable.Average", sig_average, enumerable_average),
    native!("System.Linq.Enumerable.Count", sig_count, enumerable_count),
    native!("System.Linq.Enumerable.Contains", sig_contains, enumerable_contains),
    native!("System.Linq.Enumerable.Reverse", sig_reverse, enumerable_reverse),
    native!("System.Collections.Generic.Arrays.Append", sig_append, arrays_append),
    native!("System.Collections.Generic.Arrays.Concat", sig_concat_arrays, arrays_concat),
    native!("System.Collections.Generic.Arrays.IndexOf", sig_index_of, arrays_index_of),
    native!("System.Threading.Tasks.Task.Delay", sig_int_to_void, task_delay),
    native!("System.IO.File.ReadAllText", sig_string_to_string, file_read_all_text),
    native!("System.IO.File.WriteAllText", sig_string2_to_void, file_write_all_text),
    native!("System.IO.File.AppendAllText", sig_string2_to_void, file_append_all_text),
    native!("System.IO.File.Exists", sig_string_to_bool, file_exists),
    native!("System.IO.File.Delete", sig_string_to_void, file_delete),
    native!("System.IO.Directory.GetCurrentDirectory", sig_none_to_string, directory_current),
    native!("System.IO.Directory.SetCurrentDirectory", sig_string_to_void, directory_set_current),
    native!("System.IO.Directory.Exists", sig_string_to_bool, directory_exists),
    native!("System.IO.Directory.CreateDirectory", sig_string_to_void, directory_create),
    native!("System.IO.Path.Combine", sig_string2_to_string, path_combine),
    native!("System.IO.Path.GetFileName", sig_string_to_string, path_file_name),
    native!("System.IO.Path.GetExtension", sig_string_to_string, path_extension),
    native!("System.Diagnostics.Process.Start", sig_process_start, process_start),
    native!("System.Diagnostics.Process.CurrentId", sig_none_to_int32, process_current_id),
];

static STRING_METHODS: &[NativeFunction] = &[
    native!("String.ToUpper", sig_method_string, string_to_upper),
    native!("String.ToLower", sig_method_string, string_to_lower),
    native!("String.Trim", sig_method_string, string_trim),
    native!("String.Contains", sig_method_predicate, string_contains),
    native!("String.StartsWith", sig_method_predicate, string_starts_with),
    native!("String.EndsWith", sig_method_predicate, string_ends_with),
    native!("String.IndexOf", sig_method_index_of, string_index_of),
    native!("String.Substring", sig_method_substring, string_substring),
    native!("String.Replace", sig_method_replace, string_replace),
    native!("String.Split", sig_method_split, string_split),
];

static TO_STRING: NativeFunction = native!("Object.ToString", sig_to_string, convert_to_string);

// Signatures

fn fixed(args: &[Type], params: &[Type], ret: Type) -> Result<Signature, String> {
    if args.len() != params.len() {
        return Err(format!(
            "takes {} argument(s) but {} were supplied",
            params.len(),
            args.len()
        ));
    }
    for (i, (arg, param)) in args.iter().zip(params).enumerate() {
        if !param.accepts(arg) {
            return Err(format!(
                "argument {}: cannot convert from '{}' to '{}'",
                i + 1,
                arg,
                param
            ));
        }
    }
    Ok(Signature {
        params: params.to_vec(),
        ret,
    })
}

fn values(args: &[Type], ret: Type) -> Result<Signature, String> {
    if let Some(i) = args.iter().position(Type::is_void) {
        return Err(format!("argument {}: a void expression has no value", i + 1));
    }
    Ok(Signature {
        params: args.to_vec(),
        ret,
    })
}

fn single_value(args: &[Type], ret: Type) -> Result<Signature, String> {
    if args.len() != 1 {
        return Err(format!("takes 1 argument(s) but {} were supplied", args.len()));
    }
    values(args, ret)
}

fn element(args: &[Type], index: usize) -> Result<Type, String> {
    match args.get(index) {
        Some(Type::Array(element)) => Ok((**element).clone()),
        Some(Type::Error) => Ok(Type::Error),
        Some(other) => Err(format!(
            "argument {}: expected an array, found '{}'",
            index + 1,
            other
        )),
        None => Err(format!("expects at least {} argument(s)", index + 1)),
    }
}

fn numeric_element(args: &[Type], index: usize) -> Result<Type, String> {
    let element = element(args, index)?;
    if element.is_numeric() || element.is_error() {
        Ok(element)
    } else {
        Err(format!(
            "argument {}: expected an array of numbers, found '{}[]'",
            index + 1,
            element
        ))
    }
}

fn sig_numeric_unary(args: &[Type]) -> Result<Signature, String> {
    match args {
        [t] if t.is_numeric() || t.is_error() => fixed(args, &[t.clone()], t.clone()),
        [t] => Err(format!("argument 1: expected a number, found '{}'", t)),
        _ => fixed(args, &[Type::Double], Type::Double),
    }
}

fn sig_numeric_binary(args: &[Type]) -> Result<Signature, String> {
    match args {
        [a, b] if a.is_error() || b.is_error() => {
            fixed(args, &[Type::Error, Type::Error], Type::Error)
        }
        [a, b] => match Type::common_numeric(a, b) {
            Some(t) => fixed(args, &[t.clone(), t.clone()], t),
            None => Err(format!(
                "arguments must be numbers, found '{}' and '{}'",
                a, b
            )),
        },
        _ => fixed(args, &[Type::Double, Type::Double], Type::Double),
    }
}

fn sig_double_unary(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::Double], Type::Double)
}

fn sig_double_binary(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::Double, Type::Double], Type::Double)
}

fn sig_write(args: &[Type]) -> Result<Signature, String> {
    if args.len() > 1 {
        return Err(format!("takes 0 or 1 argument(s) but {} were supplied", args.len()));
    }
    values(args, Type::Void)
}

fn sig_to_int32(args: &[Type]) -> Result<Signature, String> {
    single_value(args, Type::Int32)
}

fn sig_to_int64(args: &[Type]) -> Result<Signature, String> {
    single_value(args, Type::Int64)
}

fn sig_to_double(args: &[Type]) -> Result<Signature, String> {
    single_value(args, Type::Double)
}

fn sig_to_boolean(args: &[Type]) -> Result<Signature, String> {
    single_value(args, Type::Boolean)
}

fn sig_to_string(args: &[Type]) -> Result<Signature, String> {
    single_value(args, Type::String)
}

fn sig_string_join(args: &[Type]) -> Result<Signature, String> {
    let element = element(args, 1)?;
    fixed(args, &[Type::String, Type::array_of(element)], Type::String)
}

fn sig_concat(args: &[Type]) -> Result<Signature, String> {
    values(args, Type::String)
}

fn sig_string_to_bool(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String], Type::Boolean)
}

fn sig_string_to_string(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String], Type::String)
}

fn sig_string_to_void(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String], Type::Void)
}

fn sig_string2_to_void(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String, Type::String], Type::Void)
}

fn sig_string2_to_string(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String, Type::String], Type::String)
}

fn sig_string_int_to_string(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String, Type::Int32], Type::String)
}

fn sig_none_to_string(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[], Type::String)
}

fn sig_none_to_int32(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[], Type::Int32)
}

fn sig_int_to_void(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::Int32], Type::Void)
}

fn sig_range(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::Int32, Type::Int32], Type::array_of(Type::Int32))
}

fn sig_numeric_fold(args: &[Type]) -> Result<Signature, String> {
    let element = numeric_element(args, 0)?;
    fixed(args, &[Type::array_of(element.clone())], element)
}

fn sig_average(args: &[Type]) -> Result<Signature, String> {
    let element = numeric_element(args, 0)?;
    fixed(args, &[Type::array_of(element)], Type::Double)
}

fn sig_count(args: &[Type]) -> Result<Signature, String> {
    let element = element(args, 0)?;
    fixed(args, &[Type::array_of(element)], Type::Int32)
}

fn sig_contains(args: &[Type]) -> Result<Signature, String> {
    let element = element(args, 0)?;
    fixed(args, &[Type::array_of(element.clone()), element], Type::Boolean)
}

fn sig_reverse(args: &[Type]) -> Result<Signature, String> {
    let array = Type::array_of(element(args, 0)?);
    fixed(args, &[array.clone()], array)
}

fn sig_append(args: &[Type]) -> Result<Signature, String> {
    let element = element(args, 0)?;
    let array = Type::array_of(element.clone());
    fixed(args, &[array.clone(), element], array)
}

fn sig_concat_arrays(args: &[Type]) -> Result<Signature, String> {
    let array = Type::array_of(element(args, 0)?);
    fixed(args, &[array.clone(), array.clone()], array)
}

fn sig_index_of(args: &[Type]) -> Result<Signature, String> {
    let element = element(args, 0)?;
    fixed(args, &[Type::array_of(element.clone()), element], Type::Int32)
}

fn sig_process_start(args: &[Type]) -> Result<Signature, String> {
    if args.len() == 1 {
        fixed(args, &[Type::String], Type::Int32)
    } else {
        fixed(args, &[Type::String, Type::String], Type::Int32)
    }
}

fn sig_method_string(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String], Type::String)
}

fn sig_method_predicate(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String, Type::String], Type::Boolean)
}

fn sig_method_index_of(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String, Type::String], Type::Int32)
}

fn sig_method_substring(args: &[Type]) -> Result<Signature, String> {
    if args.len() == 2 {
        fixed(args, &[Type::String, Type::Int32], Type::String)
    } else {
        fixed(args, &[Type::String, Type::Int32, Type::Int32], Type::String)
    }
}

fn sig_method_replace(args: &[Type]) -> Result<Signature, String> {
    fixed(args, &[Type::String, Type::String, Type::String], Type::String)
}

fn sig_method_split(args: &[Type]) -> Result<Signature, String> {
    fixed(
        args,
        &[Type::String, Type::String],
        Type::array_of(Type::String),
    )
}

// Implementations

type NativeResult = Result<Value, RuntimeError>;

fn bad_args(name: &str) -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::InvalidArgument,
        format!("invalid arguments to {}", name),
    )
}

fn overflow() -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::Overflow,
        "arithmetic operation resulted in an overflow",
    )
}

fn empty_sequence() -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::InvalidOperation,
        "sequence contains no elements",
    )
}

fn first(args: Vec<Value>, name: &str) -> NativeResult {
    args.into_iter().next().ok_or_else(|| bad_args(name))
}

fn math_abs(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match first(args, "Math.Abs")? {
        Value::Int32(v) => v.checked_abs().map(Value::Int32).ok_or_else(overflow),
        Value::Int64(v) => v.checked_abs().map(Value::Int64).ok_or_else(overflow),
        Value::Double(v) => Ok(Value::Double(v.abs())),
        _ => Err(bad_args("Math.Abs")),
    }
}

fn math_max(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::Int32(a), Value::Int32(b)] => Ok(Value::Int32(*a.max(b))),
        [Value::Int64(a), Value::Int64(b)] => Ok(Value::Int64(*a.max(b))),
        [Value::Double(a), Value::Double(b)] => Ok(Value::Double(a.max(*b))),
        _ => Err(bad_args("Math.Max")),
    }
}

fn math_min(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::Int32(a), Value::Int32(b)] => Ok(Value::Int32(*a.min(b))),
        [Value::Int64(a), Value::Int64(b)] => Ok(Value::Int64(*a.min(b))),
        [Value::Double(a), Value::Double(b)] => Ok(Value::Double(a.min(*b))),
        _ => Err(bad_args("Math.Min")),
    }
}

fn double_arg(args: &[Value], index: usize, name: &str) -> Result<f64, RuntimeError> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| bad_args(name))
}

fn math_pow(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let base = double_arg(&args, 0, "Math.Pow")?;
    let exponent = double_arg(&args, 1, "Math.Pow")?;
    Ok(Value::Double(base.powf(exponent)))
}

fn math_sqrt(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Double(double_arg(&args, 0, "Math.Sqrt")?.sqrt()))
}

fn math_floor(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Double(double_arg(&args, 0, "Math.Floor")?.floor()))
}

fn math_ceiling(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Double(double_arg(&args, 0, "Math.Ceiling")?.ceil()))
}

fn math_round(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Double(
        double_arg(&args, 0, "Math.Round")?.round_ties_even(),
    ))
}

fn console_write_line(ctx: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let text = args.first().map(Value::to_string).unwrap_or_default();
    tracing::debug!(target: "trustbridge_script::console", "{}", text);
    ctx.console.write_line(&text);
    Ok(Value::Void)
}

fn console_write(ctx: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let text = args.first().map(Value::to_string).unwrap_or_default();
    ctx.console.write(&text);
    Ok(Value::Void)
}

fn convert_to(args: Vec<Value>, to: &Type, name: &str) -> NativeResult {
    Ok(first(args, name)?.convert(to)?)
}

fn convert_to_int32(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    convert_to(args, &Type::Int32, "Convert.ToInt32")
}

fn convert_to_int64(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    convert_to(args, &Type::Int64, "Convert.ToInt64")
}

fn convert_to_double(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    convert_to(args, &Type::Double, "Convert.ToDouble")
}

fn convert_to_boolean(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    convert_to(args, &Type::Boolean, "Convert.ToBoolean")
}

fn convert_to_string(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    convert_to(args, &Type::String, "Convert.ToString")
}

fn string_join(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::String(separator), Value::Array(items)] => Ok(Value::String(
            items
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(separator.as_str()),
        )),
        _ => Err(bad_args("String.Join")),
    }
}

fn string_concat(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::String(args.iter().map(Value::to_string).collect()))
}

fn string_is_null_or_empty(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::String(s)] => Ok(Value::Boolean(s.is_empty())),
        _ => Err(bad_args("String.IsNullOrEmpty")),
    }
}

fn environment_variable(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::String(name)] => Ok(Value::String(std::env::var(name).unwrap_or_default())),
        _ => Err(bad_args("Environment.GetEnvironmentVariable")),
    }
}

fn environment_machine_name(_: &mut NativeContext<'_>, _: Vec<Value>) -> NativeResult {
    let name = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    Ok(Value::String(name))
}

fn strings_reverse(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::String(s)] => Ok(Value::String(s.chars().rev().collect())),
        _ => Err(bad_args("Strings.Reverse")),
    }
}

fn strings_repeat(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::String(s), Value::Int32(n)] => {
            let n = usize::try_from(*n).map_err(|_| {
                RuntimeError::new(
                    RuntimeErrorKind::InvalidArgument,
                    "count must be non-negative",
                )
            })?;
            Ok(Value::String(s.repeat(n)))
        }
        _ => Err(bad_args("Strings.Repeat")),
    }
}

fn strings_pad_left(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::String(s), Value::Int32(width)] => {
            let width = usize::try_from(*width).map_err(|_| {
                RuntimeError::new(
                    RuntimeErrorKind::InvalidArgument,
                    "total width must be non-negative",
                )
            })?;
            Ok(Value::String(format!("{:>width$}", s, width = width)))
        }
        _ => Err(bad_args("Strings.PadLeft")),
    }
}

fn enumerable_range(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::Int32(start), Value::Int32(count)] => {
            if *count < 0 || i64::from(*start) + i64::from(*count) - 1 > i64::from(i32::MAX) {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::InvalidArgument,
                    "count is out of range",
                ));
            }
            Ok(Value::Array(
                (0..*count).map(|i| Value::Int32(start + i)).collect(),
            ))
        }
        _ => Err(bad_args("Enumerable.Range")),
    }
}

fn array_arg(args: Vec<Value>, name: &str) -> Result<Vec<Value>, RuntimeError> {
    match first(args, name)? {
        Value::Array(items) => Ok(items),
        _ => Err(bad_args(name)),
    }
}

fn enumerable_sum(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let items = array_arg(args, "Enumerable.Sum")?;
    match items.first() {
        None | Some(Value::Int32(_)) => items
            .iter()
            .try_fold(0i32, |acc, v| match v {
                Value::Int32(x) => acc.checked_add(*x).ok_or_else(overflow),
                _ => Err(bad_args("Enumerable.Sum")),
            })
            .map(Value::Int32),
        Some(Value::Int64(_)) => items
            .iter()
            .try_fold(0i64, |acc, v| match v {
                Value::Int64(x) => acc.checked_add(*x).ok_or_else(overflow),
                _ => Err(bad_args("Enumerable.Sum")),
            })
            .map(Value::Int64),
        Some(_) => Ok(Value::Double(
            items.iter().filter_map(Value::as_f64).sum(),
        )),
    }
}

fn extreme(args: Vec<Value>, name: &str, pick_greater: bool) -> NativeResult {
    let items = array_arg(args, name)?;
    let mut best: Option<Value> = None;
    for item in items {
        let replace = match &best {
            None => true,
            Some(current) => {
                let (a, b) = (item.as_f64(), current.as_f64());
                match (a, b) {
                    (Some(a), Some(b)) => {
                        if pick_greater {
                            a > b
                        } else {
                            a < b
                        }
                    }
                    _ => return Err(bad_args(name)),
                }
            }
        };
        if replace {
            best = Some(item);
        }
    }
    best.ok_or_else(empty_sequence)
}

fn enumerable_min(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    extreme(args, "Enumerable.Min", false)
}

fn enumerable_max(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    extreme(args, "Enumerable.Max", true)
}

fn enumerable_average(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let items = array_arg(args, "Enumerable.Average")?;
    if items.is_empty() {
        return Err(empty_sequence());
    }
    let total: f64 = items.iter().filter_map(Value::as_f64).sum();
    Ok(Value::Double(total / items.len() as f64))
}

fn enumerable_count(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let items = array_arg(args, "Enumerable.Count")?;
    i32::try_from(items.len())
        .map(Value::Int32)
        .map_err(|_| overflow())
}

fn enumerable_contains(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::Array(items), needle] => Ok(Value::Boolean(items.contains(needle))),
        _ => Err(bad_args("Enumerable.Contains")),
    }
}

fn enumerable_reverse(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let mut items = array_arg(args, "Enumerable.Reverse")?;
    items.reverse();
    Ok(Value::Array(items))
}

fn arrays_append(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(Value::Array(mut items)), Some(item)) => {
            items.push(item);
            Ok(Value::Array(items))
        }
        _ => Err(bad_args("Arrays.Append")),
    }
}

fn arrays_concat(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(Value::Array(mut items)), Some(Value::Array(more))) => {
            items.extend(more);
            Ok(Value::Array(items))
        }
        _ => Err(bad_args("Arrays.Concat")),
    }
}

fn arrays_index_of(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::Array(items), needle] => {
            let index = items.iter().position(|item| item == needle);
            Ok(Value::Int32(
                index.and_then(|i| i32::try_from(i).ok()).unwrap_or(-1),
            ))
        }
        _ => Err(bad_args("Arrays.IndexOf")),
    }
}

fn task_delay(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::Int32(ms)] => {
            let ms = u64::try_from(*ms).map_err(|_| {
                RuntimeError::new(
                    RuntimeErrorKind::InvalidArgument,
                    "delay must be non-negative",
                )
            })?;
            std::thread::sleep(Duration::from_millis(ms));
            Ok(Value::Void)
        }
        _ => Err(bad_args("Task.Delay")),
    }
}

fn string_arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str, RuntimeError> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| bad_args(name))
}

fn file_read_all_text(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let path = string_arg(&args, 0, "File.ReadAllText")?;
    std::fs::read_to_string(path)
        .map(Value::String)
        .map_err(|e| RuntimeError::io(&format!("could not read '{}'", path), e))
}

fn file_write_all_text(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let path = string_arg(&args, 0, "File.WriteAllText")?;
    let contents = string_arg(&args, 1, "File.WriteAllText")?;
    std::fs::write(path, contents)
        .map(|_| Value::Void)
        .map_err(|e| RuntimeError::io(&format!("could not write '{}'", path), e))
}

fn file_append_all_text(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    use std::io::Write;

    let path = string_arg(&args, 0, "File.AppendAllText")?;
    let contents = string_arg(&args, 1, "File.AppendAllText")?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(contents.as_bytes()))
        .map(|_| Value::Void)
        .map_err(|e| RuntimeError::io(&format!("could not append to '{}'", path), e))
}

fn file_exists(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let path = string_arg(&args, 0, "File.Exists")?;
    Ok(Value::Boolean(Path::new(path).is_file()))
}

fn file_delete(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let path = string_arg(&args, 0, "File.Delete")?;
    match std::fs::remove_file(path) {
        Ok(()) => Ok(Value::Void),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::Void),
        Err(e) => Err(RuntimeError::io(&format!("could not delete '{}'", path), e)),
    }
}

fn directory_current(_: &mut NativeContext<'_>, _: Vec<Value>) -> NativeResult {
    std::env::current_dir()
        .map(|dir| Value::String(dir.display().to_string()))
        .map_err(|e| RuntimeError::io("could not read the current directory", e))
}

fn directory_set_current(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let path = string_arg(&args, 0, "Directory.SetCurrentDirectory")?;
    std::env::set_current_dir(path)
        .map(|_| Value::Void)
        .map_err(|e| RuntimeError::io(&format!("could not enter '{}'", path), e))
}

fn directory_exists(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let path = string_arg(&args, 0, "Directory.Exists")?;
    Ok(Value::Boolean(Path::new(path).is_dir()))
}

fn directory_create(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let path = string_arg(&args, 0, "Directory.CreateDirectory")?;
    std::fs::create_dir_all(path)
        .map(|_| Value::Void)
        .map_err(|e| RuntimeError::io(&format!("could not create '{}'", path), e))
}

fn path_combine(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let a = string_arg(&args, 0, "Path.Combine")?;
    let b = string_arg(&args, 1, "Path.Combine")?;
    Ok(Value::String(Path::new(a).join(b).display().to_string()))
}

fn path_file_name(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let path = string_arg(&args, 0, "Path.GetFileName")?;
    Ok(Value::String(
        Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
    ))
}

fn path_extension(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let path = string_arg(&args, 0, "Path.GetExtension")?;
    Ok(Value::String(
        Path::new(path)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default(),
    ))
}

fn process_start(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let program = string_arg(&args, 0, "Process.Start")?;
    let arguments = match args.get(1) {
        Some(_) => string_arg(&args, 1, "Process.Start")?,
        None => "",
    };

    let mut child = std::process::Command::new(program)
        .args(arguments.split_whitespace())
        .spawn()
        .map_err(|e| {
            RuntimeError::new(
                RuntimeErrorKind::Process,
                format!("could not start '{}': {}", program, e),
            )
        })?;
    let pid = child.id();
    tracing::debug!(program, pid, "process started");

    std::thread::spawn(move || {
        let _ = child.wait();
    });

    Ok(Value::Int32(i32::try_from(pid).unwrap_or(i32::MAX)))
}

fn process_current_id(_: &mut NativeContext<'_>, _: Vec<Value>) -> NativeResult {
    Ok(Value::Int32(
        i32::try_from(std::process::id()).unwrap_or(i32::MAX),
    ))
}

fn string_to_upper(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::String(string_arg(&args, 0, "String.ToUpper")?.to_uppercase()))
}

fn string_to_lower(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::String(string_arg(&args, 0, "String.ToLower")?.to_lowercase()))
}

fn string_trim(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::String(string_arg(&args, 0, "String.Trim")?.trim().to_string()))
}

fn string_contains(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let s = string_arg(&args, 0, "String.Contains")?;
    let needle = string_arg(&args, 1, "String.Contains")?;
    Ok(Value::Boolean(s.contains(needle)))
}

fn string_starts_with(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let s = string_arg(&args, 0, "String.StartsWith")?;
    let prefix = string_arg(&args, 1, "String.StartsWith")?;
    Ok(Value::Boolean(s.starts_with(prefix)))
}

fn string_ends_with(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let s = string_arg(&args, 0, "String.EndsWith")?;
    let suffix = string_arg(&args, 1, "String.EndsWith")?;
    Ok(Value::Boolean(s.ends_with(suffix)))
}

fn string_index_of(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let s = string_arg(&args, 0, "String.IndexOf")?;
    let needle = string_arg(&args, 1, "String.IndexOf")?;
    let index = s
        .find(needle)
        .map(|byte| s[..byte].chars().count())
        .and_then(|i| i32::try_from(i).ok())
        .unwrap_or(-1);
    Ok(Value::Int32(index))
}

fn string_substring(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let s = string_arg(&args, 0, "String.Substring")?;
    let chars: Vec<char> = s.chars().collect();
    let start = match args.get(1) {
        Some(Value::Int32(start)) => *start,
        _ => return Err(bad_args("String.Substring")),
    };
    let length = match args.get(2) {
        Some(Value::Int32(length)) => *length,
        Some(_) => return Err(bad_args("String.Substring")),
        None => i32::try_from(chars.len()).unwrap_or(i32::MAX).saturating_sub(start),
    };

    let out_of_range = || {
        RuntimeError::new(
            RuntimeErrorKind::IndexOutOfRange,
            format!(
                "start {} and length {} do not refer to a location within a string of length {}",
                start,
                length,
                chars.len()
            ),
        )
    };
    let start_index = usize::try_from(start).map_err(|_| out_of_range())?;
    let len = usize::try_from(length).map_err(|_| out_of_range())?;
    let end = start_index
        .checked_add(len)
        .filter(|end| *end <= chars.len())
        .ok_or_else(out_of_range)?;

    Ok(Value::String(chars[start_index..end].iter().collect()))
}

fn string_replace(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let s = string_arg(&args, 0, "String.Replace")?;
    let from = string_arg(&args, 1, "String.Replace")?;
    let to = string_arg(&args, 2, "String.Replace")?;
    if from.is_empty() {
        return Err(RuntimeError::new(
            RuntimeErrorKind::InvalidArgument,
            "string cannot be of zero length",
        ));
    }
    Ok(Value::String(s.replace(from, to)))
}

fn string_split(_: &mut NativeContext<'_>, args: Vec<Value>) -> NativeResult {
    let s = string_arg(&args, 0, "String.Split")?;
    let separator = string_arg(&args, 1, "String.Split")?;
    let parts = if separator.is_empty() {
        vec![Value::String(s.to_string())]
    } else {
        s.split(separator)
            .map(|part| Value::String(part.to_string()))
            .collect()
    };
    Ok(Value::Array(parts))
}

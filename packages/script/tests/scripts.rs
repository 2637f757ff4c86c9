use std::sync::Arc;

use trustbridge_script::{
    codes, compile, load_library, CompileOptions, Library, RunLimits, RuntimeErrorKind, Severity,
    UnitKind, Value,
};

fn options() -> CompileOptions {
    CompileOptions::default().with_imports(["System", "System.Linq", "System.Text"])
}

fn eval(source: &str) -> Value {
    let compilation = compile(source, UnitKind::Script, &options());
    let errors: Vec<String> = compilation.errors().map(|d| d.to_string()).collect();
    let unit = compilation
        .unit
        .unwrap_or_else(|| panic!("compilation failed: {:?}", errors));
    unit.run(None, &RunLimits::default()).result.unwrap()
}

fn error_codes(source: &str, kind: UnitKind) -> Vec<&'static str> {
    compile(source, kind, &options())
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.code)
        .collect()
}

#[test]
fn loops_and_locals() {
    let source = r#"
        int total = 0;
        for (int i = 1; i <= 10; i++) {
            if (i % 2 == 0) { continue; }
            total += i;
        }
        var n = 0;
        while (true) {
            n++;
            if (n == 3) break;
        }
        total * 100 + n
    "#;
    assert_eq!(eval(source), Value::Int32(2503));
}

#[test]
fn functions_and_recursion() {
    let source = r#"
        long Fact(int n) {
            if (n <= 1) return 1;
            return n * Fact(n - 1);
        }
        Fact(20)
    "#;
    assert_eq!(eval(source), Value::Int64(2_432_902_008_176_640_000));
}

#[test]
fn structs_and_arrays() {
    let source = r#"
        struct Point { int X; int Y; }
        var points = new Point[3];
        for (int i = 0; i < points.Length; i++) {
            points[i].X = i;
            points[i].Y = i * i;
        }
        var p = new Point { X = 10 };
        int sum = p.X + p.Y;
        foreach (var q in points) { sum += q.Y; }
        sum
    "#;
    assert_eq!(eval(source), Value::Int32(15));
}

#[test]
fn strings_and_library_calls() {
    let source = r#"
        var words = "a,b,c".Split(",");
        var joined = String.Join("-", words);
        joined.ToUpper() + " " + Enumerable.Sum(new[] { 1, 2, 3 }) + " " + Math.Max(2, 2.5)
    "#;
    assert_eq!(eval(source), Value::String("A-B-C 6 2.5".into()));
}

#[test]
fn numeric_widening() {
    assert_eq!(eval("long x = 2; double d = x; d / 4"), Value::Double(0.5));
    assert_eq!(eval("1 + 2L"), Value::Int64(3));
}

#[test]
fn console_output_is_captured() {
    let unit = compile(
        "Console.Write(\"a\"); Console.WriteLine(1); Console.WriteLine(true);",
        UnitKind::Script,
        &options(),
    )
    .unit
    .unwrap();
    let outcome = unit.run(None, &RunLimits::default());
    assert_eq!(outcome.console, vec!["a1", "True"]);
}

#[test]
fn runtime_errors_carry_line() {
    let unit = compile("int a = 1;\nint b = 0;\nvar c = a / b;", UnitKind::Script, &options())
        .unit
        .unwrap();
    let err = unit.run(None, &RunLimits::default()).result.unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::DivideByZero);
    assert_eq!(err.line, Some(3));

    let unit = compile("var a = new[] { 1 };\na[1]", UnitKind::Script, &options())
        .unit
        .unwrap();
    let err = unit.run(None, &RunLimits::default()).result.unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::IndexOutOfRange);

    let unit = compile("throw \"boom\";", UnitKind::Script, &options())
        .unit
        .unwrap();
    let err = unit.run(None, &RunLimits::default()).result.unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::Thrown);
    assert_eq!(err.message, "boom");
}

#[test]
fn unbounded_recursion_is_stopped() {
    let unit = compile("int F(int n) { return F(n + 1); }\nF(0)", UnitKind::Script, &options())
        .unit
        .unwrap();
    let err = unit.run(None, &RunLimits::default()).result.unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::StackOverflow);
}

#[test]
fn long_operator_chains_are_bounded() {
    let terms = vec!["1"; 100].join(" + ");
    assert_eq!(eval(&format!("return {};", terms)), Value::Int32(100));

    let terms = vec!["1"; 3000].join(" + ");
    let found = error_codes(&format!("return {};", terms), UnitKind::Script);
    assert!(found.contains(&codes::NESTING_TOO_DEEP), "{:?}", found);
}

#[test]
fn deeply_nested_scripts_do_not_compile() {
    let depth = 3000;
    let source = format!("return {}1{};", "(".repeat(depth), ")".repeat(depth));
    let found = error_codes(&source, UnitKind::Script);
    assert_eq!(found, vec![codes::NESTING_TOO_DEEP]);
}

#[test]
fn semantic_errors() {
    assert_eq!(error_codes("var x = y;", UnitKind::Script), vec![codes::UNKNOWN_NAME]);
    assert_eq!(error_codes("int x = \"s\";", UnitKind::Script), vec![codes::TYPE_MISMATCH]);
    assert_eq!(error_codes("Widget w;", UnitKind::Script), vec![codes::UNKNOWN_TYPE]);
    assert_eq!(error_codes("using Nope;", UnitKind::Script), vec![codes::UNKNOWN_NAMESPACE]);
    assert_eq!(error_codes("Math.Nope(1);", UnitKind::Script), vec![codes::UNKNOWN_FUNCTION]);
    assert_eq!(error_codes("break;", UnitKind::Script), vec![codes::MISPLACED_JUMP]);
    assert_eq!(error_codes("1 + 2;", UnitKind::Script), vec![codes::INVALID_STATEMENT]);
    assert_eq!(
        error_codes("struct A { B b; }\nstruct B { A a; }", UnitKind::Script),
        vec![codes::RECURSIVE_STRUCT, codes::RECURSIVE_STRUCT]
    );
    assert_eq!(
        error_codes("int F() { return \"x\"; }", UnitKind::Script),
        vec![codes::TYPE_MISMATCH]
    );
}

#[test]
fn warnings_do_not_fail_compilation() {
    let compilation = compile("int unused = 1;\nreturn 2;\nvar x = 3;", UnitKind::Script, &options());
    assert!(compilation.succeeded());
    let warnings: Vec<&str> = compilation
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .map(|d| d.code)
        .collect();
    assert!(warnings.contains(&codes::UNUSED_VARIABLE));
    assert!(warnings.contains(&codes::UNREACHABLE_CODE));
}

#[test]
fn programs_need_main() {
    assert_eq!(
        error_codes("static void Run() { }", UnitKind::Program),
        vec![codes::MISSING_MAIN]
    );
    assert_eq!(
        error_codes("Console.WriteLine(1);\nstatic void Main() { }", UnitKind::Program),
        vec![codes::MISPLACED_ITEM]
    );
}

#[test]
fn script_libraries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geometry.tsl");
    std::fs::write(
        &path,
        r#"
        namespace Shapes.Geometry;
        public struct Rect { double W; double H; }
        public static double Area(Rect r) { return Scale(r.W * r.H); }
        static double Scale(double v) { return v; }
        "#,
    )
    .unwrap();

    let library = Arc::new(load_library(&path, &[]).unwrap());
    assert_eq!(library.name(), "Shapes.Geometry");
    assert_eq!(library.path(), Some(path.as_path()));

    let options = options()
        .with_library(library)
        .with_imports(["Shapes.Geometry"]);
    let unit = compile("Area(new Rect { W = 2, H = 3.5 })", UnitKind::Script, &options)
        .unit
        .unwrap();
    let outcome = unit.run(None, &RunLimits::default());
    assert_eq!(outcome.result.unwrap(), Value::Double(7.0));
}

#[test]
fn invalid_library() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.tsl");
    std::fs::write(&path, "static int F() { return 1; }").unwrap();
    assert!(matches!(
        load_library(&path, &[]),
        Err(trustbridge_script::LibraryError::Invalid { .. })
    ));

    let missing = dir.path().join("missing.tsl");
    assert!(matches!(
        load_library(&missing, &[Library::standard()]),
        Err(trustbridge_script::LibraryError::Io { .. })
    ));
}

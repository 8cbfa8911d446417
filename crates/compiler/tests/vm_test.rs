//! End-to-end tests: source text through the compiler and the VM to a
//! final value. After every successful run the stack pointer must be
//! back at zero.

use monkey_compiler::Compiler;
use monkey_syntax::parse;
use monkey_vm::value::Value;
use monkey_vm::vm::{RuntimeError, VM};

enum Expected {
    Int(i64),
    Bool(bool),
    Str(&'static str),
    Null,
    IntArray(&'static [i64]),
    /// A host error value produced by a builtin.
    Error(&'static str),
    /// The value's inspect rendering (used for hashes, whose display is
    /// sorted and therefore deterministic).
    Rendered(&'static str),
}

fn run_program(input: &str) -> Result<VM, RuntimeError> {
    let (program, errors) = parse(input);
    assert!(errors.is_empty(), "parse errors for {:?}: {:?}", input, errors);
    let program = program.expect("no program parsed");

    let mut compiler = Compiler::new();
    compiler
        .compile(&program)
        .unwrap_or_else(|err| panic!("compiler error for {:?}: {}", input, err));

    let mut vm = VM::new(compiler.bytecode());
    vm.run().map(|()| vm)
}

fn check_value(input: &str, expected: &Expected, actual: &Value) {
    match expected {
        Expected::Int(want) => assert!(
            actual.equals(&Value::Integer(*want)),
            "wrong value for {:?}: want {}, got {:?}",
            input,
            want,
            actual
        ),
        Expected::Bool(want) => assert!(
            actual.equals(&Value::Boolean(*want)),
            "wrong value for {:?}: want {}, got {:?}",
            input,
            want,
            actual
        ),
        Expected::Str(want) => assert!(
            actual.equals(&Value::string(*want)),
            "wrong value for {:?}: want {:?}, got {:?}",
            input,
            want,
            actual
        ),
        Expected::Null => assert!(
            matches!(actual, Value::Null),
            "wrong value for {:?}: want null, got {:?}",
            input,
            actual
        ),
        Expected::IntArray(want) => match actual {
            Value::Array(elements) => {
                let elements = elements.borrow();
                assert_eq!(
                    elements.len(),
                    want.len(),
                    "wrong element count for {:?}: got {:?}",
                    input,
                    elements
                );
                for (i, expected_element) in want.iter().enumerate() {
                    assert!(
                        elements[i].equals(&Value::Integer(*expected_element)),
                        "wrong element {} for {:?}: want {}, got {:?}",
                        i,
                        input,
                        expected_element,
                        elements[i]
                    );
                }
            }
            other => panic!("wrong value for {:?}: want array, got {:?}", input, other),
        },
        Expected::Error(want) => match actual {
            Value::Error(message) => assert_eq!(
                message.as_str(),
                *want,
                "wrong error message for {:?}",
                input
            ),
            other => panic!("wrong value for {:?}: want error, got {:?}", input, other),
        },
        Expected::Rendered(want) => assert_eq!(
            actual.inspect(),
            *want,
            "wrong rendering for {:?}",
            input
        ),
    }
}

fn run_vm_tests(tests: &[(&str, Expected)]) {
    for (input, expected) in tests {
        let vm = run_program(input)
            .unwrap_or_else(|err| panic!("vm error for {:?}: {}", input, err));
        assert_eq!(vm.sp(), 0, "non-zero stack pointer for {:?}", input);
        check_value(input, expected, vm.last_popped());
    }
}

fn run_vm_error_tests(tests: &[(&str, &str)]) {
    for (input, expected) in tests {
        match run_program(input) {
            Ok(_) => panic!("expected VM error for {:?}", input),
            Err(err) => assert_eq!(err.to_string(), *expected, "wrong error for {:?}", input),
        }
    }
}

#[test]
fn test_integer_arithmetic() {
    run_vm_tests(&[
        ("1", Expected::Int(1)),
        ("2", Expected::Int(2)),
        ("1 + 2", Expected::Int(3)),
        ("1 - 2", Expected::Int(-1)),
        ("1 * 2", Expected::Int(2)),
        ("4 / 2", Expected::Int(2)),
        ("50 / 2 * 2 + 10 - 5", Expected::Int(55)),
        ("5 * (2 + 10)", Expected::Int(60)),
        ("5 + 5 + 5 + 5 - 10", Expected::Int(10)),
        ("2 * 2 * 2 * 2 * 2", Expected::Int(32)),
        ("5 * 2 + 10", Expected::Int(20)),
        ("5 + 2 * 10", Expected::Int(25)),
        ("-5", Expected::Int(-5)),
        ("-50 + 100 + -50", Expected::Int(0)),
        ("(5 + 10 * 2 + 15 / 3) * 2 + -10", Expected::Int(50)),
        ("5 % 2", Expected::Int(1)),
        ("1 | 2", Expected::Int(3)),
        ("2 ^ 4", Expected::Int(6)),
        ("3 & 6", Expected::Int(2)),
        ("~1", Expected::Int(-2)),
        ("!1", Expected::Bool(false)),
    ]);
}

#[test]
fn test_boolean_expressions() {
    run_vm_tests(&[
        ("true", Expected::Bool(true)),
        ("false", Expected::Bool(false)),
        ("null", Expected::Null),
        ("!true", Expected::Bool(false)),
        ("!false", Expected::Bool(true)),
        ("!5", Expected::Bool(false)),
        ("!!true", Expected::Bool(true)),
        ("!!5", Expected::Bool(true)),
        ("true && true", Expected::Bool(true)),
        ("false && true", Expected::Bool(false)),
        ("true || false", Expected::Bool(true)),
        ("false || false", Expected::Bool(false)),
        ("1 < 2", Expected::Bool(true)),
        ("1 > 2", Expected::Bool(false)),
        ("1 < 1", Expected::Bool(false)),
        ("1 > 1", Expected::Bool(false)),
        ("1 <= 2", Expected::Bool(true)),
        ("2 <= 2", Expected::Bool(true)),
        ("3 <= 2", Expected::Bool(false)),
        ("1 >= 2", Expected::Bool(false)),
        ("2 >= 2", Expected::Bool(true)),
        ("1 == 1", Expected::Bool(true)),
        ("1 != 1", Expected::Bool(false)),
        ("1 == 2", Expected::Bool(false)),
        ("1 != 2", Expected::Bool(true)),
        ("true == true", Expected::Bool(true)),
        ("true == false", Expected::Bool(false)),
        ("true != false", Expected::Bool(true)),
        ("(1 < 2) == true", Expected::Bool(true)),
        ("(1 > 2) == false", Expected::Bool(true)),
        ("(1 <= 2) == true", Expected::Bool(true)),
        ("(1 >= 2) == false", Expected::Bool(true)),
        ("!(if (false) { 5; })", Expected::Bool(true)),
        (r#""a" == "a""#, Expected::Bool(true)),
        (r#""a" != "b""#, Expected::Bool(true)),
        (r#""a" < "b""#, Expected::Bool(true)),
        (r#""b" > "a""#, Expected::Bool(true)),
        ("null == null", Expected::Bool(true)),
        ("1 == \"1\"", Expected::Bool(false)),
    ]);
}

#[test]
fn test_conditionals() {
    run_vm_tests(&[
        ("if (true) { 10 }", Expected::Int(10)),
        ("if (true) { 10 } else { 20 }", Expected::Int(10)),
        ("if (false) { 10 } else { 20 }", Expected::Int(20)),
        ("if (1) { 10 }", Expected::Int(10)),
        ("if (0) { 10 }", Expected::Int(10)),
        ("if (1 < 2) { 10 }", Expected::Int(10)),
        ("if (1 > 2) { 10 } else { 20 }", Expected::Int(20)),
        ("if (1 > 2) { 10 }", Expected::Null),
        ("if (false) { 10 }", Expected::Null),
        ("if ((if (false) { 10 })) { 10 } else { 20 }", Expected::Int(20)),
        ("if (true) { a := 5; }", Expected::Null),
        ("if (true) { 10; a := 5; }", Expected::Null),
        ("if (false) { 10 } else { b := 5; }", Expected::Null),
        ("x := 0; if (true) { x = 1; }; if (false) { x = 2; }; x", Expected::Int(1)),
        ("if (1 < 2) { 10 } else if (1 == 2) { 20 }", Expected::Int(10)),
        ("if (1 > 2) { 10 } else if (1 == 2) { 20 } else { 30 }", Expected::Int(30)),
    ]);
}

#[test]
fn test_while_loops() {
    run_vm_tests(&[
        ("while (false) { }", Expected::Null),
        ("n := 0; while (n < 10) { n := n + 1 }; n", Expected::Int(10)),
        ("n := 10; while (n > 0) { n := n - 1 }; n", Expected::Int(0)),
        ("n := 0; while (n < 10) { n = n + 1 }", Expected::Null),
        ("n := 0; while (n < 10) { n = n + 1 }; n", Expected::Int(10)),
        ("n := 10; while (n > 0) { n = n - 1 }; n", Expected::Int(0)),
        (
            "sum := 0; i := 0; while (i < 5) { sum = sum + i; i = i + 1 }; sum",
            Expected::Int(10),
        ),
    ]);
}

#[test]
fn test_global_bind_expressions() {
    run_vm_tests(&[
        ("one := 1; one", Expected::Int(1)),
        ("one := 1; two := 2; one + two", Expected::Int(3)),
        ("one := 1; two := one + one; one + two", Expected::Int(3)),
        ("one := 1;", Expected::Null),
    ]);
}

#[test]
fn test_assignment_expressions() {
    run_vm_tests(&[
        ("a := 0; a = 5;", Expected::Null),
        ("a := 0; a = 5; a;", Expected::Int(5)),
        ("a := 0; a = 5 * 5; a;", Expected::Int(25)),
        ("a := 0; a = 5; b := 0; b = a; b;", Expected::Int(5)),
        ("one := 0; one = 1; two := 0; two = one + one; one + two", Expected::Int(3)),
    ]);
}

#[test]
fn test_clone_on_bind() {
    run_vm_tests(&[
        // Scalars and strings detach on bind.
        ("a := 5; b := a; a = 0; b;", Expected::Int(5)),
        (r#"a := "x"; b := a; a = "y"; b;"#, Expected::Str("x")),
        // Aggregates alias on bind.
        ("xs := [1]; ys := xs; xs[0] = 9; ys[0];", Expected::Int(9)),
        ("h := {}; g := h; h[1] = 2; g[1];", Expected::Int(2)),
        // push copies, and clones scalar arguments.
        ("xs := [1]; ys := push(xs, 2); len(xs);", Expected::Int(1)),
        ("xs := [1]; ys := push(xs, 2); len(ys);", Expected::Int(2)),
    ]);
}

#[test]
fn test_string_expressions() {
    run_vm_tests(&[
        (r#""monkey""#, Expected::Str("monkey")),
        (r#""mon" + "key""#, Expected::Str("monkey")),
        (r#""mon" + "key" + "banana""#, Expected::Str("monkeybanana")),
        (r#"" " * 4"#, Expected::Str("    ")),
        (r#"4 * " ""#, Expected::Str("    ")),
    ]);
}

#[test]
fn test_array_literals() {
    run_vm_tests(&[
        ("[]", Expected::IntArray(&[])),
        ("[1, 2, 3]", Expected::IntArray(&[1, 2, 3])),
        ("[1 + 2, 3 * 4, 5 + 6]", Expected::IntArray(&[3, 12, 11])),
    ]);
}

#[test]
fn test_array_operators() {
    run_vm_tests(&[
        ("[] + [1]", Expected::IntArray(&[1])),
        ("[1] + [2]", Expected::IntArray(&[1, 2])),
        ("[1, 2] + [3, 4]", Expected::IntArray(&[1, 2, 3, 4])),
        ("[1] * 3", Expected::IntArray(&[1, 1, 1])),
        ("3 * [1]", Expected::IntArray(&[1, 1, 1])),
        ("[1, 2] * 2", Expected::IntArray(&[1, 2, 1, 2])),
    ]);
}

#[test]
fn test_hash_literals() {
    run_vm_tests(&[
        ("{}", Expected::Rendered("{}")),
        ("{1: 2, 2: 3}", Expected::Rendered("{1: 2, 2: 3}")),
        ("{1 + 1: 2 * 2, 3 + 3: 4 * 4}", Expected::Rendered("{2: 4, 6: 16}")),
        (r#"{"a": 1, true: 2}"#, Expected::Rendered("{\"a\": 1, true: 2}")),
    ]);
}

#[test]
fn test_hash_merging() {
    run_vm_tests(&[
        (r#"{} + {"a": 1}"#, Expected::Rendered("{\"a\": 1}")),
        (r#"{"a": 1} + {"b": 2}"#, Expected::Rendered("{\"a\": 1, \"b\": 2}")),
        // Right-hand pairs override left-hand ones.
        (r#"{"a": 1} + {"a": 2}"#, Expected::Rendered("{\"a\": 2}")),
    ]);
}

#[test]
fn test_index_expressions() {
    run_vm_tests(&[
        ("[1, 2, 3][1]", Expected::Int(2)),
        ("[1, 2, 3][0 + 2]", Expected::Int(3)),
        ("[[1, 1, 1]][0][0]", Expected::Int(1)),
        ("[][0]", Expected::Null),
        ("[1, 2, 3][99]", Expected::Null),
        ("[1][-1]", Expected::Null),
        ("{1: 1, 2: 2}[1]", Expected::Int(1)),
        ("{1: 1, 2: 2}[2]", Expected::Int(2)),
        ("{1: 1}[0]", Expected::Null),
        ("{}[0]", Expected::Null),
        (r#"{true: 10}[true]"#, Expected::Int(10)),
        (r#""abc"[0]"#, Expected::Str("a")),
        (r#""abc"[1]"#, Expected::Str("b")),
        (r#""abc"[2]"#, Expected::Str("c")),
        (r#""abc"[3]"#, Expected::Str("")),
        (r#""abc"[-1]"#, Expected::Str("")),
    ]);
}

#[test]
fn test_selector_expressions() {
    run_vm_tests(&[
        (r#"{"foo": 5}.foo"#, Expected::Int(5)),
        (r#"{"foo": 5}.bar"#, Expected::Null),
        ("{}.foo", Expected::Null),
        (r#"h := {"a": {"b": 3}}; h.a.b"#, Expected::Int(3)),
    ]);
}

#[test]
fn test_index_assignment() {
    run_vm_tests(&[
        ("xs := [1, 2, 3]; xs[1] = 4; xs[1];", Expected::Int(4)),
        ("xs := [1]; r := (xs[0] = 5); r;", Expected::Null),
        (r#"h := {}; h["k"] = 1; h["k"];"#, Expected::Int(1)),
        (r#"h := {"k": 1}; h["k"] = 2; h["k"];"#, Expected::Int(2)),
    ]);
}

#[test]
fn test_functions() {
    run_vm_tests(&[
        (
            "fivePlusTen := fn() { return 5 + 10; }; fivePlusTen();",
            Expected::Int(15),
        ),
        (
            "one := fn() { return 1; }; two := fn() { return 2; }; one() + two()",
            Expected::Int(3),
        ),
        (
            "a := fn() { return 1 }; b := fn() { return a() + 1 }; c := fn() { return b() + 1 }; c();",
            Expected::Int(3),
        ),
        (
            "earlyExit := fn() { return 99; 100; }; earlyExit();",
            Expected::Int(99),
        ),
        (
            "earlyExit := fn() { return 99; return 100; }; earlyExit();",
            Expected::Int(99),
        ),
        ("noReturn := fn() { }; noReturn();", Expected::Null),
        // Without an explicit return the body's value is discarded.
        ("implicit := fn() { 5 }; implicit();", Expected::Null),
        (
            "noReturn := fn() { }; noReturnTwo := fn() { noReturn(); }; noReturn(); noReturnTwo();",
            Expected::Null,
        ),
    ]);
}

#[test]
fn test_first_class_functions() {
    run_vm_tests(&[
        (
            "returnsOne := fn() { return 1; }; returnsOneReturner := fn() { return returnsOne; }; returnsOneReturner()();",
            Expected::Int(1),
        ),
        (
            "returnsOneReturner := fn() { returnsOne := fn() { return 1; }; return returnsOne; }; returnsOneReturner()();",
            Expected::Int(1),
        ),
    ]);
}

#[test]
fn test_functions_with_bindings() {
    run_vm_tests(&[
        ("one := fn() { one := 1; return one }; one();", Expected::Int(1)),
        (
            "oneAndTwo := fn() { one := 1; two := 2; return one + two; }; oneAndTwo();",
            Expected::Int(3),
        ),
        (
            "oneAndTwo := fn() { one := 1; two := 2; return one + two; };
             threeAndFour := fn() { three := 3; four := 4; return three + four; };
             oneAndTwo() + threeAndFour();",
            Expected::Int(10),
        ),
        (
            "firstFoobar := fn() { foobar := 50; return foobar; };
             secondFoobar := fn() { foobar := 100; return foobar; };
             firstFoobar() + secondFoobar();",
            Expected::Int(150),
        ),
        (
            "globalSeed := 50;
             minusOne := fn() { num := 1; return globalSeed - num; }
             minusTwo := fn() { num := 2; return globalSeed - num; }
             minusOne() + minusTwo();",
            Expected::Int(97),
        ),
    ]);
}

#[test]
fn test_functions_with_arguments() {
    run_vm_tests(&[
        ("identity := fn(a) { return a; }; identity(4);", Expected::Int(4)),
        ("sum := fn(a, b) { return a + b; }; sum(1, 2);", Expected::Int(3)),
        (
            "sum := fn(a, b) { c := a + b; return c; }; sum(1, 2);",
            Expected::Int(3),
        ),
        (
            "sum := fn(a, b) { c := a + b; return c; }; sum(1, 2) + sum(3, 4);",
            Expected::Int(10),
        ),
        (
            "sum := fn(a, b) { c := a + b; return c; };
             outer := fn() { return sum(1, 2) + sum(3, 4); };
             outer();",
            Expected::Int(10),
        ),
        (
            "globalNum := 10;
             sum := fn(a, b) { c := a + b; return c + globalNum; };
             outer := fn() { return sum(1, 2) + sum(3, 4) + globalNum; };
             outer() + globalNum;",
            Expected::Int(50),
        ),
    ]);
}

#[test]
fn test_calling_with_wrong_arguments() {
    run_vm_error_tests(&[
        (
            "fn() { return 1; }(1);",
            "wrong number of arguments: want=0, got=1",
        ),
        (
            "fn(a) { return a; }();",
            "wrong number of arguments: want=1, got=0",
        ),
        (
            "fn(a, b) { return a + b; }(1);",
            "wrong number of arguments: want=2, got=1",
        ),
    ]);
}

#[test]
fn test_closures() {
    run_vm_tests(&[
        (
            "newClosure := fn(a) { return fn() { return a; }; };
             closure := newClosure(99);
             closure();",
            Expected::Int(99),
        ),
        (
            "newAdder := fn(a, b) { return fn(c) { return a + b + c }; };
             adder := newAdder(1, 2);
             adder(8);",
            Expected::Int(11),
        ),
        (
            "newAdder := fn(a, b) { c := a + b; return fn(d) { return c + d }; };
             adder := newAdder(1, 2);
             adder(8);",
            Expected::Int(11),
        ),
        (
            "newAdderOuter := fn(a, b) {
                 c := a + b;
                 return fn(d) {
                     e := d + c;
                     return fn(f) { return e + f; };
                 };
             };
             newAdderInner := newAdderOuter(1, 2)
             adder := newAdderInner(3);
             adder(8);",
            Expected::Int(14),
        ),
        (
            "a := 1;
             newAdderOuter := fn(b) {
                 return fn(c) {
                     return fn(d) { return a + b + c + d };
                 };
             };
             newAdderInner := newAdderOuter(2)
             adder := newAdderInner(3);
             adder(8);",
            Expected::Int(14),
        ),
        (
            "newClosure := fn(a, b) {
                 one := fn() { return a; };
                 two := fn() { return b; };
                 return fn() { return one() + two(); };
             };
             closure := newClosure(9, 90);
             closure();",
            Expected::Int(99),
        ),
        (
            "newAdder := fn(a) { return fn(b) { return a + b } }; newAdder(2)(3);",
            Expected::Int(5),
        ),
    ]);
}

#[test]
fn test_recursive_functions() {
    run_vm_tests(&[
        (
            "countDown := fn(x) { if (x == 0) { return 0; } else { return countDown(x - 1); } };
             countDown(1);",
            Expected::Int(0),
        ),
        (
            "countDown := fn(x) { if (x == 0) { return 0; } else { return countDown(x - 1); } };
             wrapper := fn() { return countDown(1); };
             wrapper();",
            Expected::Int(0),
        ),
        // A closure defined inside a function can still call itself by
        // name through its self slot.
        (
            "wrapper := fn() {
                 countDown := fn(x) {
                     if (x == 0) { return 2; } else { return countDown(x - 1); }
                 };
                 return countDown(1);
             };
             wrapper();",
            Expected::Int(2),
        ),
    ]);
}

#[test]
fn test_recursive_fibonacci() {
    run_vm_tests(&[(
        "fibonacci := fn(x) {
             if (x == 0) {
                 return 0;
             } else {
                 if (x == 1) {
                     return 1;
                 } else {
                     return fibonacci(x - 1) + fibonacci(x - 2);
                 }
             }
         };
         fibonacci(15);",
        Expected::Int(610),
    )]);
}

#[test]
fn test_tail_calls() {
    run_vm_tests(&[
        (
            "fact := fn(n, a) {
                 if (n == 0) { return a }
                 return fact(n - 1, a * n)
             }
             fact(5, 1)",
            Expected::Int(120),
        ),
        // Without frame reuse this would overflow MaxFrames.
        (
            "iter := fn(n, max) {
                 if (n == max) { return n }
                 return iter(n + 1, max)
             }
             iter(0, 9999)",
            Expected::Int(9999),
        ),
    ]);
}

#[test]
fn test_non_tail_recursion_overflows_frames() {
    run_vm_error_tests(&[(
        "f := fn() { return f() + 1; }; f();",
        "frame overflow",
    )]);
}

#[test]
fn test_builtin_functions() {
    run_vm_tests(&[
        (r#"len("")"#, Expected::Int(0)),
        (r#"len("four")"#, Expected::Int(4)),
        (r#"len("hello world")"#, Expected::Int(11)),
        (r#"len("∑")"#, Expected::Int(1)),
        ("len([1, 2, 3])", Expected::Int(3)),
        ("len([])", Expected::Int(0)),
        (
            "len(1)",
            Expected::Error("argument to `len` not supported, got int"),
        ),
        (
            r#"len("one", "two")"#,
            Expected::Error("wrong number of arguments. got=2, want=1"),
        ),
        ("first([1, 2, 3])", Expected::Int(1)),
        ("first([])", Expected::Null),
        (
            "first(1)",
            Expected::Error("argument to `first` must be array, got int"),
        ),
        ("last([1, 2, 3])", Expected::Int(3)),
        ("last([])", Expected::Null),
        ("rest([1, 2, 3])", Expected::IntArray(&[2, 3])),
        ("rest([])", Expected::Null),
        ("push([], 1)", Expected::IntArray(&[1])),
        (
            "push(1, 1)",
            Expected::Error("argument to `push` must be array, got int"),
        ),
        ("pop([1])", Expected::Int(1)),
        (
            "pop([])",
            Expected::Error("cannot pop from an empty array"),
        ),
        ("xs := [1, 2]; pop(xs); len(xs)", Expected::Int(1)),
        ("bool(1)", Expected::Bool(true)),
        ("bool(0)", Expected::Bool(false)),
        ("bool(null)", Expected::Bool(false)),
        (r#"bool("")"#, Expected::Bool(false)),
        (r#"bool("foo")"#, Expected::Bool(true)),
        ("bool([])", Expected::Bool(false)),
        ("bool([1])", Expected::Bool(true)),
        ("bool({})", Expected::Bool(false)),
        (r#"bool({"a": 1})"#, Expected::Bool(true)),
        ("int(true)", Expected::Int(1)),
        ("int(false)", Expected::Int(0)),
        ("int(1)", Expected::Int(1)),
        (r#"int("10")"#, Expected::Int(10)),
        ("str(null)", Expected::Str("null")),
        ("str(true)", Expected::Str("true")),
        ("str(10)", Expected::Str("10")),
        (r#"str("foo")"#, Expected::Str("foo")),
        ("str([1, 2, 3])", Expected::Str("[1, 2, 3]")),
        (r#"str({"a": 1})"#, Expected::Str("{\"a\": 1}")),
        ("typeof(1)", Expected::Str("int")),
        (r#"typeof("x")"#, Expected::Str("str")),
        ("typeof(null)", Expected::Str("null")),
        ("typeof([])", Expected::Str("array")),
        ("typeof({})", Expected::Str("hash")),
        ("typeof(len)", Expected::Str("builtin")),
        ("typeof(fn() { })", Expected::Str("closure")),
        (r#"upper("abc")"#, Expected::Str("ABC")),
        (r#"lower("AbC")"#, Expected::Str("abc")),
        (r#"find("hello", "llo")"#, Expected::Int(2)),
        ("find([5, 7], 7)", Expected::Int(1)),
        (r#"join([1, 2, 3], "-")"#, Expected::Str("1-2-3")),
        (r#"len(split("a,b,c", ","))"#, Expected::Int(3)),
        (r#"split("a,b,c", ",")[1]"#, Expected::Str("b")),
        (r#"print("hello", "world!")"#, Expected::Null),
    ]);
}

#[test]
fn test_builtins_as_values() {
    run_vm_tests(&[
        ("length := len; length([1, 2])", Expected::Int(2)),
        ("apply := fn(f, x) { return f(x); }; apply(len, [1, 2, 3])", Expected::Int(3)),
    ]);
}

#[test]
fn test_runtime_errors() {
    run_vm_error_tests(&[
        (
            "5 + true",
            "unsupported types for binary operation: int bool",
        ),
        (
            "5 + true; 5;",
            "unsupported types for binary operation: int bool",
        ),
        ("-true", "unsupported type for negation: bool"),
        ("~true", "unsupported type for bitwise NOT: bool"),
        ("true > false", "unknown operator: GreaterThan (bool bool)"),
        ("1 && 2", "unknown operator: And (int int)"),
        (r#""a" - "b""#, "unknown operator: Sub (str str)"),
        ("1 / 0", "division by zero"),
        ("1 % 0", "division by zero"),
        ("{[]: 1}", "unusable as hash key: array"),
        ("{1: 1}[[]]", "unusable as hash key: array"),
        (
            "[1, 2][true]",
            "index operator not supported: left=array index=bool",
        ),
        (
            "5[0]",
            "index operator not supported: left=int index=int",
        ),
        ("xs := [1]; xs[5] = 1;", "index out of range: 5"),
        ("xs := [1]; xs[-1] = 1;", "index out of range: -1"),
        ("5(1)", "calling non-closure and non-builtin"),
        (r#""x"()"#, "calling non-closure and non-builtin"),
    ]);
}

#[test]
fn test_stack_is_balanced_after_every_statement() {
    let sources = [
        "a := 1; b := 2; a + b; [a, b]; {a: b}; if (a < b) { a } else { b };",
        "f := fn(x) { return x; }; f(1); f(2); while (false) { };",
        "xs := [1, 2]; xs[0] = 9; xs[0]; pop(xs);",
    ];
    for source in sources {
        let vm = run_program(source).expect("program should run");
        assert_eq!(vm.sp(), 0, "non-zero stack pointer for {:?}", source);
    }
}

#[test]
fn test_deterministic_reruns() {
    let source = "xs := [3, 1, 2]; xs[0] * 100 + xs[1] * 10 + xs[2]";
    let first = run_program(source).expect("program should run");
    let second = run_program(source).expect("program should run");
    assert!(first.last_popped().equals(second.last_popped()));
}

#[test]
fn test_top_level_return_terminates() {
    let vm = run_program("return 5;").expect("program should run");
    assert!(vm.last_popped().equals(&Value::Integer(5)));
}

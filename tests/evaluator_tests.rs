use pretty_assertions::assert_eq;

use lark::builtins::parse_leading_number;
use lark::error::panic_header;
use lark::runner::{parse_source, run_in};
use lark::{Console, ErrorKind, Evaluator, EvaluatorConfig, Halt, Span, Value};

fn run_with(mut evaluator: Evaluator, source: &str) -> (Result<(), Halt>, String) {
    let program = parse_source(source).expect("program should parse");
    let result = evaluator
        .evaluate_program(&program)
        .and_then(|()| evaluator.finish());
    (result, evaluator.console().output().to_string())
}

fn run(source: &str) -> (Result<(), Halt>, String) {
    run_with(Evaluator::with_console(Console::captured()), source)
}

fn run_with_input(source: &str, input: &str) -> (Result<(), Halt>, String) {
    run_with(
        Evaluator::with_console(Console::captured_with_input(input)),
        source,
    )
}

/// Output of a program that must finish cleanly.
fn output(source: &str) -> String {
    match run(source) {
        (Ok(()), out) => out,
        (Err(halt), out) => panic!("program halted with {:?}; output so far: {:?}", halt, out),
    }
}

/// Kind of the fatal error a program must stop with.
fn error_kind(source: &str) -> ErrorKind {
    match run(source).0 {
        Err(Halt::Error(error)) => error.kind,
        other => panic!("expected a fatal error, got {:?}", other),
    }
}

fn error_message(source: &str) -> String {
    match run(source).0 {
        Err(Halt::Error(error)) => error.message,
        other => panic!("expected a fatal error, got {:?}", other),
    }
}

// ============================================================================
// Values and operators
// ============================================================================

#[test]
fn arithmetic_and_number_rendering() {
    assert_eq!(
        output("println(1 + 2 * 3, 10 / 4, 2 ^ 10, -3 + +1)"),
        "7 2.5 1024 -2\n"
    );
    assert_eq!(output("println(0.1 + 0.2, 3.0)"), "0.30000000000000004 3\n");
}

#[test]
fn power_is_right_associative_and_binds_tighter_than_negation() {
    assert_eq!(output("println(2 ^ 3 ^ 2, -2 ^ 2)"), "512 -4\n");
}

#[test]
fn nil_and_bool_rendering() {
    assert_eq!(output("let x println(x, true, false)"), "(nil) true false\n");
}

#[test]
fn functions_render_with_their_arity() {
    assert_eq!(output("println(fun (a, b) { })"), "<fun/2>\n");
}

#[test]
fn string_concatenation_and_len() {
    assert_eq!(
        output("let s = \"ab\" + \"cd\" println(s, len(s), len(\"héllo\"))"),
        "abcd 4 6\n"
    );
}

#[test]
fn concatenation_leaves_operands_untouched() {
    assert_eq!(
        output("let a = \"x\" let b = a b = b + \"y\" println(a, b)"),
        "x xy\n"
    );
}

#[test]
fn equality_across_types_is_false_not_an_error() {
    assert_eq!(
        output("println(1 == \"1\", 1 /= \"1\", nil == nil, \"a\" == \"a\", true == 1)"),
        "false true true true false\n"
    );
}

#[test]
fn functions_compare_by_identity() {
    assert_eq!(
        output("let f = fun () { return 1 } let g = f println(f == g, f == fun () { return 1 })"),
        "true false\n"
    );
}

#[test]
fn mismatched_operands_are_type_errors() {
    assert_eq!(error_kind("1 < \"a\""), ErrorKind::TypeError);
    assert_eq!(error_kind("\"a\" - 1"), ErrorKind::TypeError);
    assert_eq!(error_kind("\"a\" + 1"), ErrorKind::TypeError);
    assert_eq!(error_kind("1 + \"a\""), ErrorKind::TypeError);
    assert_eq!(error_kind("true and 1"), ErrorKind::TypeError);
    assert_eq!(error_kind("-\"a\""), ErrorKind::TypeError);
    assert_eq!(error_kind("not 1"), ErrorKind::TypeError);
    assert_eq!(error_kind("+true"), ErrorKind::TypeError);
}

#[test]
fn comparisons_yield_booleans() {
    assert_eq!(
        output("println(2 > 1, 1 >= 1, 2 <= 1, 1 < 2, 1 > 2, 2 >= 3)"),
        "true true false true false false\n"
    );
}

#[test]
fn comparisons_require_numbers_on_both_sides() {
    assert_eq!(error_kind("1 > \"a\""), ErrorKind::TypeError);
    assert_eq!(error_kind("1 >= true"), ErrorKind::TypeError);
    assert_eq!(error_kind("\"a\" <= 1"), ErrorKind::TypeError);
    assert_eq!(error_kind("nil < 1"), ErrorKind::TypeError);
    assert_eq!(error_kind("\"a\" > \"b\""), ErrorKind::TypeError);
}

#[test]
fn type_error_names_the_offending_value() {
    assert_eq!(
        error_message("\"a\" - 1"),
        "Unexpected string value in left side of '-' operation"
    );
}

#[test]
fn division_by_zero_is_fatal() {
    assert_eq!(error_kind("1 / 0"), ErrorKind::ArithmeticError);
    assert_eq!(error_kind("let x = 1 x // 0"), ErrorKind::ArithmeticError);
}

#[test]
fn logical_operators_evaluate_both_sides() {
    assert_eq!(
        output("let n = 0 let b = false and do { n ++ 1 return true } println(b, n)"),
        "false 1\n"
    );
}

// ============================================================================
// Variables and assignment
// ============================================================================

#[test]
fn compound_assignment_yields_the_new_value() {
    assert_eq!(
        output("let x = 10 println(x ++ 5, x -- 3, x ** 2, x // 4, x)"),
        "15 12 24 6 6\n"
    );
}

#[test]
fn chained_assignment_is_right_associative() {
    assert_eq!(output("let x = 0, y = 0 x = y = 3 println(x, y)"), "3 3\n");
}

#[test]
fn assignment_keeps_the_variable_type() {
    assert_eq!(error_kind("let x = 1 x = \"a\""), ErrorKind::TypeError);
    assert_eq!(error_kind("let x = 1 x ++ \"a\""), ErrorKind::TypeError);
    assert_eq!(error_kind("let s = \"a\" s ++ \"b\""), ErrorKind::TypeError);
}

#[test]
fn undefined_names_are_fatal() {
    assert_eq!(error_kind("y = 1"), ErrorKind::UndefinedError);
    assert_eq!(error_message("println(z)"), "Undefined identifier 'z'");
}

#[test]
fn redeclaration_in_one_scope_is_fatal() {
    assert_eq!(error_kind("let a = 1 let a = 2"), ErrorKind::RedeclarationError);
    assert_eq!(error_kind("let a = 1, a = 2"), ErrorKind::RedeclarationError);
}

#[test]
fn names_can_be_declared_again_once_their_scope_ends() {
    assert_eq!(output("{ let a = 1 } { let a = 2 println(a) }"), "2\n");
    assert_eq!(output("if true { let t = 1 } let t = 2 println(t)"), "2\n");
}

#[test]
fn inner_declaration_shadows_outer() {
    assert_eq!(
        output("let x = 1 { let x = 2 x = 3 println(x) } println(x)"),
        "3\n1\n"
    );
}

#[test]
fn let_chain_sees_earlier_bindings_but_not_its_own() {
    assert_eq!(output("let a = 1, b = a + 1 println(a, b)"), "1 2\n");
    assert_eq!(error_kind("let q = q"), ErrorKind::UndefinedError);
}

// ============================================================================
// Control flow
// ============================================================================

#[test]
fn if_else_chain_picks_first_true_branch() {
    let source = "let x = 5 \
        if x < 3 { println(\"small\") } \
        else if x < 10 { println(\"medium\") } \
        else { println(\"large\") }";
    assert_eq!(output(source), "medium\n");
}

#[test]
fn conditions_must_be_booleans() {
    assert_eq!(error_kind("if 1 { }"), ErrorKind::TypeError);
    assert_eq!(error_kind("while nil { }"), ErrorKind::TypeError);
}

#[test]
fn while_loop_runs_until_condition_is_false() {
    assert_eq!(
        output("let i = 0 while i < 3 { print(i) i ++ 1 } println()"),
        "012\n"
    );
}

#[test]
fn while_body_shares_one_scope_across_iterations() {
    assert_eq!(
        error_kind("let i = 0 while i < 2 { let y = i i ++ 1 }"),
        ErrorKind::RedeclarationError
    );
}

#[test]
fn for_loop_variable_is_scoped_to_the_loop() {
    let (result, out) = run("for (let i = 0; i < 3; i ++ 1) { println(i) } println(i)");
    assert_eq!(out, "0\n1\n2\n");
    match result {
        Err(Halt::Error(error)) => assert_eq!(error.kind, ErrorKind::UndefinedError),
        other => panic!("expected undefined i, got {:?}", other),
    }
}

#[test]
fn for_initializer_cannot_return() {
    assert_eq!(
        error_kind("let f = fun () { for (return 1; true; ) { } } f()"),
        ErrorKind::ControlFlowError
    );
}

#[test]
fn for_step_cannot_return() {
    let (result, out) =
        run("let f = fun () { for (let i = 0; i < 2; return 1) { println(i) } } f()");
    assert_eq!(out, "0\n");
    match result {
        Err(Halt::Error(error)) => {
            assert_eq!(error.kind, ErrorKind::ControlFlowError);
            assert_eq!(error.message, "Unexpected return in for loop");
        }
        other => panic!("expected a control flow error, got {:?}", other),
    }
}

#[test]
fn return_from_for_body_runs_iteration_defers() {
    let source = "let f = fun () { \
            for (let i = 0; i < 5; i ++ 1) { \
                defer println(\"end of iteration\") \
                if i == 1 { return i } \
            } \
            return 99 \
        } \
        println(f())";
    assert_eq!(output(source), "end of iteration\nend of iteration\n1\n");
}

#[test]
fn return_from_while_inside_function() {
    let source = "let f = fun (n) { \
            let i = 0 \
            while true { if i == n { return i * 10 } i ++ 1 } \
        } \
        println(f(3))";
    assert_eq!(output(source), "30\n");
}

#[test]
fn do_block_yields_its_return_value() {
    assert_eq!(output("println(do { let x = 1 return x + 1 })"), "2\n");
    assert_eq!(output("println(do { let y = 1 })"), "(nil)\n");
}

#[test]
fn return_in_do_block_does_not_leave_the_function() {
    let source = "let f = fun () { \
            let v = do { return 1 } \
            println(\"after\", v) \
            return v + 1 \
        } \
        println(f())";
    assert_eq!(output(source), "after 1\n2\n");
}

#[test]
fn return_outside_function_or_do_is_fatal() {
    assert_eq!(error_kind("return 1"), ErrorKind::ControlFlowError);
    assert_eq!(error_kind("{ return 1 }"), ErrorKind::ControlFlowError);
}

// ============================================================================
// Defers
// ============================================================================

#[test]
fn defers_run_newest_first_when_scope_ends() {
    assert_eq!(
        output("{ defer println(\"A\") defer println(\"B\") defer println(\"C\") println(\"body\") }"),
        "body\nC\nB\nA\n"
    );
}

#[test]
fn defers_run_before_the_return_value_is_used() {
    assert_eq!(
        output("let f = fun () { defer println(\"cleanup\") return 42 } println(f())"),
        "cleanup\n42\n"
    );
}

#[test]
fn defers_see_the_latest_values_in_their_scope() {
    assert_eq!(output("{ let x = 1 defer println(x) x = 2 }"), "2\n");
}

#[test]
fn top_level_defers_run_at_finish() {
    assert_eq!(output("defer println(\"bye\") println(\"hi\")"), "hi\nbye\n");
}

#[test]
fn defer_registered_by_a_defer_still_runs() {
    assert_eq!(
        output("{ defer defer println(\"inner\") defer println(\"outer\") }"),
        "outer\ninner\n"
    );
}

#[test]
fn return_inside_deferred_statement_is_fatal() {
    assert_eq!(
        error_kind("let f = fun () { defer return 5 return 1 } f()"),
        ErrorKind::ControlFlowError
    );
}

#[test]
fn fatal_error_skips_pending_defers() {
    let (result, out) = run("{ defer println(\"deferred\") 1 / 0 }");
    assert!(matches!(result, Err(Halt::Error(_))));
    assert_eq!(out, "");
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn recursive_function() {
    let source = "let fact = fun (n) { if n <= 1 { return 1 } return n * fact(n - 1) } \
        println(fact(10))";
    assert_eq!(output(source), "3628800\n");
}

#[test]
fn free_names_resolve_in_the_caller_scope() {
    assert_eq!(
        output("let show = fun () { println(y) } { let y = \"inner\" show() }"),
        "inner\n"
    );
    assert_eq!(
        error_kind("let show = fun () { println(y) } show()"),
        ErrorKind::UndefinedError
    );
}

#[test]
fn calls_check_arity_and_callee() {
    assert_eq!(
        error_kind("let f = fun (a, b) { return a } f(1)"),
        ErrorKind::ArityError
    );
    assert_eq!(error_kind("let n = 1 n()"), ErrorKind::TypeError);
    assert_eq!(error_message("nope()"), "Unknown function 'nope'");
}

#[test]
fn runaway_recursion_hits_the_depth_limit() {
    let evaluator = Evaluator::with_config(EvaluatorConfig { max_depth: 16 }, Console::captured());
    match run_with(evaluator, "let f = fun (n) { return f(n + 1) } f(0)").0 {
        Err(Halt::Error(error)) => assert_eq!(error.kind, ErrorKind::ResourceError),
        other => panic!("expected a resource error, got {:?}", other),
    }
}

#[test]
fn scopes_are_balanced_after_a_program() {
    let program = parse_source("{ let a = 1 { let b = 2 } } let f = fun () { return 1 } f()")
        .expect("program should parse");
    let mut evaluator = Evaluator::with_console(Console::captured());
    evaluator.evaluate_program(&program).expect("program should run");
    assert_eq!(evaluator.depth(), 1);
    assert_eq!(evaluator.get("a"), None);
    assert_eq!(evaluator.get("f").map(|v| v.type_name()), Some("function"));

    evaluator.finish().expect("finish should succeed");
    assert_eq!(evaluator.depth(), 0);
}

// ============================================================================
// Builtins
// ============================================================================

#[test]
fn print_separates_arguments_with_spaces() {
    assert_eq!(output("print(\"a\", 1, nil) println()"), "a 1 (nil)\n");
}

#[test]
fn len_checks_its_argument() {
    assert_eq!(error_kind("len(1)"), ErrorKind::TypeError);
    assert_eq!(error_kind("len(\"a\", \"b\")"), ErrorKind::ArityError);
}

#[test]
fn readnum_parses_a_leading_number() {
    let (result, out) = run_with_input("let n = readnum(\"Number?\") println(n + 1)", "42.5abc\n");
    assert!(result.is_ok());
    assert_eq!(out, "Number? 43.5\n");

    let (_, out) = run_with_input("println(readnum())", "abc\n");
    assert_eq!(out, " 0\n");
}

#[test]
fn readstr_strips_the_newline() {
    let (result, out) = run_with_input(
        "let a = readstr() let b = readstr(\"next:\") println(a + \"|\" + b)",
        "hello world\nsecond\n",
    );
    assert!(result.is_ok());
    assert_eq!(out, " next: hello world|second\n");
}

#[test]
fn input_that_is_not_utf8_is_read_lossily() {
    let evaluator = Evaluator::with_console(Console::captured_with_input_bytes(b"ab\xff\n7\xfe\n"));
    let (result, out) = run_with(
        evaluator,
        "println(len(readstr(\"s?\"))) println(readnum())",
    );
    assert!(result.is_ok(), "got {:?}", result);
    // U+FFFD takes three bytes
    assert_eq!(out, "s? 5\n 7\n");
}

#[test]
fn readstr_at_end_of_input_is_empty() {
    let (_, out) = run_with_input("println(len(readstr()))", "");
    assert_eq!(out, " 0\n");
}

#[test]
fn panic_halts_without_running_defers() {
    let (result, out) = run("defer println(\"never\") panic(\"bad\", 1 + 1)");
    assert_eq!(out, "");
    match result {
        Err(Halt::Panic { message, .. }) => assert_eq!(message, " bad 2"),
        other => panic!("expected a panic, got {:?}", other),
    }
}

#[test]
fn exit_halts_with_its_status_without_running_defers() {
    let (result, out) = run("defer println(\"never\") { defer println(\"nope\") exit(2) }");
    assert_eq!(out, "");
    assert!(matches!(result, Err(Halt::Exit(2))));

    assert!(matches!(run("exit(3.9)").0, Err(Halt::Exit(3))));
    assert_eq!(error_kind("exit(\"x\")"), ErrorKind::TypeError);
    assert_eq!(error_kind("exit()"), ErrorKind::ArityError);
}

#[test]
fn leading_number_parsing() {
    assert_eq!(parse_leading_number("  12.5xyz"), 12.5);
    assert_eq!(parse_leading_number("-3\n"), -3.0);
    assert_eq!(parse_leading_number(".5"), 0.5);
    assert_eq!(parse_leading_number("1e3"), 1000.0);
    assert_eq!(parse_leading_number("1e"), 1.0);
    assert_eq!(parse_leading_number("abc"), 0.0);
    assert_eq!(parse_leading_number(""), 0.0);
}

// ============================================================================
// Runner
// ============================================================================

#[test]
fn runner_maps_halts_to_exit_status() {
    let mut evaluator = Evaluator::with_console(Console::captured());
    assert_eq!(run_in(&mut evaluator, "println(1)", Some("ok.lark")), 0);
    assert_eq!(evaluator.console().output(), "1\n");

    let mut evaluator = Evaluator::with_console(Console::captured());
    assert_eq!(run_in(&mut evaluator, "exit(7)", Some("exit.lark")), 7);

    let mut evaluator = Evaluator::with_console(Console::captured());
    assert_eq!(run_in(&mut evaluator, "1 / 0", Some("err.lark")), 1);

    let mut evaluator = Evaluator::with_console(Console::captured());
    assert_eq!(run_in(&mut evaluator, "println(", Some("parse.lark")), 1);
}

#[test]
fn panic_header_reports_row_and_column() {
    let source = "let x = 1\n  panic(\"boom\")";
    let header = panic_header(&Span::new(12, 25), source, Some("t.lark"));
    assert!(header.starts_with("t.lark:2:3: "), "got {:?}", header);
    assert!(header.contains("panic():"), "got {:?}", header);
}

#[test]
fn panic_reports_before_evaluating_its_arguments() {
    let mut evaluator = Evaluator::with_console(Console::captured());
    assert_eq!(run_in(&mut evaluator, "panic(\"a\", panic(\"b\"))", Some("t.lark")), 1);

    // The outer header and " a" are written before the inner panic reports
    let errors = evaluator.console().errors();
    assert!(errors.starts_with("t.lark:1:1: "), "got {:?}", errors);
    assert!(errors.contains(" at.lark:1:12: "), "got {:?}", errors);
    assert!(errors.ends_with(" b\n"), "got {:?}", errors);
    assert_eq!(evaluator.console().output(), "");
}

#[test]
fn value_equality_follows_variant() {
    assert_eq!(Value::Number(1.0), Value::Number(1.0));
    assert!(Value::Nil != Value::Bool(false));
    assert_eq!(Value::string("a"), Value::string("a"));
}

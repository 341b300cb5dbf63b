//! Error reporting: lex, parse, symbol, type, host, and runtime failures.

use rill::{CollectStringPrint, CompileErrorKind, Script, ScriptError};

fn parse_error(source: &str) -> rill::CompileError {
    let mut script = Script::with_print(Box::new(CollectStringPrint::new()));
    script
        .parse_code(source, "test.rl", "test")
        .expect_err("expected a parse-stage error")
}

fn compile_error(source: &str) -> ScriptError {
    let mut script = Script::with_print(Box::new(CollectStringPrint::new()));
    script.parse_code(source, "test.rl", "test").expect("parse");
    script.compile().expect_err("expected a compile error")
}

fn run_error(source: &str) -> rill::RunError {
    let mut script = Script::with_print(Box::new(CollectStringPrint::new()));
    script.parse_code(source, "test.rl", "test").expect("parse");
    script.compile().expect("compile");
    match script.run() {
        Err(ScriptError::Run(err)) => err,
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

fn message_of(error: &ScriptError) -> String {
    error.to_string()
}

#[test]
fn unknown_character_is_a_lex_error() {
    let err = parse_error("var x @ 1");
    assert_eq!(err.kind, CompileErrorKind::Lex);
    assert!(err.message.contains("unexpected character"));
    assert_eq!(err.file, "test.rl");
}

#[test]
fn unterminated_string_is_a_lex_error() {
    let err = parse_error("write \"oops");
    assert_eq!(err.kind, CompileErrorKind::Lex);
    assert!(err.message.contains("unterminated"));
}

#[test]
fn bad_escape_is_a_lex_error() {
    let err = parse_error(r#"write "\q""#);
    assert_eq!(err.kind, CompileErrorKind::Lex);
    assert!(err.message.contains("bad escape"));
}

#[test]
fn unexpected_token_names_expected_and_actual() {
    let err = parse_error("func 123");
    assert_eq!(err.kind, CompileErrorKind::Parse);
    assert!(err.message.contains("identifier"));
    assert!(err.message.contains("number"));
}

#[test]
fn return_outside_function_is_a_parse_error() {
    let err = parse_error("return 1");
    assert_eq!(err.kind, CompileErrorKind::Parse);
    assert!(err.message.contains("'return' outside"));
}

#[test]
fn undeclared_reference_is_deferred_to_compile() {
    let err = compile_error("write missing_thing");
    assert!(message_of(&err).contains("undeclared"));
}

#[test]
fn global_redeclaration_is_a_symbol_error() {
    let err = compile_error("var x: number\nvar x: number");
    assert!(message_of(&err).contains("redeclaration of global 'x'"));
}

#[test]
fn shadowing_across_modules_is_allowed() {
    // Same global name in two modules is by design not an error.
    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    script.parse_code("var x = 1\nwrite x", "a.rl", "a").expect("parse a");
    script.parse_code("var x = 2\nwrite x", "b.rl", "b").expect("parse b");
    script.compile().expect("compile");
    script.run().expect("run");
    assert_eq!(out.output(), "1\n2\n");
}

#[test]
fn operand_type_mismatch_is_a_type_error() {
    let err = compile_error("write 1 + \"a\"");
    assert!(message_of(&err).contains("expected 'number'"));
}

#[test]
fn missing_return_in_non_void_function() {
    let err = compile_error("func f(): number { write 1 }");
    assert!(message_of(&err).contains("missing a return"));
}

#[test]
fn bare_return_in_non_void_function() {
    let err = compile_error("func f(): number { return; }");
    assert!(message_of(&err).contains("'return' without a value"));
}

#[test]
fn undefined_struct_fails_compilation() {
    let err = compile_error("var p: Mystery");
    assert!(message_of(&err).contains("undefined struct 'Mystery'"));
}

#[test]
fn non_member_initializer_is_a_type_error() {
    let source = "struct Point { x:number=0 }\nvar p = new Point { z = 1 }";
    let err = compile_error(source);
    assert!(message_of(&err).contains("non-existent member 'z'"));
}

#[test]
fn dot_on_member_function_is_rejected() {
    let source = "struct S { m():number { return 1 } }\nvar s = new S {}\nwrite s.m";
    let err = compile_error(source);
    assert!(message_of(&err).contains("use ':' instead"));
}

#[test]
fn colon_on_data_member_is_rejected() {
    let source = "struct S { v:number=0 }\nvar s = new S {}\nwrite s:v";
    let err = compile_error(source);
    assert!(message_of(&err).contains("use '.' instead"));
}

#[test]
fn argument_count_mismatch() {
    let source = "func f(a:number): void { write a }\nf(1, 2)";
    let err = compile_error(source);
    assert!(message_of(&err).contains("1 argument(s) but received 2"));
}

#[test]
fn len_applies_to_strings_and_arrays_only() {
    let err = compile_error("write len 5");
    assert!(message_of(&err).contains("'len' applies to"));
}

#[test]
fn several_errors_are_reported_together() {
    let source = "write missing_one\nwrite missing_two";
    let err = compile_error(source);
    let message = message_of(&err);
    assert!(message.contains("missing_one"));
    assert!(message.contains("missing_two"));
    assert!(message.contains("2 error(s)"));
}

#[test]
fn unbound_extern_declaration_is_a_host_error() {
    let err = parse_error("extern definitely_not_bound(number): void");
    assert_eq!(err.kind, CompileErrorKind::Host);
    assert!(err.message.contains("unbound extern"));
}

#[test]
fn running_uncompiled_script_is_a_host_error() {
    let mut script = Script::with_print(Box::new(CollectStringPrint::new()));
    script.parse_code("write 1", "test.rl", "test").expect("parse");
    let err = script.run().expect_err("run before compile must fail");
    assert!(err.to_string().contains("uncompiled"));
}

#[test]
fn mod_by_zero_is_a_runtime_error() {
    let err = run_error("write 5 % 0");
    assert!(err.message.contains("division by zero"));
    assert_eq!(err.file, "test.rl");
    assert_eq!(err.line, 1);
}

#[test]
fn array_index_out_of_bounds_is_a_runtime_error() {
    let err = run_error("var a = [1, 2]\nwrite a[5]");
    assert!(err.message.contains("out of bounds"));
}

#[test]
fn runtime_trace_carries_function_and_arguments() {
    let source = r#"
func inner(s:string): number { return 1 % 0 }
func outer(n:number): number { return inner("boom") }
write outer(7)
"#;
    let err = run_error(source);
    assert_eq!(err.trace.len(), 2);
    assert_eq!(err.trace[0].function, "outer");
    assert_eq!(err.trace[0].args, vec!["7".to_owned()]);
    assert_eq!(err.trace[1].function, "inner");
    assert_eq!(err.trace[1].args, vec!["\"boom\"".to_owned()]);
}

#[test]
fn compile_time_extern_at_runtime_is_fatal() {
    let err = run_error("write get_current_module_index()");
    assert!(err.message.contains("called at runtime"));
}

//! `#on_compile` blocks and the compile-time extern catalog.

use pretty_assertions::assert_eq;
use rill::{CollectStringPrint, Script, Value};

fn run_source(source: &str) -> String {
    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    script.parse_code(source, "ct.rl", "ct").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    out.output()
}

#[test]
fn injected_write_expression_runs_at_runtime() {
    let source = r#"
#on_compile add_expr_to_module(get_current_module_index(), make_write_expr(make_num_expr(42)))
"#;
    assert_eq!(run_source(source), "42\n");
}

#[test]
fn injected_binary_expression() {
    let source = "#on_compile add_expr_to_module(get_current_module_index(), make_write_expr(make_bin_expr(make_num_expr(19), make_num_expr(23), \"+\")))";
    assert_eq!(run_source(source), "42\n");
}

#[test]
fn compile_time_code_sees_regular_top_level_code() {
    // Regular top-level statements execute during the compile-time pass as
    // well as at runtime, so the write below appears twice.
    let source = r#"
write "hello"
#on_compile add_expr_to_module(get_current_module_index(), make_write_expr(make_string_expr("injected")))
"#;
    assert_eq!(run_source(source), "hello\nhello\ninjected\n");
}

#[test]
fn declare_and_reference_variables_at_compile_time() {
    let source = concat!(
        "#on_compile declare_variable(\"generated\", create_number_type())\n",
        "#on_compile add_expr_to_module(get_current_module_index(), make_bin_expr(reference_variable(\"generated\"), make_num_expr(41), \"=\"))\n",
        "#on_compile add_expr_to_module(get_current_module_index(), make_write_expr(make_bin_expr(reference_variable(\"generated\"), make_num_expr(1), \"+\")))\n",
    );
    assert_eq!(run_source(source), "42\n");
}

#[test]
fn injected_call_to_a_declared_function() {
    let source = concat!(
        "func shout(): void { write \"generated call\" }\n",
        "#on_compile add_expr_to_module(get_current_module_index(), make_call_expr(reference_function(\"shout\"), make_array_of_length(0)))\n",
    );
    assert_eq!(run_source(source), "generated call\n");
}

#[test]
fn get_func_decl_name_reads_the_function_table() {
    let source = r#"
func first(): void { write "unused" }
#on_compile add_expr_to_module(get_current_module_index(), make_write_expr(make_string_expr(get_func_decl_name(0))))
"#;
    assert_eq!(run_source(source), "first\n");
}

#[test]
fn array_index_expression_constructor() {
    let source = concat!(
        "var data = [10, 20, 30]\n",
        "#on_compile add_expr_to_module(get_current_module_index(), make_write_expr(make_array_index_expr(reference_variable(\"data\"), make_num_expr(1))))\n",
    );
    assert_eq!(run_source(source), "20\n");
}

#[test]
fn compile_time_execution_leaves_a_clean_runtime_state() {
    // Compile-time blocks may allocate values and modify modules, but they
    // must not leak stack slots into runtime, and global slots stay null
    // unless the module's code explicitly assigned them.
    let source = concat!(
        "var assigned = 5\n",
        "var untouched: number\n",
        "#on_compile add_expr_to_module(get_current_module_index(), make_write_expr(make_num_expr(1)))\n",
    );
    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    script.parse_code(source, "ct.rl", "ct").expect("parse");
    script.compile().expect("compile");

    assert_eq!(script.stack_depth(), 0, "compile-time execution must leave the stack empty");
    assert!(
        matches!(script.global_by_name("untouched"), Some(Value::Null)),
        "an unassigned global stays null after compile-time execution"
    );
    assert!(
        matches!(script.global_by_name("assigned"), Some(Value::Number(n)) if n == 5.0),
        "an explicitly assigned global keeps its value"
    );

    script.run().expect("run");
    assert_eq!(out.output(), "1\n");
    assert_eq!(script.stack_depth(), 0);
}

#[test]
fn parse_code_registers_a_new_module() {
    let source = r#"
#on_compile parse_code("write \"from generated module\"", "gen.rl", "gen")
write "from main"
"#;
    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    script.parse_code(source, "ct.rl", "ct").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    // The generated module is compiled after the current one, so its
    // top-level code runs after main's.
    assert!(out.output().contains("from main"));
    assert!(out.output().contains("from generated module"));
}

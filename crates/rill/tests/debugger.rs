//! The debugger command loop, driven with scripted input.

use std::io::Cursor;

use rill::{CollectStringPrint, Script, ScriptError, debug_repl};

/// Runs source expected to fail at runtime and returns the faulted script.
fn faulted_script(source: &str) -> Script {
    let mut script = Script::with_print(Box::new(CollectStringPrint::new()));
    script.parse_code(source, "dbg.rl", "dbg").expect("parse");
    script.compile().expect("compile");
    match script.run() {
        Err(ScriptError::Run(_)) => script,
        other => panic!("expected a runtime fault, got {other:?}"),
    }
}

fn drive(script: &Script, commands: &str) -> String {
    let mut input = Cursor::new(commands.to_owned());
    let mut output = Vec::new();
    debug_repl(script, &mut input, &mut output).expect("repl io");
    String::from_utf8(output).expect("repl output is utf-8")
}

const FAULTING: &str = r#"func boom(x:number): void {
    var doubled = x * 2
    write doubled % 0
}
boom(7)
"#;

#[test]
fn trace_is_printed_before_the_prompt() {
    let script = faulted_script(FAULTING);
    let output = drive(&script, "stop\n");
    assert!(output.contains("Call records:"), "{output}");
    assert!(output.contains("boom(7)"), "{output}");
    assert!(output.contains("dbg.rl"), "{output}");
    assert!(output.contains("debug> "), "{output}");
}

#[test]
fn local_prints_a_named_slot() {
    let script = faulted_script(FAULTING);
    let output = drive(&script, "local doubled\nlocal x\nstop\n");
    assert!(output.contains("doubled = 14"), "{output}");
    assert!(output.contains("x = 7"), "{output}");
}

#[test]
fn stack_walks_the_frame() {
    let script = faulted_script(FAULTING);
    let output = drive(&script, "stack\nstop\n");
    assert!(output.contains("x = 7"), "{output}");
    assert!(output.contains("doubled = 14"), "{output}");
}

#[test]
fn list_shows_source_around_the_fault() {
    let script = faulted_script(FAULTING);
    let output = drive(&script, "list 1\nstop\n");
    assert!(output.contains("write doubled % 0"), "{output}");
    assert!(output.contains(">"), "{output}");
}

#[test]
fn unknown_commands_print_help_and_eof_exits() {
    let script = faulted_script(FAULTING);
    let output = drive(&script, "wat\n");
    assert!(output.contains("unknown command 'wat'"), "{output}");
}

//! The extern bridge and host-side value helpers.

use pretty_assertions::assert_eq;
use rill::{CollectStringPrint, RunResult, Script, Value};

fn run_source(source: &str) -> String {
    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    script.parse_code(source, "host.rl", "host").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    out.output()
}

#[test]
fn custom_extern_binding() {
    fn double(script: &mut Script, args: &[Value]) -> RunResult<()> {
        let n = script.arg_number(args, 0)?;
        script.push_number(n * 2.0)?;
        script.return_top()
    }

    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    script.bind_extern("double", double);
    script
        .parse_code("extern double(number): number\nwrite double(21)", "host.rl", "host")
        .expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    assert_eq!(out.output(), "42\n");
}

#[test]
fn extern_arguments_read_left_to_right() {
    fn concat_args(script: &mut Script, args: &[Value]) -> RunResult<()> {
        let first = script.arg_string(args, 0)?;
        let second = script.arg_string(args, 1)?;
        let joined = format!("{first}-{second}");
        script.push_string(&joined)?;
        script.return_top()
    }

    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    script.bind_extern("concat_args", concat_args);
    script
        .parse_code(
            "extern concat_args(string, string): string\nwrite concat_args(\"left\", \"right\")",
            "host.rl",
            "host",
        )
        .expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    assert_eq!(out.output(), "left-right\n");
}

#[test]
fn u8_buffer_native_roundtrip() {
    let source = r#"
extern {
    make_u8_buffer(): native
    u8_buffer_push(native, number): void
    u8_buffer_pop(native): number
    u8_buffer_length(native): number
    u8_buffer_clear(native): void
    u8_buffer_to_string(native): string
}

var b = make_u8_buffer()
u8_buffer_push(b, 104)
u8_buffer_push(b, 105)
write u8_buffer_to_string(b)
write u8_buffer_length(b)
write u8_buffer_pop(b)
write u8_buffer_length(b)
u8_buffer_clear(b)
write u8_buffer_length(b)
"#;
    assert_eq!(run_source(source), "hi\n2\n105\n1\n0\n");
}

#[test]
fn conversion_externs() {
    let source = r#"
extern {
    char_to_number(char): number
    number_to_char(number): char
    number_to_string(number): string
    string_to_number(string): number
    floor(number): number
    ceil(number): number
}

write char_to_number('A')
write number_to_char(66)
write number_to_string(3.5)
write string_to_number("2.25") + 1
write floor(2.9)
write ceil(2.1)
"#;
    assert_eq!(run_source(source), "65\nB\n3.5\n3.25\n2\n3\n");
}

#[test]
fn make_array_of_length_builds_null_slots() {
    let source = r#"
extern make_array_of_length(number): array - dynamic
var a = make_array_of_length(3)
write len a
write a[0]
a[1] = 9
write a[1]
"#;
    assert_eq!(run_source(source), "3\nnull\n9\n");
}

#[test]
fn host_calls_a_script_function() {
    let mut script = Script::with_print(Box::new(CollectStringPrint::new()));
    script
        .parse_code(
            "func sub(a:number, b:number): number { return a - b }",
            "host.rl",
            "host",
        )
        .expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");

    let sub = script.get_function_by_name("sub").expect("sub exists");
    assert!(!sub.is_extern);
    // Arguments are pushed rightmost-first so the leftmost ends on top.
    script.push_number(8.0).unwrap();
    script.push_number(50.0).unwrap();
    script.call_function(sub, 2).unwrap();
    match script.return_value() {
        Some(Value::Number(n)) => assert_eq!(n, 42.0),
        other => panic!("expected a number, got {other:?}"),
    }
}

#[test]
fn get_function_by_name_finds_externs_too() {
    let script = Script::new();
    let floor = script.get_function_by_name("floor").expect("registered extern");
    assert!(floor.is_extern);
    assert!(script.get_function_by_name("no_such_function").is_none());
}

#[test]
fn extern_leftovers_without_return_top_are_discarded() {
    fn pushes_without_return(script: &mut Script, _args: &[Value]) -> RunResult<()> {
        script.push_number(1.0)?;
        script.push_number(2.0)?;
        Ok(())
    }

    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    script.bind_extern("noisy_extern", pushes_without_return);
    script
        .parse_code("extern noisy_extern(): void\nnoisy_extern()\nwrite 7", "host.rl", "host")
        .expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    assert_eq!(out.output(), "7\n");
    assert_eq!(script.stack_depth(), 0);
}

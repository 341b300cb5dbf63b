//! Module loading, `#import` resolution, and compile order.

use pretty_assertions::assert_eq;
use rill::{CollectStringPrint, MemoryLoader, Script};

fn script_with_files(files: &[(&str, &str)]) -> (Script, CollectStringPrint) {
    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    let mut loader = MemoryLoader::new();
    for (path, source) in files {
        loader.insert(*path, *source);
    }
    script.set_loader(Box::new(loader));
    (script, out)
}

#[test]
fn imported_module_compiles_and_runs_first() {
    let (mut script, out) = script_with_files(&[
        (
            "main.rl",
            r#"
#import "lib.rl"
write greeting
write double(21)
"#,
        ),
        (
            "lib.rl",
            r#"
var greeting = "hello from lib"
write "lib loaded"
func double(n:number): number { return n * 2 }
"#,
        ),
    ]);
    script.parse_file("main.rl", "main").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    // The referenced module's top-level code executes before the importer's.
    assert_eq!(out.output(), "lib loaded\nhello from lib\n42\n");
}

#[test]
fn import_paths_are_relative_to_the_importer() {
    let (mut script, out) = script_with_files(&[
        ("dir/main.rl", "#import \"util.rl\"\nwrite shared"),
        ("dir/util.rl", "var shared = 7"),
    ]);
    script.parse_file("dir/main.rl", "main").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    assert_eq!(out.output(), "7\n");
}

#[test]
fn repeated_imports_parse_once() {
    let (mut script, out) = script_with_files(&[
        ("a.rl", "#import \"shared.rl\"\n#import \"b.rl\"\nwrite \"a\""),
        ("b.rl", "#import \"shared.rl\"\nwrite \"b\""),
        ("shared.rl", "write \"shared\""),
    ]);
    script.parse_file("a.rl", "a").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    // "shared" runs exactly once, before both dependents.
    assert_eq!(out.output(), "shared\nb\na\n");
}

#[test]
fn missing_import_is_a_host_error() {
    let (mut script, _out) = script_with_files(&[("main.rl", "#import \"nowhere.rl\"\nwrite 1")]);
    let err = script.parse_file("main.rl", "main").expect_err("missing module");
    assert!(err.message.contains("nowhere.rl"));
}

#[test]
fn independent_module_is_unaffected_by_earlier_loads() {
    // Loading A before B must not change B's behavior when B does not
    // depend on A.
    let b_source = "var value = 5\nwrite value * 2";

    let (mut first, out_first) = script_with_files(&[]);
    first.parse_code(b_source, "b.rl", "b").expect("parse");
    first.compile().expect("compile");
    first.run().expect("run");

    let (mut second, out_second) = script_with_files(&[]);
    second.parse_code("var unrelated = 1", "a.rl", "a").expect("parse a");
    second.parse_code(b_source, "b.rl", "b").expect("parse b");
    second.compile().expect("compile");
    second.run().expect("run");

    assert_eq!(out_first.output(), "10\n");
    assert_eq!(out_second.output(), "10\n");
}

#[test]
fn cross_module_function_and_globals() {
    let (mut script, out) = script_with_files(&[
        (
            "main.rl",
            r#"
#import "counter.rl"
bump()
bump()
bump()
write count
"#,
        ),
        (
            "counter.rl",
            r#"
var count = 0
func bump(): void { count = count + 1 }
"#,
        ),
    ]);
    script.parse_file("main.rl", "main").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    assert_eq!(out.output(), "3\n");
}

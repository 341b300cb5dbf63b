//! End-to-end scenarios: parse, compile, run, and check `write` output.

use pretty_assertions::assert_eq;
use rill::{CollectStringPrint, Script, Warning};

fn run_source(source: &str) -> (String, Script) {
    let out = CollectStringPrint::new();
    let mut script = Script::with_print(Box::new(out.clone()));
    script.parse_code(source, "test.rl", "test").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    (out.output(), script)
}

fn output_of(source: &str) -> String {
    run_source(source).0
}

#[test]
fn fizzbuzz() {
    let source = r#"
var i = 1
for i = 1, i <= 15, i = i + 1, {
    if i % 15 == 0 write "FizzBuzz"
    else if i % 3 == 0 write "Fizz"
    else if i % 5 == 0 write "Buzz"
    else write i
}
"#;
    let expected = "1\n2\nFizz\n4\nBuzz\nFizz\n7\n8\nFizz\nBuzz\n11\nFizz\n13\n14\nFizzBuzz\n";
    assert_eq!(output_of(source), expected);
}

#[test]
fn struct_with_using() {
    let source = r#"
struct Point { x:number=0 y:number=0 }
struct Colored { using Point c:number=0 }
var p = new Colored { x=1 y=2 c=3 }
write p.x; write p.y; write p.c
"#;
    assert_eq!(output_of(source), "1\n2\n3\n");
}

#[test]
fn method_call_dispatch() {
    let source = r#"
struct Box { v:number   sum(a:number):number { return self.v + a } }
write new Box{v=10}:sum(5)
"#;
    assert_eq!(output_of(source), "15\n");
}

#[test]
fn array_dynamic_promotion_warns_once() {
    let source = r#"
var a = [1, "two"]
write len a
"#;
    let (output, script) = run_source(source);
    assert_eq!(output, "2\n");
    let dynamic_literal_warnings = script
        .warnings()
        .iter()
        .filter(|(w, _)| *w == Warning::DynamicArrayLiteral)
        .count();
    assert_eq!(dynamic_literal_warnings, 1);
}

#[test]
fn recursion_formats_like_printf_g() {
    let source = r#"
func fact(n:number):number { if n < 2 return 1 else return n * fact(n - 1) }
write fact(10)
"#;
    assert_eq!(output_of(source), "3.6288e+06\n");
}

#[test]
fn while_loop_sum() {
    let source = r#"
var total = 0
var i = 1
while i <= 10 {
    total = total + i
    i = i + 1
}
write total
"#;
    assert_eq!(output_of(source), "55\n");
}

#[test]
fn string_indexing_yields_chars() {
    let source = r#"
var s = "hello"
write s[0]
write s[4]
write len s
"#;
    assert_eq!(output_of(source), "h\no\n5\n");
}

#[test]
fn array_get_set() {
    let source = r#"
var a = [10, 20, 30]
a[1] = 25
write a[1]
write a
"#;
    assert_eq!(output_of(source), "25\n[10, 25, 30]\n");
}

#[test]
fn empty_array_literal_requires_element_type() {
    let source = r#"
var a = [] : number
write len a
"#;
    assert_eq!(output_of(source), "0\n");
}

#[test]
fn struct_defaults_fill_uninitialized_members() {
    let source = r#"
struct Point { x:number=7 y:number=9 }
var p = new Point {}
write p.x
write p.y
"#;
    assert_eq!(output_of(source), "7\n9\n");
}

#[test]
fn struct_member_assignment() {
    let source = r#"
struct Point { x:number=0 y:number=0 }
var p = new Point {}
p.x = 3
p.y = p.x + 1
write p.x
write p.y
"#;
    assert_eq!(output_of(source), "3\n4\n");
}

#[test]
fn union_members_share_slot_zero() {
    let source = r#"
union Either { n:number s:string }
var e = new Either { n = 5 }
write e.n
"#;
    assert_eq!(output_of(source), "5\n");
}

#[test]
fn static_member_function_is_a_free_function() {
    let source = r#"
struct Math { static twice(n:number):number { return n * 2 } }
write Math_twice(21)
"#;
    assert_eq!(output_of(source), "42\n");
}

#[test]
fn nominal_struct_equality() {
    let source = r#"
struct T { v:number=1 }
struct U { v:number=1 }
var a: dynamic = new T {}
var b: dynamic = new T {}
var c: dynamic = new U {}
write a == b
write a == c
"#;
    assert_eq!(output_of(source), "true\nfalse\n");
}

#[test]
fn null_and_bool_values() {
    let source = r#"
write null
write null == null
write true && false
write true || false
write !false
"#;
    assert_eq!(output_of(source), "null\ntrue\nfalse\ntrue\ntrue\n");
}

#[test]
fn arithmetic_identity() {
    let source = r#"
var a = 123456
var b = 789
write (a + b) - b
write [1, 2, 3, 4]
write len [1, 2, 3, 4]
"#;
    assert_eq!(output_of(source), "123456\n[1, 2, 3, 4]\n4\n");
}

#[test]
fn mod_truncates_and_keeps_dividend_sign() {
    let source = r#"
write 7 % 3
write -7 % 3
write 7.9 % 3
"#;
    assert_eq!(output_of(source), "1\n-1\n1\n");
}

#[test]
fn atomic_statement_executes_inline() {
    let source = r#"
atomic {
    write 1
    write 2
}
write 3
"#;
    assert_eq!(output_of(source), "1\n2\n3\n");
}

#[test]
fn first_class_functions() {
    let source = r#"
func add(a:number, b:number):number { return a + b }
var op: func(number, number) - number = add
write op(19, 23)
"#;
    assert_eq!(output_of(source), "42\n");
}

#[test]
fn char_literals_and_escapes() {
    let source = r#"
write 'a'
write "tab\there"
"#;
    assert_eq!(output_of(source), "a\ntab\there\n");
}

#[test]
fn stack_is_balanced_after_run() {
    let source = r#"
func noisy(n:number):number { return n + 1 }
noisy(1)
write noisy(2)
"#;
    let (output, script) = run_source(source);
    assert_eq!(output, "3\n");
    assert_eq!(script.stack_depth(), 0);
    assert_eq!(script.frame_depth(), 0);
}

#[test]
fn inference_from_first_assignment() {
    let source = r#"
var x = 41
x = x + 1
write x
"#;
    assert_eq!(output_of(source), "42\n");
}

#[test]
fn comments_are_ignored() {
    let source = r#"
// a leading comment
write 1 // trailing comment
// a closing comment
"#;
    assert_eq!(output_of(source), "1\n");
}

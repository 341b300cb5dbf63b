//! Heap safety: collection keeps reachable values and reclaims garbage.

use rill::{CollectStringPrint, Script};

fn run(source: &str) -> Script {
    let mut script = Script::with_print(Box::new(CollectStringPrint::new()));
    script.parse_code(source, "gc.rl", "gc").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    script
}

#[test]
fn temporaries_are_reclaimed() {
    // Each iteration allocates an array and a string that die with the
    // frame.
    let source = r#"
func churn(): void {
    var i = 0
    while i < 500 {
        var a = [1, 2, 3, "garbage"]
        i = i + 1
    }
}
churn()
"#;
    let mut script = run(source);
    script.collect_garbage();
    assert_eq!(script.live_objects(), 0, "all temporaries must be reclaimed");
}

#[test]
fn globals_are_roots() {
    let source = r#"
var keep = [1, 2, 3]
func churn(): void {
    var i = 0
    while i < 500 {
        var junk = [i]
        i = i + 1
    }
}
churn()
write keep
"#;
    let mut script = run(source);
    script.collect_garbage();
    // The retained global survives every collection; `write` pushed nothing
    // that outlives the run.
    assert_eq!(script.live_objects(), 1);
}

#[test]
fn nested_aggregates_stay_reachable_through_their_parent() {
    let source = r#"
struct Node { label:string="node" items:array - number = [] : number }
var root = new Node { label = "root", items = [1, 2, 3] }
func churn(): void {
    var i = 0
    while i < 200 {
        var junk = new Node {}
        i = i + 1
    }
}
churn()
write root.label
"#;
    let mut script = run(source);
    script.collect_garbage();
    // root struct + its label string + its items array.
    assert_eq!(script.live_objects(), 3);
}

#[test]
fn collection_happens_during_execution() {
    // 500 dead allocations with a threshold that doubles from 8: the live
    // count at any instant stays far below the total allocated.
    let source = r#"
func churn(): void {
    var i = 0
    while i < 500 {
        var s = "some string that is heap allocated"
        i = i + 1
    }
}
churn()
"#;
    let script = run(source);
    assert!(
        script.live_objects() < 500,
        "collection must have run during execution (live = {})",
        script.live_objects()
    );
}

#[test]
fn return_slot_is_a_root() {
    let source = r#"
func make(): string { return "kept by the return slot" }
make()
"#;
    let mut script = run(source);
    // The call left its result in the return slot; it must survive.
    script.collect_garbage();
    assert_eq!(script.live_objects(), 1);
    assert!(script.return_value().is_some());
}

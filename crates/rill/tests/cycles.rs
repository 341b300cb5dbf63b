//! Cycle-limited execution: begin/pump calls, atomic brackets, stop.

use rill::{CollectStringPrint, Script, Value};

fn prepare(source: &str) -> Script {
    let mut script = Script::with_print(Box::new(CollectStringPrint::new()));
    script.parse_code(source, "cycles.rl", "cycles").expect("parse");
    script.compile().expect("compile");
    script.run().expect("run");
    script
}

const LOOP_FUNC: &str = r#"
func spin(n:number): number {
    var total = 0
    var i = 0
    while i < n {
        total = total + i
        i = i + 1
    }
    return total
}

func spin_atomic(n:number): number {
    var total = 0
    atomic {
        var i = 0
        while i < n {
            total = total + i
            i = i + 1
        }
    }
    return total
}
"#;

#[test]
fn call_function_runs_to_completion() {
    let mut script = prepare(LOOP_FUNC);
    let spin = script.get_function_by_name("spin").expect("spin exists");
    script.push_number(100.0).unwrap();
    script.call_function(spin, 1).unwrap();
    match script.return_value() {
        Some(Value::Number(n)) => assert_eq!(n, 4950.0),
        other => panic!("expected a number, got {other:?}"),
    }
    assert_eq!(script.frame_depth(), 0);
    assert_eq!(script.stack_depth(), 0);
}

#[test]
fn pump_yields_between_cycles() {
    let mut script = prepare(LOOP_FUNC);
    let spin = script.get_function_by_name("spin").expect("spin exists");
    script.push_number(50.0).unwrap();
    let call = script.begin_call(spin, 1).unwrap();

    let mut pumps = 0usize;
    while !script.pump(call, 10).unwrap() {
        pumps += 1;
        assert!(pumps < 10_000, "call never completed");
    }
    assert!(pumps > 1, "a 50-iteration loop must not finish in 10 cycles");
    match script.return_value() {
        Some(Value::Number(n)) => assert_eq!(n, 1225.0),
        other => panic!("expected a number, got {other:?}"),
    }
}

#[test]
fn atomic_suppresses_yielding() {
    let mut script = prepare(LOOP_FUNC);

    let plain = script.get_function_by_name("spin").expect("spin exists");
    script.push_number(50.0).unwrap();
    let call = script.begin_call(plain, 1).unwrap();
    let mut plain_pumps = 0usize;
    while !script.pump(call, 5).unwrap() {
        plain_pumps += 1;
    }

    let atomic = script.get_function_by_name("spin_atomic").expect("spin_atomic exists");
    script.push_number(50.0).unwrap();
    let call = script.begin_call(atomic, 1).unwrap();
    let mut atomic_pumps = 0usize;
    while !script.pump(call, 5).unwrap() {
        atomic_pumps += 1;
    }

    // Once the bracket is entered, the pump keeps cycling past its quota,
    // so the whole loop runs in at most a couple of pumps.
    assert!(
        atomic_pumps < plain_pumps,
        "atomic: {atomic_pumps} pumps, plain: {plain_pumps} pumps"
    );
}

#[test]
fn stop_halts_and_clears_the_stack() {
    let mut script = prepare(LOOP_FUNC);
    let spin = script.get_function_by_name("spin").expect("spin exists");
    script.push_number(1000.0).unwrap();
    let call = script.begin_call(spin, 1).unwrap();
    assert!(!script.pump(call, 10).unwrap());

    script.stop();
    assert!(script.is_halted());
    assert_eq!(script.stack_depth(), 0);
    // Further cycles are no-ops.
    script.execute_cycle().unwrap();
    assert!(script.is_halted());
}

#[test]
fn extern_calls_complete_synchronously() {
    let mut script = prepare(LOOP_FUNC);
    let floor = script.get_function_by_name("floor").expect("floor is registered");
    assert!(floor.is_extern);
    script.push_number(2.75).unwrap();
    let call = script.begin_call(floor, 1).unwrap();
    assert!(script.pump(call, 0).unwrap());
    match script.return_value() {
        Some(Value::Number(n)) => assert_eq!(n, 2.0),
        other => panic!("expected a number, got {other:?}"),
    }
}

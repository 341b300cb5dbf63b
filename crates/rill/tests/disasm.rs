//! Disassembler listings.

use rill::{CollectStringPrint, Script};

fn disassembly_of(source: &str) -> String {
    let mut script = Script::with_print(Box::new(CollectStringPrint::new()));
    script.parse_code(source, "dis.rl", "dis").expect("parse");
    script.compile().expect("compile");
    let mut buffer = Vec::new();
    script.disassemble(&mut buffer).expect("disassemble");
    String::from_utf8(buffer).expect("listing is utf-8")
}

#[test]
fn listing_shows_mnemonics_and_operands() {
    let listing = disassembly_of("var x = 41\nwrite x + 1");
    assert!(listing.contains("push_number 41"), "{listing}");
    assert!(listing.contains("push_number 1"), "{listing}");
    assert!(listing.contains("set 0"), "{listing}");
    assert!(listing.contains("get 0"), "{listing}");
    assert!(listing.contains("add"), "{listing}");
    assert!(listing.contains("write"), "{listing}");
    assert!(listing.contains("halt"), "{listing}");
    assert!(listing.contains("file 'dis.rl'"), "{listing}");
}

#[test]
fn listing_shows_strings_and_jumps() {
    let listing = disassembly_of("if true write \"yes\" else write \"no\"");
    assert!(listing.contains("push_true"), "{listing}");
    assert!(listing.contains("gotoz "), "{listing}");
    assert!(listing.contains("goto "), "{listing}");
    assert!(listing.contains("push_string 'yes'"), "{listing}");
    assert!(listing.contains("push_string 'no'"), "{listing}");
}

#[test]
fn listing_shows_function_entries_and_calls() {
    let listing = disassembly_of("func id(x:number): number { return x }\nwrite id(5)");
    assert!(listing.contains("push_func 0 (pc = "), "{listing}");
    assert!(listing.contains("call nargs=1"), "{listing}");
    assert!(listing.contains("return_value"), "{listing}");
    assert!(listing.contains("push_retval"), "{listing}");
    assert!(listing.contains("getlocal -1"), "{listing}");
}

#[test]
fn every_instruction_line_starts_with_its_pc() {
    let listing = disassembly_of("write 1");
    for line in listing.lines() {
        let (pc, _rest) = line.split_once(": ").expect("pc prefix");
        pc.parse::<usize>().expect("numeric pc");
    }
}

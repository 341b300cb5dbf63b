//! Interactive debugger, entered by the host when a runtime error fires.
//!
//! Commands read from any `BufRead` (standard input in the reference host,
//! a scripted cursor in tests):
//!
//! - `list <distance>` — source lines of the executing module around the
//!   current line
//! - `local <name>` — a named local or argument of the top frame
//! - `stack` — every slot of the top frame with its declaration name
//! - `stop` — leave the debugger
//!
//! The call-record chain (file, line, function name, argument values) is
//! printed before the first prompt.

use std::io::{self, BufRead, Write};

use crate::{script::Script, symbols::FuncId, value::render_value};

impl Script {
    /// Renders the call-record chain, innermost call first.
    #[must_use]
    pub fn render_trace(&self) -> String {
        let mut out = String::from("Call records:\n");
        for record in self.call_records.iter().rev() {
            out.push_str(&format!("  {}:{}: {}(", record.file, record.line, record.function));
            for (i, arg) in record.args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(arg);
            }
            out.push_str(")\n");
        }
        if self.call_records.is_empty() {
            out.push_str("  <top level>\n");
        }
        out
    }

    /// The function whose frame is on top, recovered from the newest call
    /// record.
    fn top_frame_function(&self) -> Option<FuncId> {
        let record = self.call_records.last()?;
        let name = self.compile.interns.lookup_str(&record.function)?;
        self.compile.symbols.reference_function(name)
    }
}

/// Runs the command loop until `stop` or end of input.
pub fn debug_repl(script: &Script, input: &mut dyn BufRead, out: &mut dyn Write) -> io::Result<()> {
    out.write_all(script.render_trace().as_bytes())?;

    let mut line = String::new();
    loop {
        out.write_all(b"debug> ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let mut words = line.split_whitespace();
        match words.next() {
            None => {}
            Some("stop") => return Ok(()),
            Some("list") => {
                let distance = words.next().and_then(|w| w.parse::<u32>().ok()).unwrap_or(2);
                list_source(script, distance, out)?;
            }
            Some("local") => {
                let Some(name) = words.next() else {
                    writeln!(out, "usage: local <name>")?;
                    continue;
                };
                print_local(script, name, out)?;
            }
            Some("stack") => print_stack(script, out)?,
            Some(other) => {
                writeln!(out, "unknown command '{other}'; commands: list <distance>, local <name>, stack, stop")?;
            }
        }
    }
}

fn list_source(script: &Script, distance: u32, out: &mut dyn Write) -> io::Result<()> {
    let file = script.compile.interns.get_str(script.cur_file);
    let Some(module) = script.compile.modules.find_by_path(file) else {
        writeln!(out, "no source available for '{file}'")?;
        return Ok(());
    };
    let module = script.compile.modules.get(module);
    writeln!(out, "module {} ({file})", module.name)?;
    let source = &module.source;
    let current = script.cur_line;

    for (index, text) in source.lines().enumerate() {
        let line_no = u32::try_from(index).unwrap_or(u32::MAX) + 1;
        if line_no + distance < current || line_no > current + distance {
            continue;
        }
        let marker = if line_no == current { ">" } else { " " };
        writeln!(out, "{marker} {line_no:4} {text}")?;
    }
    Ok(())
}

fn print_local(script: &Script, name: &str, out: &mut dyn Write) -> io::Result<()> {
    let Some(func) = script.top_frame_function() else {
        writeln!(out, "no call frame")?;
        return Ok(());
    };
    let Some(name_id) = script.compile.interns.lookup_str(name) else {
        writeln!(out, "no local named '{name}'")?;
        return Ok(());
    };

    let decl = script.compile.symbols.func(func);
    for &var in decl.locals.iter().chain(&decl.args) {
        let var = script.compile.symbols.var(var);
        if var.name != name_id {
            continue;
        }
        let slot = i64::try_from(script.fp).unwrap_or(i64::MAX) + i64::from(var.index);
        match usize::try_from(slot).ok().and_then(|s| script.stack.get(s)) {
            Some(&value) => writeln!(out, "{name} = {}", render_value(&script.heap, value))?,
            None => writeln!(out, "{name} is not live in this frame")?,
        }
        return Ok(());
    }
    writeln!(out, "no local named '{name}'")?;
    Ok(())
}

fn print_stack(script: &Script, out: &mut dyn Write) -> io::Result<()> {
    if let Some(func) = script.top_frame_function() {
        let decl = script.compile.symbols.func(func);
        for &var in decl.args.iter().chain(&decl.locals) {
            let var = script.compile.symbols.var(var);
            let name = script.compile.interns.get_str(var.name);
            let slot = i64::try_from(script.fp).unwrap_or(i64::MAX) + i64::from(var.index);
            match usize::try_from(slot).ok().and_then(|s| script.stack.get(s)) {
                Some(&value) => writeln!(out, "{name} = {}", render_value(&script.heap, value))?,
                None => writeln!(out, "{name} = <not live>")?,
            }
        }
    } else {
        writeln!(out, "no call frame")?;
    }

    // Globals of the executing module, when known.
    let file = script.compile.interns.get_str(script.cur_file);
    if let Some(module) = script.compile.modules.find_by_path(file) {
        for &global in &script.compile.modules.get(module).globals {
            let var = script.compile.symbols.var(global);
            let name = script.compile.interns.get_str(var.name);
            match usize::try_from(var.index).ok().and_then(|s| script.globals.get(s)) {
                Some(&value) => writeln!(out, "global {name} = {}", render_value(&script.heap, value))?,
                None => writeln!(out, "global {name} = <unallocated>")?,
            }
        }
    }
    Ok(())
}

use std::{env, io, path::Path, process::ExitCode};

use rill::{Script, ScriptError, debug_repl};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut script_path = None;
    let mut iterations = 1u32;
    let mut disassemble = false;
    for arg in &args {
        if arg == "-dis" {
            disassemble = true;
        } else if let Ok(count) = arg.parse::<u32>() {
            iterations = count;
        } else if script_path.is_none() {
            script_path = Some(arg.clone());
        } else {
            eprintln!("unexpected argument '{arg}'");
            return usage();
        }
    }
    let Some(path) = script_path else {
        return usage();
    };
    let name = Path::new(&path)
        .file_stem()
        .map_or_else(|| path.clone(), |s| s.to_string_lossy().into_owned());

    let mut script = Script::new();
    if let Err(err) = script.parse_file(&path, &name) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    if let Err(err) = script.compile() {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    if disassemble {
        let mut stdout = io::stdout().lock();
        if let Err(err) = script.disassemble(&mut stdout) {
            eprintln!("failed to write disassembly: {err}");
            return ExitCode::FAILURE;
        }
    }

    for _ in 0..iterations {
        match script.run() {
            Ok(()) => {}
            Err(ScriptError::Run(err)) => {
                eprintln!("{err}");
                let stdin = io::stdin();
                let mut input = stdin.lock();
                let mut stderr = io::stderr().lock();
                let _ = debug_repl(&script, &mut input, &mut stderr);
                return ExitCode::FAILURE;
            }
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn usage() -> ExitCode {
    eprintln!("usage: rill <script> [iterations] [-dis]");
    ExitCode::FAILURE
}

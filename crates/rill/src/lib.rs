#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "bytecode immediates narrow by contract")]
#![expect(clippy::cast_sign_loss, reason = "number-to-index casts are bounds-checked at use")]
#![expect(clippy::cast_possible_wrap, reason = "pc and slot arithmetic is checked before use")]

mod bytecode;
mod compile;
mod debug;
mod error;
mod expressions;
mod externs;
mod heap;
mod intern;
mod io;
mod lex;
mod module;
mod parse;
mod resolve;
mod script;
mod symbols;
mod types;
mod value;

pub use crate::{
    debug::debug_repl,
    error::{CompileError, CompileErrorKind, CompileResult, RunError, RunResult, ScriptError, TraceFrame, Warning},
    externs::{ByteBuffer, ExternFn},
    heap::{Handle, NativeData},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    module::{FsLoader, MemoryLoader, ModuleId, ModuleLoader},
    script::{FunctionCall, Script},
    value::{FuncRef, Value},
};

//! Shared compilation state threaded through the parser, resolver, and
//! emitter.
//!
//! The original design kept this in file-scope mutables; here it is one
//! struct owned by the [`Script`](crate::Script) so compile-time externs can
//! reach it through the VM.

use ahash::AHashSet;

use crate::{
    error::{CompileError, CompileErrorKind, Warning},
    expressions::{Ctx, ExprArena},
    intern::Interns,
    module::Modules,
    symbols::Symbols,
    types::Tags,
};

#[derive(Debug)]
pub(crate) struct Compile {
    pub arena: ExprArena,
    pub tags: Tags,
    pub symbols: Symbols,
    pub modules: Modules,
    pub interns: Interns,
    /// Deferred symbol/type errors; compilation aborts after a pass when any
    /// were recorded, so one run reports as many as possible.
    pub errors: Vec<CompileError>,
    /// Warnings emitted so far, with their rendered messages.
    pub warnings: Vec<(Warning, String)>,
    disabled_warnings: AHashSet<Warning>,
}

impl Compile {
    pub fn new() -> Self {
        Self {
            arena: ExprArena::default(),
            tags: Tags::new(),
            symbols: Symbols::new(),
            modules: Modules::new(),
            interns: Interns::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            disabled_warnings: AHashSet::new(),
        }
    }

    pub fn file_name(&self, ctx: Ctx) -> &str {
        self.interns.get_str(ctx.file)
    }

    /// Records a deferred error and keeps going.
    pub fn defer(&mut self, kind: CompileErrorKind, ctx: Ctx, message: impl Into<String>) {
        let file = self.file_name(ctx).to_owned();
        self.errors.push(CompileError::new(kind, file, ctx.line, message));
    }

    /// Prints and records a warning unless it has been disabled.
    pub fn warn(&mut self, warning: Warning, ctx: Ctx, message: impl Into<String>) {
        if self.disabled_warnings.contains(&warning) {
            return;
        }
        let message = message.into();
        eprintln!("warning [{warning}] ({}:{}): {message}", self.file_name(ctx), ctx.line);
        self.warnings.push((warning, message));
    }

    pub fn disable_warning(&mut self, warning: Warning) {
        self.disabled_warnings.insert(warning);
    }

    /// Takes the deferred-error list, leaving it empty.
    pub fn take_errors(&mut self) -> Vec<CompileError> {
        std::mem::take(&mut self.errors)
    }
}

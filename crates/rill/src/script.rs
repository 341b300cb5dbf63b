//! The `Script`: process state and the host API surface.
//!
//! One `Script` owns everything: compile state (modules, AST arena, tags,
//! symbols, interns), the code buffer, the extern registry, the GC heap, and
//! the VM cursor (stack, frames, pc/fp). Compilation drives the two-pass
//! per-module pipeline, interleaving emission and execution for modules
//! with `#on_compile` blocks.

use crate::{
    bytecode::{Emitter, Opcode, Program},
    compile::Compile,
    error::{CompileError, CompileErrorKind, CompileResult, RunError, RunResult, ScriptError, TraceFrame, Warning},
    externs::{self, ExternFn, Externs},
    heap::{Handle, Heap, HeapData, NativeData},
    intern::StringId,
    io::{PrintWriter, StdPrint},
    module::{FsLoader, ModuleId, ModuleLoader},
    parse,
    resolve::Resolver,
    value::{FuncRef, Value},
};

/// Value stack capacity; exceeding it is a runtime error.
pub(crate) const STACK_SIZE: usize = 1024;

/// One entry on the indirection stack: the pc/fp/nargs saved by `CALL` and
/// restored by `RETURN`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub ret_pc: i64,
    pub saved_fp: usize,
    pub nargs: usize,
}

/// A trace entry captured at call time: function, location, and rendered
/// argument values.
#[derive(Debug, Clone)]
pub(crate) struct CallRecord {
    pub function: String,
    pub file: String,
    pub line: u32,
    pub args: Vec<String>,
}

/// Handle for a cycle-limited call started with [`Script::begin_call`].
///
/// The caller polls completion by pumping cycles; the call is done when the
/// frame depth returns to where it started.
#[derive(Debug, Clone, Copy)]
pub struct FunctionCall {
    base_frames: usize,
}

pub struct Script {
    pub(crate) compile: Compile,
    pub(crate) prog: Program,
    pub(crate) externs: Externs,
    pub(crate) heap: Heap,
    pub(crate) globals: Vec<Value>,
    pub(crate) stack: Vec<Value>,
    /// The indirection stack; its depth is the frame depth.
    pub(crate) frames: Vec<Frame>,
    /// The return slot read by `PUSH_RETVAL`.
    pub(crate) ret_val: Option<Value>,
    pub(crate) call_records: Vec<CallRecord>,
    /// Execution cursor; negative means halted.
    pub(crate) pc: i64,
    pub(crate) fp: usize,
    /// While positive, cycle-limited pumping never yields.
    pub(crate) atomic_depth: u32,
    /// Suppresses collection while an extern holds argument values.
    pub(crate) in_extern: bool,
    pub(crate) cur_file: StringId,
    pub(crate) cur_line: u32,
    /// Module whose compile-time code is executing, or -1 at runtime.
    pub(crate) current_module: i64,
    pub(crate) out: Box<dyn PrintWriter>,
    loader: Box<dyn ModuleLoader>,
    compiled: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    /// Creates a script with the default extern catalog bound, printing to
    /// stdout and loading modules from the filesystem.
    #[must_use]
    pub fn new() -> Self {
        let mut compile = Compile::new();
        let cur_file = compile.interns.string("none");
        let mut registry = Externs::new();
        externs::bind_defaults(&mut registry);
        Self {
            compile,
            prog: Program::new(),
            externs: registry,
            heap: Heap::new(),
            globals: Vec::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            ret_val: None,
            call_records: Vec::new(),
            pc: -1,
            fp: 0,
            atomic_depth: 0,
            in_extern: false,
            cur_file,
            cur_line: 0,
            current_module: -1,
            out: Box::new(StdPrint),
            loader: Box::new(FsLoader),
            compiled: false,
        }
    }

    /// Creates a script that writes `write` output through `out`.
    #[must_use]
    pub fn with_print(out: Box<dyn PrintWriter>) -> Self {
        let mut script = Self::new();
        script.out = out;
        script
    }

    /// Replaces the module source provider.
    pub fn set_loader(&mut self, loader: Box<dyn ModuleLoader>) {
        self.loader = loader;
    }

    /// Drops all compiled and runtime state, keeping extern bindings, the
    /// print writer, and the loader.
    pub fn reset(&mut self) {
        let cur_file = {
            let mut compile = Compile::new();
            let id = compile.interns.string("none");
            self.compile = compile;
            id
        };
        self.prog = Program::new();
        self.heap.clear();
        self.globals.clear();
        self.stack.clear();
        self.frames.clear();
        self.ret_val = None;
        self.call_records.clear();
        self.pc = -1;
        self.fp = 0;
        self.atomic_depth = 0;
        self.in_extern = false;
        self.cur_file = cur_file;
        self.cur_line = 0;
        self.current_module = -1;
        self.compiled = false;
    }

    /// Registers a host function; script code binds to it with
    /// `extern name(..): R`. Must happen before parse.
    pub fn bind_extern(&mut self, name: &str, func: ExternFn) {
        self.externs.bind(name, func);
    }

    pub fn disable_warning(&mut self, warning: Warning) {
        self.compile.disable_warning(warning);
    }

    /// Warnings emitted so far, with rendered messages.
    #[must_use]
    pub fn warnings(&self) -> &[(Warning, String)] {
        &self.compile.warnings
    }

    /// Count of live GC allocations.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.heap.live_objects()
    }

    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Current value-stack depth; zero between top-level statements.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// The return slot: the value most recently returned by a call, which
    /// `PUSH_RETVAL` would push.
    #[must_use]
    pub fn return_value(&self) -> Option<Value> {
        self.ret_val
    }

    /// Reads a global variable's current value by declaration name, for
    /// host introspection. A declared global whose slot has not been
    /// allocated yet reads as null.
    #[must_use]
    pub fn global_by_name(&self, name: &str) -> Option<Value> {
        let name_id = self.compile.interns.lookup_str(name)?;
        for module in self.compile.modules.ids() {
            for &global in &self.compile.modules.get(module).globals {
                let var = self.compile.symbols.var(global);
                if var.name == name_id {
                    let slot = usize::try_from(var.index).ok()?;
                    return Some(self.globals.get(slot).copied().unwrap_or(Value::Null));
                }
            }
        }
        None
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.pc < 0
    }

    // === loading ===

    /// Registers and parses a module from source text. Re-registering an
    /// already-parsed path returns the existing module untouched.
    pub fn parse_code(&mut self, source: &str, path: &str, name: &str) -> CompileResult<ModuleId> {
        let (id, added) = self.compile.modules.add(path, name);
        if !added && self.compile.modules.get(id).parsed {
            return Ok(id);
        }
        self.compile.modules.get_mut(id).source = source.to_owned();
        {
            let Self { compile, externs, .. } = self;
            parse::parse_module(compile, externs, id)?;
        }
        self.parse_pending_imports()?;
        Ok(id)
    }

    /// Reads a module through the loader, then parses it.
    pub fn parse_file(&mut self, path: &str, name: &str) -> CompileResult<ModuleId> {
        let source = self.load_source(path)?;
        self.parse_code(&source, path, name)
    }

    fn load_source(&mut self, path: &str) -> CompileResult<String> {
        self.loader.load(path).map_err(|err| {
            CompileError::new(
                CompileErrorKind::Host,
                "",
                0,
                format!("failed to load module '{path}': {err}"),
            )
        })
    }

    /// Parses modules registered by `#import` that have no source yet.
    fn parse_pending_imports(&mut self) -> CompileResult<()> {
        while let Some(id) = self.compile.modules.next_unparsed() {
            let path = self.compile.modules.get(id).local_path.clone();
            let source = self.load_source(&path)?;
            self.compile.modules.get_mut(id).source = source;
            let Self { compile, externs, .. } = self;
            parse::parse_module(compile, externs, id)?;
        }
        Ok(())
    }

    // === compilation ===

    /// Compiles every parsed module, referenced modules first, running
    /// `#on_compile` blocks as each module's emission completes.
    pub fn compile(&mut self) -> Result<(), ScriptError> {
        if self.compiled {
            return Ok(());
        }

        // Compile-time code may register new modules (and new struct tags)
        // mid-compile, so the definedness check and `using` finalization are
        // repeated before each module; both are write-through.
        loop {
            let mut errors = self.compile.take_errors();
            self.compile.tags.check_all_defined(&self.compile.interns, &mut errors);
            if !errors.is_empty() {
                return Err(CompileError::from_deferred(&errors).into());
            }
            {
                let Compile { tags, interns, .. } = &mut self.compile;
                tags.finalize_all(interns).map_err(ScriptError::Compile)?;
            }

            let next = self.compile.modules.ids().find(|&id| !self.compile.modules.get(id).compiled);
            let Some(id) = next else { break };
            self.compile_module(id)?;
        }

        self.prog.emit(Opcode::Halt);
        self.compiled = true;
        Ok(())
    }

    /// Compiles one module: references first, then the two-pass (or single
    /// pass when no `#on_compile` blocks exist) emission.
    pub(crate) fn compile_module(&mut self, id: ModuleId) -> Result<(), ScriptError> {
        {
            let module = self.compile.modules.get(id);
            if module.compiled || module.compiling {
                return Ok(());
            }
        }
        self.compile.modules.get_mut(id).compiling = true;

        let refs = self.compile.modules.get(id).refs.clone();
        for referenced in refs {
            self.compile_module(referenced)?;
        }

        let start_pc = self.prog.pos();
        self.compile.modules.get_mut(id).start_pc = start_pc;

        // Pass 0: regular top-level code.
        self.resolve_and_emit_ast(id)?;

        let has_blocks = !self.compile.modules.get(id).compile_blocks.is_empty();
        if has_blocks {
            // Emit the compile-time blocks after the regular code, run the
            // whole module from its start pc, then discard the block code.
            let blocks = self.compile.modules.get(id).compile_blocks.clone();
            {
                let Self { compile, externs, .. } = self;
                let mut resolver = Resolver::new(compile, externs, id);
                for &block in &blocks {
                    resolver.resolve(block);
                }
            }
            let errors = self.compile.take_errors();
            if !errors.is_empty() {
                return Err(CompileError::from_deferred(&errors).into());
            }
            {
                let Self {
                    compile, externs, prog, ..
                } = self;
                let mut emitter = Emitter::new(compile, externs, prog);
                for &block in &blocks {
                    emitter.statement(block).map_err(ScriptError::Compile)?;
                }
            }
            self.prog.emit(Opcode::Halt);

            self.stack.clear();
            self.frames.clear();
            self.ret_val = None;
            self.allocate_globals();
            self.current_module = i64::try_from(id.index()).expect("module index fits i64");
            self.pc = i64::try_from(start_pc).expect("code offset fits i64");
            while self.pc >= 0 {
                self.execute_cycle().map_err(ScriptError::Run)?;
            }
            self.current_module = -1;

            // Pass 1: re-emit the regular code, which now includes any
            // expressions compile-time execution injected into the module.
            self.prog.truncate(start_pc);
            self.resolve_and_emit_ast(id)?;
        }

        let end_pc = self.prog.pos();
        let module = self.compile.modules.get_mut(id);
        module.end_pc = end_pc;
        module.compiled = true;
        module.compiling = false;
        Ok(())
    }

    /// Resolves and emits a module's top-level expressions, in source order.
    /// Both passes are write-through, so replaying is safe.
    fn resolve_and_emit_ast(&mut self, id: ModuleId) -> Result<(), ScriptError> {
        let ast = self.compile.modules.get(id).ast.clone();
        {
            let Self { compile, externs, .. } = self;
            let mut resolver = Resolver::new(compile, externs, id);
            for &expr in &ast {
                resolver.resolve(expr);
            }
        }
        let errors = self.compile.take_errors();
        if !errors.is_empty() {
            return Err(CompileError::from_deferred(&errors).into());
        }
        let Self {
            compile, externs, prog, ..
        } = self;
        let mut emitter = Emitter::new(compile, externs, prog);
        for &expr in &ast {
            emitter.statement(expr).map_err(ScriptError::Compile)?;
        }
        Ok(())
    }

    fn allocate_globals(&mut self) {
        self.globals.resize(self.compile.symbols.num_globals(), Value::Null);
    }

    // === execution ===

    /// Runs the compiled program from the top until `HALT`.
    pub fn run(&mut self) -> Result<(), ScriptError> {
        self.start()?;
        while self.pc >= 0 {
            self.execute_cycle().map_err(ScriptError::Run)?;
        }
        Ok(())
    }

    /// Resets runtime state and positions the cursor at the first
    /// instruction; drive with [`Script::execute_cycle`].
    pub fn start(&mut self) -> Result<(), ScriptError> {
        if !self.compiled {
            return Err(CompileError::new(
                CompileErrorKind::Host,
                "",
                0,
                "attempted to run an uncompiled script",
            )
            .into());
        }
        self.stack.clear();
        self.frames.clear();
        self.ret_val = None;
        self.call_records.clear();
        self.heap.clear();
        self.globals = vec![Value::Null; self.compile.symbols.num_globals()];
        self.atomic_depth = 0;
        self.fp = 0;
        self.pc = 0;
        Ok(())
    }

    /// Halts execution: the cursor moves past the end and the stack is
    /// cleared. The next cycle is a no-op.
    pub fn stop(&mut self) {
        self.pc = -1;
        self.stack.clear();
    }

    /// Looks up a script function by name across every module's function
    /// list, then falls back to the extern registry.
    #[must_use]
    pub fn get_function_by_name(&self, name: &str) -> Option<FuncRef> {
        if let Some(name_id) = self.compile.interns.lookup_str(name) {
            for module in self.compile.modules.ids() {
                for &func in &self.compile.modules.get(module).funcs {
                    let decl = self.compile.symbols.func(func);
                    if decl.name == name_id {
                        return Some(FuncRef {
                            is_extern: false,
                            index: i32::try_from(decl.index).expect("function index fits i32"),
                        });
                    }
                }
            }
        }
        self.externs.index_of(name).map(|index| FuncRef {
            is_extern: true,
            index: i32::try_from(index).expect("extern index fits i32"),
        })
    }

    /// Begins a call to `function` with `nargs` arguments already pushed.
    ///
    /// Externs complete synchronously; script functions leave a frame to be
    /// pumped with [`Script::pump`].
    pub fn begin_call(&mut self, function: FuncRef, nargs: usize) -> RunResult<FunctionCall> {
        let base_frames = self.frames.len();
        self.call_value(function, nargs)?;
        Ok(FunctionCall { base_frames })
    }

    /// Pumps up to `cycles` cycles of a pending call. Returns true when the
    /// call has returned. While `atomic` code is executing, pumping
    /// continues past the quota rather than suspending inside the bracket.
    pub fn pump(&mut self, call: FunctionCall, cycles: usize) -> RunResult<bool> {
        let mut remaining = cycles;
        while self.frames.len() > call.base_frames && self.pc >= 0 {
            if remaining == 0 && self.atomic_depth == 0 {
                return Ok(false);
            }
            self.execute_cycle()?;
            remaining = remaining.saturating_sub(1);
        }
        Ok(true)
    }

    /// Calls a function and runs until it returns.
    pub fn call_function(&mut self, function: FuncRef, nargs: usize) -> RunResult<()> {
        let call = self.begin_call(function, nargs)?;
        while !self.pump(call, usize::MAX)? {}
        Ok(())
    }

    // === value helpers for externs and hosts ===

    pub(crate) fn alloc(&mut self, data: HeapData) -> Handle {
        if !self.in_extern && self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.alloc(data)
    }

    /// Marks from the roots (return slot, value stack, globals) and sweeps.
    pub fn collect_garbage(&mut self) {
        let Self {
            heap,
            stack,
            globals,
            ret_val,
            ..
        } = self;
        if let Some(value) = ret_val {
            heap.mark_value(*value);
        }
        for &value in stack.iter() {
            heap.mark_value(value);
        }
        for &value in globals.iter() {
            heap.mark_value(value);
        }
        heap.sweep();
    }

    pub fn push_value(&mut self, value: Value) -> RunResult<()> {
        self.push(value)
    }

    pub fn pop_value(&mut self) -> RunResult<Value> {
        self.pop()
    }

    pub fn push_null(&mut self) -> RunResult<()> {
        self.push(Value::Null)
    }

    pub fn push_bool(&mut self, value: bool) -> RunResult<()> {
        self.push(Value::Bool(value))
    }

    pub fn push_char(&mut self, code: u8) -> RunResult<()> {
        self.push(Value::Char(code))
    }

    pub fn push_number(&mut self, value: f64) -> RunResult<()> {
        self.push(Value::Number(value))
    }

    pub fn push_func(&mut self, function: FuncRef) -> RunResult<()> {
        self.push(Value::Func(function))
    }

    pub fn push_string(&mut self, value: &str) -> RunResult<()> {
        let handle = self.alloc(HeapData::Str(value.as_bytes().to_vec().into_boxed_slice()));
        self.push(Value::Ref(handle))
    }

    pub fn push_string_bytes(&mut self, bytes: Vec<u8>) -> RunResult<()> {
        let handle = self.alloc(HeapData::Str(bytes.into_boxed_slice()));
        self.push(Value::Ref(handle))
    }

    pub fn push_array(&mut self, values: Vec<Value>) -> RunResult<()> {
        let handle = self.alloc(HeapData::Array(values));
        self.push(Value::Ref(handle))
    }

    pub fn push_native(&mut self, native: Box<dyn NativeData>) -> RunResult<()> {
        let handle = self.alloc(HeapData::Native(native));
        self.push(Value::Ref(handle))
    }

    /// Pops a string value, copying its bytes out as UTF-8 (lossily).
    pub fn pop_string(&mut self) -> RunResult<String> {
        let handle = self.pop_string_handle()?;
        let HeapData::Str(bytes) = self.heap.get(handle) else {
            unreachable!("pop_string_handle returns strings");
        };
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Pops the top of the stack into the return slot, which the next
    /// `PUSH_RETVAL` reads.
    pub fn return_top(&mut self) -> RunResult<()> {
        let value = self.pop()?;
        self.ret_val = Some(value);
        Ok(())
    }

    /// Positional argument accessor for the extern view; index 0 is the
    /// leftmost argument.
    #[must_use]
    pub fn get_arg(args: &[Value], index: usize) -> Value {
        args.get(index).copied().unwrap_or(Value::Null)
    }

    pub fn arg_number(&self, args: &[Value], index: usize) -> RunResult<f64> {
        match args.get(index) {
            Some(Value::Number(n)) => Ok(*n),
            Some(other) => Err(self.runtime_error(format!(
                "expected number but received {}",
                other.type_name(&self.heap)
            ))),
            None => Err(self.runtime_error(format!("missing extern argument {index}"))),
        }
    }

    pub fn arg_bool(&self, args: &[Value], index: usize) -> RunResult<bool> {
        match args.get(index) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(self.runtime_error(format!("expected bool but received {}", other.type_name(&self.heap)))),
            None => Err(self.runtime_error(format!("missing extern argument {index}"))),
        }
    }

    pub fn arg_char(&self, args: &[Value], index: usize) -> RunResult<u8> {
        match args.get(index) {
            Some(Value::Char(c)) => Ok(*c),
            Some(other) => Err(self.runtime_error(format!("expected char but received {}", other.type_name(&self.heap)))),
            None => Err(self.runtime_error(format!("missing extern argument {index}"))),
        }
    }

    pub fn arg_string(&self, args: &[Value], index: usize) -> RunResult<String> {
        match args.get(index) {
            Some(Value::Ref(handle)) => {
                if let HeapData::Str(bytes) = self.heap.get(*handle) {
                    Ok(String::from_utf8_lossy(bytes).into_owned())
                } else {
                    Err(self.runtime_error(format!(
                        "expected string but received {}",
                        Value::Ref(*handle).type_name(&self.heap)
                    )))
                }
            }
            Some(other) => Err(self.runtime_error(format!(
                "expected string but received {}",
                other.type_name(&self.heap)
            ))),
            None => Err(self.runtime_error(format!("missing extern argument {index}"))),
        }
    }

    /// Borrows a typed native payload from an argument.
    pub fn arg_native_mut<T: NativeData>(&mut self, args: &[Value], index: usize) -> RunResult<&mut T> {
        let handle = match args.get(index) {
            Some(Value::Ref(handle)) if matches!(self.heap.get(*handle), HeapData::Native(_)) => *handle,
            Some(other) => {
                return Err(self.runtime_error(format!(
                    "expected native but received {}",
                    other.type_name(&self.heap)
                )));
            }
            None => return Err(self.runtime_error(format!("missing extern argument {index}"))),
        };
        let compatible = matches!(self.heap.get(handle), HeapData::Native(n) if n.as_any().is::<T>());
        if !compatible {
            return Err(self.runtime_error("native value has an unexpected payload type"));
        }
        let HeapData::Native(native) = self.heap.get_mut(handle) else {
            unreachable!("checked above");
        };
        Ok(native
            .as_any_mut()
            .downcast_mut::<T>()
            .expect("payload type checked above"))
    }

    // === diagnostics ===

    pub(crate) fn runtime_error(&self, message: impl Into<String>) -> RunError {
        let mut error = RunError::new(self.compile.interns.get_str(self.cur_file), self.cur_line, message);
        error.trace = self
            .call_records
            .iter()
            .map(|record| TraceFrame {
                file: record.file.clone(),
                line: record.line,
                function: record.function.clone(),
                args: record.args.clone(),
            })
            .collect();
        error
    }

    /// The module currently executing compile-time code, if any.
    pub(crate) fn compile_time_module(&self) -> Option<ModuleId> {
        usize::try_from(self.current_module)
            .ok()
            .map(|index| ModuleId::from_index(u32::try_from(index).expect("module index fits u32")))
    }
}

//! The execution engine: one cycle reads one opcode.
//!
//! The VM is single-threaded and cooperative; suspension happens only
//! between cycles (the cycle-limited call helper), never inside an
//! `ATOMIC_ENABLE`/`ATOMIC_DISABLE` bracket. Fatal conditions — stack
//! over/underflow, pop-type mismatches, out-of-bounds access, a zero
//! divisor in `%`, calling a non-function — surface as [`RunError`]s
//! carrying the call-record trace.

use smallvec::SmallVec;

use crate::{
    error::{RunError, RunResult},
    heap::{HeapData, StructData},
    intern::StringId,
    script::{CallRecord, Frame, Script, STACK_SIZE},
    value::{FuncRef, Value, render_trace_value, values_equal},
};

use super::{
    builder::{INT_BYTES, UNEMITTED_PC},
    op::Opcode,
};

impl Script {
    /// Executes one instruction. A halted script (pc < 0) is a no-op.
    pub fn execute_cycle(&mut self) -> RunResult<()> {
        if self.pc < 0 {
            return Ok(());
        }
        let pc = usize::try_from(self.pc).expect("non-negative pc");
        if pc >= self.prog.code.len() {
            return Err(self.runtime_error("program counter ran past the end of code"));
        }
        let byte = self.prog.byte_at(pc);
        self.pc += 1;
        let Some(op) = Opcode::from_repr(byte) else {
            return Err(self.runtime_error(format!("corrupt bytecode: unknown opcode {byte}")));
        };

        match op {
            Opcode::PushNull => self.push(Value::Null)?,
            Opcode::PushTrue => self.push(Value::Bool(true))?,
            Opcode::PushFalse => self.push(Value::Bool(false))?,
            Opcode::PushChar => {
                let code = self.read_int();
                self.push(Value::Char(code as u8))?;
            }
            Opcode::PushNumber => {
                let index = self.read_int();
                let value = self.compile.interns.get_number(crate::intern::NumberId::from_index(index as u32));
                self.push(Value::Number(value))?;
            }
            Opcode::PushString => {
                let index = self.read_int();
                let bytes = self
                    .compile
                    .interns
                    .get_str(StringId::from_index(index as u32))
                    .as_bytes()
                    .to_vec();
                let handle = self.alloc(HeapData::Str(bytes.into_boxed_slice()));
                self.push(Value::Ref(handle))?;
            }
            Opcode::PushFunc => {
                let index = self.read_int();
                self.push(Value::Func(FuncRef {
                    is_extern: false,
                    index,
                }))?;
            }
            Opcode::PushExternFunc => {
                let index = self.read_int();
                self.push(Value::Func(FuncRef { is_extern: true, index }))?;
            }
            Opcode::PushArrayBlock => {
                let length = usize::try_from(self.read_int()).expect("array literal length is non-negative");
                let mut values = vec![Value::Null; length];
                for slot in values.iter_mut() {
                    *slot = self.pop()?;
                }
                let handle = self.alloc(HeapData::Array(values));
                self.push(Value::Ref(handle))?;
            }
            Opcode::PushRetval => {
                let value = self.ret_val.unwrap_or(Value::Null);
                self.push(value)?;
            }
            Opcode::PushStruct => {
                let size = usize::try_from(self.read_int()).expect("struct size is non-negative");
                let ninit = self.read_int();
                let tag = self.read_int() as u32;
                let mut members = vec![Value::Null; size];
                for _ in 0..ninit {
                    let value = self.pop()?;
                    let index = self.pop_number()? as usize;
                    let Some(slot) = members.get_mut(index) else {
                        return Err(self.runtime_error("struct initializer index out of bounds"));
                    };
                    *slot = value;
                }
                let handle = self.alloc(HeapData::Struct(StructData { tag, members }));
                self.push(Value::Ref(handle))?;
            }

            Opcode::StringLen => {
                let handle = self.pop_string_handle()?;
                let HeapData::Str(bytes) = self.heap.get(handle) else {
                    unreachable!("pop_string_handle returns strings");
                };
                let length = bytes.len() as f64;
                self.push(Value::Number(length))?;
            }
            Opcode::ArrayLen => {
                let handle = self.pop_array_handle()?;
                let HeapData::Array(values) = self.heap.get(handle) else {
                    unreachable!("pop_array_handle returns arrays");
                };
                let length = values.len() as f64;
                self.push(Value::Number(length))?;
            }

            Opcode::StringGet => {
                let handle = self.pop_string_handle()?;
                let index = self.pop_number()? as i64;
                let HeapData::Str(bytes) = self.heap.get(handle) else {
                    unreachable!("pop_string_handle returns strings");
                };
                let Some(&byte) = usize::try_from(index).ok().and_then(|i| bytes.get(i)) else {
                    return Err(self.runtime_error("string index out of bounds"));
                };
                self.push(Value::Char(byte))?;
            }
            Opcode::ArrayGet => {
                let handle = self.pop_array_handle()?;
                let index = self.pop_number()? as i64;
                let HeapData::Array(values) = self.heap.get(handle) else {
                    unreachable!("pop_array_handle returns arrays");
                };
                let Some(&value) = usize::try_from(index).ok().and_then(|i| values.get(i)) else {
                    return Err(self.runtime_error("array index out of bounds"));
                };
                self.push(value)?;
            }
            Opcode::ArraySet => {
                let handle = self.pop_array_handle()?;
                let index = self.pop_number()? as i64;
                let value = self.pop()?;
                let HeapData::Array(values) = self.heap.get_mut(handle) else {
                    unreachable!("pop_array_handle returns arrays");
                };
                let Some(slot) = usize::try_from(index).ok().and_then(|i| values.get_mut(i)) else {
                    return Err(self.runtime_error("array index out of bounds"));
                };
                *slot = value;
            }

            Opcode::StructGet => {
                let index = usize::try_from(self.read_int()).expect("member index is non-negative");
                let handle = self.pop_struct_handle()?;
                let HeapData::Struct(data) = self.heap.get(handle) else {
                    unreachable!("pop_struct_handle returns structs");
                };
                let Some(&value) = data.members.get(index) else {
                    return Err(self.runtime_error("struct member index out of bounds"));
                };
                self.push(value)?;
            }
            Opcode::StructSet => {
                let index = usize::try_from(self.read_int()).expect("member index is non-negative");
                let handle = self.pop_struct_handle()?;
                let value = self.pop()?;
                let HeapData::Struct(data) = self.heap.get_mut(handle) else {
                    unreachable!("pop_struct_handle returns structs");
                };
                let Some(slot) = data.members.get_mut(index) else {
                    return Err(self.runtime_error("struct member index out of bounds"));
                };
                *slot = value;
            }

            Opcode::Add => self.binary_number(|a, b| a + b)?,
            Opcode::Sub => self.binary_number(|a, b| a - b)?,
            Opcode::Mul => self.binary_number(|a, b| a * b)?,
            Opcode::Div => self.binary_number(|a, b| a / b)?,
            Opcode::Mod => {
                let a = self.pop_number()?;
                let b = self.pop_number()?;
                let divisor = b as i64;
                if divisor == 0 {
                    return Err(self.runtime_error("division by zero in '%'"));
                }
                self.push(Value::Number(((a as i64) % divisor) as f64))?;
            }
            Opcode::Lt => self.binary_compare(|a, b| a < b)?,
            Opcode::Gt => self.binary_compare(|a, b| a > b)?,
            Opcode::Lte => self.binary_compare(|a, b| a <= b)?,
            Opcode::Gte => self.binary_compare(|a, b| a >= b)?,
            Opcode::Land => {
                let a = self.pop_bool()?;
                let b = self.pop_bool()?;
                self.push(Value::Bool(a && b))?;
            }
            Opcode::Lor => {
                let a = self.pop_bool()?;
                let b = self.pop_bool()?;
                self.push(Value::Bool(a || b))?;
            }
            Opcode::Neg => {
                let value = self.pop_number()?;
                self.push(Value::Number(-value))?;
            }
            Opcode::Not => {
                let value = self.pop_bool()?;
                self.push(Value::Bool(!value))?;
            }
            Opcode::Equ => {
                let a = self.pop()?;
                let b = self.pop()?;
                let equal = values_equal(&self.heap, a, b);
                self.push(Value::Bool(equal))?;
            }

            Opcode::Read => {
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                let handle = self.alloc(HeapData::Str(line.into_bytes().into_boxed_slice()));
                self.push(Value::Ref(handle))?;
            }
            Opcode::Write => {
                let value = self.pop()?;
                let rendered = crate::value::render_value(&self.heap, value);
                self.out.write_str(&rendered);
                self.out.push_char('\n');
            }

            Opcode::Goto => {
                let target = self.read_int();
                self.pc = i64::from(target);
            }
            Opcode::Gotoz => {
                let target = self.read_int();
                let cond = self.pop_bool()?;
                if !cond {
                    self.pc = i64::from(target);
                }
            }

            Opcode::Set => {
                let index = usize::try_from(self.read_int()).expect("global slot is non-negative");
                let value = self.pop()?;
                let Some(slot) = self.globals.get_mut(index) else {
                    return Err(self.runtime_error("global slot out of bounds"));
                };
                *slot = value;
            }
            Opcode::Get => {
                let index = usize::try_from(self.read_int()).expect("global slot is non-negative");
                let Some(&value) = self.globals.get(index) else {
                    return Err(self.runtime_error("global slot out of bounds"));
                };
                self.push(value)?;
            }
            Opcode::Setlocal => {
                let offset = self.read_int();
                let value = self.pop()?;
                let slot = self.frame_slot(offset)?;
                self.stack[slot] = value;
            }
            Opcode::Getlocal => {
                let offset = self.read_int();
                let slot = self.frame_slot(offset)?;
                let value = self.stack[slot];
                self.push(value)?;
            }

            Opcode::Call => {
                let nargs = usize::from(self.read_byte());
                let callee = self.pop()?;
                let Value::Func(func) = callee else {
                    let name = callee.type_name(&self.heap);
                    return Err(self.runtime_error(format!("attempted to call a value of type '{name}'")));
                };
                self.call_value(func, nargs)?;
            }
            Opcode::Return => {
                self.ret_val = None;
                self.pop_frame()?;
            }
            Opcode::ReturnValue => {
                self.ret_val = Some(self.pop()?);
                self.pop_frame()?;
            }

            Opcode::AtomicEnable => self.atomic_depth += 1,
            Opcode::AtomicDisable => {
                if self.atomic_depth == 0 {
                    return Err(self.runtime_error("unbalanced 'atomic' bracket"));
                }
                self.atomic_depth -= 1;
            }

            Opcode::File => {
                let index = self.read_int();
                self.cur_file = StringId::from_index(index as u32);
            }
            Opcode::Line => {
                self.cur_line = u32::try_from(self.read_int()).unwrap_or(0);
            }

            Opcode::Halt => self.pc = -1,
        }
        Ok(())
    }

    fn read_byte(&mut self) -> u8 {
        let pc = usize::try_from(self.pc).expect("non-negative pc");
        self.pc += 1;
        self.prog.byte_at(pc)
    }

    fn read_int(&mut self) -> i32 {
        let pc = usize::try_from(self.pc).expect("non-negative pc");
        self.pc += INT_BYTES as i64;
        self.prog.int_at(pc)
    }

    fn binary_number(&mut self, f: impl FnOnce(f64, f64) -> f64) -> RunResult<()> {
        let a = self.pop_number()?;
        let b = self.pop_number()?;
        self.push(Value::Number(f(a, b)))
    }

    fn binary_compare(&mut self, f: impl FnOnce(f64, f64) -> bool) -> RunResult<()> {
        let a = self.pop_number()?;
        let b = self.pop_number()?;
        self.push(Value::Bool(f(a, b)))
    }

    fn frame_slot(&self, offset: i32) -> RunResult<usize> {
        let slot = i64::try_from(self.fp).expect("frame pointer fits i64") + i64::from(offset);
        usize::try_from(slot)
            .ok()
            .filter(|&s| s < self.stack.len())
            .ok_or_else(|| self.runtime_error("local slot out of bounds"))
    }

    /// Dispatches a function value popped by `CALL` (also used by the host
    /// call helpers).
    pub(crate) fn call_value(&mut self, func: FuncRef, nargs: usize) -> RunResult<()> {
        if self.stack.len() < nargs {
            return Err(self.runtime_error("stack underflow in call"));
        }

        // Arguments sit on top of the stack, leftmost on top; capture the
        // rendered values now so the trace survives collection.
        let record_args: Vec<String> = (0..nargs)
            .map(|i| render_trace_value(&self.heap, self.stack[self.stack.len() - 1 - i]))
            .collect();
        let function = self.function_name(func);
        let file = self.compile.interns.get_str(self.cur_file).to_owned();
        self.call_records.push(CallRecord {
            function,
            file,
            line: self.cur_line,
            args: record_args,
        });

        if func.is_extern {
            let index = usize::try_from(func.index).unwrap_or(usize::MAX);
            let Some(ext) = self.externs.get(index) else {
                self.call_records.pop();
                return Err(self.runtime_error(format!("call of unregistered extern {}", func.index)));
            };

            let mut args: SmallVec<[Value; 8]> = SmallVec::new();
            for _ in 0..nargs {
                args.push(self.pop()?);
            }
            let base = self.stack.len();

            self.in_extern = true;
            let result = ext(self, &args);
            self.in_extern = false;

            // Anything the extern left behind without `return_top` is
            // discarded, keeping the stack balanced.
            self.stack.truncate(base);
            self.call_records.pop();
            result
        } else {
            let index = usize::try_from(func.index).unwrap_or(usize::MAX);
            let entry = self.prog.function_pcs.get(index).copied().unwrap_or(UNEMITTED_PC);
            if entry == UNEMITTED_PC {
                self.call_records.pop();
                return Err(self.runtime_error(format!("call of unemitted function {}", func.index)));
            }
            self.push_frame(nargs);
            self.pc = i64::try_from(entry).expect("entry pc fits i64");
            Ok(())
        }
    }

    fn push_frame(&mut self, nargs: usize) {
        self.frames.push(Frame {
            ret_pc: self.pc,
            saved_fp: self.fp,
            nargs,
        });
        self.fp = self.stack.len();
    }

    fn pop_frame(&mut self) -> RunResult<()> {
        let Some(frame) = self.frames.pop() else {
            return Err(self.runtime_error("return outside of any call frame"));
        };
        // Drop the locals, then the arguments below the former frame
        // pointer, restoring exactly the pc/fp saved on entry.
        self.stack.truncate(self.fp);
        self.pc = frame.ret_pc;
        self.fp = frame.saved_fp;
        let new_len = self.stack.len().saturating_sub(frame.nargs);
        self.stack.truncate(new_len);
        self.call_records.pop();
        Ok(())
    }

    fn function_name(&self, func: FuncRef) -> String {
        let index = usize::try_from(func.index).unwrap_or(usize::MAX);
        if func.is_extern {
            return self.externs.name(index).unwrap_or("<unknown extern>").to_owned();
        }
        self.compile
            .symbols
            .function_by_table_index(index)
            .map_or_else(|| "<unknown>".to_owned(), |id| {
                self.compile.interns.get_str(self.compile.symbols.func(id).name).to_owned()
            })
    }

    // === stack primitives ===

    pub(crate) fn push(&mut self, value: Value) -> RunResult<()> {
        if self.stack.len() >= STACK_SIZE {
            return Err(self.runtime_error("stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> RunResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| self.runtime_error("stack underflow"))
    }

    pub fn pop_number(&mut self) -> RunResult<f64> {
        match self.pop()? {
            Value::Number(n) => Ok(n),
            other => Err(self.pop_type_error("number", other)),
        }
    }

    pub fn pop_bool(&mut self) -> RunResult<bool> {
        match self.pop()? {
            Value::Bool(b) => Ok(b),
            other => Err(self.pop_type_error("bool", other)),
        }
    }

    pub fn pop_char(&mut self) -> RunResult<u8> {
        match self.pop()? {
            Value::Char(c) => Ok(c),
            other => Err(self.pop_type_error("char", other)),
        }
    }

    pub(crate) fn pop_string_handle(&mut self) -> RunResult<crate::heap::Handle> {
        match self.pop()? {
            Value::Ref(handle) if matches!(self.heap.get(handle), HeapData::Str(_)) => Ok(handle),
            other => Err(self.pop_type_error("string", other)),
        }
    }

    pub(crate) fn pop_array_handle(&mut self) -> RunResult<crate::heap::Handle> {
        match self.pop()? {
            Value::Ref(handle) if matches!(self.heap.get(handle), HeapData::Array(_)) => Ok(handle),
            other => Err(self.pop_type_error("array", other)),
        }
    }

    pub(crate) fn pop_struct_handle(&mut self) -> RunResult<crate::heap::Handle> {
        match self.pop()? {
            Value::Ref(handle) if matches!(self.heap.get(handle), HeapData::Struct(_)) => Ok(handle),
            other => Err(self.pop_type_error("struct", other)),
        }
    }

    fn pop_type_error(&self, expected: &str, actual: Value) -> RunError {
        let actual = actual.type_name(&self.heap);
        self.runtime_error(format!("expected {expected} but received {actual}"))
    }
}

//! The extern bridge: host-function registration and the default catalog.
//!
//! Externs are `(script, args-view) -> Result` callbacks registered by name
//! before parse; `extern name(..): R` in script code binds by looking the
//! name up in the registry. The argument view reads left-to-right. An
//! extern returns a value by pushing it and calling
//! [`Script::return_top`]; anything else it leaves on the stack is
//! discarded when the call ends.
//!
//! The compile-time half of the catalog (module manipulation, expression
//! and type constructors, symbol access) is only legal while a module's
//! `#on_compile` code is executing; calling one at runtime is a fatal
//! error.

use std::any::Any;
use std::io::Read;

use indexmap::IndexMap;

use crate::{
    error::RunResult,
    expressions::{Ctx, ExprId, ExprKind},
    heap::{HeapData, NativeData},
    lex::Token,
    module::ModuleId,
    script::Script,
    types::{TagId, TypeTag},
    value::{Value, format_g},
};

/// A host-registered function invoked by `CALL` on an extern function value.
pub type ExternFn = fn(&mut Script, &[Value]) -> RunResult<()>;

/// Name-indexed extern registry; a binding's index is its insertion order.
#[derive(Default)]
pub(crate) struct Externs {
    map: IndexMap<String, ExternFn>,
}

impl Externs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a binding; replacing keeps the original index.
    pub fn bind(&mut self, name: &str, func: ExternFn) {
        self.map.insert(name.to_owned(), func);
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.map.get_index_of(name)
    }

    pub fn get(&self, index: usize) -> Option<ExternFn> {
        self.map.get_index(index).map(|(_, &func)| func)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.map.get_index(index).map(|(name, _)| name.as_str())
    }
}

/// Registers the fixed builtin catalog.
pub(crate) fn bind_defaults(externs: &mut Externs) {
    externs.bind("make_array_of_length", ext_make_array_of_length);
    externs.bind("char_to_number", ext_char_to_number);
    externs.bind("number_to_char", ext_number_to_char);
    externs.bind("number_to_string", ext_number_to_string);
    externs.bind("string_to_number", ext_string_to_number);
    externs.bind("read_char", ext_read_char);
    externs.bind("print_char", ext_print_char);
    externs.bind("floor", ext_floor);
    externs.bind("ceil", ext_ceil);

    externs.bind("make_u8_buffer", ext_make_u8_buffer);
    externs.bind("u8_buffer_clear", ext_u8_buffer_clear);
    externs.bind("u8_buffer_length", ext_u8_buffer_length);
    externs.bind("u8_buffer_push", ext_u8_buffer_push);
    externs.bind("u8_buffer_pop", ext_u8_buffer_pop);
    externs.bind("u8_buffer_to_string", ext_u8_buffer_to_string);

    externs.bind("add_module", ext_add_module);
    externs.bind("load_module", ext_load_module);
    externs.bind("compile_module", ext_compile_module);
    externs.bind("run_module", ext_run_module);
    externs.bind("get_current_module_index", ext_get_current_module_index);
    externs.bind("parse_code", ext_parse_code);
    externs.bind("add_expr_to_module", ext_add_expr_to_module);

    externs.bind("make_num_expr", ext_make_num_expr);
    externs.bind("make_string_expr", ext_make_string_expr);
    externs.bind("make_var_expr", ext_make_var_expr);
    externs.bind("make_bin_expr", ext_make_bin_expr);
    externs.bind("make_call_expr", ext_make_call_expr);
    externs.bind("make_array_index_expr", ext_make_array_index_expr);
    externs.bind("make_write_expr", ext_make_write_expr);

    externs.bind("create_void_type", ext_create_void_type);
    externs.bind("create_dynamic_type", ext_create_dynamic_type);
    externs.bind("create_bool_type", ext_create_bool_type);
    externs.bind("create_char_type", ext_create_char_type);
    externs.bind("create_number_type", ext_create_number_type);
    externs.bind("create_string_type", ext_create_string_type);
    externs.bind("create_array_type", ext_create_array_type);

    externs.bind("declare_variable", ext_declare_variable);
    externs.bind("reference_variable", ext_reference_variable);
    externs.bind("reference_function", ext_reference_function);
    externs.bind("get_func_decl_name", ext_get_func_decl_name);
}

// === runtime externs ===

fn ext_make_array_of_length(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let length = script.arg_number(args, 0)? as usize;
    script.push_array(vec![Value::Null; length])?;
    script.return_top()
}

fn ext_char_to_number(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let code = script.arg_char(args, 0)?;
    script.push_number(f64::from(code))?;
    script.return_top()
}

fn ext_number_to_char(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let value = script.arg_number(args, 0)?;
    script.push_char(value as u8)?;
    script.return_top()
}

fn ext_number_to_string(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let value = script.arg_number(args, 0)?;
    let rendered = format_g(value);
    script.push_string(&rendered)?;
    script.return_top()
}

fn ext_string_to_number(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let value = script.arg_string(args, 0)?;
    let parsed = value.trim().parse::<f64>().unwrap_or(0.0);
    script.push_number(parsed)?;
    script.return_top()
}

fn ext_read_char(script: &mut Script, _args: &[Value]) -> RunResult<()> {
    let mut byte = [0u8; 1];
    let code = match std::io::stdin().read(&mut byte) {
        Ok(1) => byte[0],
        _ => 0,
    };
    script.push_char(code)?;
    script.return_top()
}

fn ext_print_char(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let code = script.arg_char(args, 0)?;
    script.out.push_char(char::from(code));
    Ok(())
}

fn ext_floor(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let value = script.arg_number(args, 0)?;
    script.push_number(value.floor())?;
    script.return_top()
}

fn ext_ceil(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let value = script.arg_number(args, 0)?;
    script.push_number(value.ceil())?;
    script.return_top()
}

// === the u8-buffer native ===

/// Growable byte buffer exposed to scripts as a `native` value.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    pub bytes: Vec<u8>,
}

impl NativeData for ByteBuffer {
    fn type_name(&self) -> &'static str {
        "u8_buffer"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn ext_make_u8_buffer(script: &mut Script, _args: &[Value]) -> RunResult<()> {
    script.push_native(Box::new(ByteBuffer::default()))?;
    script.return_top()
}

fn ext_u8_buffer_clear(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let buffer: &mut ByteBuffer = script.arg_native_mut(args, 0)?;
    buffer.bytes.clear();
    Ok(())
}

fn ext_u8_buffer_length(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let length = {
        let buffer: &mut ByteBuffer = script.arg_native_mut(args, 0)?;
        buffer.bytes.len()
    };
    script.push_number(length as f64)?;
    script.return_top()
}

fn ext_u8_buffer_push(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let value = script.arg_number(args, 1)?;
    let buffer: &mut ByteBuffer = script.arg_native_mut(args, 0)?;
    buffer.bytes.push(value as u8);
    Ok(())
}

fn ext_u8_buffer_pop(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let popped = {
        let buffer: &mut ByteBuffer = script.arg_native_mut(args, 0)?;
        buffer.bytes.pop()
    };
    let Some(byte) = popped else {
        return Err(script.runtime_error("pop from an empty u8 buffer"));
    };
    script.push_number(f64::from(byte))?;
    script.return_top()
}

fn ext_u8_buffer_to_string(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let bytes = {
        let buffer: &mut ByteBuffer = script.arg_native_mut(args, 0)?;
        buffer.bytes.clone()
    };
    script.push_string_bytes(bytes)?;
    script.return_top()
}

// === compile-time externs ===

impl Script {
    /// Fails unless a module's compile-time code is executing.
    fn require_compile_time(&self, name: &str) -> RunResult<ModuleId> {
        self.compile_time_module()
            .ok_or_else(|| self.runtime_error(format!("compile-time extern '{name}' called at runtime")))
    }

    /// Synthetic location for expressions built by compile-time code.
    fn generated_ctx(&mut self) -> Ctx {
        Ctx {
            file: self.compile.interns.string("<compile-time>"),
            line: 0,
        }
    }

    fn arg_expr_id(&self, args: &[Value], index: usize) -> RunResult<ExprId> {
        let raw = self.arg_number(args, index)?;
        let id = ExprId::from_index(raw as u32);
        if self.compile.arena.contains(id) {
            Ok(id)
        } else {
            Err(self.runtime_error(format!("{raw} is not a valid expression handle")))
        }
    }

    fn arg_module_id(&self, args: &[Value], index: usize) -> RunResult<ModuleId> {
        let raw = self.arg_number(args, index)?;
        let module = ModuleId::from_index(raw as u32);
        if module.index() < self.compile.modules.len() {
            Ok(module)
        } else {
            Err(self.runtime_error(format!("{raw} is not a valid module index")))
        }
    }

    fn push_expr_id(&mut self, id: ExprId) -> RunResult<()> {
        self.push_number(id.index() as f64)?;
        self.return_top()
    }
}

fn ext_add_module(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("add_module")?;
    let path = script.arg_string(args, 0)?;
    let name = script.arg_string(args, 1)?;
    let (id, _) = script.compile.modules.add(&path, &name);
    script.push_number(id.index() as f64)?;
    script.return_top()
}

fn ext_load_module(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("load_module")?;
    let path = script.arg_string(args, 0)?;
    let name = script.arg_string(args, 1)?;
    let id = script
        .parse_file(&path, &name)
        .map_err(|err| script.runtime_error(err.to_string()))?;
    script.push_number(id.index() as f64)?;
    script.return_top()
}

fn ext_compile_module(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("compile_module")?;
    let module = script.arg_module_id(args, 0)?;
    script
        .compile_module(module)
        .map_err(|err| script.runtime_error(err.to_string()))?;
    Ok(())
}

fn ext_run_module(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("run_module")?;
    let module = script.arg_module_id(args, 0)?;
    let (start_pc, end_pc, compiled) = {
        let m = script.compile.modules.get(module);
        (m.start_pc, m.end_pc, m.compiled)
    };
    if !compiled {
        return Err(script.runtime_error("attempted to run an uncompiled module"));
    }

    let saved_pc = script.pc;
    let base_frames = script.frames.len();
    script.pc = i64::try_from(start_pc).expect("code offset fits i64");
    loop {
        if script.pc < 0 {
            break;
        }
        let at = usize::try_from(script.pc).expect("non-negative pc");
        if script.frames.len() == base_frames && at >= end_pc {
            break;
        }
        script.execute_cycle()?;
    }
    script.pc = saved_pc;
    Ok(())
}

fn ext_get_current_module_index(script: &mut Script, _args: &[Value]) -> RunResult<()> {
    let module = script.require_compile_time("get_current_module_index")?;
    script.push_number(module.index() as f64)?;
    script.return_top()
}

fn ext_parse_code(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("parse_code")?;
    let source = script.arg_string(args, 0)?;
    let path = script.arg_string(args, 1)?;
    let name = script.arg_string(args, 2)?;
    let id = script
        .parse_code(&source, &path, &name)
        .map_err(|err| script.runtime_error(err.to_string()))?;
    script.push_number(id.index() as f64)?;
    script.return_top()
}

fn ext_add_expr_to_module(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("add_expr_to_module")?;
    let module = script.arg_module_id(args, 0)?;
    let expr = script.arg_expr_id(args, 1)?;
    script.compile.modules.get_mut(module).ast.push(expr);
    Ok(())
}

// === expression constructors ===

fn ext_make_num_expr(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("make_num_expr")?;
    let value = script.arg_number(args, 0)?;
    let ctx = script.generated_ctx();
    let number = script.compile.interns.number(value);
    let id = script.compile.arena.alloc(ctx, ExprKind::Number(number));
    script.push_expr_id(id)
}

fn ext_make_string_expr(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("make_string_expr")?;
    let value = script.arg_string(args, 0)?;
    let ctx = script.generated_ctx();
    let string = script.compile.interns.string(&value);
    let id = script.compile.arena.alloc(ctx, ExprKind::Str(string));
    script.push_expr_id(id)
}

fn ext_make_var_expr(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("make_var_expr")?;
    let name = script.arg_string(args, 0)?;
    let ctx = script.generated_ctx();
    let name = script.compile.interns.string(&name);
    let id = script.compile.arena.alloc(ctx, ExprKind::Var { name, decl: None });
    script.push_expr_id(id)
}

fn ext_make_bin_expr(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("make_bin_expr")?;
    let lhs = script.arg_expr_id(args, 0)?;
    let rhs = script.arg_expr_id(args, 1)?;
    let op_name = script.arg_string(args, 2)?;
    let op = binary_op_from_name(&op_name)
        .ok_or_else(|| script.runtime_error(format!("'{op_name}' is not a binary operator")))?;
    let ctx = script.generated_ctx();
    let id = script.compile.arena.alloc(ctx, ExprKind::Binary { op, lhs, rhs });
    script.push_expr_id(id)
}

fn ext_make_call_expr(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("make_call_expr")?;
    let func = script.arg_expr_id(args, 0)?;
    let call_args = match args.get(1) {
        Some(Value::Ref(handle)) => match script.heap.get(*handle) {
            HeapData::Array(values) => values.clone(),
            _ => return Err(script.runtime_error("make_call_expr expects an array of expression handles")),
        },
        _ => return Err(script.runtime_error("make_call_expr expects an array of expression handles")),
    };
    let mut arg_ids = Vec::with_capacity(call_args.len());
    for value in call_args {
        arg_ids.push(script.arg_expr_id(&[value], 0)?);
    }
    let ctx = script.generated_ctx();
    let id = script.compile.arena.alloc(ctx, ExprKind::Call { func, args: arg_ids });
    script.push_expr_id(id)
}

fn ext_make_array_index_expr(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("make_array_index_expr")?;
    let array = script.arg_expr_id(args, 0)?;
    let index = script.arg_expr_id(args, 1)?;
    let ctx = script.generated_ctx();
    let id = script.compile.arena.alloc(ctx, ExprKind::Index { array, index });
    script.push_expr_id(id)
}

fn ext_make_write_expr(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("make_write_expr")?;
    let value = script.arg_expr_id(args, 0)?;
    let ctx = script.generated_ctx();
    let id = script.compile.arena.alloc(ctx, ExprKind::Write(value));
    script.push_expr_id(id)
}

fn binary_op_from_name(name: &str) -> Option<Token> {
    let op = match name {
        "=" => Token::Assign,
        "+" => Token::Plus,
        "-" => Token::Minus,
        "*" => Token::Star,
        "/" => Token::Slash,
        "%" => Token::Percent,
        "<" => Token::Lt,
        ">" => Token::Gt,
        "<=" => Token::Lte,
        ">=" => Token::Gte,
        "==" => Token::Equals,
        "!=" => Token::NotEqual,
        "&&" => Token::Land,
        "||" => Token::Lor,
        _ => return None,
    };
    Some(op)
}

// === type constructors ===

fn push_tag(script: &mut Script, tag: TagId) -> RunResult<()> {
    script.push_number(tag.index() as f64)?;
    script.return_top()
}

fn ext_create_void_type(script: &mut Script, _args: &[Value]) -> RunResult<()> {
    script.require_compile_time("create_void_type")?;
    push_tag(script, TagId::VOID)
}

fn ext_create_dynamic_type(script: &mut Script, _args: &[Value]) -> RunResult<()> {
    script.require_compile_time("create_dynamic_type")?;
    push_tag(script, TagId::DYNAMIC)
}

fn ext_create_bool_type(script: &mut Script, _args: &[Value]) -> RunResult<()> {
    script.require_compile_time("create_bool_type")?;
    push_tag(script, TagId::BOOL)
}

fn ext_create_char_type(script: &mut Script, _args: &[Value]) -> RunResult<()> {
    script.require_compile_time("create_char_type")?;
    push_tag(script, TagId::CHAR)
}

fn ext_create_number_type(script: &mut Script, _args: &[Value]) -> RunResult<()> {
    script.require_compile_time("create_number_type")?;
    push_tag(script, TagId::NUMBER)
}

fn ext_create_string_type(script: &mut Script, _args: &[Value]) -> RunResult<()> {
    script.require_compile_time("create_string_type")?;
    push_tag(script, TagId::STRING)
}

fn ext_create_array_type(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("create_array_type")?;
    let raw = script.arg_number(args, 0)?;
    let element = TagId::from_index(raw as u32);
    let tag = script.compile.tags.alloc(TypeTag::Array { element });
    push_tag(script, tag)
}

// === symbol access ===

fn ext_declare_variable(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let module = script.require_compile_time("declare_variable")?;
    let name = script.arg_string(args, 0)?;
    let raw_tag = script.arg_number(args, 1)?;
    let tag = TagId::from_index(raw_tag as u32);
    let name_id = script.compile.interns.string(&name);
    match script.compile.symbols.declare_variable(name_id, tag, module) {
        Ok(id) => {
            script.compile.modules.get_mut(module).globals.push(id);
            let index = script.compile.symbols.var(id).index;
            script.push_number(f64::from(index))?;
            script.return_top()
        }
        Err(_) => Err(script.runtime_error(format!("redeclaration of global '{name}'"))),
    }
}

fn ext_reference_variable(script: &mut Script, args: &[Value]) -> RunResult<()> {
    let module = script.require_compile_time("reference_variable")?;
    let name = script.arg_string(args, 0)?;
    let name_id = script.compile.interns.string(&name);
    let Some(decl) = script.compile.symbols.reference_variable(name_id, module) else {
        return Err(script.runtime_error(format!("attempted to reference undeclared variable '{name}'")));
    };
    let ctx = script.generated_ctx();
    let id = script.compile.arena.alloc(
        ctx,
        ExprKind::Var {
            name: name_id,
            decl: Some(decl),
        },
    );
    script.push_expr_id(id)
}

fn ext_reference_function(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("reference_function")?;
    let name = script.arg_string(args, 0)?;
    let name_id = script.compile.interns.string(&name);
    if script.compile.symbols.reference_function(name_id).is_none() {
        return Err(script.runtime_error(format!("attempted to reference undeclared function '{name}'")));
    }
    let ctx = script.generated_ctx();
    let id = script.compile.arena.alloc(
        ctx,
        ExprKind::Var {
            name: name_id,
            decl: None,
        },
    );
    script.push_expr_id(id)
}

fn ext_get_func_decl_name(script: &mut Script, args: &[Value]) -> RunResult<()> {
    script.require_compile_time("get_func_decl_name")?;
    let raw = script.arg_number(args, 0)?;
    let index = raw as usize;
    let Some(func) = script.compile.symbols.function_by_table_index(index) else {
        return Err(script.runtime_error(format!("{raw} is not a valid function index")));
    };
    let name = script
        .compile
        .interns
        .get_str(script.compile.symbols.func(func).name)
        .to_owned();
    script.push_string(&name)?;
    script.return_top()
}

//! The emitter: expression tree to bytecode.
//!
//! Expressions are compiled in one of three contexts — statement, value, or
//! assignment target — mirroring how the resolver typed them. Function
//! declarations wrap their body in a `GOTO` so they cost nothing as
//! statements, record their entry pc, and pre-size the frame with one
//! `PUSH_NULL` per local.

use crate::{
    compile::Compile,
    error::{CompileError, CompileErrorKind, CompileResult},
    expressions::{Ctx, ExprId, ExprKind},
    externs::Externs,
    intern::StringId,
    lex::Token,
    symbols::{FuncId, FuncKind},
    types::{TagId, TypeTag},
};

use super::{builder::Program, op::Opcode};

pub(crate) struct Emitter<'a> {
    cx: &'a mut Compile,
    externs: &'a Externs,
    prog: &'a mut Program,
}

impl<'a> Emitter<'a> {
    pub fn new(cx: &'a mut Compile, externs: &'a Externs, prog: &'a mut Program) -> Self {
        prog.reserve_functions(cx.symbols.num_functions());
        Self { cx, externs, prog }
    }

    fn error(&self, ctx: Ctx, message: impl Into<String>) -> CompileError {
        CompileError::new(CompileErrorKind::Type, self.cx.file_name(ctx), ctx.line, message)
    }

    fn patch_here(&mut self, loc: usize) -> CompileResult<()> {
        let target = i32::try_from(self.prog.pos())
            .map_err(|_| CompileError::new(CompileErrorKind::Type, "", 0, "code buffer exceeds i32 addressing"))?;
        self.prog.patch_int(loc, target);
        Ok(())
    }

    /// Compiles one top-level or nested statement.
    pub fn statement(&mut self, id: ExprId) -> CompileResult<()> {
        let ctx = self.cx.arena.get(id).ctx;
        let kind = self.cx.arena.get(id).kind.clone();
        self.prog.emit_location(ctx, false);

        match kind {
            // Declarations emit nothing by themselves.
            ExprKind::Extern(_) | ExprKind::Var { .. } => Ok(()),

            ExprKind::StructDecl { tag } => {
                let methods: Vec<(FuncId, ExprId)> = match self.cx.tags.get(tag) {
                    TypeTag::Struct(st) => st.methods.iter().map(|m| (m.func, m.body)).collect(),
                    _ => Vec::new(),
                };
                for (func, body) in methods {
                    self.function(func, body)?;
                }
                Ok(())
            }

            ExprKind::Block(body) => {
                for entry in body {
                    self.statement(entry)?;
                }
                Ok(())
            }

            ExprKind::Return { value, .. } => {
                match value {
                    Some(value) => {
                        self.value(value)?;
                        self.prog.emit(Opcode::ReturnValue);
                    }
                    None => self.prog.emit(Opcode::Return),
                }
                Ok(())
            }

            ExprKind::If { cond, body, alt } => {
                self.value(cond)?;
                let else_loc = self.prog.emit_jump(Opcode::Gotoz);
                self.statement(body)?;
                let exit_loc = self.prog.emit_jump(Opcode::Goto);
                self.patch_here(else_loc)?;
                if let Some(alt) = alt {
                    self.statement(alt)?;
                }
                self.patch_here(exit_loc)
            }

            ExprKind::While { cond, body } => {
                let loop_start = i32::try_from(self.prog.pos()).expect("code offset fits i32");
                self.value(cond)?;
                let exit_loc = self.prog.emit_jump(Opcode::Gotoz);
                self.statement(body)?;
                self.prog.emit(Opcode::Goto);
                self.prog.emit_int(loop_start);
                self.patch_here(exit_loc)
            }

            ExprKind::For { init, cond, step, body } => {
                self.statement(init)?;
                let loop_start = i32::try_from(self.prog.pos()).expect("code offset fits i32");
                self.value(cond)?;
                let exit_loc = self.prog.emit_jump(Opcode::Gotoz);
                self.statement(body)?;
                self.statement(step)?;
                self.prog.emit(Opcode::Goto);
                self.prog.emit_int(loop_start);
                self.patch_here(exit_loc)
            }

            ExprKind::Func { decl, body } => self.function(decl, body),

            ExprKind::Binary { op, lhs, rhs } => {
                if op != Token::Assign {
                    return Err(self.error(ctx, "value expression used in non-value context"));
                }
                self.value(rhs)?;
                self.assign(lhs)
            }

            ExprKind::Call { func, args } => {
                self.call(func, &args)?;
                // The call may have branched; refresh the location info.
                self.prog.emit_location(ctx, true);
                Ok(())
            }

            ExprKind::Write(value) => {
                self.value(value)?;
                self.prog.emit(Opcode::Write);
                Ok(())
            }

            ExprKind::Atomic(body) => {
                self.prog.emit(Opcode::AtomicEnable);
                self.statement(body)?;
                self.prog.emit(Opcode::AtomicDisable);
                Ok(())
            }

            _ => Err(self.error(ctx, "value expression used in non-value context")),
        }
    }

    /// Compiles an expression that leaves exactly one value on the stack.
    fn value(&mut self, id: ExprId) -> CompileResult<()> {
        let ctx = self.cx.arena.get(id).ctx;
        let kind = self.cx.arena.get(id).kind.clone();
        self.prog.emit_location(ctx, false);

        match kind {
            ExprKind::Null => {
                self.prog.emit(Opcode::PushNull);
                Ok(())
            }
            ExprKind::Bool(value) => {
                self.prog.emit(if value { Opcode::PushTrue } else { Opcode::PushFalse });
                Ok(())
            }
            ExprKind::Char(code) => {
                self.prog.emit(Opcode::PushChar);
                self.prog.emit_int(i32::from(code));
                Ok(())
            }
            ExprKind::Number(number) => {
                self.prog.emit(Opcode::PushNumber);
                self.prog.emit_int(i32::try_from(number.index()).expect("number pool index fits i32"));
                Ok(())
            }
            ExprKind::Str(string) => {
                self.prog.emit(Opcode::PushString);
                self.prog.emit_int(i32::try_from(string.index()).expect("string pool index fits i32"));
                Ok(())
            }

            ExprKind::Var { name, decl } => {
                if let Some(decl) = decl {
                    let var = self.cx.symbols.var(decl);
                    let (op, index) = if var.func.is_some() {
                        (Opcode::Getlocal, var.index)
                    } else {
                        (Opcode::Get, var.index)
                    };
                    self.prog.emit(op);
                    self.prog.emit_int(index);
                    return Ok(());
                }
                if let Some(func) = self.cx.symbols.reference_function(name) {
                    let decl = self.cx.symbols.func(func);
                    let op = match decl.kind {
                        FuncKind::Function => Opcode::PushFunc,
                        FuncKind::Extern => Opcode::PushExternFunc,
                    };
                    let index = i32::try_from(decl.index).expect("function index fits i32");
                    self.prog.emit(op);
                    self.prog.emit_int(index);
                    return Ok(());
                }
                // An undeclared registry extern, referenced by name alone.
                if let Some(index) = self.externs.index_of(self.cx.interns.get_str(name)) {
                    self.prog.emit(Opcode::PushExternFunc);
                    self.prog.emit_int(i32::try_from(index).expect("extern index fits i32"));
                    return Ok(());
                }
                let rendered = self.cx.interns.get_str(name).to_owned();
                Err(self.error(ctx, format!("unresolved reference '{rendered}' reached the emitter")))
            }

            ExprKind::Dot { value, name } => {
                let (index, is_method) = self.member_index(ctx, value, name)?;
                if is_method {
                    return Err(self.error(ctx, "attempted to access member function with '.'; use ':' instead"));
                }
                self.value(value)?;
                self.prog.emit(Opcode::StructGet);
                self.prog.emit_int(i32::try_from(index).expect("member index fits i32"));
                Ok(())
            }

            ExprKind::Colon { value, name } => {
                let receiver_tag = self.expr_tag(value, ctx)?;
                let method = match self.cx.tags.get(receiver_tag) {
                    TypeTag::Struct(st) => st.method(name),
                    _ => None,
                };
                let Some(method) = method else {
                    return Err(self.error(ctx, "attempted to access member value with ':'; use '.' instead"));
                };
                let index = self.cx.symbols.func(method.func).index;
                self.prog.emit(Opcode::PushFunc);
                self.prog.emit_int(i32::try_from(index).expect("function index fits i32"));
                Ok(())
            }

            ExprKind::Index { array, index } => {
                self.value(index)?;
                self.value(array)?;
                let array_tag = self.expr_tag(array, ctx)?;
                let op = if matches!(self.cx.tags.get(array_tag), TypeTag::String) {
                    Opcode::StringGet
                } else {
                    Opcode::ArrayGet
                };
                self.prog.emit(op);
                Ok(())
            }

            ExprKind::ArrayLiteral { values, .. } => {
                for &value in values.iter().rev() {
                    self.value(value)?;
                }
                self.prog.emit(Opcode::PushArrayBlock);
                self.prog.emit_int(i32::try_from(values.len()).expect("array literal length fits i32"));
                Ok(())
            }

            ExprKind::StructNew { tag, init } => self.struct_new(ctx, tag, &init),

            ExprKind::Len(value) => {
                self.value(value)?;
                let value_tag = self.expr_tag(value, ctx)?;
                let op = if matches!(self.cx.tags.get(value_tag), TypeTag::String) {
                    Opcode::StringLen
                } else {
                    Opcode::ArrayLen
                };
                self.prog.emit(op);
                Ok(())
            }

            ExprKind::Read => {
                self.prog.emit(Opcode::Read);
                Ok(())
            }

            ExprKind::Unary { op, rhs } => {
                self.value(rhs)?;
                self.prog.emit(if op == Token::Minus { Opcode::Neg } else { Opcode::Not });
                Ok(())
            }

            ExprKind::Binary { op, lhs, rhs } => {
                if op == Token::Assign {
                    return Err(self.error(ctx, "assignment used in value context"));
                }
                self.value(rhs)?;
                self.value(lhs)?;
                match op {
                    Token::Plus => self.prog.emit(Opcode::Add),
                    Token::Minus => self.prog.emit(Opcode::Sub),
                    Token::Star => self.prog.emit(Opcode::Mul),
                    Token::Slash => self.prog.emit(Opcode::Div),
                    Token::Percent => self.prog.emit(Opcode::Mod),
                    Token::Lt => self.prog.emit(Opcode::Lt),
                    Token::Gt => self.prog.emit(Opcode::Gt),
                    Token::Lte => self.prog.emit(Opcode::Lte),
                    Token::Gte => self.prog.emit(Opcode::Gte),
                    Token::Land => self.prog.emit(Opcode::Land),
                    Token::Lor => self.prog.emit(Opcode::Lor),
                    Token::Equals => self.prog.emit(Opcode::Equ),
                    Token::NotEqual => {
                        self.prog.emit(Opcode::Equ);
                        self.prog.emit(Opcode::Not);
                    }
                    other => return Err(self.error(ctx, format!("'{other}' is not a binary operator"))),
                }
                Ok(())
            }

            ExprKind::Call { func, args } => {
                self.call(func, &args)?;
                self.prog.emit(Opcode::PushRetval);
                self.prog.emit_location(ctx, true);
                Ok(())
            }

            ExprKind::Paren(inner) => self.value(inner),

            _ => Err(self.error(ctx, "non-value expression used in value context")),
        }
    }

    /// Compiles a store into the target; the value to store is already on
    /// the stack.
    fn assign(&mut self, id: ExprId) -> CompileResult<()> {
        let ctx = self.cx.arena.get(id).ctx;
        let kind = self.cx.arena.get(id).kind.clone();

        match kind {
            ExprKind::Var { decl: Some(decl), .. } => {
                let var = self.cx.symbols.var(decl);
                let (op, index) = if var.func.is_some() {
                    (Opcode::Setlocal, var.index)
                } else {
                    (Opcode::Set, var.index)
                };
                self.prog.emit(op);
                self.prog.emit_int(index);
                Ok(())
            }
            ExprKind::Var { decl: None, .. } => Err(self.error(ctx, "attempted to assign to unassignable value")),

            ExprKind::Index { array, index } => {
                self.value(index)?;
                self.value(array)?;
                self.prog.emit(Opcode::ArraySet);
                Ok(())
            }

            ExprKind::Dot { value, name } => {
                let (index, is_method) = self.member_index(ctx, value, name)?;
                if is_method {
                    return Err(self.error(ctx, "attempted to assign to a member function"));
                }
                self.value(value)?;
                self.prog.emit(Opcode::StructSet);
                self.prog.emit_int(i32::try_from(index).expect("member index fits i32"));
                Ok(())
            }

            _ => Err(self.error(ctx, "invalid left-hand side in assignment expression")),
        }
    }

    /// Pushes arguments right-to-left (so the leftmost ends on top), then the
    /// callee, then `CALL`.
    fn call(&mut self, func: ExprId, args: &[ExprId]) -> CompileResult<()> {
        let ctx = self.cx.arena.get(func).ctx;
        let nargs = u8::try_from(args.len()).map_err(|_| self.error(ctx, "calls support at most 255 arguments"))?;
        for &arg in args.iter().rev() {
            self.value(arg)?;
        }
        self.value(func)?;
        self.prog.emit(Opcode::Call);
        self.prog.emit_byte(nargs);
        Ok(())
    }

    fn struct_new(&mut self, ctx: Ctx, tag: TagId, init: &[ExprId]) -> CompileResult<()> {
        let (size, member_count) = match self.cx.tags.get(tag) {
            TypeTag::Struct(st) => (st.size, st.members.len()),
            _ => return Err(self.error(ctx, "'new' requires a struct type")),
        };
        let mut initialized = vec![false; size.max(1)];
        let mut ninit = 0i32;

        // Explicit initializers, in reverse order.
        for &entry in init.iter().rev() {
            let ExprKind::Binary { lhs, rhs, .. } = self.cx.arena.get(entry).kind else {
                return Err(self.error(ctx, "invalid struct initializer"));
            };
            let ExprKind::Var { name, .. } = self.cx.arena.get(lhs).kind else {
                return Err(self.error(ctx, "invalid struct initializer"));
            };
            let index = self.lookup_member(ctx, tag, name)?;
            initialized[index] = true;
            ninit += 1;

            self.push_member_index(index);
            self.value(rhs)?;
        }

        // Defaults for members left uninitialized, in reverse declaration
        // order so the runtime fills slots the same way explicit
        // initializers do.
        for member_pos in (0..member_count).rev() {
            let (index, default) = match self.cx.tags.get(tag) {
                TypeTag::Struct(st) => {
                    let member = &st.members[member_pos];
                    (member.index, member.default_value)
                }
                _ => unreachable!("checked above"),
            };
            if initialized[index] {
                continue;
            }
            let Some(default) = default else { continue };
            initialized[index] = true;
            ninit += 1;

            self.push_member_index(index);
            self.value(default)?;
        }

        self.prog.emit(Opcode::PushStruct);
        self.prog.emit_int(i32::try_from(size.max(1)).expect("struct size fits i32"));
        self.prog.emit_int(ninit);
        self.prog.emit_int(i32::try_from(tag.index()).expect("tag index fits i32"));
        Ok(())
    }

    /// Member slot indices travel through the number pool, like every other
    /// numeric immediate on the value stack.
    fn push_member_index(&mut self, index: usize) {
        let number = self.cx.interns.number(index as f64);
        self.prog.emit(Opcode::PushNumber);
        self.prog.emit_int(i32::try_from(number.index()).expect("number pool index fits i32"));
    }

    /// Emits a function body wrapped in a `GOTO` and records its entry pc.
    fn function(&mut self, decl: FuncId, body: ExprId) -> CompileResult<()> {
        let skip_loc = self.prog.emit_jump(Opcode::Goto);

        let (table_index, num_locals) = {
            let f = self.cx.symbols.func(decl);
            (f.index, f.locals.len())
        };
        self.prog.reserve_functions(table_index + 1);
        self.prog.function_pcs[table_index] = self.prog.pos();

        for _ in 0..num_locals {
            self.prog.emit(Opcode::PushNull);
        }
        self.statement(body)?;
        self.prog.emit(Opcode::Return);
        self.patch_here(skip_loc)
    }

    fn expr_tag(&self, id: ExprId, ctx: Ctx) -> CompileResult<TagId> {
        self.cx
            .arena
            .get(id)
            .tag
            .ok_or_else(|| self.error(ctx, "untyped expression reached the emitter"))
    }

    fn lookup_member(&self, ctx: Ctx, tag: TagId, name: StringId) -> CompileResult<usize> {
        let TypeTag::Struct(st) = self.cx.tags.get(tag) else {
            return Err(self.error(ctx, "member access on a non-struct type"));
        };
        if let Some(member) = st.member(name) {
            return Ok(member.index);
        }
        let rendered = self.cx.interns.get_str(name).to_owned();
        let struct_rendered = self.cx.interns.get_str(st.name).to_owned();
        Err(self.error(
            ctx,
            format!("attempted to access non-existent member '{rendered}' in struct {struct_rendered}"),
        ))
    }

    /// Resolves a `.`/`:` access to `(layout index, is_method)`.
    fn member_index(&self, ctx: Ctx, value: ExprId, name: StringId) -> CompileResult<(usize, bool)> {
        let value_tag = self.expr_tag(value, ctx)?;
        let TypeTag::Struct(st) = self.cx.tags.get(value_tag) else {
            return Err(self.error(ctx, "member access on a non-struct type"));
        };
        if let Some(member) = st.member(name) {
            return Ok((member.index, false));
        }
        if st.method(name).is_some() {
            return Ok((0, true));
        }
        let rendered = self.cx.interns.get_str(name).to_owned();
        let struct_rendered = self.cx.interns.get_str(st.name).to_owned();
        Err(self.error(
            ctx,
            format!("attempted to access non-existent member '{rendered}' in struct {struct_rendered}"),
        ))
    }
}

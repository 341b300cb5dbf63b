//! Recursive-descent parser.
//!
//! Parsing declares symbols and struct tags as a side effect: `var`
//! declares a local or global, `func` declares a function and enters its
//! scope, struct bodies lower member functions to free functions named
//! `Struct_member` with a leading `self` argument. Directives (`#import`,
//! `#on_compile`) are recognized at the top level only.

use std::path::Path;

use crate::{
    compile::Compile,
    error::{CompileError, CompileErrorKind, CompileResult},
    expressions::{Ctx, ExprId, ExprKind},
    externs::Externs,
    intern::StringId,
    lex::{Lexer, Token},
    module::{ModuleId, resolve_import},
    symbols::FuncId,
    types::{Member, Method, TagId, Tags, TypeTag},
};

/// Parses the registered module's source, filling its AST and compile-time
/// block lists and declaring every symbol the source mentions.
pub(crate) fn parse_module(cx: &mut Compile, externs: &Externs, module: ModuleId) -> CompileResult<()> {
    let source = cx.modules.get(module).source.clone();
    let label = cx.modules.get(module).local_path.clone();
    let file = cx.interns.string(&label);
    let mut parser = Parser {
        lx: Lexer::new(&source, &label),
        cx,
        externs,
        module,
        file,
    };
    parser.run()?;
    parser.cx.modules.get_mut(module).parsed = true;
    Ok(())
}

struct Parser<'a> {
    lx: Lexer<'a>,
    cx: &'a mut Compile,
    externs: &'a Externs,
    module: ModuleId,
    file: StringId,
}

impl Parser<'_> {
    fn run(&mut self) -> CompileResult<()> {
        self.advance()?;
        while self.lx.token != Token::Eof {
            match self.lx.token {
                Token::Semicolon => {
                    self.advance()?;
                }
                Token::Import => self.import_directive()?,
                Token::OnCompile => {
                    self.advance()?;
                    let block = self.expr()?;
                    self.cx.modules.get_mut(self.module).compile_blocks.push(block);
                }
                _ => {
                    let top = self.expr()?;
                    self.cx.modules.get_mut(self.module).ast.push(top);
                }
            }
        }
        Ok(())
    }

    fn ctx(&self) -> Ctx {
        Ctx {
            file: self.file,
            line: self.lx.line,
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(CompileErrorKind::Parse, &self.lx.file, self.lx.line, message)
    }

    fn advance(&mut self) -> CompileResult<Token> {
        self.lx.advance()
    }

    fn expect(&mut self, token: Token) -> CompileResult<()> {
        if self.lx.token != token {
            return Err(self.error(format!("expected '{token}' but received '{}'", self.lx.token)));
        }
        self.advance()?;
        Ok(())
    }

    fn intern_lexeme(&mut self) -> StringId {
        self.cx.interns.string(&self.lx.lexeme)
    }

    fn alloc(&mut self, ctx: Ctx, kind: ExprKind) -> ExprId {
        self.cx.arena.alloc(ctx, kind)
    }

    fn import_directive(&mut self) -> CompileResult<()> {
        self.advance()?;
        if self.lx.token != Token::Str {
            return Err(self.error(format!("expected string after '#import' but received '{}'", self.lx.token)));
        }
        let importer = self.cx.modules.get(self.module).local_path.clone();
        let path = resolve_import(&importer, &self.lx.lexeme);
        let name = Path::new(&path)
            .file_stem()
            .map_or_else(|| path.clone(), |s| s.to_string_lossy().into_owned());
        let (imported, _) = self.cx.modules.add(&path, &name);
        let refs = &mut self.cx.modules.get_mut(self.module).refs;
        if imported != self.module && !refs.contains(&imported) {
            refs.push(imported);
        }
        self.advance()?;
        Ok(())
    }

    // === expressions ===

    fn expr(&mut self) -> CompileResult<ExprId> {
        let lhs = self.unary()?;
        self.bin_rhs(lhs, 0)
    }

    fn bin_rhs(&mut self, mut lhs: ExprId, min_prec: i32) -> CompileResult<ExprId> {
        loop {
            let Some(prec) = binary_prec(self.lx.token) else {
                return Ok(lhs);
            };
            if prec < min_prec {
                return Ok(lhs);
            }
            let op = self.lx.token;
            let ctx = self.ctx();
            self.advance()?;

            let mut rhs = self.unary()?;
            if binary_prec(self.lx.token).is_some_and(|next| next > prec) {
                rhs = self.bin_rhs(rhs, prec + 1)?;
            }
            lhs = self.alloc(ctx, ExprKind::Binary { op, lhs, rhs });
        }
    }

    fn unary(&mut self) -> CompileResult<ExprId> {
        match self.lx.token {
            Token::New => self.new_expr(),
            Token::Not | Token::Minus => {
                let ctx = self.ctx();
                let op = self.lx.token;
                self.advance()?;
                let rhs = self.unary()?;
                Ok(self.alloc(ctx, ExprKind::Unary { op, rhs }))
            }
            _ => {
                let pre = self.factor()?;
                self.post(pre)
            }
        }
    }

    fn post(&mut self, pre: ExprId) -> CompileResult<ExprId> {
        match self.lx.token {
            Token::Dot | Token::Colon => {
                let is_method = self.lx.token == Token::Colon;
                let ctx = self.ctx();
                self.advance()?;
                if self.lx.token != Token::Ident {
                    let sep = if is_method { ':' } else { '.' };
                    return Err(self.error(format!(
                        "expected identifier after '{sep}' but received '{}'",
                        self.lx.token
                    )));
                }
                let name = self.intern_lexeme();
                self.advance()?;
                let kind = if is_method {
                    ExprKind::Colon { value: pre, name }
                } else {
                    ExprKind::Dot { value: pre, name }
                };
                let exp = self.alloc(ctx, kind);
                self.post(exp)
            }
            Token::OpenParen => {
                let ctx = self.ctx();
                self.advance()?;

                let mut args = Vec::new();
                // A method call duplicates its receiver as the first
                // argument; in the arena that is an id-clone, not a new node.
                if let ExprKind::Colon { value, .. } = self.cx.arena.get(pre).kind {
                    args.push(value);
                }
                while self.lx.token != Token::CloseParen {
                    args.push(self.expr()?);
                    if self.lx.token == Token::Comma {
                        self.advance()?;
                    } else if self.lx.token != Token::CloseParen {
                        return Err(self.error(format!(
                            "expected ')' at the end of call argument list but received '{}'",
                            self.lx.token
                        )));
                    }
                }
                self.advance()?;
                let exp = self.alloc(ctx, ExprKind::Call { func: pre, args });
                self.post(exp)
            }
            Token::OpenSquare => {
                let ctx = self.ctx();
                self.advance()?;
                let index = self.expr()?;
                self.expect(Token::CloseSquare)?;
                let exp = self.alloc(ctx, ExprKind::Index { array: pre, index });
                self.post(exp)
            }
            _ => Ok(pre),
        }
    }

    fn factor(&mut self) -> CompileResult<ExprId> {
        match self.lx.token {
            Token::Null => {
                let ctx = self.ctx();
                self.advance()?;
                Ok(self.alloc(ctx, ExprKind::Null))
            }
            Token::True | Token::False => {
                let ctx = self.ctx();
                let value = self.lx.token == Token::True;
                self.advance()?;
                Ok(self.alloc(ctx, ExprKind::Bool(value)))
            }
            Token::CharLit => {
                let ctx = self.ctx();
                let c = self.lx.lexeme.chars().next().unwrap_or('\0');
                let code = u8::try_from(u32::from(c))
                    .map_err(|_| self.error(format!("character literal '{c}' is not a single byte")))?;
                self.advance()?;
                Ok(self.alloc(ctx, ExprKind::Char(code)))
            }
            Token::Number => {
                let ctx = self.ctx();
                let value = self.lx.number_value()?;
                let id = self.cx.interns.number(value);
                self.advance()?;
                Ok(self.alloc(ctx, ExprKind::Number(id)))
            }
            Token::Str => {
                let ctx = self.ctx();
                let id = self.intern_lexeme();
                self.advance()?;
                Ok(self.alloc(ctx, ExprKind::Str(id)))
            }
            Token::Var => self.var_decl(),
            Token::Ident => {
                let ctx = self.ctx();
                let name = self.intern_lexeme();
                self.advance()?;
                let decl = self.cx.symbols.reference_variable(name, self.module);
                Ok(self.alloc(ctx, ExprKind::Var { name, decl }))
            }
            Token::OpenParen => {
                let ctx = self.ctx();
                self.advance()?;
                let inner = self.expr()?;
                self.expect(Token::CloseParen)?;
                Ok(self.alloc(ctx, ExprKind::Paren(inner)))
            }
            Token::OpenCurly => self.block(),
            Token::If => self.if_expr(),
            Token::While => self.while_expr(),
            Token::For => self.for_expr(),
            Token::Func => self.func_decl(),
            Token::Return => self.return_expr(),
            Token::Write => {
                let ctx = self.ctx();
                self.advance()?;
                let value = self.expr()?;
                Ok(self.alloc(ctx, ExprKind::Write(value)))
            }
            Token::Read => {
                let ctx = self.ctx();
                self.advance()?;
                Ok(self.alloc(ctx, ExprKind::Read))
            }
            Token::Len => {
                let ctx = self.ctx();
                self.advance()?;
                let value = self.expr()?;
                Ok(self.alloc(ctx, ExprKind::Len(value)))
            }
            Token::OpenSquare => self.array_literal(),
            Token::Extern => self.extern_decl(),
            Token::Struct | Token::Union => self.struct_decl(),
            Token::Atomic => {
                let ctx = self.ctx();
                self.advance()?;
                let body = self.expr()?;
                Ok(self.alloc(ctx, ExprKind::Atomic(body)))
            }
            other => Err(self.error(format!("unexpected token '{other}'"))),
        }
    }

    fn block(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        self.advance()?;
        self.cx.symbols.enter_scope();
        let mut body = Vec::new();
        while self.lx.token != Token::CloseCurly {
            if self.lx.token == Token::Semicolon {
                self.advance()?;
                continue;
            }
            if self.lx.token == Token::Eof {
                return Err(self.error("expected '}' before end of file"));
            }
            body.push(self.expr()?);
        }
        self.advance()?;
        self.cx.symbols.exit_scope();
        Ok(self.alloc(ctx, ExprKind::Block(body)))
    }

    fn if_expr(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        self.advance()?;
        let cond = self.expr()?;
        let body = self.expr()?;
        let alt = if self.lx.token == Token::Else {
            self.advance()?;
            Some(self.expr()?)
        } else {
            None
        };
        Ok(self.alloc(ctx, ExprKind::If { cond, body, alt }))
    }

    fn while_expr(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        self.advance()?;
        let cond = self.expr()?;
        let body = self.expr()?;
        Ok(self.alloc(ctx, ExprKind::While { cond, body }))
    }

    fn for_expr(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        self.advance()?;
        let init = self.expr()?;
        self.expect(Token::Comma)?;
        let cond = self.expr()?;
        self.expect(Token::Comma)?;
        let step = self.expr()?;
        // A trailing comma before the body is accepted.
        if self.lx.token == Token::Comma {
            self.advance()?;
        }
        let body = self.expr()?;
        Ok(self.alloc(ctx, ExprKind::For { init, cond, step, body }))
    }

    fn return_expr(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        let Some(func) = self.cx.symbols.cur_func else {
            return Err(self.error("'return' outside of any function"));
        };
        self.advance()?;
        let value = if self.lx.token == Token::Semicolon {
            self.advance()?;
            None
        } else {
            Some(self.expr()?)
        };
        self.cx.symbols.func_mut(func).has_return = true;
        Ok(self.alloc(ctx, ExprKind::Return { func, value }))
    }

    fn var_decl(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        self.advance()?;
        if self.lx.token != Token::Ident {
            return Err(self.error(format!("expected identifier after 'var' but received '{}'", self.lx.token)));
        }
        let name = self.intern_lexeme();
        self.advance()?;

        let tag = if self.lx.token == Token::Colon {
            self.advance()?;
            self.type_tag()?
        } else {
            TagId::UNKNOWN
        };

        let decl = match self.cx.symbols.declare_variable(name, tag, self.module) {
            Ok(id) => {
                if self.cx.symbols.var(id).func.is_none() {
                    self.cx.modules.get_mut(self.module).globals.push(id);
                }
                id
            }
            Err(existing) => {
                let rendered = self.cx.interns.get_str(name).to_owned();
                self.cx
                    .defer(CompileErrorKind::Symbol, ctx, format!("redeclaration of global '{rendered}'"));
                existing
            }
        };
        Ok(self.alloc(ctx, ExprKind::Var { name, decl: Some(decl) }))
    }

    fn array_literal(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        self.advance()?;
        let mut values = Vec::new();
        while self.lx.token != Token::CloseSquare {
            values.push(self.expr()?);
            if self.lx.token == Token::Comma {
                self.advance()?;
            } else if self.lx.token != Token::CloseSquare {
                return Err(self.error(format!("unexpected '{}' in array literal", self.lx.token)));
            }
        }
        self.advance()?;

        let element = if values.is_empty() {
            if self.lx.token != Token::Colon {
                return Err(self.error("an empty array literal requires ': T' to name its element type"));
            }
            self.advance()?;
            Some(self.type_tag()?)
        } else {
            None
        };
        Ok(self.alloc(ctx, ExprKind::ArrayLiteral { element, values }))
    }

    fn new_expr(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        self.advance()?;

        if self.lx.token != Token::Ident {
            // The original treats a bare `new` as an ordinary identifier
            // reference when no type name follows.
            let name = self.cx.interns.string("new");
            let decl = self.cx.symbols.reference_variable(name, self.module);
            let exp = self.alloc(ctx, ExprKind::Var { name, decl });
            return self.post(exp);
        }

        let name = self.intern_lexeme();
        let tag = self.cx.tags.struct_placeholder(name, ctx);
        self.advance()?;

        let mut init = Vec::new();
        if self.lx.token == Token::OpenCurly {
            self.advance()?;
            while self.lx.token != Token::CloseCurly {
                let entry = self.expr()?;
                let valid = matches!(
                    self.cx.arena.get(entry).kind,
                    ExprKind::Binary { op: Token::Assign, lhs, .. }
                        if matches!(self.cx.arena.get(lhs).kind, ExprKind::Var { .. })
                );
                if !valid {
                    let rendered = self.cx.interns.get_str(name).to_owned();
                    return Err(self.error(format!(
                        "invalid initializer in 'new {rendered}': expected 'member = value'"
                    )));
                }
                init.push(entry);
                if self.lx.token == Token::Comma {
                    self.advance()?;
                }
            }
            self.advance()?;
        }

        let exp = self.alloc(ctx, ExprKind::StructNew { tag, init });
        self.post(exp)
    }

    fn func_decl(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        self.advance()?;
        if self.lx.token != Token::Ident {
            return Err(self.error(format!("expected identifier after 'func' but received '{}'", self.lx.token)));
        }
        let name = self.intern_lexeme();
        self.advance()?;

        let placeholder = self.cx.tags.alloc(TypeTag::Func {
            args: Vec::new(),
            ret: TagId::VOID,
        });
        let decl = self.cx.symbols.declare_function(name, placeholder);
        self.cx.modules.get_mut(self.module).funcs.push(decl);
        self.cx.symbols.enter_function(decl);

        let body = self.finish_function(decl, placeholder, None, ctx)?;
        Ok(self.alloc(ctx, ExprKind::Func { decl, body }))
    }

    /// Parses `(arg: T, ..): R body` for a function already entered, patching
    /// its placeholder tag, and checks the non-void-needs-return rule.
    fn finish_function(
        &mut self,
        decl: FuncId,
        placeholder: TagId,
        self_tag: Option<TagId>,
        ctx: Ctx,
    ) -> CompileResult<ExprId> {
        self.expect(Token::OpenParen)?;

        let mut arg_tags = Vec::new();
        if let Some(receiver) = self_tag {
            let self_name = self.cx.interns.string("self");
            self.cx.symbols.declare_argument(self_name, receiver, self.module);
            arg_tags.push(receiver);
        }
        while self.lx.token != Token::CloseParen {
            if self.lx.token != Token::Ident {
                return Err(self.error(format!(
                    "expected identifier in argument list but received '{}'",
                    self.lx.token
                )));
            }
            let arg_name = self.intern_lexeme();
            self.advance()?;
            self.expect(Token::Colon)?;
            let tag = self.type_tag()?;
            self.cx.symbols.declare_argument(arg_name, tag, self.module);
            arg_tags.push(tag);

            if self.lx.token == Token::Comma {
                self.advance()?;
            } else if self.lx.token != Token::CloseParen {
                return Err(self.error(format!(
                    "expected ')' at the end of argument list but received '{}'",
                    self.lx.token
                )));
            }
        }
        self.advance()?;

        self.expect(Token::Colon)?;
        let ret = self.type_tag()?;
        *self.cx.tags.get_mut(placeholder) = TypeTag::Func { args: arg_tags, ret };

        let body = self.expr()?;
        self.cx.symbols.exit_function();

        if ret != TagId::VOID && !self.cx.symbols.func(decl).has_return {
            let rendered = self.cx.interns.get_str(self.cx.symbols.func(decl).name).to_owned();
            self.cx.defer(
                CompileErrorKind::Type,
                ctx,
                format!("non-void function '{rendered}' is missing a return statement"),
            );
        }
        Ok(body)
    }

    fn extern_decl(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        self.advance()?;

        if self.lx.token == Token::OpenCurly {
            self.advance()?;
            let mut decls = Vec::new();
            while self.lx.token != Token::CloseCurly {
                decls.push(self.extern_binding()?);
            }
            self.advance()?;
            return Ok(self.alloc(ctx, ExprKind::Block(decls)));
        }

        self.extern_binding()
    }

    fn extern_binding(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        if self.lx.token != Token::Ident {
            return Err(self.error(format!(
                "expected identifier after 'extern' but received '{}'",
                self.lx.token
            )));
        }
        let name = self.intern_lexeme();
        let rendered = self.lx.lexeme.clone();
        self.advance()?;

        self.expect(Token::OpenParen)?;
        let mut arg_tags = Vec::new();
        while self.lx.token != Token::CloseParen {
            arg_tags.push(self.type_tag()?);
            if self.lx.token == Token::Comma {
                self.advance()?;
            } else if self.lx.token != Token::CloseParen {
                return Err(self.error(format!(
                    "expected ')' at the end of extern argument list but received '{}'",
                    self.lx.token
                )));
            }
        }
        self.advance()?;
        self.expect(Token::Colon)?;
        let ret = self.type_tag()?;

        let Some(index) = self.externs.index_of(&rendered) else {
            return Err(CompileError::new(
                CompileErrorKind::Host,
                &self.lx.file,
                self.lx.line,
                format!("attempted to declare unbound extern '{rendered}'"),
            ));
        };
        let tag = self.cx.tags.alloc(TypeTag::Func { args: arg_tags, ret });
        let decl = self.cx.symbols.declare_extern(name, tag, index);
        Ok(self.alloc(ctx, ExprKind::Extern(decl)))
    }

    fn struct_decl(&mut self) -> CompileResult<ExprId> {
        let ctx = self.ctx();
        let is_union = self.lx.token == Token::Union;
        let keyword = if is_union { "union" } else { "struct" };
        self.advance()?;

        if self.lx.token != Token::Ident {
            return Err(self.error(format!(
                "expected identifier after '{keyword}' but received '{}'",
                self.lx.token
            )));
        }
        let name = self.intern_lexeme();
        let rendered = self.lx.lexeme.clone();
        self.advance()?;

        let tag = self.cx.tags.struct_placeholder(name, ctx);
        let already_defined = matches!(self.cx.tags.get(tag), TypeTag::Struct(st) if st.defined);
        if already_defined {
            self.cx
                .defer(CompileErrorKind::Type, ctx, format!("{keyword} '{rendered}' redefined"));
        }
        {
            let TypeTag::Struct(st) = self.cx.tags.get_mut(tag) else {
                unreachable!("struct placeholder is always a struct tag");
            };
            st.defined = true;
            st.is_union = is_union;
        }

        self.expect(Token::OpenCurly)?;

        let mut members: Vec<Member> = Vec::new();
        let mut usings: Vec<TagId> = Vec::new();
        let mut methods: Vec<Method> = Vec::new();

        while self.lx.token != Token::CloseCurly {
            if self.lx.token == Token::Using {
                let using_ctx = self.ctx();
                self.advance()?;
                if self.lx.token != Token::Ident {
                    return Err(self.error(format!(
                        "expected identifier after 'using' but received '{}'",
                        self.lx.token
                    )));
                }
                let used_name = self.intern_lexeme();
                let used = self.cx.tags.struct_placeholder(used_name, using_ctx);
                usings.push(used);
                self.advance()?;
                continue;
            }

            let is_static = if self.lx.token == Token::Static {
                self.advance()?;
                true
            } else {
                false
            };

            if self.lx.token != Token::Ident {
                return Err(self.error(format!(
                    "expected identifier in {keyword} body but received '{}'",
                    self.lx.token
                )));
            }
            let member_name = self.intern_lexeme();
            let member_rendered = self.lx.lexeme.clone();
            self.advance()?;

            match self.lx.token {
                Token::Colon => {
                    self.advance()?;
                    let member_tag = self.type_tag()?;
                    let default_value = if self.lx.token == Token::Assign {
                        self.advance()?;
                        Some(self.expr()?)
                    } else {
                        None
                    };
                    let index = if is_union { 0 } else { members.len() };
                    members.push(Member {
                        name: member_name,
                        index,
                        tag: member_tag,
                        default_value,
                    });
                }
                Token::OpenParen => {
                    let method_ctx = self.ctx();
                    let lowered = format!("{rendered}_{member_rendered}");
                    let lowered_id = self.cx.interns.string(&lowered);
                    let placeholder = self.cx.tags.alloc(TypeTag::Func {
                        args: Vec::new(),
                        ret: TagId::VOID,
                    });
                    let decl = self.cx.symbols.declare_function(lowered_id, placeholder);
                    self.cx.modules.get_mut(self.module).funcs.push(decl);
                    self.cx.symbols.enter_function(decl);
                    let receiver = if is_static { None } else { Some(tag) };
                    let body = self.finish_function(decl, placeholder, receiver, method_ctx)?;
                    methods.push(Method {
                        name: member_name,
                        func: decl,
                        body,
                    });
                }
                other => {
                    return Err(self.error(format!("expected ':' or '(' after '{member_rendered}' but received '{other}'")));
                }
            }
        }
        self.advance()?;

        {
            let size = if is_union { 1 } else { members.len() };
            let TypeTag::Struct(st) = self.cx.tags.get_mut(tag) else {
                unreachable!("struct placeholder is always a struct tag");
            };
            st.members = members;
            st.usings = usings;
            st.methods = methods;
            st.size = size;
        }
        Ok(self.alloc(ctx, ExprKind::StructDecl { tag }))
    }

    // === types ===

    fn type_tag(&mut self) -> CompileResult<TagId> {
        match self.lx.token {
            Token::Func => {
                self.advance()?;
                self.expect(Token::OpenParen)?;
                let mut args = Vec::new();
                while self.lx.token != Token::CloseParen {
                    args.push(self.type_tag()?);
                    if self.lx.token == Token::Comma {
                        self.advance()?;
                    } else if self.lx.token != Token::CloseParen {
                        return Err(self.error(format!(
                            "expected ')' at the end of function type argument list but received '{}'",
                            self.lx.token
                        )));
                    }
                }
                self.advance()?;
                self.expect(Token::Minus)?;
                let ret = self.type_tag()?;
                Ok(self.cx.tags.alloc(TypeTag::Func { args, ret }))
            }
            Token::Ident => {
                if self.lx.lexeme == "array" {
                    self.advance()?;
                    self.expect(Token::Minus)?;
                    let element = self.type_tag()?;
                    return Ok(self.cx.tags.alloc(TypeTag::Array { element }));
                }
                if let Some(builtin) = Tags::builtin_by_name(&self.lx.lexeme) {
                    self.advance()?;
                    return Ok(builtin);
                }
                let ctx = self.ctx();
                let name = self.intern_lexeme();
                self.advance()?;
                Ok(self.cx.tags.struct_placeholder(name, ctx))
            }
            other => Err(self.error(format!("expected a type name but received '{other}'"))),
        }
    }
}

fn binary_prec(token: Token) -> Option<i32> {
    let prec = match token {
        Token::Assign => 0,
        Token::Land | Token::Lor => 1,
        Token::Lt | Token::Gt | Token::Lte | Token::Gte | Token::Equals | Token::NotEqual => 2,
        Token::Plus | Token::Minus => 3,
        Token::Star | Token::Slash | Token::Percent => 4,
        _ => return None,
    };
    Some(prec)
}

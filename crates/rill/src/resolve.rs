//! Symbol and type resolution.
//!
//! Two sub-passes per top-level expression, in the order the compile-time
//! driver replays them: the symbol pass binds identifiers the parser could
//! not (globals from later modules, forward function references), then the
//! type pass assigns a tag to every node. Both passes defer their errors so
//! a single run reports as many as possible; both are write-through, so
//! replaying them over an already-resolved tree is a no-op.

use crate::{
    compile::Compile,
    error::{CompileErrorKind, Warning},
    expressions::{Ctx, ExprId, ExprKind},
    externs::Externs,
    intern::StringId,
    lex::Token,
    module::ModuleId,
    types::{Compat, TagId, TypeTag},
};

pub(crate) struct Resolver<'a> {
    cx: &'a mut Compile,
    externs: &'a Externs,
    module: ModuleId,
}

impl<'a> Resolver<'a> {
    pub fn new(cx: &'a mut Compile, externs: &'a Externs, module: ModuleId) -> Self {
        Self { cx, externs, module }
    }

    /// Resolves one top-level expression: symbols first, then types, the
    /// latter only when the symbol pass added no new errors.
    pub fn resolve(&mut self, id: ExprId) {
        let errors_before = self.cx.errors.len();
        self.symbols(id);
        if self.cx.errors.len() == errors_before {
            self.types(id);
        }
    }

    // === symbol pass ===

    fn symbols(&mut self, id: ExprId) {
        let kind = self.cx.arena.get(id).kind.clone();
        match kind {
            ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Char(_)
            | ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::Read
            | ExprKind::Extern(_) => {}

            ExprKind::Var { name, decl } => {
                if decl.is_some() {
                    return;
                }
                if let Some(found) = self.cx.symbols.reference_variable(name, self.module) {
                    if let ExprKind::Var { decl, .. } = &mut self.cx.arena.get_mut(id).kind {
                        *decl = Some(found);
                    }
                    return;
                }
                if self.cx.symbols.reference_function(name).is_some() {
                    return;
                }
                if self.cx.tags.struct_by_name(name).is_some() {
                    return;
                }
                // Registered externs are callable without an `extern`
                // declaration; they type as `dynamic`.
                if self.externs.index_of(self.cx.interns.get_str(name)).is_some() {
                    return;
                }
                let ctx = self.cx.arena.get(id).ctx;
                let rendered = self.cx.interns.get_str(name).to_owned();
                self.cx.defer(
                    CompileErrorKind::Symbol,
                    ctx,
                    format!("attempted to reference undeclared '{rendered}'"),
                );
            }

            ExprKind::Dot { value, .. } | ExprKind::Colon { value, .. } => self.symbols(value),
            ExprKind::Index { array, index } => {
                self.symbols(array);
                self.symbols(index);
            }
            ExprKind::ArrayLiteral { values, .. } => {
                for value in values {
                    self.symbols(value);
                }
            }
            // Initializer left-hand sides are member names, not variables.
            ExprKind::StructNew { init, .. } => {
                for entry in init {
                    if let ExprKind::Binary { rhs, .. } = self.cx.arena.get(entry).kind {
                        self.symbols(rhs);
                    }
                }
            }
            ExprKind::StructDecl { tag } => {
                let (defaults, methods): (Vec<ExprId>, Vec<ExprId>) = match self.cx.tags.get(tag) {
                    TypeTag::Struct(st) => (
                        st.members.iter().filter_map(|m| m.default_value).collect(),
                        st.methods.iter().map(|m| m.body).collect(),
                    ),
                    _ => (Vec::new(), Vec::new()),
                };
                for default in defaults {
                    self.symbols(default);
                }
                for body in methods {
                    self.symbols(body);
                }
            }
            ExprKind::Len(value) | ExprKind::Write(value) | ExprKind::Paren(value) | ExprKind::Atomic(value) => {
                self.symbols(value);
            }
            ExprKind::Unary { rhs, .. } => self.symbols(rhs),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.symbols(lhs);
                self.symbols(rhs);
            }
            ExprKind::Call { func, args } => {
                for arg in args {
                    self.symbols(arg);
                }
                self.symbols(func);
            }
            ExprKind::Block(body) => {
                for entry in body {
                    self.symbols(entry);
                }
            }
            ExprKind::If { cond, body, alt } => {
                self.symbols(cond);
                self.symbols(body);
                if let Some(alt) = alt {
                    self.symbols(alt);
                }
            }
            ExprKind::While { cond, body } => {
                self.symbols(cond);
                self.symbols(body);
            }
            ExprKind::For { init, cond, step, body } => {
                self.symbols(init);
                self.symbols(cond);
                self.symbols(step);
                self.symbols(body);
            }
            ExprKind::Return { value, .. } => {
                if let Some(value) = value {
                    self.symbols(value);
                }
            }
            ExprKind::Func { body, .. } => self.symbols(body),
        }
    }

    // === type pass ===

    fn type_error(&mut self, ctx: Ctx, message: String) -> TagId {
        self.cx.defer(CompileErrorKind::Type, ctx, message);
        // Keep walking with a harmless tag so one mistake does not cascade.
        TagId::VOID
    }

    fn display(&self, tag: TagId) -> String {
        self.cx.tags.display(tag, &self.cx.interns)
    }

    fn name(&self, id: StringId) -> String {
        self.cx.interns.get_str(id).to_owned()
    }

    /// Checks `actual` against `expected`, emitting any downgrade warning.
    fn check_compat(&mut self, expected: TagId, actual: TagId, ctx: Ctx, what: &str) {
        match self.cx.tags.compare(expected, actual) {
            Compat::Ok => {}
            Compat::OkWarn(warning) => {
                let message = format!(
                    "{what}: '{}' used where '{}' was expected",
                    self.display(actual),
                    self.display(expected)
                );
                self.cx.warn(warning, ctx, message);
            }
            Compat::Fail => {
                let message = format!(
                    "{what}: expected '{}' but found '{}'",
                    self.display(expected),
                    self.display(actual)
                );
                self.type_error(ctx, message);
            }
        }
    }

    fn set_tag(&mut self, id: ExprId, tag: TagId) -> TagId {
        self.cx.arena.get_mut(id).tag = Some(tag);
        tag
    }

    fn types(&mut self, id: ExprId) -> TagId {
        if let Some(tag) = self.cx.arena.get(id).tag {
            return tag;
        }
        let ctx = self.cx.arena.get(id).ctx;
        let kind = self.cx.arena.get(id).kind.clone();

        let tag = match kind {
            ExprKind::Null => TagId::DYNAMIC,
            ExprKind::Bool(_) => TagId::BOOL,
            ExprKind::Char(_) => TagId::CHAR,
            ExprKind::Number(_) => TagId::NUMBER,
            ExprKind::Str(_) => TagId::STRING,
            ExprKind::Read => TagId::STRING,

            ExprKind::Var { name, decl } => {
                if let Some(decl) = decl {
                    self.cx.symbols.var(decl).tag
                } else if let Some(func) = self.cx.symbols.reference_function(name) {
                    self.cx.symbols.func(func).tag
                } else if self.externs.index_of(self.cx.interns.get_str(name)).is_some() {
                    // An undeclared registry extern has no signature to
                    // check against.
                    TagId::DYNAMIC
                } else {
                    // The symbol pass already reported this reference.
                    TagId::VOID
                }
            }

            ExprKind::Dot { value, name } => {
                let value_tag = self.types(value);
                self.member_access(ctx, value_tag, name, false)
            }
            ExprKind::Colon { value, name } => {
                let value_tag = self.types(value);
                self.member_access(ctx, value_tag, name, true)
            }

            ExprKind::Index { array, index } => {
                let index_tag = self.types(index);
                self.check_compat(TagId::NUMBER, index_tag, ctx, "index");
                let array_tag = self.types(array);
                let element = match self.cx.tags.get(array_tag) {
                    TypeTag::String => Some(TagId::CHAR),
                    TypeTag::Array { element } => Some(*element),
                    TypeTag::Dynamic => Some(TagId::DYNAMIC),
                    _ => None,
                };
                match element {
                    Some(element) => element,
                    None => {
                        self.type_error(ctx, format!("attempted to index a value of type '{}'", self.display(array_tag)))
                    }
                }
            }

            ExprKind::ArrayLiteral { element, values } => {
                let mut element = element;
                for &value in &values {
                    let value_tag = self.types(value);
                    match element {
                        None => element = Some(value_tag),
                        Some(expected) => {
                            if !matches!(self.cx.tags.get(expected), TypeTag::Dynamic)
                                && self.cx.tags.compare(expected, value_tag) != Compat::Ok
                            {
                                self.cx.warn(
                                    Warning::DynamicArrayLiteral,
                                    ctx,
                                    "non-uniform array literal falls back to 'array - dynamic'".to_owned(),
                                );
                                element = Some(TagId::DYNAMIC);
                            }
                        }
                    }
                }
                let element = element.unwrap_or(TagId::DYNAMIC);
                self.cx.tags.alloc(TypeTag::Array { element })
            }

            ExprKind::StructDecl { tag } => {
                let (members, methods): (Vec<(StringId, TagId, Option<ExprId>)>, Vec<ExprId>) =
                    match self.cx.tags.get(tag) {
                        TypeTag::Struct(st) => (
                            st.members.iter().map(|m| (m.name, m.tag, m.default_value)).collect(),
                            st.methods.iter().map(|m| m.body).collect(),
                        ),
                        _ => (Vec::new(), Vec::new()),
                    };
                for (name, member_tag, default) in members {
                    if let Some(default) = default {
                        let default_tag = self.types(default);
                        let what = format!("default value of member '{}'", self.name(name));
                        self.check_compat(member_tag, default_tag, ctx, &what);
                    }
                }
                for body in methods {
                    self.types(body);
                }
                TagId::VOID
            }

            ExprKind::StructNew { tag, init } => {
                if !matches!(self.cx.tags.get(tag), TypeTag::Struct(_)) {
                    let error = self.type_error(ctx, "'new' requires a struct type".to_owned());
                    return self.set_tag(id, error);
                }
                for entry in init {
                    let ExprKind::Binary { lhs, rhs, .. } = self.cx.arena.get(entry).kind else {
                        continue;
                    };
                    let ExprKind::Var { name, .. } = self.cx.arena.get(lhs).kind else {
                        continue;
                    };
                    let rhs_tag = self.types(rhs);
                    let (struct_name, member_tag, is_method) = match self.cx.tags.get(tag) {
                        TypeTag::Struct(st) => (st.name, st.member(name).map(|m| m.tag), st.method(name).is_some()),
                        _ => unreachable!("checked above"),
                    };
                    if let Some(member_tag) = member_tag {
                        let what = format!("initializer of member '{}'", self.name(name));
                        self.check_compat(member_tag, rhs_tag, ctx, &what);
                    } else if is_method {
                        let message = format!(
                            "attempted to initialize member function '{}' in struct {} instantiation",
                            self.name(name),
                            self.name(struct_name)
                        );
                        self.type_error(ctx, message);
                    } else {
                        let message = format!(
                            "attempted to initialize non-existent member '{}' in struct {} instantiation",
                            self.name(name),
                            self.name(struct_name)
                        );
                        self.type_error(ctx, message);
                    }
                }
                tag
            }

            ExprKind::Len(value) => {
                let value_tag = self.types(value);
                if matches!(self.cx.tags.get(value_tag), TypeTag::String | TypeTag::Array { .. }) {
                    TagId::NUMBER
                } else {
                    self.type_error(
                        ctx,
                        format!("'len' applies to string and array values, not '{}'", self.display(value_tag)),
                    )
                }
            }

            ExprKind::Write(value) => {
                let value_tag = self.types(value);
                if matches!(self.cx.tags.get(value_tag), TypeTag::Void) {
                    self.type_error(ctx, "'write' requires a value".to_owned());
                }
                TagId::VOID
            }

            ExprKind::Unary { op, rhs } => {
                let rhs_tag = self.types(rhs);
                match op {
                    Token::Minus => {
                        self.check_compat(TagId::NUMBER, rhs_tag, ctx, "operand of unary '-'");
                        TagId::NUMBER
                    }
                    _ => {
                        self.check_compat(TagId::BOOL, rhs_tag, ctx, "operand of '!'");
                        TagId::BOOL
                    }
                }
            }

            ExprKind::Binary { op, lhs, rhs } => self.binary(ctx, op, lhs, rhs),

            ExprKind::Call { func, args } => self.call(ctx, func, &args),

            ExprKind::Paren(inner) => self.types(inner),

            ExprKind::Block(body) => {
                for entry in body {
                    self.types(entry);
                }
                TagId::VOID
            }

            ExprKind::If { cond, body, alt } => {
                let cond_tag = self.types(cond);
                self.check_compat(TagId::BOOL, cond_tag, ctx, "'if' condition");
                self.types(body);
                if let Some(alt) = alt {
                    self.types(alt);
                }
                TagId::VOID
            }
            ExprKind::While { cond, body } => {
                let cond_tag = self.types(cond);
                self.check_compat(TagId::BOOL, cond_tag, ctx, "'while' condition");
                self.types(body);
                TagId::VOID
            }
            ExprKind::For { init, cond, step, body } => {
                self.types(init);
                let cond_tag = self.types(cond);
                self.check_compat(TagId::BOOL, cond_tag, ctx, "'for' condition");
                self.types(step);
                self.types(body);
                TagId::VOID
            }

            ExprKind::Return { func, value } => {
                let ret = match self.cx.tags.get(self.cx.symbols.func(func).tag) {
                    TypeTag::Func { ret, .. } => *ret,
                    _ => TagId::VOID,
                };
                match value {
                    Some(value) => {
                        let value_tag = self.types(value);
                        self.check_compat(ret, value_tag, ctx, "return value");
                    }
                    None => {
                        if ret != TagId::VOID {
                            let rendered = self.name(self.cx.symbols.func(func).name);
                            self.type_error(
                                ctx,
                                format!("'return' without a value in non-void function '{rendered}'"),
                            );
                        }
                    }
                }
                TagId::VOID
            }

            ExprKind::Extern(_) => TagId::VOID,

            ExprKind::Func { body, .. } => {
                self.types(body);
                TagId::VOID
            }

            ExprKind::Atomic(body) => {
                self.types(body);
                TagId::VOID
            }
        };
        self.set_tag(id, tag)
    }

    fn member_access(&mut self, ctx: Ctx, value_tag: TagId, name: StringId, is_method: bool) -> TagId {
        let looked_up = match self.cx.tags.get(value_tag) {
            TypeTag::Struct(st) => Some((st.name, st.member(name).map(|m| m.tag), st.method(name).map(|m| m.func))),
            _ => None,
        };
        let Some((struct_name, member_tag, method_func)) = looked_up else {
            return self.type_error(
                ctx,
                format!("attempted to access members in non-struct type '{}'", self.display(value_tag)),
            );
        };

        if let Some(member_tag) = member_tag {
            if is_method {
                return self.type_error(
                    ctx,
                    format!(
                        "attempted to use ':' to access member value '{}'; use '.' instead",
                        self.name(name)
                    ),
                );
            }
            return member_tag;
        }
        if let Some(func) = method_func {
            let method_tag = self.cx.symbols.func(func).tag;
            if !is_method {
                return self.type_error(
                    ctx,
                    format!(
                        "attempted to use '.' to access member function '{}'; use ':' instead",
                        self.name(name)
                    ),
                );
            }
            return method_tag;
        }
        self.type_error(
            ctx,
            format!(
                "attempted to access non-existent member '{}' in struct {}",
                self.name(name),
                self.name(struct_name)
            ),
        )
    }

    fn binary(&mut self, ctx: Ctx, op: Token, lhs: ExprId, rhs: ExprId) -> TagId {
        if op == Token::Assign {
            let rhs_tag = self.types(rhs);

            // First assignment into an unannotated declaration infers the
            // declaration's type from the right-hand side.
            let lhs_decl = match &self.cx.arena.get(lhs).kind {
                ExprKind::Var { decl, .. } => *decl,
                _ => None,
            };
            if let Some(decl) = lhs_decl
                && self.cx.symbols.var(decl).tag == TagId::UNKNOWN
            {
                if rhs_tag == TagId::UNKNOWN {
                    self.type_error(ctx, "cannot infer a type from this assignment".to_owned());
                } else {
                    self.cx.symbols.var_mut(decl).tag = rhs_tag;
                }
            }

            let lhs_tag = self.types(lhs);
            self.check_compat(lhs_tag, rhs_tag, ctx, "assignment");
            return TagId::VOID;
        }

        let lhs_tag = self.types(lhs);
        let rhs_tag = self.types(rhs);
        match op {
            Token::Equals | Token::NotEqual => {
                if !self.cx.tags.compare(lhs_tag, rhs_tag).is_ok() {
                    self.type_error(
                        ctx,
                        format!(
                            "cannot compare '{}' with '{}'",
                            self.display(lhs_tag),
                            self.display(rhs_tag)
                        ),
                    );
                }
                TagId::BOOL
            }
            Token::Land | Token::Lor => {
                self.check_compat(TagId::BOOL, lhs_tag, ctx, "logical operand");
                self.check_compat(TagId::BOOL, rhs_tag, ctx, "logical operand");
                TagId::BOOL
            }
            Token::Lt | Token::Gt | Token::Lte | Token::Gte => {
                self.check_compat(TagId::NUMBER, lhs_tag, ctx, "comparison operand");
                self.check_compat(TagId::NUMBER, rhs_tag, ctx, "comparison operand");
                TagId::BOOL
            }
            _ => {
                let what = format!("operand of '{op}'");
                self.check_compat(TagId::NUMBER, lhs_tag, ctx, &what);
                self.check_compat(TagId::NUMBER, rhs_tag, ctx, &what);
                TagId::NUMBER
            }
        }
    }

    fn call(&mut self, ctx: Ctx, func: ExprId, args: &[ExprId]) -> TagId {
        let func_tag = self.types(func);

        if matches!(self.cx.tags.get(func_tag), TypeTag::Dynamic) {
            self.cx.warn(
                Warning::DynamicCall,
                ctx,
                "calling a 'dynamic' value skips argument checking".to_owned(),
            );
            for &arg in args {
                self.types(arg);
            }
            return TagId::DYNAMIC;
        }

        let signature = match self.cx.tags.get(func_tag) {
            TypeTag::Func { args, ret } => Some((args.clone(), *ret)),
            _ => None,
        };
        let Some((expected, ret)) = signature else {
            for &arg in args {
                self.types(arg);
            }
            return self.type_error(
                ctx,
                format!("attempted to call a value of type '{}'", self.display(func_tag)),
            );
        };

        if args.len() != expected.len() {
            self.type_error(
                ctx,
                format!("call expects {} argument(s) but received {}", expected.len(), args.len()),
            );
        }
        for (i, &arg) in args.iter().enumerate() {
            let arg_tag = self.types(arg);
            if let Some(&expected_tag) = expected.get(i) {
                let what = format!("argument {}", i + 1);
                self.check_compat(expected_tag, arg_tag, ctx, &what);
            }
        }
        ret
    }
}

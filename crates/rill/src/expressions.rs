//! The expression tree.
//!
//! Expression nodes live in an index-keyed arena owned by the compile state.
//! Children are referenced by [`ExprId`], so a "shallow copy" (the duplicated
//! receiver of a method call) is simply the same id appearing twice; the
//! arena owns every node exactly once and drops them all together.

use crate::{
    intern::{NumberId, StringId},
    lex::Token,
    symbols::{FuncId, VarId},
    types::TagId,
};

/// Index of an expression node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub(crate) fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Source location of an expression: file label (interned) and 1-based line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ctx {
    pub file: StringId,
    pub line: u32,
}

/// One node of the expression tree.
///
/// `tag` is `None` until the type resolver assigns it; the resolver is
/// write-through, so a node reached twice (shallow-copied receivers) keeps
/// its first assignment.
#[derive(Debug, Clone)]
pub(crate) struct Expr {
    pub ctx: Ctx,
    pub tag: Option<TagId>,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub(crate) enum ExprKind {
    Null,
    Bool(bool),
    Char(u8),
    Number(NumberId),
    Str(StringId),
    /// Identifier reference; `decl` is filled by the parser for declarations
    /// and by the symbol resolver for everything else. A name that resolves
    /// to a function instead stays `decl: None` and is handled at emit time.
    Var {
        name: StringId,
        decl: Option<VarId>,
    },
    /// `value.name` — data member access.
    Dot {
        value: ExprId,
        name: StringId,
    },
    /// `value:name` — method access.
    Colon {
        value: ExprId,
        name: StringId,
    },
    Index {
        array: ExprId,
        index: ExprId,
    },
    /// `[e1, ..]`; `element` is set for empty literals (`[] : T`) at parse
    /// time and inferred for the rest during type resolution.
    ArrayLiteral {
        element: Option<TagId>,
        values: Vec<ExprId>,
    },
    /// A `struct`/`union` declaration; member functions are emitted when the
    /// declaration is compiled.
    StructDecl {
        tag: TagId,
    },
    /// `new T { field = expr, .. }`; each initializer is an assignment with
    /// an identifier on the left.
    StructNew {
        tag: TagId,
        init: Vec<ExprId>,
    },
    Len(ExprId),
    Write(ExprId),
    Read,
    Unary {
        op: Token,
        rhs: ExprId,
    },
    Binary {
        op: Token,
        lhs: ExprId,
        rhs: ExprId,
    },
    Call {
        func: ExprId,
        args: Vec<ExprId>,
    },
    Paren(ExprId),
    Block(Vec<ExprId>),
    If {
        cond: ExprId,
        body: ExprId,
        alt: Option<ExprId>,
    },
    While {
        cond: ExprId,
        body: ExprId,
    },
    For {
        init: ExprId,
        cond: ExprId,
        step: ExprId,
        body: ExprId,
    },
    Return {
        func: FuncId,
        value: Option<ExprId>,
    },
    Extern(FuncId),
    Func {
        decl: FuncId,
        body: ExprId,
    },
    /// `atomic expr` — the body executes without yielding to a cycle quota.
    Atomic(ExprId),
}

/// Arena of all expression nodes in the process.
#[derive(Debug, Default)]
pub(crate) struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn alloc(&mut self, ctx: Ctx, kind: ExprKind) -> ExprId {
        let id = ExprId::from_index(u32::try_from(self.nodes.len()).expect("expression arena exceeds u32"));
        self.nodes.push(Expr { ctx, tag: None, kind });
        id
    }

    #[inline]
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.nodes[id.index()]
    }

    pub fn contains(&self, id: ExprId) -> bool {
        id.index() < self.nodes.len()
    }
}

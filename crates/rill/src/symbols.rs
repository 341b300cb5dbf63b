//! Variable and function declarations, scopes, and lookup order.
//!
//! The parser declares symbols eagerly as a side effect of parsing; the
//! resolver only fills in references that were still unknown. Scopes are
//! integer-nested: leaving a scope decrements the counter, which hides that
//! scope's locals from lookup while their stack offsets stay valid for the
//! VM.

use crate::{intern::StringId, module::ModuleId, types::TagId};

/// Index of a variable declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(u32);

impl VarId {
    #[inline]
    pub(crate) fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a function declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);

impl FuncId {
    #[inline]
    pub(crate) fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub(crate) struct VarDecl {
    pub name: StringId,
    pub tag: TagId,
    /// Owning function; `None` for globals.
    pub func: Option<FuncId>,
    pub scope: u32,
    /// Frame-relative slot for locals (>= 0) and arguments (< 0), or the
    /// process-wide global slot.
    pub index: i32,
    pub module: ModuleId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FuncKind {
    Function,
    Extern,
}

#[derive(Debug, Clone)]
pub(crate) struct FuncDecl {
    pub name: StringId,
    pub kind: FuncKind,
    pub parent: Option<FuncId>,
    /// The function's `Func` type tag; the return type is patched in once the
    /// signature has been parsed.
    pub tag: TagId,
    pub locals: Vec<VarId>,
    pub args: Vec<VarId>,
    /// Script function table index, or the extern registry index.
    pub index: usize,
    pub has_return: bool,
}

/// All declarations in the process, plus the parser's scope cursor.
#[derive(Debug, Default)]
pub(crate) struct Symbols {
    vars: Vec<VarDecl>,
    funcs: Vec<FuncDecl>,
    /// Global variables across modules, in definition order; a global's
    /// `index` is its position here.
    globals: Vec<VarId>,
    /// Count of script (non-extern) functions, which is also the size of the
    /// function-pc table.
    num_functions: usize,
    pub scope: u32,
    pub cur_func: Option<FuncId>,
}

impl Symbols {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id.index()]
    }

    #[inline]
    pub fn var_mut(&mut self, id: VarId) -> &mut VarDecl {
        &mut self.vars[id.index()]
    }

    #[inline]
    pub fn func(&self, id: FuncId) -> &FuncDecl {
        &self.funcs[id.index()]
    }

    #[inline]
    pub fn func_mut(&mut self, id: FuncId) -> &mut FuncDecl {
        &mut self.funcs[id.index()]
    }

    pub fn num_globals(&self) -> usize {
        self.globals.len()
    }

    pub fn num_functions(&self) -> usize {
        self.num_functions
    }

    pub fn enter_scope(&mut self) {
        self.scope += 1;
    }

    pub fn exit_scope(&mut self) {
        self.scope -= 1;
    }

    pub fn enter_function(&mut self, func: FuncId) {
        self.cur_func = Some(func);
    }

    pub fn exit_function(&mut self) {
        let cur = self.cur_func.expect("exited a function the parser never entered");
        self.cur_func = self.funcs[cur.index()].parent;
    }

    /// Declares a local in the current function, or a global otherwise.
    ///
    /// Returns `Err(existing)` when a global of the same name already exists
    /// in the same module; the caller reports the symbol error.
    pub fn declare_variable(&mut self, name: StringId, tag: TagId, module: ModuleId) -> Result<VarId, VarId> {
        if let Some(func) = self.cur_func {
            let index = i32::try_from(self.funcs[func.index()].locals.len()).expect("too many locals");
            let id = self.push_var(VarDecl {
                name,
                tag,
                func: Some(func),
                scope: self.scope,
                index,
                module,
            });
            self.funcs[func.index()].locals.push(id);
            return Ok(id);
        }

        if let Some(&existing) = self
            .globals
            .iter()
            .find(|&&g| self.vars[g.index()].name == name && self.vars[g.index()].module == module)
        {
            return Err(existing);
        }

        let index = i32::try_from(self.globals.len()).expect("too many globals");
        let id = self.push_var(VarDecl {
            name,
            tag,
            func: None,
            scope: 0,
            index,
            module,
        });
        self.globals.push(id);
        Ok(id)
    }

    /// Declares an argument of the current function with a negative offset:
    /// argument `j` of `n` lives at frame slot `-(j + 1)`.
    pub fn declare_argument(&mut self, name: StringId, tag: TagId, module: ModuleId) -> VarId {
        let func = self.cur_func.expect("argument declared outside of a function");
        let index = -(i32::try_from(self.funcs[func.index()].args.len()).expect("too many arguments") + 1);
        let id = self.push_var(VarDecl {
            name,
            tag,
            func: Some(func),
            scope: self.scope,
            index,
            module,
        });
        self.funcs[func.index()].args.push(id);
        id
    }

    /// Searches visible locals (by decreasing scope), then arguments, then
    /// globals. Globals of the referencing module win over other modules'.
    pub fn reference_variable(&self, name: StringId, module: ModuleId) -> Option<VarId> {
        if let Some(func) = self.cur_func {
            let decl = &self.funcs[func.index()];
            for scope in (0..=self.scope).rev() {
                for &local in &decl.locals {
                    let var = &self.vars[local.index()];
                    if var.scope == scope && var.name == name {
                        return Some(local);
                    }
                }
            }
            for &arg in &decl.args {
                if self.vars[arg.index()].name == name {
                    return Some(arg);
                }
            }
        }

        let mut fallback = None;
        for &global in &self.globals {
            let var = &self.vars[global.index()];
            if var.name == name {
                if var.module == module {
                    return Some(global);
                }
                fallback.get_or_insert(global);
            }
        }
        fallback
    }

    pub fn declare_function(&mut self, name: StringId, tag: TagId) -> FuncId {
        let id = FuncId::from_index(u32::try_from(self.funcs.len()).expect("function arena exceeds u32"));
        self.funcs.push(FuncDecl {
            name,
            kind: FuncKind::Function,
            parent: self.cur_func,
            tag,
            locals: Vec::new(),
            args: Vec::new(),
            index: self.num_functions,
            has_return: false,
        });
        self.num_functions += 1;
        id
    }

    /// Declares an extern binding; `extern_index` is its registry slot.
    pub fn declare_extern(&mut self, name: StringId, tag: TagId, extern_index: usize) -> FuncId {
        let id = FuncId::from_index(u32::try_from(self.funcs.len()).expect("function arena exceeds u32"));
        self.funcs.push(FuncDecl {
            name,
            kind: FuncKind::Extern,
            parent: self.cur_func,
            tag,
            locals: Vec::new(),
            args: Vec::new(),
            index: extern_index,
            has_return: false,
        });
        id
    }

    pub fn reference_function(&self, name: StringId) -> Option<FuncId> {
        (0..self.funcs.len())
            .map(|i| FuncId::from_index(u32::try_from(i).expect("function index")))
            .find(|&id| self.funcs[id.index()].name == name)
    }

    /// Looks up a script function by its function-table index.
    pub fn function_by_table_index(&self, index: usize) -> Option<FuncId> {
        (0..self.funcs.len())
            .map(|i| FuncId::from_index(u32::try_from(i).expect("function index")))
            .find(|&id| {
                let f = &self.funcs[id.index()];
                f.kind == FuncKind::Function && f.index == index
            })
    }

    fn push_var(&mut self, decl: VarDecl) -> VarId {
        let id = VarId::from_index(u32::try_from(self.vars.len()).expect("variable arena exceeds u32"));
        self.vars.push(decl);
        id
    }
}

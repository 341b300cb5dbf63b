//! Static type tags and the `using`-based struct composition rules.
//!
//! Tags live in one process-wide arena so that nominal struct types with the
//! same name resolve to the same [`TagId`] everywhere. Builtin tags are
//! pre-seeded at fixed indices; function and array tags are allocated on
//! demand and compared structurally.

use ahash::{AHashMap, AHashSet};

use crate::{
    error::{CompileError, CompileErrorKind, CompileResult, Warning},
    expressions::{Ctx, ExprId},
    intern::{Interns, StringId},
    symbols::FuncId,
};

/// Index of a type tag in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagId(u32);

impl TagId {
    pub(crate) const VOID: Self = Self(0);
    pub(crate) const DYNAMIC: Self = Self(1);
    pub(crate) const BOOL: Self = Self(2);
    pub(crate) const CHAR: Self = Self(3);
    pub(crate) const NUMBER: Self = Self(4);
    pub(crate) const STRING: Self = Self(5);
    pub(crate) const NATIVE: Self = Self(6);
    /// Temporary tag for unannotated locals awaiting inference.
    pub(crate) const UNKNOWN: Self = Self(7);

    #[inline]
    pub(crate) fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A data member of a struct or union.
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub name: StringId,
    /// Layout index; always 0 inside unions.
    pub index: usize,
    pub tag: TagId,
    /// Default-value expression, shared by id when flattened through `using`.
    pub default_value: Option<ExprId>,
}

/// A member function, stored as the free function the parser lowered it to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Method {
    pub name: StringId,
    pub func: FuncId,
    /// The lowered function's body; emitted when the owning declaration is
    /// compiled.
    pub body: ExprId,
}

#[derive(Debug, Clone)]
pub(crate) struct StructTag {
    pub name: StringId,
    pub is_union: bool,
    pub members: Vec<Member>,
    pub usings: Vec<TagId>,
    pub methods: Vec<Method>,
    /// Instance slot count; 1 for unions, member count after finalization
    /// otherwise.
    pub size: usize,
    /// False while the tag is only a forward reference from a type position.
    pub defined: bool,
    /// True once every `using` composite has been flattened into `members`.
    pub finalized: bool,
    /// Location of the first mention, for undefined-struct diagnostics.
    pub ctx: Ctx,
}

impl StructTag {
    pub fn member(&self, name: StringId) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn method(&self, name: StringId) -> Option<Method> {
        self.methods.iter().find(|m| m.name == name).copied()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum TypeTag {
    Void,
    Dynamic,
    Bool,
    Char,
    Number,
    String,
    Native,
    /// Placeholder for inference on unannotated locals; must be resolved
    /// before compatibility checks.
    Unknown,
    Func { args: Vec<TagId>, ret: TagId },
    Array { element: TagId },
    Struct(StructTag),
}

/// Result of a compatibility check between two tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Compat {
    Ok,
    /// Compatible, but the resolver should surface a warning.
    OkWarn(Warning),
    Fail,
}

impl Compat {
    pub fn is_ok(self) -> bool {
        !matches!(self, Self::Fail)
    }
}

/// Process-wide tag arena plus the nominal struct name table.
#[derive(Debug)]
pub(crate) struct Tags {
    tags: Vec<TypeTag>,
    struct_names: AHashMap<StringId, TagId>,
}

impl Tags {
    pub fn new() -> Self {
        Self {
            tags: vec![
                TypeTag::Void,
                TypeTag::Dynamic,
                TypeTag::Bool,
                TypeTag::Char,
                TypeTag::Number,
                TypeTag::String,
                TypeTag::Native,
                TypeTag::Unknown,
            ],
            struct_names: AHashMap::new(),
        }
    }

    pub fn alloc(&mut self, tag: TypeTag) -> TagId {
        let id = TagId::from_index(u32::try_from(self.tags.len()).expect("tag arena exceeds u32"));
        self.tags.push(tag);
        id
    }

    #[inline]
    pub fn get(&self, id: TagId) -> &TypeTag {
        &self.tags[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: TagId) -> &mut TypeTag {
        &mut self.tags[id.index()]
    }

    /// Resolves a builtin type name from a type position.
    pub fn builtin_by_name(name: &str) -> Option<TagId> {
        let id = match name {
            "void" => TagId::VOID,
            "dynamic" => TagId::DYNAMIC,
            "bool" => TagId::BOOL,
            "char" => TagId::CHAR,
            "number" => TagId::NUMBER,
            "string" => TagId::STRING,
            "native" => TagId::NATIVE,
            _ => return None,
        };
        Some(id)
    }

    pub fn struct_by_name(&self, name: StringId) -> Option<TagId> {
        self.struct_names.get(&name).copied()
    }

    /// Returns the tag for a struct name, creating an undefined placeholder
    /// on first mention. Later `struct`/`union` declarations must define it.
    pub fn struct_placeholder(&mut self, name: StringId, ctx: Ctx) -> TagId {
        if let Some(id) = self.struct_by_name(name) {
            return id;
        }
        let id = self.alloc(TypeTag::Struct(StructTag {
            name,
            is_union: false,
            members: Vec::new(),
            usings: Vec::new(),
            methods: Vec::new(),
            size: 0,
            defined: false,
            finalized: false,
            ctx,
        }));
        self.struct_names.insert(name, id);
        id
    }

    /// Fails compilation if any struct tag is still only a forward reference.
    pub fn check_all_defined(&self, interns: &Interns, errors: &mut Vec<CompileError>) {
        for tag in &self.tags {
            if let TypeTag::Struct(st) = tag
                && !st.defined
            {
                errors.push(CompileError::new(
                    CompileErrorKind::Type,
                    interns.get_str(st.ctx.file),
                    st.ctx.line,
                    format!("use of undefined struct '{}'", interns.get_str(st.name)),
                ));
            }
        }
    }

    /// Flattens every `using` clause into the owning struct's member list.
    ///
    /// For each `using T`, copies of `T`'s members are appended with their
    /// layout index offset by the current size (index 0 in unions), and the
    /// size grows by `T`'s size. Default-value expressions are shared by id.
    pub fn finalize_all(&mut self, interns: &Interns) -> CompileResult<()> {
        let mut in_progress = AHashSet::new();
        for index in 0..self.tags.len() {
            self.finalize_struct(TagId::from_index(u32::try_from(index).expect("tag index")), interns, &mut in_progress)?;
        }
        Ok(())
    }

    fn finalize_struct(&mut self, id: TagId, interns: &Interns, in_progress: &mut AHashSet<u32>) -> CompileResult<()> {
        let TypeTag::Struct(st) = self.get(id) else {
            return Ok(());
        };
        if st.finalized {
            return Ok(());
        }
        if !in_progress.insert(id.0) {
            return Err(CompileError::new(
                CompileErrorKind::Type,
                interns.get_str(st.ctx.file),
                st.ctx.line,
                format!("recursive 'using' chain through struct '{}'", interns.get_str(st.name)),
            ));
        }

        let usings = st.usings.clone();
        for used in usings {
            self.finalize_struct(used, interns, in_progress)?;
            let TypeTag::Struct(used_tag) = self.get(used) else {
                continue;
            };
            let copied: Vec<Member> = used_tag.members.clone();
            let used_size = used_tag.size;

            let TypeTag::Struct(st) = self.get_mut(id) else {
                unreachable!("tag changed variant during finalization");
            };
            if st.is_union {
                for member in copied {
                    st.members.push(Member { index: 0, ..member });
                }
            } else {
                let base = st.size;
                for member in copied {
                    st.members.push(Member {
                        index: base + member.index,
                        ..member
                    });
                }
                st.size = base + used_size;
            }
        }

        in_progress.remove(&id.0);
        let TypeTag::Struct(st) = self.get_mut(id) else {
            unreachable!("tag changed variant during finalization");
        };
        st.finalized = true;
        Ok(())
    }

    /// Compatibility between two tags.
    ///
    /// `dynamic` matches every non-void tag; `void` matches only itself;
    /// function tags compare pointwise; array tags compare by element with a
    /// dynamic/specific mismatch downgraded to a warning; struct tags are
    /// nominal and compare by name.
    pub fn compare(&self, a: TagId, b: TagId) -> Compat {
        if a == b {
            return Compat::Ok;
        }
        match (self.get(a), self.get(b)) {
            (TypeTag::Void, TypeTag::Void) => Compat::Ok,
            (TypeTag::Void, _) | (_, TypeTag::Void) => Compat::Fail,
            (TypeTag::Dynamic, _) | (_, TypeTag::Dynamic) => Compat::Ok,
            (TypeTag::Unknown, _) | (_, TypeTag::Unknown) => Compat::Fail,
            (TypeTag::Func { args: aa, ret: ar }, TypeTag::Func { args: ba, ret: br }) => {
                if aa.len() != ba.len() || !self.compare(*ar, *br).is_ok() {
                    return Compat::Fail;
                }
                for (&x, &y) in aa.iter().zip(ba) {
                    if !self.compare(x, y).is_ok() {
                        return Compat::Fail;
                    }
                }
                Compat::Ok
            }
            (TypeTag::Array { element: ae }, TypeTag::Array { element: be }) => {
                let a_dyn = matches!(self.get(*ae), TypeTag::Dynamic);
                let b_dyn = matches!(self.get(*be), TypeTag::Dynamic);
                if a_dyn != b_dyn {
                    return Compat::OkWarn(Warning::DynamicArrayAssign);
                }
                match self.compare(*ae, *be) {
                    Compat::Fail => Compat::Fail,
                    _ => Compat::Ok,
                }
            }
            (TypeTag::Struct(sa), TypeTag::Struct(sb)) => {
                if sa.name == sb.name {
                    Compat::Ok
                } else {
                    Compat::Fail
                }
            }
            (x, y) => {
                if std::mem::discriminant(x) == std::mem::discriminant(y) {
                    Compat::Ok
                } else {
                    Compat::Fail
                }
            }
        }
    }

    /// Human-readable tag name for diagnostics.
    pub fn display(&self, id: TagId, interns: &Interns) -> String {
        match self.get(id) {
            TypeTag::Void => "void".to_owned(),
            TypeTag::Dynamic => "dynamic".to_owned(),
            TypeTag::Bool => "bool".to_owned(),
            TypeTag::Char => "char".to_owned(),
            TypeTag::Number => "number".to_owned(),
            TypeTag::String => "string".to_owned(),
            TypeTag::Native => "native".to_owned(),
            TypeTag::Unknown => "<unknown>".to_owned(),
            TypeTag::Func { args, ret } => {
                let mut out = String::from("func(");
                for (i, &arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.display(arg, interns));
                }
                out.push_str(") - ");
                out.push_str(&self.display(*ret, interns));
                out
            }
            TypeTag::Array { element } => format!("array - {}", self.display(*element, interns)),
            TypeTag::Struct(st) => interns.get_str(st.name).to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(interns: &mut Interns) -> Ctx {
        Ctx {
            file: interns.string("test.rl"),
            line: 1,
        }
    }

    #[test]
    fn dynamic_matches_everything_but_void() {
        let tags = Tags::new();
        assert_eq!(tags.compare(TagId::DYNAMIC, TagId::NUMBER), Compat::Ok);
        assert_eq!(tags.compare(TagId::STRING, TagId::DYNAMIC), Compat::Ok);
        assert_eq!(tags.compare(TagId::DYNAMIC, TagId::VOID), Compat::Fail);
    }

    #[test]
    fn array_dynamic_vs_specific_warns() {
        let mut tags = Tags::new();
        let arr_num = tags.alloc(TypeTag::Array { element: TagId::NUMBER });
        let arr_dyn = tags.alloc(TypeTag::Array { element: TagId::DYNAMIC });
        assert_eq!(tags.compare(arr_num, arr_dyn), Compat::OkWarn(Warning::DynamicArrayAssign));
        assert_eq!(tags.compare(arr_num, arr_num), Compat::Ok);
    }

    #[test]
    fn structs_are_nominal() {
        let mut interns = Interns::new();
        let here = ctx(&mut interns);
        let mut tags = Tags::new();
        let a = interns.string("A");
        let b = interns.string("B");
        let ta = tags.struct_placeholder(a, here);
        let tb = tags.struct_placeholder(b, here);
        assert_eq!(tags.struct_placeholder(a, here), ta);
        assert_eq!(tags.compare(ta, tb), Compat::Fail);
        assert_eq!(tags.compare(ta, ta), Compat::Ok);
    }

    #[test]
    fn using_flattens_with_offset_indices() {
        let mut interns = Interns::new();
        let here = ctx(&mut interns);
        let mut tags = Tags::new();
        let point = tags.struct_placeholder(interns.string("Point"), here);
        let colored = tags.struct_placeholder(interns.string("Colored"), here);

        let (x, y, c) = (interns.string("x"), interns.string("y"), interns.string("c"));
        {
            let TypeTag::Struct(st) = tags.get_mut(point) else { unreachable!() };
            st.defined = true;
            st.members = vec![
                Member { name: x, index: 0, tag: TagId::NUMBER, default_value: None },
                Member { name: y, index: 1, tag: TagId::NUMBER, default_value: None },
            ];
            st.size = 2;
        }
        {
            let TypeTag::Struct(st) = tags.get_mut(colored) else { unreachable!() };
            st.defined = true;
            st.members = vec![Member { name: c, index: 0, tag: TagId::NUMBER, default_value: None }];
            st.size = 1;
            st.usings = vec![point];
        }

        tags.finalize_all(&interns).unwrap();
        let TypeTag::Struct(st) = tags.get(colored) else { unreachable!() };
        assert!(st.finalized);
        assert_eq!(st.size, 3);
        assert_eq!(st.member(x).unwrap().index, 1);
        assert_eq!(st.member(y).unwrap().index, 2);
        assert_eq!(st.member(c).unwrap().index, 0);
    }

    #[test]
    fn recursive_using_is_an_error() {
        let mut interns = Interns::new();
        let here = ctx(&mut interns);
        let mut tags = Tags::new();
        let a = tags.struct_placeholder(interns.string("A"), here);
        let b = tags.struct_placeholder(interns.string("B"), here);
        for (id, used) in [(a, b), (b, a)] {
            let TypeTag::Struct(st) = tags.get_mut(id) else { unreachable!() };
            st.defined = true;
            st.usings = vec![used];
        }
        assert!(tags.finalize_all(&interns).is_err());
    }
}

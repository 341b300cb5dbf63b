//! The module registry and the source-provider seam.
//!
//! A module is a named unit of source, created on first mention (explicit
//! add or `#import`) and deduplicated by local path. The registry never
//! re-parses an already-loaded path. File access goes through
//! [`ModuleLoader`] so hosts and tests can supply sources without a
//! filesystem.

use std::path::{Component, PathBuf};

use ahash::AHashMap;

use crate::{
    expressions::ExprId,
    symbols::{FuncId, VarId},
};

/// Index of a module in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u32);

impl ModuleId {
    #[inline]
    pub(crate) fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub(crate) struct Module {
    /// Path as imported; the registry's dedup key.
    pub local_path: String,
    pub name: String,
    pub source: String,
    pub parsed: bool,
    pub compiled: bool,
    /// Cycle guard while the compile-time driver recurses into references.
    pub compiling: bool,
    /// Modules referenced via `#import`, in reference order.
    pub refs: Vec<ModuleId>,
    /// Top-level expressions, in source order.
    pub ast: Vec<ExprId>,
    /// `#on_compile` expressions, in source order.
    pub compile_blocks: Vec<ExprId>,
    pub globals: Vec<VarId>,
    pub funcs: Vec<FuncId>,
    /// Code range of this module's top-level emission, filled at emit time.
    pub start_pc: usize,
    pub end_pc: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Modules {
    list: Vec<Module>,
}

impl Modules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module, returning the existing index when the path is already
    /// registered. The bool is true when a new module was created.
    pub fn add(&mut self, local_path: &str, name: &str) -> (ModuleId, bool) {
        if let Some(existing) = self.find_by_path(local_path) {
            return (existing, false);
        }
        let id = ModuleId::from_index(u32::try_from(self.list.len()).expect("module registry exceeds u32"));
        self.list.push(Module {
            local_path: local_path.to_owned(),
            name: name.to_owned(),
            source: String::new(),
            parsed: false,
            compiled: false,
            compiling: false,
            refs: Vec::new(),
            ast: Vec::new(),
            compile_blocks: Vec::new(),
            globals: Vec::new(),
            funcs: Vec::new(),
            start_pc: 0,
            end_pc: 0,
        });
        (id, true)
    }

    pub fn find_by_path(&self, local_path: &str) -> Option<ModuleId> {
        self.list
            .iter()
            .position(|m| m.local_path == local_path)
            .map(|i| ModuleId::from_index(u32::try_from(i).expect("module index")))
    }

    #[inline]
    pub fn get(&self, id: ModuleId) -> &Module {
        &self.list[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.list[id.index()]
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + use<> {
        (0..self.list.len()).map(|i| ModuleId::from_index(u32::try_from(i).expect("module index")))
    }

    /// First module with source present but not yet parsed from an import.
    pub fn next_unparsed(&self) -> Option<ModuleId> {
        self.ids().find(|&id| !self.get(id).parsed)
    }
}

/// Resolves an `#import` path relative to the importing module's directory
/// and normalizes `.`/`..` components lexically.
pub(crate) fn resolve_import(importer_path: &str, import: &str) -> String {
    let mut base = PathBuf::from(importer_path);
    base.pop();
    base.push(import);

    let mut normalized = PathBuf::new();
    for component in base.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other),
        }
    }
    normalized.to_string_lossy().into_owned()
}

/// Abstract source provider for module loading.
///
/// The pipeline only needs "path in, source text out"; the reference host
/// reads files, tests supply an in-memory map.
pub trait ModuleLoader {
    fn load(&mut self, path: &str) -> std::io::Result<String>;
}

/// Loader backed by the filesystem.
#[derive(Debug, Default)]
pub struct FsLoader;

impl ModuleLoader for FsLoader {
    fn load(&mut self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// In-memory loader for tests and embedded hosts.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    files: AHashMap<String, String>,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.files.insert(path.into(), source.into());
    }
}

impl ModuleLoader for MemoryLoader {
    fn load(&mut self, path: &str) -> std::io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("no module source for '{path}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_dedupes_by_path() {
        let mut modules = Modules::new();
        let (a, added_a) = modules.add("dir/a.rl", "a");
        let (b, added_b) = modules.add("dir/a.rl", "a");
        assert!(added_a);
        assert!(!added_b);
        assert_eq!(a, b);
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn import_paths_resolve_relative_to_importer() {
        assert_eq!(resolve_import("dir/a.rl", "b.rl"), "dir/b.rl");
        assert_eq!(resolve_import("dir/a.rl", "../c.rl"), "c.rl");
        assert_eq!(resolve_import("a.rl", "sub/d.rl"), "sub/d.rl");
    }
}

//! Frozen declaration table
//!
//! Immutable after population, so lookups are plain map reads and the table
//! is shared between codegen workers behind an `Arc`.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use super::path::normalize_path;
use super::populator::{DeclarationPopulator, PopulateOptions};
use crate::errors::DeclarationError;
use crate::features::declarations::domain::{FileEntry, FunctionEntry, TypeEntry, USER_INITIALIZER};
use crate::shared::models::{QualifiedName, Routine, SourceUnit};

#[derive(Debug)]
pub struct DeclarationTable {
    /// Caller order
    files: Vec<Arc<FileEntry>>,
    files_by_path: FxHashMap<String, Arc<FileEntry>>,
    /// Unconditional declarations only
    functions: FxHashMap<String, Arc<FunctionEntry>>,
    types: FxHashMap<String, Arc<TypeEntry>>,
    base_directory: Option<String>,
}

impl DeclarationTable {
    pub(crate) fn new(
        files: Vec<Arc<FileEntry>>,
        files_by_path: FxHashMap<String, Arc<FileEntry>>,
        functions: FxHashMap<String, Arc<FunctionEntry>>,
        types: FxHashMap<String, Arc<TypeEntry>>,
        base_directory: Option<String>,
    ) -> Self {
        Self {
            files,
            files_by_path,
            functions,
            types,
            base_directory,
        }
    }

    /// Populate a table from all units of a compilation
    pub fn populate(
        units: Vec<SourceUnit>,
        options: PopulateOptions,
    ) -> Result<Self, DeclarationError> {
        DeclarationPopulator::new(options).populate(units)
    }

    /// File by path; normalized the same way as at population time
    pub fn file(&self, path: &str) -> Option<&Arc<FileEntry>> {
        let key = normalize_path(path, self.base_directory.as_deref());
        self.files_by_path.get(&key)
    }

    /// First unit supplied by the caller: the script entry point
    pub fn first_script(&self) -> Option<&Arc<FileEntry>> {
        self.files.first()
    }

    pub fn files(&self) -> &[Arc<FileEntry>] {
        &self.files
    }

    /// Unconditionally declared function
    pub fn function(&self, name: &str) -> Option<&Arc<FunctionEntry>> {
        self.functions.get(QualifiedName::new(name).key())
    }

    /// Unconditionally declared type
    pub fn type_entry(&self, name: &str) -> Option<&Arc<TypeEntry>> {
        self.types.get(QualifiedName::new(name).key())
    }

    /// All functions in file order, conditional ones included
    pub fn functions(&self) -> impl Iterator<Item = &Arc<FunctionEntry>> {
        self.files.iter().flat_map(|f| f.functions())
    }

    /// All types in file order, conditional ones included
    pub fn types(&self) -> impl Iterator<Item = &Arc<TypeEntry>> {
        self.files.iter().flat_map(|f| f.types())
    }

    /// Whether any declaration, conditional or not, introduces the type
    pub fn declares_type(&self, name: &str) -> bool {
        self.type_entry(name).is_some() || self.types().any(|t| t.name.is(name))
    }

    /// `entry` followed by its base types, nearest first.
    ///
    /// Bases resolve through unconditional declarations; the walk stops at a
    /// missing base or a cycle.
    pub fn base_chain(&self, entry: &Arc<TypeEntry>) -> Vec<Arc<TypeEntry>> {
        let mut chain = vec![Arc::clone(entry)];
        let mut seen = FxHashSet::default();
        seen.insert(entry.name.key().to_string());

        let mut current = Arc::clone(entry);
        while let Some(base) = current.base.as_ref() {
            let Some(next) = self.type_entry(base.as_str()) else {
                break;
            };
            if !seen.insert(next.name.key().to_string()) {
                warn!("cyclic inheritance through {}", next.name);
                break;
            }
            chain.push(Arc::clone(next));
            current = Arc::clone(next);
        }
        chain
    }

    /// Method `name` of type `ty` or the nearest base declaring it
    pub fn resolve_method(&self, ty: &str, name: &str) -> Option<(Arc<TypeEntry>, Arc<Routine>)> {
        let entry = self.type_entry(ty)?;
        self.base_chain(entry)
            .into_iter()
            .find_map(|t| t.method(name).cloned().map(|m| (Arc::clone(&t), m)))
    }

    /// User initializer run for instances of `entry`: its own, else the nearest
    /// base type's.
    pub fn resolve_initializer(&self, entry: &Arc<TypeEntry>) -> Option<(Arc<TypeEntry>, Arc<Routine>)> {
        self.base_chain(entry)
            .into_iter()
            .find_map(|t| t.method(USER_INITIALIZER).cloned().map(|m| (Arc::clone(&t), m)))
    }

    /// Type declaring static field `field` as seen from `ty`. Conditional
    /// types resolve to their first declaration.
    pub fn resolve_static_field(&self, ty: &str, field: &str) -> Option<Arc<TypeEntry>> {
        let entry = self
            .type_entry(ty)
            .cloned()
            .or_else(|| self.types().find(|t| t.name.is(ty)).cloned())?;
        self.base_chain(&entry)
            .into_iter()
            .find(|t| t.field(field).is_some_and(|f| f.is_static))
    }
}

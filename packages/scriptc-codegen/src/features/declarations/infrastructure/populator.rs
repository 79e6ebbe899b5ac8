//! Declaration table population
//!
//! Visits every unit exactly once, sequentially in caller order or in
//! parallel on the Rayon pool. Unconditional declarations are collected per
//! name into DashMaps together with their origin; conflicts are decided after
//! all units are visited by comparing origins, so both modes report the same
//! redeclaration. Conditional declarations only go into their file's list.

use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use super::path::normalize_path;
use super::table::DeclarationTable;
use crate::config::CodegenConfig;
use crate::errors::{DeclarationError, DeclarationKind};
use crate::features::declarations::domain::{
    DeclOrigin, Declaration, FileEntry, FunctionEntry, TypeEntry,
};
use crate::shared::models::{SourceItem, SourceUnit};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateOptions {
    pub parallel: bool,
    pub base_directory: Option<String>,
}

impl From<&CodegenConfig> for PopulateOptions {
    fn from(config: &CodegenConfig) -> Self {
        Self {
            parallel: config.parallel,
            base_directory: config.base_directory.clone(),
        }
    }
}

pub struct DeclarationPopulator {
    options: PopulateOptions,
    /// Lowercase name → unconditional declarations of that name
    functions: DashMap<String, Vec<Arc<FunctionEntry>>>,
    types: DashMap<String, Vec<Arc<TypeEntry>>>,
    /// Unit index → file
    files: DashMap<usize, Arc<FileEntry>>,
}

impl DeclarationPopulator {
    pub fn new(options: PopulateOptions) -> Self {
        Self {
            options,
            functions: DashMap::new(),
            types: DashMap::new(),
            files: DashMap::new(),
        }
    }

    /// Visit all units and freeze the result
    pub fn populate(self, units: Vec<SourceUnit>) -> Result<DeclarationTable, DeclarationError> {
        if self.options.parallel {
            crate::init_rayon();
            units
                .into_par_iter()
                .enumerate()
                .for_each(|(index, unit)| self.visit_unit(index, unit));
        } else {
            for (index, unit) in units.into_iter().enumerate() {
                self.visit_unit(index, unit);
            }
        }
        self.freeze()
    }

    fn visit_unit(&self, unit_index: usize, unit: SourceUnit) {
        let path = normalize_path(&unit.path, self.options.base_directory.as_deref());
        let mut declarations = Vec::new();
        let mut cursor = Cursor {
            unit: unit_index,
            item: 0,
            path: &path,
        };
        self.visit_items(unit.items, false, &mut cursor, &mut declarations);

        debug!(
            "populated {} ({} declarations)",
            unit.path,
            declarations.len()
        );
        self.files.insert(
            unit_index,
            Arc::new(FileEntry {
                path,
                source_path: unit.path,
                unit: unit_index,
                declarations,
            }),
        );
    }

    fn visit_items(
        &self,
        items: Vec<SourceItem>,
        conditional: bool,
        cursor: &mut Cursor<'_>,
        declarations: &mut Vec<Declaration>,
    ) {
        for item in items {
            match item {
                SourceItem::Function(routine) => {
                    let entry = Arc::new(FunctionEntry {
                        name: routine.name.as_str().into(),
                        file: cursor.path.to_string(),
                        conditional,
                        routine: Arc::new(routine),
                        origin: cursor.next(),
                    });
                    if !conditional {
                        self.functions
                            .entry(entry.name.key().to_string())
                            .or_default()
                            .push(Arc::clone(&entry));
                    }
                    declarations.push(Declaration::Function(entry));
                }
                SourceItem::Type(decl) => {
                    let methods = decl
                        .methods
                        .into_iter()
                        .map(|mut m| {
                            m.owner.get_or_insert_with(|| decl.name.clone());
                            m.threads_context |= decl.threads_context && !m.is_static;
                            Arc::new(m)
                        })
                        .collect();
                    let entry = Arc::new(TypeEntry {
                        name: decl.name,
                        file: cursor.path.to_string(),
                        conditional,
                        base: decl.base,
                        fields: decl.fields,
                        methods,
                        threads_context: decl.threads_context,
                        callable: decl.callable,
                        origin: cursor.next(),
                    });
                    if !conditional {
                        self.types
                            .entry(entry.name.key().to_string())
                            .or_default()
                            .push(Arc::clone(&entry));
                    }
                    declarations.push(Declaration::Type(entry));
                }
                SourceItem::Conditional(nested) => {
                    self.visit_items(nested, true, cursor, declarations);
                }
            }
        }
    }

    fn freeze(self) -> Result<DeclarationTable, DeclarationError> {
        let mut files: Vec<Arc<FileEntry>> = self.files.into_iter().map(|(_, f)| f).collect();
        files.sort_by_key(|f| f.unit);

        let mut conflicts = Vec::new();
        let functions = settle(self.functions, &files, DeclarationKind::Function, &mut conflicts);
        let types = settle(self.types, &files, DeclarationKind::Type, &mut conflicts);

        // Report the conflict whose redeclaration comes first in caller order.
        if let Some((_, err)) = conflicts.into_iter().min_by_key(|(origin, _)| *origin) {
            return Err(err);
        }

        let mut files_by_path = FxHashMap::default();
        for file in &files {
            if files_by_path
                .insert(file.path.clone(), Arc::clone(file))
                .is_some()
            {
                warn!("duplicate source path {}, last unit wins", file.path);
            }
        }

        info!(
            "declaration table: {} files, {} functions, {} types",
            files.len(),
            functions.len(),
            types.len()
        );

        Ok(DeclarationTable::new(
            files,
            files_by_path,
            functions,
            types,
            self.options.base_directory,
        ))
    }
}

struct Cursor<'a> {
    unit: usize,
    item: usize,
    path: &'a str,
}

impl Cursor<'_> {
    fn next(&mut self) -> DeclOrigin {
        let origin = DeclOrigin {
            unit: self.unit,
            item: self.item,
        };
        self.item += 1;
        origin
    }
}

trait Originated {
    fn origin(&self) -> DeclOrigin;
    fn name(&self) -> &str;
}

impl Originated for FunctionEntry {
    fn origin(&self) -> DeclOrigin {
        self.origin
    }

    fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl Originated for TypeEntry {
    fn origin(&self) -> DeclOrigin {
        self.origin
    }

    fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// Keep the earliest declaration of every name; record each later one as a conflict
fn settle<T: Originated>(
    map: DashMap<String, Vec<Arc<T>>>,
    files: &[Arc<FileEntry>],
    kind: DeclarationKind,
    conflicts: &mut Vec<(DeclOrigin, DeclarationError)>,
) -> FxHashMap<String, Arc<T>> {
    let source_path = |origin: DeclOrigin| {
        files
            .get(origin.unit)
            .map(|f| f.source_path.clone())
            .unwrap_or_default()
    };

    let mut settled = FxHashMap::default();
    for (key, mut entries) in map {
        entries.sort_by_key(|e| e.origin());
        let first = Arc::clone(&entries[0]);
        for duplicate in &entries[1..] {
            let err = DeclarationError::Redeclaration {
                kind,
                name: duplicate.name().to_string(),
                first: source_path(first.origin()),
                second: source_path(duplicate.origin()),
            };
            warn!("{}", err);
            conflicts.push((duplicate.origin(), err));
        }
        settled.insert(key, first);
    }
    settled
}

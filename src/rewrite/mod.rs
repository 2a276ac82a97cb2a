// Rewrite pass engine.
//
// A pass mutates parsed files in place and reports which aliased imports
// it needs added or removed; the engine owns serialization, the staged
// write, and the rename over the original. Nothing here re-parses: passes
// and engine share the `SourceFile` ASTs built by the analysis.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use crate::domain::callgraph::CallGraph;
use crate::domain::descriptor::FuncDescriptor;
use crate::domain::model::SourceFile;
use crate::domain::resolver::{DeclIndex, InterfaceImplMap};

pub mod builders;
pub mod context;
pub mod instrument;
pub mod prune;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportAction {
    Add,
    Remove,
}

/// One aliased `use` item a pass wants present or gone, e.g.
/// `use tracegen_rt::context as __atel_context;`.
#[derive(Debug, Clone)]
pub struct ImportDirective {
    pub alias: String,
    pub path: String,
    pub action: ImportAction,
}

impl ImportDirective {
    pub fn add(alias: &str, path: &str) -> Self {
        ImportDirective {
            alias: alias.to_string(),
            path: path.to_string(),
            action: ImportAction::Add,
        }
    }

    pub fn remove(alias: &str) -> Self {
        ImportDirective {
            alias: alias.to_string(),
            path: String::new(),
            action: ImportAction::Remove,
        }
    }
}

/// The shared, immutable view every pass reads: declarations, graph,
/// roots, the memoized reachable set, and the control-panel selection.
#[derive(Debug, Default)]
pub struct AnalysisInfo {
    pub decls: DeclIndex,
    pub graph: CallGraph,
    pub impls: InterfaceImplMap,
    pub roots: Vec<FuncDescriptor>,
    pub reachable: HashSet<FuncDescriptor>,
    /// `type_hash()` strings the control panel kept checked. Empty means
    /// everything is selected.
    pub selected: HashSet<String>,
}

impl AnalysisInfo {
    pub fn is_root(&self, desc: &FuncDescriptor) -> bool {
        self.roots.contains(desc)
    }

    /// A function is in instrumentation scope when the graph knows it and
    /// some designated root reaches it.
    pub fn in_scope(&self, desc: &FuncDescriptor) -> bool {
        self.reachable.contains(desc) && self.graph.is_member(desc)
    }

    /// The trait-keyed descriptor a concrete method also answers to,
    /// when its receiver type implements a known trait under this name.
    pub fn trait_twin(&self, desc: &FuncDescriptor) -> Option<&FuncDescriptor> {
        let receiver = desc.receiver.as_deref()?;
        for (trait_name, types) in &self.impls {
            if types.iter().any(|t| t == receiver) {
                if let Some(twin) = self.decls.resolve_method(trait_name, &desc.name) {
                    return Some(twin);
                }
            }
        }
        None
    }

    pub fn in_scope_or_twin(&self, desc: &FuncDescriptor) -> bool {
        self.in_scope(desc)
            || self
                .trait_twin(desc)
                .is_some_and(|twin| self.in_scope(twin))
    }

    /// Whether the function's signature and call sites carry the
    /// propagated context parameter.
    pub fn needs_context(&self, desc: &FuncDescriptor) -> bool {
        self.in_scope_or_twin(desc) && !self.is_root(desc)
    }

    /// Roots are always instrumented; everything else honors the
    /// control-panel selection.
    pub fn is_selected(&self, desc: &FuncDescriptor) -> bool {
        self.is_root(desc)
            || self.selected.is_empty()
            || self.selected.contains(&desc.type_hash())
    }
}

pub trait RewritePass {
    fn name(&self) -> &'static str;

    /// Mutate one file; return the import directives the rewrite needs.
    fn execute(&self, file: &mut SourceFile, info: &AnalysisInfo) -> Vec<ImportDirective>;
}

/// One analysis run's worth of files plus the shared pass view.
pub struct Analysis {
    pub files: Vec<SourceFile>,
    pub info: AnalysisInfo,
    /// Dump-intermediate mode: keep the suffixed output next to the
    /// original instead of renaming over it.
    pub debug: bool,
}

impl Analysis {
    /// Run one pass over every file. With no roots anywhere the pass is
    /// skipped and files are serialized unchanged. A serialization or
    /// rename failure aborts the whole call; files already rewritten
    /// stay rewritten.
    pub fn execute(&mut self, pass: &dyn RewritePass, suffix: &str) -> Result<()> {
        for sf in &mut self.files {
            let directives = if self.info.roots.is_empty() {
                Vec::new()
            } else {
                pass.execute(sf, &self.info)
            };
            apply_import_directives(&mut sf.ast, &directives)?;

            let rendered = prettyplease::unparse(&sf.ast);
            let staged = PathBuf::from(format!("{}{}", sf.path.display(), suffix));
            fs::write(&staged, rendered)
                .with_context(|| format!("writing {}", staged.display()))?;
            if !self.debug {
                fs::rename(&staged, &sf.path).with_context(|| {
                    format!("renaming {} over {}", staged.display(), sf.path.display())
                })?;
            }
            info!("pass {} rewrote {}", pass.name(), sf.path.display());
        }
        Ok(())
    }
}

/// Apply directives to one file's item list. Adds are idempotent (an
/// existing alias is left alone); removes retain everything else.
pub fn apply_import_directives(
    ast: &mut syn::File,
    directives: &[ImportDirective],
) -> Result<()> {
    for directive in directives {
        match directive.action {
            ImportAction::Add => {
                if has_use_alias(ast, &directive.alias) {
                    continue;
                }
                let item: syn::ItemUse =
                    syn::parse_str(&format!("use {} as {};", directive.path, directive.alias))
                        .with_context(|| {
                            format!("building use item for alias {}", directive.alias)
                        })?;
                let at = ast
                    .items
                    .iter()
                    .rposition(|i| matches!(i, syn::Item::Use(_)))
                    .map(|i| i + 1)
                    .unwrap_or(0);
                ast.items.insert(at, syn::Item::Use(item));
            }
            ImportAction::Remove => {
                ast.items.retain(|item| match item {
                    syn::Item::Use(u) => !tree_has_alias(&u.tree, &directive.alias),
                    _ => true,
                });
            }
        }
    }
    Ok(())
}

fn has_use_alias(ast: &syn::File, alias: &str) -> bool {
    ast.items.iter().any(|item| match item {
        syn::Item::Use(u) => tree_has_alias(&u.tree, alias),
        _ => false,
    })
}

fn tree_has_alias(tree: &syn::UseTree, alias: &str) -> bool {
    match tree {
        syn::UseTree::Path(p) => tree_has_alias(&p.tree, alias),
        syn::UseTree::Rename(r) => r.rename == alias,
        syn::UseTree::Group(g) => g.items.iter().any(|t| tree_has_alias(t, alias)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_add_is_idempotent() {
        let mut ast: syn::File = syn::parse_str("fn main() {}").unwrap();
        let add = vec![ImportDirective::add("__atel_context", "tracegen_rt::context")];
        apply_import_directives(&mut ast, &add).unwrap();
        apply_import_directives(&mut ast, &add).unwrap();
        let uses = ast
            .items
            .iter()
            .filter(|i| matches!(i, syn::Item::Use(_)))
            .count();
        assert_eq!(uses, 1);
    }

    #[test]
    fn import_remove_only_touches_the_alias() {
        let mut ast: syn::File = syn::parse_str(
            "use std::fmt;\nuse tracegen_rt::context as __atel_context;\nfn main() {}",
        )
        .unwrap();
        apply_import_directives(&mut ast, &[ImportDirective::remove("__atel_context")])
            .unwrap();
        let rendered = prettyplease::unparse(&ast);
        assert!(rendered.contains("use std::fmt;"));
        assert!(!rendered.contains("__atel_context"));
    }

    #[test]
    fn new_use_lands_after_existing_uses() {
        let mut ast: syn::File = syn::parse_str("use std::fmt;\nfn main() {}").unwrap();
        apply_import_directives(
            &mut ast,
            &[ImportDirective::add("__atel_otel", "tracegen_rt::otel")],
        )
        .unwrap();
        assert!(matches!(ast.items[1], syn::Item::Use(_)));
        assert!(matches!(ast.items[2], syn::Item::Fn(_)));
    }
}

// Parsed program model: every matched source file plus the symbol tables
// the analysis passes read from.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use log::warn;
use rayon::prelude::*;
use syn::visit::Visit;

use crate::domain::descriptor::FuncDescriptor;
use crate::domain::resolver::{describe_fn, signature_string, type_name_of};

/// One parsed source file, tagged with the crate it belongs to.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub crate_name: String,
    pub path: PathBuf,
    pub ast: syn::File,
}

#[derive(Debug, Clone)]
pub struct TraitMethod {
    pub name: String,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct TraitDecl {
    pub crate_name: String,
    pub source_file: String,
    pub source_line: usize,
    pub methods: Vec<TraitMethod>,
}

/// The three symbol tables: free functions, type methods, traits.
/// Keys are `(crate, fn name)` / `(receiver type, fn name)` / trait name.
#[derive(Debug, Default)]
pub struct SymbolTables {
    pub definitions: HashMap<(String, String), FuncDescriptor>,
    pub selections: HashMap<(String, String), FuncDescriptor>,
    pub interfaces: HashMap<String, TraitDecl>,
}

impl SymbolTables {
    fn merge(&mut self, other: SymbolTables) {
        self.definitions.extend(other.definitions);
        self.selections.extend(other.selections);
        self.interfaces.extend(other.interfaces);
    }
}

/// The full model for one analysis run. Construction is the only write
/// phase; everything downstream reads it immutably.
#[derive(Debug, Default)]
pub struct ProgramModel {
    pub files: Vec<SourceFile>,
    pub symbols: SymbolTables,
}

impl ProgramModel {
    /// Parse and index `(crate_name, path, code)` triples. Files that fail
    /// to parse are logged and dropped; the rest of the model still builds.
    ///
    /// Indexing fans out per file. The `syn` ASTs are not `Send`, so each
    /// worker parses its own copy and only the symbol tables cross
    /// threads; the retained ASTs are parsed sequentially afterwards.
    pub fn build(sources: &[(String, String, String)]) -> Self {
        let tables = Mutex::new(SymbolTables::default());
        sources.par_iter().for_each(|(crate_name, path, code)| {
            let Ok(ast) = syn::parse_file(code) else {
                return;
            };
            let mut local = SymbolTables::default();
            let mut indexer = SymbolIndexer {
                crate_name: crate_name.as_str(),
                file: path.as_str(),
                self_ty: None,
                tables: &mut local,
            };
            indexer.visit_file(&ast);
            tables.lock().unwrap().merge(local);
        });

        let files: Vec<SourceFile> = sources
            .iter()
            .filter_map(|(crate_name, path, code)| match syn::parse_file(code) {
                Ok(ast) => Some(SourceFile {
                    crate_name: crate_name.clone(),
                    path: PathBuf::from(path),
                    ast,
                }),
                Err(err) => {
                    warn!("skipping unparsable file {path}: {err}");
                    None
                }
            })
            .collect();

        ProgramModel {
            files,
            symbols: tables.into_inner().unwrap(),
        }
    }
}

struct SymbolIndexer<'a> {
    crate_name: &'a str,
    file: &'a str,
    self_ty: Option<String>,
    tables: &'a mut SymbolTables,
}

impl<'a, 'ast> Visit<'ast> for SymbolIndexer<'a> {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        let desc = describe_fn(self.crate_name, None, &node.sig, self.file);
        self.tables
            .definitions
            .insert((desc.package.clone(), desc.name.clone()), desc);
        // nested fns declare symbols too
        syn::visit::visit_item_fn(self, node);
    }

    fn visit_item_impl(&mut self, node: &'ast syn::ItemImpl) {
        let prev = self.self_ty.take();
        self.self_ty = type_name_of(&node.self_ty);
        syn::visit::visit_item_impl(self, node);
        self.self_ty = prev;
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        if let Some(ty) = self.self_ty.clone() {
            let desc = describe_fn(self.crate_name, Some(&ty), &node.sig, self.file);
            self.tables
                .selections
                .insert((ty, desc.name.clone()), desc);
        }
        syn::visit::visit_impl_item_fn(self, node);
    }

    fn visit_item_trait(&mut self, node: &'ast syn::ItemTrait) {
        let methods = node
            .items
            .iter()
            .filter_map(|item| match item {
                syn::TraitItem::Fn(f) => Some(TraitMethod {
                    name: f.sig.ident.to_string(),
                    signature: signature_string(&f.sig),
                }),
                _ => None,
            })
            .collect();
        self.tables.interfaces.insert(
            node.ident.to_string(),
            TraitDecl {
                crate_name: self.crate_name.to_string(),
                source_file: self.file.to_string(),
                source_line: node.ident.span().start().line,
                methods,
            },
        );
        syn::visit::visit_item_trait(self, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_of(code: &str) -> ProgramModel {
        ProgramModel::build(&[(
            "app".to_string(),
            "src/lib.rs".to_string(),
            code.to_string(),
        )])
    }

    #[test]
    fn indexes_free_fns_methods_and_traits() {
        let model = model_of(
            r#"
            fn helper() {}

            struct Server;
            impl Server {
                fn run(&self) {}
            }

            trait Greeter {
                fn greet(&self);
            }

            mod inner {
                fn nested() {}
            }
            "#,
        );
        let syms = &model.symbols;
        assert!(syms
            .definitions
            .contains_key(&("app".to_string(), "helper".to_string())));
        assert!(syms
            .definitions
            .contains_key(&("app".to_string(), "nested".to_string())));
        let run = &syms.selections[&("Server".to_string(), "run".to_string())];
        assert_eq!(run.receiver.as_deref(), Some("Server"));
        let greeter = &syms.interfaces["Greeter"];
        assert_eq!(greeter.methods.len(), 1);
        assert_eq!(greeter.methods[0].name, "greet");
    }

    #[test]
    fn symbols_merge_across_files() {
        let model = ProgramModel::build(&[
            (
                "app".to_string(),
                "src/a.rs".to_string(),
                "fn a() {}".to_string(),
            ),
            (
                "app".to_string(),
                "src/b.rs".to_string(),
                "fn b() {}".to_string(),
            ),
            (
                "lib_x".to_string(),
                "src/c.rs".to_string(),
                "fn c() {}".to_string(),
            ),
        ]);
        assert_eq!(model.files.len(), 3);
        for key in [("app", "a"), ("app", "b"), ("lib_x", "c")] {
            assert!(model
                .symbols
                .definitions
                .contains_key(&(key.0.to_string(), key.1.to_string())));
        }
    }

    #[test]
    fn unparsable_files_are_dropped_not_fatal() {
        let model = ProgramModel::build(&[
            (
                "app".to_string(),
                "src/bad.rs".to_string(),
                "fn broken( {".to_string(),
            ),
            (
                "app".to_string(),
                "src/good.rs".to_string(),
                "fn ok() {}".to_string(),
            ),
        ]);
        assert_eq!(model.files.len(), 1);
        assert!(model
            .symbols
            .definitions
            .contains_key(&("app".to_string(), "ok".to_string())));
    }
}

// Root inference: a function becomes a tracing root by containing a call
// whose name matches the sentinel label. The call itself is ordinary user
// code (typically a no-op marker fn); only its name matters here.

use syn::visit::Visit;

use crate::domain::descriptor::FuncDescriptor;
use crate::domain::model::ProgramModel;
use crate::domain::resolver::{describe_fn, type_name_of};

pub const DEFAULT_ENTRY_POINT_LABEL: &str = "AutotelEntryPoint";

/// Scan every body for sentinel calls. Discovery order, deduplicated.
pub fn find_root_functions(model: &ProgramModel, label: &str) -> Vec<FuncDescriptor> {
    let mut roots = Vec::new();
    for sf in &model.files {
        let file = sf.path.display().to_string();
        let mut walker = RootWalker {
            crate_name: &sf.crate_name,
            file: &file,
            label,
            current: None,
            self_ty: None,
            roots: &mut roots,
        };
        walker.visit_file(&sf.ast);
    }
    roots
}

struct RootWalker<'a> {
    crate_name: &'a str,
    file: &'a str,
    label: &'a str,
    current: Option<FuncDescriptor>,
    self_ty: Option<String>,
    roots: &'a mut Vec<FuncDescriptor>,
}

impl<'a> RootWalker<'a> {
    fn mark_current(&mut self) {
        if let Some(current) = &self.current {
            if !self.roots.contains(current) {
                self.roots.push(current.clone());
            }
        }
    }
}

impl<'a, 'ast> Visit<'ast> for RootWalker<'a> {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        let prev = self
            .current
            .replace(describe_fn(self.crate_name, None, &node.sig, self.file));
        syn::visit::visit_item_fn(self, node);
        self.current = prev;
    }

    fn visit_item_impl(&mut self, node: &'ast syn::ItemImpl) {
        let prev = self.self_ty.take();
        self.self_ty = type_name_of(&node.self_ty);
        syn::visit::visit_item_impl(self, node);
        self.self_ty = prev;
    }

    fn visit_item_trait(&mut self, node: &'ast syn::ItemTrait) {
        let prev = self.self_ty.take();
        self.self_ty = Some(node.ident.to_string());
        syn::visit::visit_item_trait(self, node);
        self.self_ty = prev;
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        let self_ty = self.self_ty.clone();
        let prev = self.current.replace(describe_fn(
            self.crate_name,
            self_ty.as_deref(),
            &node.sig,
            self.file,
        ));
        syn::visit::visit_impl_item_fn(self, node);
        self.current = prev;
    }

    fn visit_trait_item_fn(&mut self, node: &'ast syn::TraitItemFn) {
        let self_ty = self.self_ty.clone();
        let prev = self.current.replace(describe_fn(
            self.crate_name,
            self_ty.as_deref(),
            &node.sig,
            self.file,
        ));
        syn::visit::visit_trait_item_fn(self, node);
        self.current = prev;
    }

    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let syn::Expr::Path(path) = &*node.func {
            if let Some(last) = path.path.segments.last() {
                if last.ident == self.label {
                    self.mark_current();
                }
            }
        }
        syn::visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        if node.method == self.label {
            self.mark_current();
        }
        syn::visit::visit_expr_method_call(self, node);
    }
}

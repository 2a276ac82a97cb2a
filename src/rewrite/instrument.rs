// Span injection. Roots get the tracer-state preamble; reachable graph
// members get the span wrapper; everything else is left alone.

use syn::visit_mut::VisitMut;

use crate::domain::model::SourceFile;
use crate::domain::resolver::{describe_fn, type_name_of};
use crate::rewrite::{builders, AnalysisInfo, ImportDirective, RewritePass};

pub struct Instrumentation;

impl RewritePass for Instrumentation {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn execute(&self, file: &mut SourceFile, info: &AnalysisInfo) -> Vec<ImportDirective> {
        let path = file.path.display().to_string();
        let mut injector = Injector {
            crate_name: &file.crate_name,
            file: &path,
            info,
            self_ty: None,
            injected: false,
        };
        injector.visit_file_mut(&mut file.ast);
        if injector.injected {
            builders::instrumentation_imports()
        } else {
            Vec::new()
        }
    }
}

struct Injector<'a> {
    crate_name: &'a str,
    file: &'a str,
    info: &'a AnalysisInfo,
    self_ty: Option<String>,
    injected: bool,
}

impl<'a> Injector<'a> {
    fn inject_into(&mut self, sig: &syn::Signature, block: &mut syn::Block) {
        let desc = describe_fn(self.crate_name, self.self_ty.as_deref(), sig, self.file);
        let stmts = if self.info.is_root(&desc) {
            builders::tracer_setup_stmts(&desc.name)
        } else if self.info.in_scope_or_twin(&desc) && self.info.is_selected(&desc) {
            builders::span_wrap_stmts(&desc.name)
        } else {
            return;
        };
        block.stmts.splice(0..0, stmts);
        self.injected = true;
    }
}

impl<'a> VisitMut for Injector<'a> {
    fn visit_item_fn_mut(&mut self, node: &mut syn::ItemFn) {
        syn::visit_mut::visit_item_fn_mut(self, node);
        let sig = node.sig.clone();
        self.inject_into(&sig, &mut node.block);
    }

    fn visit_item_impl_mut(&mut self, node: &mut syn::ItemImpl) {
        let prev = self.self_ty.take();
        self.self_ty = type_name_of(&node.self_ty);
        syn::visit_mut::visit_item_impl_mut(self, node);
        self.self_ty = prev;
    }

    fn visit_item_trait_mut(&mut self, node: &mut syn::ItemTrait) {
        let prev = self.self_ty.take();
        self.self_ty = Some(node.ident.to_string());
        syn::visit_mut::visit_item_trait_mut(self, node);
        self.self_ty = prev;
    }

    fn visit_impl_item_fn_mut(&mut self, node: &mut syn::ImplItemFn) {
        syn::visit_mut::visit_impl_item_fn_mut(self, node);
        let sig = node.sig.clone();
        self.inject_into(&sig, &mut node.block);
    }

    fn visit_trait_item_fn_mut(&mut self, node: &mut syn::TraitItemFn) {
        syn::visit_mut::visit_trait_item_fn_mut(self, node);
        let sig = node.sig.clone();
        if let Some(block) = node.default.as_mut() {
            self.inject_into(&sig, block);
        }
    }
}

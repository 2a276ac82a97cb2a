// Context propagation. Qualifying functions gain a leading context
// parameter; every call site to a qualifying callee gains a matching
// leading argument, threaded from the caller's child context when the
// caller is itself inside the instrumented region.

use syn::visit_mut::VisitMut;

use crate::domain::model::SourceFile;
use crate::domain::resolver::{
    call_targets, describe_fn, type_name_of, CallSite, FnScope,
};
use crate::rewrite::builders::{self, SYNTHETIC_PREFIX};
use crate::rewrite::{AnalysisInfo, ImportDirective, RewritePass};

pub struct ContextPropagation;

impl RewritePass for ContextPropagation {
    fn name(&self) -> &'static str {
        "ctx"
    }

    fn execute(&self, file: &mut SourceFile, info: &AnalysisInfo) -> Vec<ImportDirective> {
        let path = file.path.display().to_string();
        let mut propagator = Propagator {
            crate_name: &file.crate_name,
            file: &path,
            info,
            self_ty: None,
            caller_in_scope: false,
            caller_selected: false,
            scope: FnScope::default(),
            changed: false,
        };
        propagator.visit_file_mut(&mut file.ast);
        if propagator.changed {
            builders::context_import()
        } else {
            Vec::new()
        }
    }
}

struct Propagator<'a> {
    crate_name: &'a str,
    file: &'a str,
    info: &'a AnalysisInfo,
    self_ty: Option<String>,
    caller_in_scope: bool,
    caller_selected: bool,
    scope: FnScope,
    changed: bool,
}

struct SavedFn {
    in_scope: bool,
    selected: bool,
    scope: FnScope,
    needs_param: bool,
}

impl<'a> Propagator<'a> {
    fn enter_fn(&mut self, sig: &syn::Signature, block: Option<&syn::Block>) -> SavedFn {
        let desc = describe_fn(self.crate_name, self.self_ty.as_deref(), sig, self.file);
        let in_scope = self.info.is_root(&desc) || self.info.in_scope_or_twin(&desc);
        let prev_in_scope = std::mem::replace(&mut self.caller_in_scope, in_scope);
        let prev_selected =
            std::mem::replace(&mut self.caller_selected, self.info.is_selected(&desc));
        let prev_scope = std::mem::replace(
            &mut self.scope,
            FnScope::of_fn(sig, self.self_ty.as_deref(), block),
        );
        SavedFn {
            in_scope: prev_in_scope,
            selected: prev_selected,
            scope: prev_scope,
            needs_param: self.info.needs_context(&desc),
        }
    }

    fn leave_fn(&mut self, saved: SavedFn, sig: &mut syn::Signature) {
        if saved.needs_param && !has_context_param(sig) {
            // a receiver must stay in first position
            let at = usize::from(matches!(
                sig.inputs.first(),
                Some(syn::FnArg::Receiver(_))
            ));
            sig.inputs.insert(at, builders::context_param());
            self.changed = true;
        }
        self.caller_in_scope = saved.in_scope;
        self.caller_selected = saved.selected;
        self.scope = saved.scope;
    }

    fn leading_arg(&self) -> syn::Expr {
        if !self.caller_in_scope {
            builders::background_context_arg()
        } else if self.caller_selected {
            builders::child_context_arg()
        } else {
            // a deselected caller has no span preamble and therefore no
            // child binding; its own received context is forwarded
            builders::received_context_arg()
        }
    }
}

fn has_context_param(sig: &syn::Signature) -> bool {
    sig.inputs.iter().any(|input| match input {
        syn::FnArg::Typed(pt) => match &*pt.pat {
            syn::Pat::Ident(pi) => pi.ident.to_string().starts_with(SYNTHETIC_PREFIX),
            _ => false,
        },
        syn::FnArg::Receiver(_) => false,
    })
}

fn is_synthetic_arg(expr: &syn::Expr) -> bool {
    match expr {
        syn::Expr::Path(p) => p
            .path
            .segments
            .first()
            .is_some_and(|s| s.ident.to_string().starts_with(SYNTHETIC_PREFIX)),
        syn::Expr::Call(c) => is_synthetic_arg(&c.func),
        _ => false,
    }
}

impl<'a> VisitMut for Propagator<'a> {
    fn visit_item_fn_mut(&mut self, node: &mut syn::ItemFn) {
        let saved = self.enter_fn(&node.sig, Some(&node.block));
        syn::visit_mut::visit_item_fn_mut(self, node);
        self.leave_fn(saved, &mut node.sig);
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
        let saved = self.enter_fn(&node.sig, Some(&node.block));
        syn::visit_mut::visit_impl_item_fn_mut(self, node);
        self.leave_fn(saved, &mut node.sig);
    }

    fn visit_trait_item_fn_mut(&mut self, node: &mut syn::TraitItemFn) {
        let saved = self.enter_fn(&node.sig, node.default.as_ref());
        syn::visit_mut::visit_trait_item_fn_mut(self, node);
        self.leave_fn(saved, &mut node.sig);
    }

    fn visit_expr_call_mut(&mut self, node: &mut syn::ExprCall) {
        syn::visit_mut::visit_expr_call_mut(self, node);
        let needs_arg = match &*node.func {
            syn::Expr::Path(path) => call_targets(
                CallSite::Path(path),
                &self.scope,
                self.crate_name,
                &self.info.decls,
                &self.info.impls,
            )
            .iter()
            .any(|t| self.info.needs_context(t)),
            _ => false,
        };
        if needs_arg && !node.args.first().is_some_and(is_synthetic_arg) {
            node.args.insert(0, self.leading_arg());
            self.changed = true;
        }
    }

    fn visit_expr_method_call_mut(&mut self, node: &mut syn::ExprMethodCall) {
        syn::visit_mut::visit_expr_method_call_mut(self, node);
        let needs_arg = call_targets(
            CallSite::Method {
                receiver: &node.receiver,
                method: &node.method,
            },
            &self.scope,
            self.crate_name,
            &self.info.decls,
            &self.info.impls,
        )
        .iter()
        .any(|t| self.info.needs_context(t));
        if needs_arg && !node.args.first().is_some_and(is_synthetic_arg) {
            node.args.insert(0, self.leading_arg());
            self.changed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::callgraph::{build_call_graph, find_func_decls};
    use crate::domain::interfaces::resolve_implementations;
    use crate::domain::model::ProgramModel;
    use crate::domain::roots::{find_root_functions, DEFAULT_ENTRY_POINT_LABEL};

    fn propagate(code: &str) -> String {
        propagate_with_selection(code, &[])
    }

    fn propagate_with_selection(code: &str, selected: &[&str]) -> String {
        let model = ProgramModel::build(&[(
            "app".to_string(),
            "src/main.rs".to_string(),
            code.to_string(),
        )]);
        let impls = resolve_implementations(&model.symbols);
        let decls = find_func_decls(&model);
        let graph = build_call_graph(&model, &decls, &impls);
        let roots = find_root_functions(&model, DEFAULT_ENTRY_POINT_LABEL);
        let reachable = graph.reachable_from(&roots);
        let info = AnalysisInfo {
            decls,
            graph,
            impls,
            roots,
            reachable,
            selected: selected.iter().map(|s| s.to_string()).collect(),
        };
        let mut file = model.files.into_iter().next().unwrap();
        ContextPropagation.execute(&mut file, &info);
        prettyplease::unparse(&file.ast)
    }

    #[test]
    fn reachable_members_gain_the_leading_parameter() {
        let out = propagate(
            r#"
            fn main() {
                AutotelEntryPoint();
                do_work();
            }
            fn do_work() {}
            "#,
        );
        assert!(out.contains("fn do_work(__atel_tracing_ctx: __atel_context::Context)"));
        assert!(out.contains("do_work(__atel_child_tracing_ctx);"));
        // the root keeps its signature
        assert!(out.contains("fn main()"));
    }

    #[test]
    fn out_of_scope_callers_pass_a_background_context() {
        let out = propagate(
            r#"
            fn main() {
                AutotelEntryPoint();
                shared();
            }
            fn outside() {
                shared();
            }
            fn shared() {}
            "#,
        );
        assert!(out.contains("shared(__atel_child_tracing_ctx);"));
        assert!(out.contains("shared(__atel_context::Context::background());"));
        assert!(out.contains("fn outside()"));
    }

    #[test]
    fn trait_signatures_follow_their_trait_keyed_descriptor() {
        let out = propagate(
            r#"
            trait Greeter {
                fn greet(&self);
            }
            struct En;
            impl En {
                fn greet(&self) {}
            }
            fn main() {
                AutotelEntryPoint();
                let g: &dyn Greeter = &En;
                g.greet();
            }
            "#,
        );
        assert!(out
            .contains("fn greet(&self, __atel_tracing_ctx: __atel_context::Context)"));
        assert!(out.contains("g.greet(__atel_child_tracing_ctx);"));
    }

    #[test]
    fn deselected_callers_forward_their_received_context() {
        let out = propagate_with_selection(
            r#"
            fn main() {
                AutotelEntryPoint();
                do_work();
            }
            fn do_work() {
                helper();
            }
            fn helper() {}
            "#,
            &["app.helper:fn()"],
        );
        // do_work is unchecked: it still carries the parameter, but its
        // call sites forward it instead of a child binding it never gets
        assert!(out.contains("fn do_work(__atel_tracing_ctx: __atel_context::Context)"));
        assert!(out.contains("helper(__atel_tracing_ctx);"));
        // the root is always selected and threads its child context
        assert!(out.contains("do_work(__atel_child_tracing_ctx);"));
    }

    #[test]
    fn argument_insertion_is_not_doubled() {
        let once = propagate(
            r#"
            fn main() {
                AutotelEntryPoint();
                do_work();
            }
            fn do_work() {}
            "#,
        );
        assert_eq!(once.matches("__atel_child_tracing_ctx").count(), 1);
    }
}

// Structural removal of everything the injection passes put in. The
// matcher keys purely on the synthetic prefix, so pruning works on trees
// whose injection predates this binary, and running it twice is a no-op.

use syn::visit_mut::VisitMut;

use crate::domain::model::SourceFile;
use crate::rewrite::builders::{self, SYNTHETIC_PREFIX};
use crate::rewrite::{AnalysisInfo, ImportDirective, RewritePass};

pub struct Pruner;

impl RewritePass for Pruner {
    fn name(&self) -> &'static str {
        "pruner"
    }

    fn execute(&self, file: &mut SourceFile, _info: &AnalysisInfo) -> Vec<ImportDirective> {
        let mut sweeper = Sweeper;
        sweeper.visit_file_mut(&mut file.ast);
        builders::pruned_imports()
    }
}

fn is_prefixed(ident: &syn::Ident) -> bool {
    ident.to_string().starts_with(SYNTHETIC_PREFIX)
}

fn pat_is_synthetic(pat: &syn::Pat) -> bool {
    match pat {
        syn::Pat::Ident(pi) => is_prefixed(&pi.ident),
        syn::Pat::Type(pt) => pat_is_synthetic(&pt.pat),
        syn::Pat::Tuple(t) => t.elems.iter().any(pat_is_synthetic),
        _ => false,
    }
}

fn path_head_is_synthetic(path: &syn::Path) -> bool {
    path.segments
        .first()
        .is_some_and(|s| is_prefixed(&s.ident))
}

fn expr_is_synthetic(expr: &syn::Expr) -> bool {
    match expr {
        syn::Expr::Path(p) => path_head_is_synthetic(&p.path),
        syn::Expr::Reference(r) => expr_is_synthetic(&r.expr),
        syn::Expr::Call(c) => expr_is_synthetic(&c.func),
        syn::Expr::MethodCall(mc) => expr_is_synthetic(&mc.receiver),
        _ => false,
    }
}

fn stmt_is_synthetic(stmt: &syn::Stmt) -> bool {
    match stmt {
        syn::Stmt::Local(local) => {
            pat_is_synthetic(&local.pat)
                || local
                    .init
                    .as_ref()
                    .is_some_and(|init| expr_is_synthetic(&init.expr))
        }
        syn::Stmt::Expr(expr, _) => expr_is_synthetic(expr),
        _ => false,
    }
}

struct Sweeper;

impl VisitMut for Sweeper {
    fn visit_block_mut(&mut self, block: &mut syn::Block) {
        block.stmts.retain(|s| !stmt_is_synthetic(s));
        syn::visit_mut::visit_block_mut(self, block);
    }

    // covers free fns, impl methods and trait method declarations alike
    fn visit_signature_mut(&mut self, sig: &mut syn::Signature) {
        let inputs = std::mem::take(&mut sig.inputs);
        sig.inputs = inputs
            .into_iter()
            .filter(|input| match input {
                syn::FnArg::Typed(pt) => !pat_is_synthetic(&pt.pat),
                syn::FnArg::Receiver(_) => true,
            })
            .collect();
        syn::visit_mut::visit_signature_mut(self, sig);
    }

    fn visit_expr_call_mut(&mut self, node: &mut syn::ExprCall) {
        let args = std::mem::take(&mut node.args);
        node.args = args
            .into_iter()
            .filter(|arg| !expr_is_synthetic(arg))
            .collect();
        syn::visit_mut::visit_expr_call_mut(self, node);
    }

    fn visit_expr_method_call_mut(&mut self, node: &mut syn::ExprMethodCall) {
        let args = std::mem::take(&mut node.args);
        node.args = args
            .into_iter()
            .filter(|arg| !expr_is_synthetic(arg))
            .collect();
        syn::visit_mut::visit_expr_method_call_mut(self, node);
    }

    fn visit_expr_closure_mut(&mut self, node: &mut syn::ExprClosure) {
        let inputs = std::mem::take(&mut node.inputs);
        node.inputs = inputs
            .into_iter()
            .filter(|pat| !pat_is_synthetic(pat))
            .collect();
        syn::visit_mut::visit_expr_closure_mut(self, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SourceFile;
    use std::path::PathBuf;

    fn prune(code: &str) -> String {
        let mut file = SourceFile {
            crate_name: "app".to_string(),
            path: PathBuf::from("src/main.rs"),
            ast: syn::parse_file(code).unwrap(),
        };
        Pruner.execute(&mut file, &AnalysisInfo::default());
        prettyplease::unparse(&file.ast)
    }

    #[test]
    fn removes_the_full_root_preamble() {
        let out = prune(
            r#"
            fn main() {
                let __atel_ts = __atel_otel::TracingState::init();
                let __atel_ts_shutdown = __atel_ts.shutdown_guard();
                __atel_otel::set_tracer_provider(&__atel_ts);
                let __atel_ctx = __atel_context::Context::background();
                let (__atel_child_tracing_ctx, __atel_span) =
                    __atel_otel::tracer("main").start(&__atel_ctx, "main");
                __atel_runtime::instrgen_set_tls(&__atel_child_tracing_ctx);
                let __atel_span_end = __atel_span.end_guard();
                do_work(__atel_child_tracing_ctx);
            }
            "#,
        );
        assert!(!out.contains("__atel_"));
        assert!(out.contains("do_work();"));
    }

    #[test]
    fn strips_params_args_and_imports() {
        let out = prune(
            r#"
            use tracegen_rt::context as __atel_context;
            fn do_work(__atel_tracing_ctx: __atel_context::Context, n: u32) -> u32 {
                helper(__atel_context::Context::background(), n)
            }
            "#,
        );
        assert!(out.contains("fn do_work(n: u32) -> u32"));
        assert!(out.contains("helper(n)"));
    }

    #[test]
    fn trait_and_impl_signatures_are_cleaned() {
        let out = prune(
            r#"
            trait Greeter {
                fn greet(&self, __atel_tracing_ctx: __atel_context::Context);
            }
            struct En;
            impl En {
                fn greet(&self, __atel_tracing_ctx: __atel_context::Context) {}
            }
            "#,
        );
        assert_eq!(out.matches("fn greet(&self)").count(), 2);
    }

    #[test]
    fn closures_lose_synthetic_params() {
        let out = prune(
            r#"
            fn f() {
                let g = |__atel_tracing_ctx: __atel_context::Context, x: u32| x + 1;
            }
            "#,
        );
        assert!(out.contains("|x: u32| x + 1"));
    }

    #[test]
    fn pruning_twice_changes_nothing() {
        let once = prune(
            r#"
            fn main() {
                let __atel_ctx = __atel_context::Context::background();
                work(__atel_ctx);
            }
            fn work() {}
            "#,
        );
        let twice = prune(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn untouched_code_survives_verbatim() {
        let out = prune("fn main() { let x = 1; helper(x); }\nfn helper(_x: i32) {}");
        assert!(out.contains("let x = 1;"));
        assert!(out.contains("helper(x);"));
    }
}

// Typed builders for every synthetic subtree the passes inject. Passes
// never assemble token streams ad hoc; each shape lives here once, so
// the pruner's structural matcher and these builders stay in agreement.

use proc_macro2::Span;
use syn::parse_quote;

use crate::rewrite::ImportDirective;

/// Prefix carried by every injected identifier and import alias.
pub const SYNTHETIC_PREFIX: &str = "__atel_";

pub const CONTEXT_ALIAS: &str = "__atel_context";
pub const OTEL_ALIAS: &str = "__atel_otel";
pub const RUNTIME_ALIAS: &str = "__atel_runtime";

pub const CONTEXT_PATH: &str = "tracegen_rt::context";
pub const OTEL_PATH: &str = "tracegen_rt::otel";
pub const RUNTIME_PATH: &str = "tracegen_rt::runtime";

fn name_lit(fn_name: &str) -> syn::LitStr {
    syn::LitStr::new(fn_name, Span::call_site())
}

/// The seven-statement root preamble: tracer state, deferred shutdown,
/// provider registration, background context, span start, task-local
/// store, deferred span end.
pub fn tracer_setup_stmts(fn_name: &str) -> Vec<syn::Stmt> {
    let lit = name_lit(fn_name);
    vec![
        parse_quote! { let __atel_ts = __atel_otel::TracingState::init(); },
        parse_quote! { let __atel_ts_shutdown = __atel_ts.shutdown_guard(); },
        parse_quote! { __atel_otel::set_tracer_provider(&__atel_ts); },
        parse_quote! { let __atel_ctx = __atel_context::Context::background(); },
        parse_quote! {
            let (__atel_child_tracing_ctx, __atel_span) =
                __atel_otel::tracer(#lit).start(&__atel_ctx, #lit);
        },
        parse_quote! { __atel_runtime::instrgen_set_tls(&__atel_child_tracing_ctx); },
        parse_quote! { let __atel_span_end = __atel_span.end_guard(); },
    ]
}

/// The four-statement preamble for instrumented non-root functions. The
/// typed retrieval shadows the propagated parameter of the same name, so
/// both the threaded context and the task-local one stay addressable.
pub fn span_wrap_stmts(fn_name: &str) -> Vec<syn::Stmt> {
    let lit = name_lit(fn_name);
    vec![
        parse_quote! {
            let __atel_tracing_ctx: __atel_context::Context = __atel_runtime::instrgen_get_tls();
        },
        parse_quote! {
            let (__atel_child_tracing_ctx, __atel_span) =
                __atel_otel::tracer(#lit).start(&__atel_tracing_ctx, #lit);
        },
        parse_quote! { __atel_runtime::instrgen_set_tls(&__atel_child_tracing_ctx); },
        parse_quote! { let __atel_span_end = __atel_span.end_guard(); },
    ]
}

/// The propagated leading parameter.
pub fn context_param() -> syn::FnArg {
    parse_quote! { __atel_tracing_ctx: __atel_context::Context }
}

/// Argument threaded from an in-scope caller.
pub fn child_context_arg() -> syn::Expr {
    parse_quote! { __atel_child_tracing_ctx }
}

/// Argument forwarded by an in-scope caller whose own span preamble was
/// deselected; without a `__atel_child_tracing_ctx` binding the received
/// parameter is passed along unchanged.
pub fn received_context_arg() -> syn::Expr {
    parse_quote! { __atel_tracing_ctx }
}

/// Argument passed from callers outside the instrumented region.
pub fn background_context_arg() -> syn::Expr {
    parse_quote! { __atel_context::Context::background() }
}

pub fn instrumentation_imports() -> Vec<ImportDirective> {
    vec![
        ImportDirective::add(CONTEXT_ALIAS, CONTEXT_PATH),
        ImportDirective::add(OTEL_ALIAS, OTEL_PATH),
        ImportDirective::add(RUNTIME_ALIAS, RUNTIME_PATH),
    ]
}

pub fn context_import() -> Vec<ImportDirective> {
    vec![ImportDirective::add(CONTEXT_ALIAS, CONTEXT_PATH)]
}

pub fn pruned_imports() -> Vec<ImportDirective> {
    vec![
        ImportDirective::remove(CONTEXT_ALIAS),
        ImportDirective::remove(OTEL_ALIAS),
        ImportDirective::remove(RUNTIME_ALIAS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_preamble_has_seven_statements() {
        assert_eq!(tracer_setup_stmts("main").len(), 7);
    }

    #[test]
    fn span_preamble_has_four_statements() {
        assert_eq!(span_wrap_stmts("do_work").len(), 4);
    }

    #[test]
    fn every_injected_binding_carries_the_prefix() {
        for stmt in tracer_setup_stmts("main") {
            if let syn::Stmt::Local(local) = stmt {
                match &local.pat {
                    syn::Pat::Ident(pi) => {
                        assert!(pi.ident.to_string().starts_with(SYNTHETIC_PREFIX))
                    }
                    syn::Pat::Tuple(t) => {
                        for elem in &t.elems {
                            if let syn::Pat::Ident(pi) = elem {
                                assert!(pi.ident.to_string().starts_with(SYNTHETIC_PREFIX));
                            }
                        }
                    }
                    syn::Pat::Type(pt) => {
                        if let syn::Pat::Ident(pi) = &*pt.pat {
                            assert!(pi.ident.to_string().starts_with(SYNTHETIC_PREFIX));
                        }
                    }
                    other => panic!("unexpected pattern {other:?}"),
                }
            }
        }
    }

    #[test]
    fn span_name_comes_from_the_function() {
        let stmts = span_wrap_stmts("helper");
        let rendered = quote::quote!(#(#stmts)*).to_string();
        assert!(rendered.contains("\"helper\""));
    }
}

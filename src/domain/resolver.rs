// Identifier and call-target resolution over the parsed program model.
//
// The analysis has no full type checker behind it; resolution is the
// conservative, name-directed kind: typed parameters, `self`, and simple
// `let` bindings give receiver types, and anything that stays unresolved
// is skipped silently (calls into externals and builtins are expected to
// miss).

use std::collections::{HashMap, HashSet};

use quote::quote;
use syn::visit::Visit;

use crate::domain::descriptor::FuncDescriptor;

/// `trait name -> concrete types known to implement it`, built by
/// interface resolution and consulted here to widen dispatch.
pub type InterfaceImplMap = HashMap<String, Vec<String>>;

/// Render a signature into the normalized form stored on descriptors,
/// e.g. `fn(&Self, i32) -> bool`. The function name is deliberately not
/// part of the rendering; it lives in its own descriptor field.
pub fn signature_string(sig: &syn::Signature) -> String {
    let mut params = Vec::new();
    for input in &sig.inputs {
        match input {
            syn::FnArg::Receiver(recv) => {
                let rendered = if recv.reference.is_some() {
                    if recv.mutability.is_some() {
                        "&mut Self"
                    } else {
                        "&Self"
                    }
                } else {
                    "Self"
                };
                params.push(rendered.to_string());
            }
            syn::FnArg::Typed(pt) => params.push(type_tokens(&pt.ty)),
        }
    }
    match &sig.output {
        syn::ReturnType::Default => format!("fn({})", params.join(", ")),
        syn::ReturnType::Type(_, ty) => {
            format!("fn({}) -> {}", params.join(", "), type_tokens(ty))
        }
    }
}

fn type_tokens(ty: &syn::Type) -> String {
    quote!(#ty).to_string()
}

/// Strip references, pointers, slices and wrappers down to the bare type
/// (or trait-object bound) name. `&mut [Foo]` resolves to `Foo`; calls
/// through an index or borrow land on the same descriptor as direct ones.
pub fn type_name_of(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Reference(r) => type_name_of(&r.elem),
        syn::Type::Paren(p) => type_name_of(&p.elem),
        syn::Type::Group(g) => type_name_of(&g.elem),
        syn::Type::Slice(s) => type_name_of(&s.elem),
        syn::Type::Array(a) => type_name_of(&a.elem),
        syn::Type::Ptr(p) => type_name_of(&p.elem),
        syn::Type::Path(tp) => tp.path.segments.last().map(|s| s.ident.to_string()),
        syn::Type::TraitObject(t) => first_bound_name(t.bounds.iter()),
        syn::Type::ImplTrait(t) => first_bound_name(t.bounds.iter()),
        _ => None,
    }
}

fn first_bound_name<'a>(
    bounds: impl Iterator<Item = &'a syn::TypeParamBound>,
) -> Option<String> {
    for bound in bounds {
        if let syn::TypeParamBound::Trait(tb) = bound {
            return tb.path.segments.last().map(|s| s.ident.to_string());
        }
    }
    None
}

/// Build the descriptor for a function declaration. Every walker and pass
/// goes through this one helper so descriptors computed at declaration
/// sites, call sites and rewrite sites always agree.
pub fn describe_fn(
    crate_name: &str,
    receiver: Option<&str>,
    sig: &syn::Signature,
    source_file: &str,
) -> FuncDescriptor {
    FuncDescriptor {
        package: crate_name.to_string(),
        receiver: receiver.map(|r| r.to_string()),
        name: sig.ident.to_string(),
        signature: signature_string(sig),
        source_file: source_file.to_string(),
        source_line: sig.ident.span().start().line,
    }
}

/// Local variable types visible inside one function body.
#[derive(Debug, Default)]
pub struct FnScope {
    vars: HashMap<String, String>,
}

impl FnScope {
    /// Collect parameter and `let` binding types for one function.
    /// `self_ty` is the enclosing impl/trait type, when there is one.
    pub fn of_fn(
        sig: &syn::Signature,
        self_ty: Option<&str>,
        block: Option<&syn::Block>,
    ) -> Self {
        let mut scope = FnScope::default();
        if let Some(ty) = self_ty {
            scope.vars.insert("self".to_string(), ty.to_string());
        }
        for input in &sig.inputs {
            if let syn::FnArg::Typed(pt) = input {
                if let (syn::Pat::Ident(pi), Some(ty)) = (&*pt.pat, type_name_of(&pt.ty)) {
                    scope.vars.insert(pi.ident.to_string(), ty);
                }
            }
        }
        if let Some(block) = block {
            let mut collector = LetCollector { scope: &mut scope };
            collector.visit_block(block);
        }
        scope
    }

    pub fn type_of(&self, var: &str) -> Option<&str> {
        self.vars.get(var).map(|s| s.as_str())
    }
}

struct LetCollector<'a> {
    scope: &'a mut FnScope,
}

impl<'a, 'ast> Visit<'ast> for LetCollector<'a> {
    fn visit_local(&mut self, local: &'ast syn::Local) {
        let (ident, explicit_ty) = match &local.pat {
            syn::Pat::Ident(pi) => (Some(pi.ident.to_string()), None),
            syn::Pat::Type(pt) => match &*pt.pat {
                syn::Pat::Ident(pi) => (Some(pi.ident.to_string()), type_name_of(&pt.ty)),
                _ => (None, None),
            },
            _ => (None, None),
        };
        if let Some(ident) = ident {
            let inferred = explicit_ty.or_else(|| {
                local
                    .init
                    .as_ref()
                    .and_then(|init| infer_expr_type(&init.expr))
            });
            if let Some(ty) = inferred {
                self.scope.vars.insert(ident, ty);
            }
        }
        syn::visit::visit_local(self, local);
    }

    // Items nested inside the body have their own scopes.
    fn visit_item_fn(&mut self, _node: &'ast syn::ItemFn) {}
}

fn infer_expr_type(expr: &syn::Expr) -> Option<String> {
    match expr {
        syn::Expr::Reference(r) => infer_expr_type(&r.expr),
        syn::Expr::Paren(p) => infer_expr_type(&p.expr),
        syn::Expr::Struct(es) => es.path.segments.last().map(|s| s.ident.to_string()),
        syn::Expr::Cast(c) => type_name_of(&c.ty),
        syn::Expr::Call(call) => {
            // `Type::new(..)` style constructors
            if let syn::Expr::Path(path) = &*call.func {
                let segs: Vec<&syn::PathSegment> = path.path.segments.iter().collect();
                if segs.len() >= 2 {
                    let qualifier = &segs[segs.len() - 2].ident;
                    let text = qualifier.to_string();
                    if text.chars().next().is_some_and(|c| c.is_uppercase()) {
                        return Some(text);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Registry of every known function declaration, indexed for the three
/// resolution shapes: plain calls, qualified path calls, method calls.
#[derive(Debug, Default)]
pub struct DeclIndex {
    known: HashSet<FuncDescriptor>,
    by_plain: HashMap<String, Vec<FuncDescriptor>>,
    by_typed: HashMap<(String, String), FuncDescriptor>,
}

impl DeclIndex {
    pub fn register(&mut self, desc: FuncDescriptor) {
        if self.known.contains(&desc) {
            return;
        }
        match &desc.receiver {
            Some(recv) => {
                self.by_typed
                    .insert((recv.clone(), desc.name.clone()), desc.clone());
            }
            None => {
                self.by_plain
                    .entry(desc.name.clone())
                    .or_default()
                    .push(desc.clone());
            }
        }
        self.known.insert(desc);
    }

    pub fn contains(&self, desc: &FuncDescriptor) -> bool {
        self.known.contains(desc)
    }

    pub fn all(&self) -> impl Iterator<Item = &FuncDescriptor> {
        self.known.iter()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Look a declaration up by its `type_hash()` string, the key the
    /// control panel sends back when designating an entry point.
    pub fn find_by_type_hash(&self, hash: &str) -> Option<&FuncDescriptor> {
        self.known.iter().find(|d| d.type_hash() == hash)
    }

    pub fn resolve_plain(&self, name: &str, caller_crate: &str) -> Option<&FuncDescriptor> {
        let candidates = self.by_plain.get(name)?;
        candidates
            .iter()
            .find(|d| d.package == caller_crate)
            .or_else(|| candidates.first())
    }

    fn resolve_plain_in_crate(&self, name: &str, crate_name: &str) -> Option<&FuncDescriptor> {
        self.by_plain
            .get(name)?
            .iter()
            .find(|d| d.package == crate_name)
    }

    pub fn resolve_method(&self, type_name: &str, method: &str) -> Option<&FuncDescriptor> {
        self.by_typed
            .get(&(type_name.to_string(), method.to_string()))
    }
}

/// One call site, in either of the two syntactic shapes syn gives us.
pub enum CallSite<'a> {
    /// `foo(..)`, `module::foo(..)`, `Type::method(..)`
    Path(&'a syn::ExprPath),
    /// `receiver.method(..)`
    Method {
        receiver: &'a syn::Expr,
        method: &'a syn::Ident,
    },
}

/// Resolve one call site to the set of declared callee descriptors.
///
/// A dispatch through a trait-typed receiver yields the trait-keyed
/// descriptor plus one descriptor per registered concrete implementation,
/// so a single call site may produce several targets. Anything that does
/// not resolve to a known declaration yields nothing.
pub fn call_targets(
    site: CallSite<'_>,
    scope: &FnScope,
    caller_crate: &str,
    decls: &DeclIndex,
    impls: &InterfaceImplMap,
) -> Vec<FuncDescriptor> {
    let mut out = Vec::new();
    match site {
        CallSite::Path(path) => {
            let segs: Vec<String> = path
                .path
                .segments
                .iter()
                .map(|s| s.ident.to_string())
                .collect();
            match segs.as_slice() {
                [name] => {
                    if let Some(d) = decls.resolve_plain(name, caller_crate) {
                        out.push(d.clone());
                    }
                }
                [.., qualifier, name] => {
                    if let Some(d) = decls.resolve_method(qualifier, name) {
                        out.push(d.clone());
                        widen_through_trait(qualifier, name, decls, impls, &mut out);
                    } else {
                        let crate_hint = if qualifier == "crate" || qualifier == "self" {
                            caller_crate
                        } else {
                            qualifier.as_str()
                        };
                        let found = decls
                            .resolve_plain_in_crate(name, crate_hint)
                            .or_else(|| decls.resolve_plain_in_crate(name, caller_crate));
                        if let Some(d) = found {
                            out.push(d.clone());
                        }
                    }
                }
                [] => {}
            }
        }
        CallSite::Method { receiver, method } => {
            if let Some(recv_ty) = receiver_type(receiver, scope) {
                let name = method.to_string();
                if let Some(d) = decls.resolve_method(&recv_ty, &name) {
                    out.push(d.clone());
                }
                widen_through_trait(&recv_ty, &name, decls, impls, &mut out);
            }
        }
    }
    out
}

fn widen_through_trait(
    type_or_trait: &str,
    method: &str,
    decls: &DeclIndex,
    impls: &InterfaceImplMap,
    out: &mut Vec<FuncDescriptor>,
) {
    if let Some(concrete_types) = impls.get(type_or_trait) {
        for ty in concrete_types {
            if let Some(d) = decls.resolve_method(ty, method) {
                if !out.contains(d) {
                    out.push(d.clone());
                }
            }
        }
    }
}

fn receiver_type(receiver: &syn::Expr, scope: &FnScope) -> Option<String> {
    match receiver {
        syn::Expr::Reference(r) => receiver_type(&r.expr, scope),
        syn::Expr::Paren(p) => receiver_type(&p.expr, scope),
        syn::Expr::Path(path) => {
            let ident = path.path.get_ident()?;
            scope.type_of(&ident.to_string()).map(|s| s.to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_sig(src: &str) -> syn::Signature {
        let f: syn::ItemFn = syn::parse_str(src).unwrap();
        f.sig
    }

    #[test]
    fn signature_rendering_is_stable() {
        let sig = parse_sig("fn f(a: i32, b: &str) -> bool { true }");
        assert_eq!(signature_string(&sig), "fn(i32, & str) -> bool");

        let unit = parse_sig("fn g() {}");
        assert_eq!(signature_string(&unit), "fn()");
    }

    #[test]
    fn scope_sees_params_lets_and_self() {
        let f: syn::ItemFn = syn::parse_str(
            r#"
            fn f(srv: &Server) {
                let w = Worker::new();
                let g: &dyn Greeter = &En;
                let plain = 42;
            }
            "#,
        )
        .unwrap();
        let scope = FnScope::of_fn(&f.sig, Some("Owner"), Some(&f.block));
        assert_eq!(scope.type_of("srv"), Some("Server"));
        assert_eq!(scope.type_of("w"), Some("Worker"));
        assert_eq!(scope.type_of("g"), Some("Greeter"));
        assert_eq!(scope.type_of("self"), Some("Owner"));
        assert_eq!(scope.type_of("plain"), None);
    }

    #[test]
    fn plain_calls_prefer_the_caller_crate() {
        let mut decls = DeclIndex::default();
        let sig = parse_sig("fn work() {}");
        decls.register(describe_fn("lib_a", None, &sig, "a.rs"));
        decls.register(describe_fn("lib_b", None, &sig, "b.rs"));

        let hit = decls.resolve_plain("work", "lib_b").unwrap();
        assert_eq!(hit.package, "lib_b");
        // unknown caller crate falls back to the first registration
        assert!(decls.resolve_plain("work", "lib_z").is_some());
    }

    #[test]
    fn method_calls_widen_through_traits() {
        let mut decls = DeclIndex::default();
        let sig = parse_sig("fn greet(&self) {}");
        let trait_sig = describe_fn("app", Some("Greeter"), &sig, "t.rs");
        let concrete = describe_fn("app", Some("En"), &sig, "t.rs");
        decls.register(trait_sig.clone());
        decls.register(concrete.clone());

        let mut impls = InterfaceImplMap::new();
        impls.insert("Greeter".to_string(), vec!["En".to_string()]);

        let expr: syn::Expr = syn::parse_str("g.greet()").unwrap();
        let (receiver, method) = match &expr {
            syn::Expr::MethodCall(mc) => (&*mc.receiver, &mc.method),
            _ => unreachable!(),
        };
        let mut scope = FnScope::default();
        scope.vars.insert("g".to_string(), "Greeter".to_string());

        let targets = call_targets(
            CallSite::Method { receiver, method },
            &scope,
            "app",
            &decls,
            &impls,
        );
        assert!(targets.contains(&trait_sig));
        assert!(targets.contains(&concrete));
    }

    #[test]
    fn unresolved_receivers_yield_no_targets() {
        let decls = DeclIndex::default();
        let impls = InterfaceImplMap::new();
        let expr: syn::Expr = syn::parse_str("mystery.run()").unwrap();
        let (receiver, method) = match &expr {
            syn::Expr::MethodCall(mc) => (&*mc.receiver, &mc.method),
            _ => unreachable!(),
        };
        let targets = call_targets(
            CallSite::Method { receiver, method },
            &FnScope::default(),
            "app",
            &decls,
            &impls,
        );
        assert!(targets.is_empty());
    }
}

// Reverse call graph over declared functions.
//
// Edges point callee -> callers, matching the way pruning and context
// propagation want to walk it; `forward()` inverts for reachability and
// for rendering the control panel tree.

use std::collections::{HashMap, HashSet, VecDeque};

use syn::visit::Visit;

use crate::domain::descriptor::FuncDescriptor;
use crate::domain::model::ProgramModel;
use crate::domain::resolver::{
    call_targets, describe_fn, CallSite, DeclIndex, FnScope, InterfaceImplMap,
};

#[derive(Debug, Default)]
pub struct CallGraph {
    edges: HashMap<FuncDescriptor, Vec<FuncDescriptor>>,
}

impl CallGraph {
    pub fn new() -> Self {
        CallGraph::default()
    }

    /// Insert `callee <- caller`, once per pair.
    pub fn add_edge(&mut self, callee: FuncDescriptor, caller: FuncDescriptor) {
        let callers = self.edges.entry(callee).or_default();
        if !callers.contains(&caller) {
            callers.push(caller);
        }
    }

    pub fn callers(&self, callee: &FuncDescriptor) -> &[FuncDescriptor] {
        self.edges.get(callee).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FuncDescriptor, &Vec<FuncDescriptor>)> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn is_member(&self, desc: &FuncDescriptor) -> bool {
        self.edges.contains_key(desc) || self.edges.values().any(|cs| cs.contains(desc))
    }

    /// Invert into `caller -> callees`.
    pub fn forward(&self) -> HashMap<FuncDescriptor, Vec<FuncDescriptor>> {
        let mut fwd: HashMap<FuncDescriptor, Vec<FuncDescriptor>> = HashMap::new();
        for (callee, callers) in &self.edges {
            for caller in callers {
                let callees = fwd.entry(caller.clone()).or_default();
                if !callees.contains(callee) {
                    callees.push(callee.clone());
                }
            }
        }
        fwd
    }

    /// Everything reachable from any of the given roots, roots included.
    /// Computed once per analysis; the passes share the resulting set.
    pub fn reachable_from(&self, roots: &[FuncDescriptor]) -> HashSet<FuncDescriptor> {
        let fwd = self.forward();
        let mut seen: HashSet<FuncDescriptor> = roots.iter().cloned().collect();
        let mut queue: VecDeque<FuncDescriptor> = roots.iter().cloned().collect();
        while let Some(current) = queue.pop_front() {
            if let Some(callees) = fwd.get(&current) {
                for callee in callees {
                    if seen.insert(callee.clone()) {
                        queue.push_back(callee.clone());
                    }
                }
            }
        }
        seen
    }

    /// Plain-text dump, `callee <- callers`, sorted for stable output.
    pub fn dump_text(&self) -> String {
        let mut lines: Vec<String> = self
            .edges
            .iter()
            .map(|(callee, callers)| {
                let mut froms: Vec<String> = callers.iter().map(|c| c.type_hash()).collect();
                froms.sort();
                format!("{} <- {}", callee.type_hash(), froms.join(", "))
            })
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

/// Declaration pass: register every free function, every impl method, and
/// a trait-keyed descriptor per trait method so dynamic dispatch has a
/// node to land on.
pub fn find_func_decls(model: &ProgramModel) -> DeclIndex {
    let mut decls = DeclIndex::default();
    for desc in model.symbols.definitions.values() {
        decls.register(desc.clone());
    }
    for desc in model.symbols.selections.values() {
        decls.register(desc.clone());
    }
    for (trait_name, decl) in &model.symbols.interfaces {
        for method in &decl.methods {
            decls.register(FuncDescriptor {
                package: decl.crate_name.clone(),
                receiver: Some(trait_name.clone()),
                name: method.name.clone(),
                signature: method.signature.clone(),
                source_file: decl.source_file.clone(),
                source_line: decl.source_line,
            });
        }
    }
    decls
}

/// Edge pass: re-walk every body with the enclosing function tracked and
/// resolve each call site against the declaration index.
pub fn build_call_graph(
    model: &ProgramModel,
    decls: &DeclIndex,
    impls: &InterfaceImplMap,
) -> CallGraph {
    let mut graph = CallGraph::new();
    for sf in &model.files {
        let file = sf.path.display().to_string();
        let mut walker = EdgeWalker {
            crate_name: &sf.crate_name,
            file: &file,
            decls,
            impls,
            graph: &mut graph,
            current: None,
            self_ty: None,
            scope: FnScope::default(),
        };
        walker.visit_file(&sf.ast);
    }
    graph
}

struct EdgeWalker<'a> {
    crate_name: &'a str,
    file: &'a str,
    decls: &'a DeclIndex,
    impls: &'a InterfaceImplMap,
    graph: &'a mut CallGraph,
    current: Option<FuncDescriptor>,
    self_ty: Option<String>,
    scope: FnScope,
}

impl<'a> EdgeWalker<'a> {
    fn record(&mut self, site: CallSite<'_>) {
        let Some(caller) = self.current.clone() else {
            return;
        };
        for callee in call_targets(site, &self.scope, self.crate_name, self.decls, self.impls) {
            self.graph.add_edge(callee, caller.clone());
        }
    }
}

impl<'a, 'ast> Visit<'ast> for EdgeWalker<'a> {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        let desc = describe_fn(self.crate_name, None, &node.sig, self.file);
        let prev_fn = self.current.replace(desc);
        let prev_scope = std::mem::replace(
            &mut self.scope,
            FnScope::of_fn(&node.sig, None, Some(&node.block)),
        );
        syn::visit::visit_item_fn(self, node);
        self.current = prev_fn;
        self.scope = prev_scope;
    }

    fn visit_item_impl(&mut self, node: &'ast syn::ItemImpl) {
        let prev = self.self_ty.take();
        self.self_ty = crate::domain::resolver::type_name_of(&node.self_ty);
        syn::visit::visit_item_impl(self, node);
        self.self_ty = prev;
    }

    fn visit_item_trait(&mut self, node: &'ast syn::ItemTrait) {
        // default method bodies attribute to the trait-keyed descriptor
        let prev = self.self_ty.take();
        self.self_ty = Some(node.ident.to_string());
        syn::visit::visit_item_trait(self, node);
        self.self_ty = prev;
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        let self_ty = self.self_ty.clone();
        let desc = describe_fn(self.crate_name, self_ty.as_deref(), &node.sig, self.file);
        let prev_fn = self.current.replace(desc);
        let prev_scope = std::mem::replace(
            &mut self.scope,
            FnScope::of_fn(&node.sig, self_ty.as_deref(), Some(&node.block)),
        );
        syn::visit::visit_impl_item_fn(self, node);
        self.current = prev_fn;
        self.scope = prev_scope;
    }

    fn visit_trait_item_fn(&mut self, node: &'ast syn::TraitItemFn) {
        let self_ty = self.self_ty.clone();
        let desc = describe_fn(self.crate_name, self_ty.as_deref(), &node.sig, self.file);
        let prev_fn = self.current.replace(desc);
        let prev_scope = std::mem::replace(
            &mut self.scope,
            FnScope::of_fn(&node.sig, self_ty.as_deref(), node.default.as_ref()),
        );
        syn::visit::visit_trait_item_fn(self, node);
        self.current = prev_fn;
        self.scope = prev_scope;
    }

    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let syn::Expr::Path(path) = &*node.func {
            self.record(CallSite::Path(path));
        }
        syn::visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        self.record(CallSite::Method {
            receiver: &node.receiver,
            method: &node.method,
        });
        syn::visit::visit_expr_method_call(self, node);
    }
}

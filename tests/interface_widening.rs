// Dispatch through a trait object must pull every known implementation
// into the instrumented region, and trait signatures must change in step
// with their implementations.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracegen::application::{self, AnalysisRequest};

const DEMO: &str = r#"
trait Greeter {
    fn greet(&self);
}

struct En;

impl En {
    fn greet(&self) {
        format_greeting();
    }
}

fn format_greeting() {}

fn main() {
    rtlib::AutotelEntryPoint();
    let g: &dyn Greeter = &En;
    g.greet();
}
"#;

fn write_project(code: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.rs"), code).unwrap();
    dir
}

fn request_for(dir: &Path) -> AnalysisRequest {
    AnalysisRequest {
        project_paths: vec![dir.display().to_string()],
        package_pattern: String::new(),
        debug: false,
        roots_override: None,
        selected: HashSet::new(),
    }
}

#[test]
fn dyn_call_reaches_trait_and_concrete_descriptors() {
    let dir = write_project(DEMO);
    let analysis = application::make_analysis(&request_for(dir.path())).unwrap();
    let info = &analysis.info;

    let trait_keyed = info.decls.all().find(|d| {
        d.receiver.as_deref() == Some("Greeter") && d.name == "greet"
    });
    let concrete = info
        .decls
        .all()
        .find(|d| d.receiver.as_deref() == Some("En") && d.name == "greet");
    let trait_keyed = trait_keyed.unwrap().clone();
    let concrete = concrete.unwrap().clone();

    assert_eq!(info.graph.callers(&trait_keyed).len(), 1);
    assert_eq!(info.graph.callers(&concrete).len(), 1);
    assert!(info.reachable.contains(&trait_keyed));
    assert!(info.reachable.contains(&concrete));

    // callees of the concrete method are reachable through it
    let formatted = info
        .decls
        .all()
        .find(|d| d.name == "format_greeting")
        .unwrap();
    assert!(info.reachable.contains(formatted));
}

#[test]
fn inject_instruments_concrete_method_and_widens_signatures() {
    let dir = write_project(DEMO);
    application::inject(&request_for(dir.path())).unwrap();
    let rewritten = fs::read_to_string(dir.path().join("main.rs")).unwrap();

    // span wrapper inside the concrete implementation
    assert!(rewritten.contains("\"greet\""));
    // both the trait declaration and the implementation gained the param
    assert_eq!(
        rewritten
            .matches("fn greet(&self, __atel_tracing_ctx: __atel_context::Context)")
            .count(),
        2
    );
    // the dyn call site threads the child context
    assert!(rewritten.contains("g.greet(__atel_child_tracing_ctx);"));
    // and the method's own callee is threaded too
    assert!(rewritten.contains("format_greeting(__atel_child_tracing_ctx);"));
}

#[test]
fn prune_undoes_the_widened_signatures() {
    let dir = write_project(DEMO);
    let req = request_for(dir.path());
    application::inject(&req).unwrap();
    application::prune(&req).unwrap();
    let pruned = fs::read_to_string(dir.path().join("main.rs")).unwrap();
    assert_eq!(
        pruned,
        prettyplease::unparse(&syn::parse_file(DEMO).unwrap())
    );
}

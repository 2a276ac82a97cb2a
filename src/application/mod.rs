// Use-case layer: the driver commands shared by the CLI and the control
// panel server. Each one loads sources, builds the analysis once, and
// runs the relevant rewrite passes.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use log::info;

use crate::domain::callgraph::{build_call_graph, find_func_decls};
use crate::domain::descriptor::FuncDescriptor;
use crate::domain::interfaces::resolve_implementations;
use crate::domain::model::ProgramModel;
use crate::domain::roots::{find_root_functions, DEFAULT_ENTRY_POINT_LABEL};
use crate::infrastructure::command_file::InterceptorConfig;
use crate::infrastructure::logsink;
use crate::infrastructure::project_loader::ProjectLoader;
use crate::ports::cfg_exporter::CfgExporter;
use crate::ports::GraphExporter;
use crate::rewrite::context::ContextPropagation;
use crate::rewrite::instrument::Instrumentation;
use crate::rewrite::prune::Pruner;
use crate::rewrite::{Analysis, AnalysisInfo};

pub const PASS_SUFFIX_PRUNER: &str = "_pass_pruner";
pub const PASS_SUFFIX_CTX: &str = "_pass_ctx";
pub const PASS_SUFFIX_TRACING: &str = "_pass_tracing";

/// Everything a driver command needs to know about what to analyze.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub project_paths: Vec<String>,
    pub package_pattern: String,
    /// Dump-intermediate mode: suffixed outputs are kept, originals stay.
    pub debug: bool,
    /// Entry points designated by `type_hash()` instead of inferred from
    /// the sentinel call.
    pub roots_override: Option<Vec<String>>,
    /// Control-panel function selection; empty selects everything.
    pub selected: HashSet<String>,
}

/// Split the CLI's comma-separated project path list.
pub fn split_project_paths(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load, parse and analyze once. The returned `Analysis` owns the ASTs
/// the passes will mutate plus the shared immutable pass view.
pub fn make_analysis(req: &AnalysisRequest) -> Result<Analysis> {
    let sources = ProjectLoader::load_many(&req.project_paths, &req.package_pattern)?;
    if sources.is_empty() {
        bail!(
            "no sources matched paths {:?} with pattern {:?}",
            req.project_paths,
            req.package_pattern
        );
    }
    let model = ProgramModel::build(&sources);
    let impls = resolve_implementations(&model.symbols);
    let decls = find_func_decls(&model);
    let graph = build_call_graph(&model, &decls, &impls);

    let roots = match &req.roots_override {
        Some(hashes) => {
            let mut roots = Vec::new();
            for hash in hashes {
                match decls.find_by_type_hash(hash) {
                    Some(desc) => roots.push(desc.clone()),
                    None => bail!("designated entry point {hash} is not a known function"),
                }
            }
            roots
        }
        None => find_root_functions(&model, DEFAULT_ENTRY_POINT_LABEL),
    };
    let reachable = graph.reachable_from(&roots);

    info!(
        "analysis: {} files, {} declarations, {} graph nodes, {} roots",
        model.files.len(),
        decls.len(),
        graph.len(),
        roots.len()
    );
    logsink::line(&format!(
        "analysis: {} files, {} declarations, {} roots",
        model.files.len(),
        decls.len(),
        roots.len()
    ));

    Ok(Analysis {
        files: model.files,
        info: AnalysisInfo {
            decls,
            graph,
            impls,
            roots,
            reachable,
            selected: req.selected.clone(),
        },
        debug: req.debug,
    })
}

/// Inject instrumentation. Runs the pruner first so repeated injections
/// are equivalent to one, then span injection, then context propagation,
/// then a parse check over the rewritten files.
pub fn inject(req: &AnalysisRequest) -> Result<()> {
    let prune_req = AnalysisRequest {
        debug: false,
        ..req.clone()
    };
    make_analysis(&prune_req)?.execute(&Pruner, PASS_SUFFIX_PRUNER)?;

    let mut analysis = make_analysis(req)?;
    if analysis.info.roots.is_empty() {
        logsink::line("inject: no entry points found, sources left unchanged");
    }
    analysis.execute(&Instrumentation, PASS_SUFFIX_TRACING)?;
    analysis.execute(&ContextPropagation, PASS_SUFFIX_CTX)?;
    if !req.debug {
        check_sema(&analysis)?;
    }
    logsink::line("inject: done");
    Ok(())
}

/// Remove every synthetic artifact, restoring the pre-injection sources
/// modulo formatting.
pub fn prune(req: &AnalysisRequest) -> Result<()> {
    let mut analysis = make_analysis(req)?;
    analysis.execute(&Pruner, PASS_SUFFIX_PRUNER)?;
    logsink::line("prune: done");
    Ok(())
}

/// Text dump of the call graph, `callee <- callers`.
pub fn dump_cfg(req: &AnalysisRequest) -> Result<String> {
    let analysis = make_analysis(req)?;
    let dump = analysis.info.graph.dump_text();
    logsink::line(&dump);
    Ok(dump)
}

pub fn root_functions(req: &AnalysisRequest) -> Result<Vec<FuncDescriptor>> {
    let analysis = make_analysis(req)?;
    Ok(analysis.info.roots)
}

/// Render the interactive call-graph page.
pub fn generate_cfg(req: &AnalysisRequest, output: &str) -> Result<()> {
    let analysis = make_analysis(req)?;
    if let Some(parent) = Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let exporter: &dyn GraphExporter = &CfgExporter;
    exporter
        .export(&analysis.info.graph, &analysis.info.roots, output)
        .with_context(|| format!("writing {output}"))?;
    info!("wrote call graph page to {output}");
    Ok(())
}

/// Inject with a UI-designated entry point and function selection.
pub fn inject_with_root(
    req: &AnalysisRequest,
    entrypoint: &str,
    funcset: &[String],
) -> Result<()> {
    let mut scoped = req.clone();
    if !entrypoint.is_empty() {
        scoped.roots_override = Some(vec![entrypoint.to_string()]);
    }
    scoped.selected = funcset.iter().cloned().collect();
    inject(&scoped)
}

/// Rewrite exactly the files of one intercepted compile step. The
/// analysis still covers the whole configured project so propagation
/// decisions match a full `inject`, but only the step's own files are
/// serialized back.
pub fn rewrite_compile_step(config: &InterceptorConfig, files: &[String]) -> Result<()> {
    let req = AnalysisRequest {
        project_paths: config.project_paths.clone(),
        package_pattern: config.package_pattern.clone(),
        ..Default::default()
    };
    let keep: HashSet<String> = files.iter().map(|f| canonical(f)).collect();

    let mut pruned = make_analysis(&req)?;
    retain_files(&mut pruned, &keep);
    pruned.execute(&Pruner, PASS_SUFFIX_PRUNER)?;

    if config.command == "prune" {
        return Ok(());
    }

    let mut analysis = make_analysis(&req)?;
    retain_files(&mut analysis, &keep);
    analysis.execute(&Instrumentation, PASS_SUFFIX_TRACING)?;
    analysis.execute(&ContextPropagation, PASS_SUFFIX_CTX)?;
    check_sema(&analysis)
}

fn canonical(path: &str) -> String {
    fs::canonicalize(path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.to_string())
}

fn retain_files(analysis: &mut Analysis, keep: &HashSet<String>) {
    analysis
        .files
        .retain(|sf| keep.contains(&canonical(&sf.path.display().to_string())));
}

/// Re-parse everything just written; a file the parser rejects aborts
/// the command before the build tool ever sees it.
fn check_sema(analysis: &Analysis) -> Result<()> {
    for sf in &analysis.files {
        let text = fs::read_to_string(&sf.path)
            .with_context(|| format!("re-reading {}", sf.path.display()))?;
        syn::parse_file(&text)
            .with_context(|| format!("semantic check failed for {}", sf.path.display()))?;
    }
    Ok(())
}

/// OTEL environment for `run`.
#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub service_name: String,
    pub traces_exporter: String,
    pub otlp_endpoint: String,
    pub zipkin_endpoint: String,
}

/// Run a build command inside the project, streaming its output to the
/// analysis log.
pub fn run_build(project_dir: &str, build_cmd: &str) -> Result<()> {
    let mut parts = build_cmd.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("empty build command");
    };
    let output = Command::new(program)
        .args(parts)
        .current_dir(project_dir)
        .output()
        .with_context(|| format!("executing {build_cmd}"))?;
    logsink::line(&String::from_utf8_lossy(&output.stdout));
    logsink::line(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        bail!("build failed with status {:?}", output.status.code());
    }
    Ok(())
}

/// Run the instrumented program with the requested OTEL environment.
pub fn run_program(project_dir: &str, settings: &RunSettings) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("run").current_dir(project_dir);
    if !settings.service_name.is_empty() {
        cmd.env("OTEL_SERVICE_NAME", &settings.service_name);
    }
    if !settings.traces_exporter.is_empty() {
        cmd.env("OTEL_TRACES_EXPORTER", &settings.traces_exporter);
    }
    if !settings.otlp_endpoint.is_empty() {
        cmd.env("OTEL_EXPORTER_OTLP_ENDPOINT", &settings.otlp_endpoint);
    }
    if !settings.zipkin_endpoint.is_empty() {
        cmd.env("OTEL_EXPORTER_ZIPKIN_ENDPOINT", &settings.zipkin_endpoint);
    }
    let output = cmd
        .output()
        .with_context(|| format!("running cargo run in {project_dir}"))?;
    logsink::line(&String::from_utf8_lossy(&output.stdout));
    logsink::line(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        bail!("run failed with status {:?}", output.status.code());
    }
    Ok(())
}

// Build-pipeline interception.
//
// The binary is registered as the build tool's compiler wrapper; every
// compile invocation lands here. The argument vector is parsed into a
// `CompileStep`, the package selected by the persisted command file is
// rewritten in place, and the real tool is then executed with stdio and
// exit status forwarded, so the surrounding build never notices us.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use log::info;

use crate::infrastructure::command_file::InterceptorConfig;
use crate::infrastructure::runtime_stub;

/// Parsed view of one compile invocation (testable without executing
/// anything).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileStep {
    /// `-o <path>`
    pub output: Option<String>,
    /// `-p <package>`
    pub package: Option<String>,
    /// `-pack` archive step
    pub is_pack: bool,
    /// every `.rs`-suffixed argument
    pub source_files: Vec<String>,
}

/// Parse the compile tool's argument convention. `-asmhdr <hdr>` is a
/// two-token pair with no meaning for us; it is skipped so its value is
/// never mistaken for a source file.
pub fn parse_compile_args(args: &[String]) -> CompileStep {
    let mut step = CompileStep::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-o" if i + 1 < args.len() => {
                step.output = Some(args[i + 1].clone());
                i += 2;
                continue;
            }
            "-p" if i + 1 < args.len() => {
                step.package = Some(args[i + 1].clone());
                i += 2;
                continue;
            }
            "-asmhdr" if i + 1 < args.len() => {
                i += 2;
                continue;
            }
            "-pack" => step.is_pack = true,
            arg if arg.ends_with(".rs") => step.source_files.push(arg.to_string()),
            _ => {}
        }
        i += 1;
    }
    step
}

fn step_matches(step: &CompileStep, pattern: &str) -> bool {
    pattern.is_empty()
        || step.package.as_deref().is_some_and(|p| p.contains(pattern))
        || step.source_files.iter().any(|f| f.contains(pattern))
}

/// Rewrite the intercepted package if the command file asks for it, then
/// exec the real tool. Returns the child's exit code.
pub fn run_intercepted(tool: &str, args: &[String]) -> Result<i32> {
    let step = parse_compile_args(args);
    let mut forwarded = args.to_vec();

    let cwd = std::env::current_dir().context("resolving working directory")?;
    if InterceptorConfig::exists(&cwd) && !step.is_pack && !step.source_files.is_empty() {
        let config = InterceptorConfig::load(&cwd)?;
        if config.replace && step_matches(&step, &config.package_pattern) {
            info!(
                "intercepted compile of {:?}, rewriting {} file(s)",
                step.package,
                step.source_files.len()
            );
            crate::application::rewrite_compile_step(&config, &step.source_files)?;
            if let Some(dir) = step
                .source_files
                .first()
                .and_then(|f| Path::new(f).parent())
            {
                if let Some(tls_path) = runtime_stub::write_tls_accessor(dir)? {
                    forwarded.push(tls_path.display().to_string());
                }
            }
        }
    }

    let status = Command::new(tool)
        .args(&forwarded)
        .status()
        .with_context(|| format!("executing {tool}"))?;
    Ok(status.code().unwrap_or(1))
}

// Command-line entry point for tracegen.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use tracegen::api::server::{start_server, ServerConfig};
use tracegen::application::{self, AnalysisRequest};
use tracegen::infrastructure::{concurrency, interceptor, logsink};

#[derive(Parser, Debug)]
#[command(author, version, about = "Call-graph-guided tracing instrumentation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Comma-separated project paths
    #[arg(long, default_value = ".")]
    project_path: String,

    /// Substring filter over crate names and file paths
    #[arg(long, default_value = "")]
    package_pattern: String,
}

impl TargetArgs {
    fn to_request(&self, debug: bool) -> AnalysisRequest {
        AnalysisRequest {
            project_paths: application::split_project_paths(&self.project_path),
            package_pattern: self.package_pattern.clone(),
            debug,
            roots_override: None,
            selected: HashSet::new(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inject spans and context propagation into the project
    Inject(TargetArgs),
    /// Inject, keeping each pass's intermediate output next to the originals
    InjectDumpIr(TargetArgs),
    /// Remove previously injected instrumentation
    Prune(TargetArgs),
    /// Print the call graph as text
    Dumpcfg(TargetArgs),
    /// Print the inferred entry points
    Rootfunctions(TargetArgs),
    /// Render the interactive call-graph page
    Generatecfg {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, default_value = "static/index.html")]
        output: String,
    },
    /// Serve the control panel
    Server {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, default_value_t = 8090)]
        port: u16,
    },
    /// Compiler-wrapper mode: rewrite the intercepted package, then exec
    /// the real tool with its original arguments
    Compile {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    logsink::init(Path::new("."))?;
    // a repeated init only happens in-process during tests
    let _ = concurrency::init_thread_pool();

    let cli = Cli::parse();
    match cli.command {
        Commands::Inject(target) => application::inject(&target.to_request(false)),
        Commands::InjectDumpIr(target) => application::inject(&target.to_request(true)),
        Commands::Prune(target) => application::prune(&target.to_request(false)),
        Commands::Dumpcfg(target) => {
            let dump = application::dump_cfg(&target.to_request(false))?;
            println!("{dump}");
            Ok(())
        }
        Commands::Rootfunctions(target) => {
            for root in application::root_functions(&target.to_request(false))? {
                println!("{} ({}:{})", root, root.source_file, root.source_line);
            }
            Ok(())
        }
        Commands::Generatecfg { target, output } => {
            application::generate_cfg(&target.to_request(false), &output)
        }
        Commands::Server { target, port } => {
            let request = target.to_request(false);
            let page = PathBuf::from("static/index.html");
            application::generate_cfg(&request, &page.display().to_string())?;
            start_server(ServerConfig {
                port,
                request,
                page,
            })
        }
        Commands::Compile { args } => {
            let Some((tool, rest)) = args.split_first() else {
                bail!("compile mode needs the real tool and its arguments");
            };
            let code = interceptor::run_intercepted(tool, rest)?;
            std::process::exit(code);
        }
    }
}

use crate::domain::callgraph::CallGraph;
use crate::domain::descriptor::FuncDescriptor;

pub mod cfg_exporter;

pub trait GraphExporter {
    fn export(
        &self,
        graph: &CallGraph,
        roots: &[FuncDescriptor],
        path: &str,
    ) -> std::io::Result<()>;
}

impl GraphExporter for cfg_exporter::CfgExporter {
    fn export(
        &self,
        graph: &CallGraph,
        roots: &[FuncDescriptor],
        path: &str,
    ) -> std::io::Result<()> {
        cfg_exporter::CfgExporter::export(graph, roots, path)
    }
}

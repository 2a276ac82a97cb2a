use serde::{Deserialize, Serialize};

use crate::domain::callgraph::CallGraph;
use crate::domain::descriptor::FuncDescriptor;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InjectRequest {
    /// `type_hash()` of the designated entry point; empty falls back to
    /// sentinel inference.
    #[serde(default)]
    pub entrypoint: String,
    /// Checked function set; empty means everything.
    #[serde(default)]
    pub funcset: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BuildRequest {
    #[serde(default)]
    pub build_args: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub otel_service_name: String,
    #[serde(default)]
    pub otel_traces_exporter: String,
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: String,
    #[serde(default)]
    pub otel_exporter_zipkin_endpoint: String,
}

impl RunRequest {
    pub fn into_settings(self) -> crate::application::RunSettings {
        crate::application::RunSettings {
            service_name: self.otel_service_name,
            traces_exporter: self.otel_traces_exporter,
            otlp_endpoint: self.otel_exporter_otlp_endpoint,
            zipkin_endpoint: self.otel_exporter_zipkin_endpoint,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphDto {
    pub nodes: Vec<NodeDto>,
    pub edges: Vec<EdgeDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeDto {
    pub id: String,
    pub package: String,
    pub name: String,
    pub source_file: String,
    pub source_line: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeDto {
    pub from: String,
    pub to: String,
}

impl From<&CallGraph> for GraphDto {
    fn from(graph: &CallGraph) -> Self {
        fn node(desc: &FuncDescriptor) -> NodeDto {
            NodeDto {
                id: desc.type_hash(),
                package: desc.package.clone(),
                name: desc.name.clone(),
                source_file: desc.source_file.clone(),
                source_line: desc.source_line,
            }
        }

        let mut nodes: Vec<NodeDto> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut edges = Vec::new();
        for (callee, callers) in graph.iter() {
            if seen.insert(callee.type_hash()) {
                nodes.push(node(callee));
            }
            for caller in callers {
                if seen.insert(caller.type_hash()) {
                    nodes.push(node(caller));
                }
                edges.push(EdgeDto {
                    from: caller.type_hash(),
                    to: callee.type_hash(),
                });
            }
        }
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        GraphDto { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str) -> FuncDescriptor {
        FuncDescriptor {
            package: "app".to_string(),
            receiver: None,
            name: name.to_string(),
            signature: "fn()".to_string(),
            source_file: "src/main.rs".to_string(),
            source_line: 1,
        }
    }

    #[test]
    fn graph_dto_carries_forward_edges() {
        let mut graph = CallGraph::new();
        graph.add_edge(desc("do_work"), desc("main"));

        let dto = GraphDto::from(&graph);
        assert_eq!(dto.nodes.len(), 2);
        assert_eq!(dto.edges.len(), 1);
        assert_eq!(dto.edges[0].from, "app.main:fn()");
        assert_eq!(dto.edges[0].to, "app.do_work:fn()");
    }

    #[test]
    fn inject_request_defaults_are_permissive() {
        let req: InjectRequest = serde_json::from_str("{}").unwrap();
        assert!(req.entrypoint.is_empty());
        assert!(req.funcset.is_empty());
    }
}

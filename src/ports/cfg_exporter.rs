//! Call-graph HTML exporter.
//!
//! Renders the interactive control panel page: a checkbox table built by
//! depth-first traversal of the forward graph, a toolbox of actions that
//! POST back to the server, and a terminal textarea that polls
//! `/terminal`.

use std::collections::HashSet;
use std::io::Result;

use crate::domain::callgraph::CallGraph;
use crate::domain::descriptor::FuncDescriptor;

pub struct CfgExporter;

impl CfgExporter {
    pub fn export(graph: &CallGraph, roots: &[FuncDescriptor], path: &str) -> Result<()> {
        let content = Self::to_html(graph, roots);
        std::fs::write(path, content)
    }

    /// Convert the graph into the full control panel page.
    pub fn to_html(graph: &CallGraph, roots: &[FuncDescriptor]) -> String {
        let mut lines = Vec::new();

        lines.push("<!DOCTYPE html>".to_string());
        lines.push("<html>".to_string());
        lines.push("<head>".to_string());
        lines.push("    <meta charset=\"utf-8\">".to_string());
        lines.push("    <title>tracegen call graph</title>".to_string());
        lines.push("    <style>".to_string());
        lines.push("        body { font-family: monospace; }".to_string());
        lines.push("        td { padding: 1px 6px; white-space: pre; }".to_string());
        lines.push("        .root { font-weight: bold; }".to_string());
        lines.push("        #terminal { width: 100%; height: 260px; }".to_string());
        lines.push("    </style>".to_string());
        lines.push("</head>".to_string());
        lines.push("<body>".to_string());

        lines.push(Self::toolbox());

        lines.push("    <table id=\"callgraph\">".to_string());
        let root_set: HashSet<&FuncDescriptor> = roots.iter().collect();
        let fwd = graph.forward();
        let mut visited = HashSet::new();
        for root in roots {
            Self::emit_rows(root, &fwd, &root_set, &mut visited, 0, &mut lines);
        }
        // members not reached from any root still get a row
        let mut leftovers: Vec<&FuncDescriptor> = graph
            .iter()
            .flat_map(|(callee, callers)| std::iter::once(callee).chain(callers.iter()))
            .filter(|d| !visited.contains(&d.type_hash()))
            .collect();
        leftovers.sort_by_key(|d| d.type_hash());
        leftovers.dedup_by_key(|d| d.type_hash());
        for desc in leftovers {
            Self::emit_rows(desc, &fwd, &root_set, &mut visited, 0, &mut lines);
        }
        lines.push("    </table>".to_string());

        lines.push("    <textarea id=\"terminal\" readonly></textarea>".to_string());
        lines.push(Self::script());
        lines.push("</body>".to_string());
        lines.push("</html>".to_string());

        lines.join("\n")
    }

    fn emit_rows(
        desc: &FuncDescriptor,
        fwd: &std::collections::HashMap<FuncDescriptor, Vec<FuncDescriptor>>,
        roots: &HashSet<&FuncDescriptor>,
        visited: &mut HashSet<String>,
        depth: usize,
        lines: &mut Vec<String>,
    ) {
        let hash = desc.type_hash();
        if !visited.insert(hash.clone()) {
            return;
        }
        let indent = "&nbsp;".repeat(depth * 4);
        let class = if roots.contains(desc) { " class=\"root\"" } else { "" };
        lines.push(format!(
            "        <tr{}><td><input type=\"checkbox\" class=\"fn\" value=\"{}\" checked>{}{}</td></tr>",
            class,
            Self::escape(&hash),
            indent,
            Self::escape(&hash),
        ));
        if let Some(callees) = fwd.get(desc) {
            for callee in callees {
                Self::emit_rows(callee, fwd, roots, visited, depth + 1, lines);
            }
        }
    }

    fn toolbox() -> String {
        [
            "    <div id=\"toolbox\">",
            "        <button onclick=\"selectAll(true)\">Select All</button>",
            "        <button onclick=\"selectAll(false)\">Unselect All</button>",
            "        <button onclick=\"postInject()\">Inject</button>",
            "        <button onclick=\"postPrune()\">Prune</button>",
            "        <input id=\"buildcmd\" value=\"cargo build\" size=\"30\">",
            "        <button onclick=\"postBuild()\">Build</button>",
            "        <input id=\"otel_service\" value=\"tracegen-demo\" size=\"18\">",
            "        <input id=\"otel_exporter\" value=\"otlp\" size=\"8\">",
            "        <input id=\"otel_endpoint\" value=\"http://localhost:4317\" size=\"24\">",
            "        <input id=\"zipkin_endpoint\" value=\"\" size=\"24\">",
            "        <button onclick=\"postRun()\">Run</button>",
            "    </div>",
        ]
        .join("\n")
    }

    fn script() -> String {
        [
            "    <script>",
            "        function selectAll(state) {",
            "            document.querySelectorAll('input.fn').forEach(cb => cb.checked = state);",
            "        }",
            "        function selected() {",
            "            return Array.from(document.querySelectorAll('input.fn:checked')).map(cb => cb.value);",
            "        }",
            "        function postInject() {",
            "            const entry = document.querySelector('tr.root input.fn');",
            "            fetch('/inject', { method: 'POST', body: JSON.stringify({",
            "                entrypoint: entry ? entry.value : '',",
            "                funcset: selected(),",
            "            })});",
            "        }",
            "        function postPrune() {",
            "            fetch('/prune', { method: 'POST', body: '{}' });",
            "        }",
            "        function postBuild() {",
            "            fetch('/build', { method: 'POST', body: JSON.stringify({",
            "                build_args: document.getElementById('buildcmd').value,",
            "            })});",
            "        }",
            "        function postRun() {",
            "            fetch('/run', { method: 'POST', body: JSON.stringify({",
            "                otel_service_name: document.getElementById('otel_service').value,",
            "                otel_traces_exporter: document.getElementById('otel_exporter').value,",
            "                otel_exporter_otlp_endpoint: document.getElementById('otel_endpoint').value,",
            "                otel_exporter_zipkin_endpoint: document.getElementById('zipkin_endpoint').value,",
            "            })});",
            "        }",
            "        setInterval(() => {",
            "            fetch('/terminal').then(r => r.text()).then(tail => {",
            "                if (tail.length === 0) return;",
            "                const t = document.getElementById('terminal');",
            "                t.value += tail;",
            "                t.scrollTop = t.scrollHeight;",
            "            });",
            "        }, 1000);",
            "    </script>",
        ]
        .join("\n")
    }

    fn escape(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
    }
}

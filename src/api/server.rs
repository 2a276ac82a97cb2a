// Control panel server. A thread-per-connection TCP loop speaking just
// enough HTTP for the generated page: command endpoints, the log tail,
// and static file serving. A failing sub-command answers 500 and the
// server keeps running.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{bail, Context, Result};
use log::{error, info};

use crate::api::dto::{BuildRequest, GraphDto, InjectRequest, RunRequest};
use crate::application::{self, AnalysisRequest};
use crate::infrastructure::command_file::InterceptorConfig;
use crate::infrastructure::logsink;

pub struct ServerConfig {
    pub port: u16,
    pub request: AnalysisRequest,
    /// The generated call-graph page served at `/`.
    pub page: PathBuf,
}

struct ServerState {
    request: AnalysisRequest,
    page: PathBuf,
    /// Byte offset into the analysis log already delivered to the
    /// terminal; advances monotonically.
    log_offset: Mutex<u64>,
}

struct Response {
    status: u16,
    reason: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        Response {
            status: 200,
            reason: "OK",
            content_type,
            body,
        }
    }

    fn text(msg: &str) -> Self {
        Response::ok("text/plain", msg.as_bytes().to_vec())
    }

    fn not_found() -> Self {
        Response {
            status: 404,
            reason: "Not Found",
            content_type: "text/plain",
            body: b"not found".to_vec(),
        }
    }
}

pub fn start_server(config: ServerConfig) -> Result<()> {
    let address = format!("127.0.0.1:{}", config.port);
    let listener = TcpListener::bind(&address)
        .with_context(|| format!("binding to {address}"))?;
    info!("control panel listening on http://{address}");

    let state = Arc::new(ServerState {
        request: config.request,
        page: config.page,
        log_offset: Mutex::new(0),
    });

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &state) {
                        error!("connection error: {err:#}");
                    }
                });
            }
            Err(err) => error!("accept error: {err}"),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &ServerState) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("/").to_string();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body)?;
    }
    let body = String::from_utf8_lossy(&body).to_string();

    let response = match route(&method, &path, &body, state) {
        Ok(response) => response,
        Err(err) => {
            error!("{method} {path} failed: {err:#}");
            logsink::line(&format!("error: {err:#}"));
            Response {
                status: 500,
                reason: "Internal Server Error",
                content_type: "text/plain",
                body: format!("{err:#}").into_bytes(),
            }
        }
    };
    write_response(&mut stream, &response)
}

fn route(method: &str, path: &str, body: &str, state: &ServerState) -> Result<Response> {
    match (method, path) {
        ("POST", "/inject") => {
            let req: InjectRequest = parse_body(body)?;
            application::inject_with_root(&state.request, &req.entrypoint, &req.funcset)?;
            Ok(Response::text("injected"))
        }
        ("POST", "/prune") => {
            application::prune(&state.request)?;
            Ok(Response::text("pruned"))
        }
        ("POST", "/build") => {
            let req: BuildRequest = parse_body(body)?;
            let Some(project) = state.request.project_paths.first() else {
                bail!("no project path configured");
            };
            let config = InterceptorConfig {
                project_paths: state.request.project_paths.clone(),
                package_pattern: state.request.package_pattern.clone(),
                command: "inject".to_string(),
                replace: true,
            };
            config.store(Path::new(project))?;
            application::run_build(project, &req.build_args)?;
            Ok(Response::text("build finished"))
        }
        ("POST", "/run") => {
            let req: RunRequest = parse_body(body)?;
            let Some(project) = state.request.project_paths.first() else {
                bail!("no project path configured");
            };
            application::run_program(project, &req.into_settings())?;
            Ok(Response::text("run finished"))
        }
        ("GET", "/terminal") => Ok(Response::ok("text/plain", tail_log(state))),
        ("GET", "/graph") => {
            let analysis = application::make_analysis(&state.request)?;
            let dto = GraphDto::from(&analysis.info.graph);
            Ok(Response::ok("application/json", serde_json::to_vec(&dto)?))
        }
        ("GET", "/") => {
            let page = fs::read(&state.page)
                .with_context(|| format!("reading {}", state.page.display()))?;
            Ok(Response::ok("text/html", page))
        }
        ("GET", _) => serve_static(path),
        _ => Ok(Response::not_found()),
    }
}

fn parse_body<T: serde::de::DeserializeOwned + Default>(body: &str) -> Result<T> {
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(body).context("parsing request body")
}

/// Everything appended to the analysis log since the last call.
fn tail_log(state: &ServerState) -> Vec<u8> {
    let Some(path) = logsink::path() else {
        return Vec::new();
    };
    let mut offset = state.log_offset.lock().unwrap();
    let data = fs::read(path).unwrap_or_default();
    let start = (*offset as usize).min(data.len());
    *offset = data.len() as u64;
    data[start..].to_vec()
}

fn serve_static(path: &str) -> Result<Response> {
    // no traversal out of the static dir
    if path.contains("..") {
        return Ok(Response::not_found());
    }
    let local = PathBuf::from(".").join(path.trim_start_matches('/'));
    if !local.starts_with("./static") || !local.is_file() {
        return Ok(Response::not_found());
    }
    let body = fs::read(&local)
        .with_context(|| format!("reading {}", local.display()))?;
    let content_type = match local.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    };
    Ok(Response::ok(content_type, body))
}

fn write_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.reason,
        response.content_type,
        response.body.len()
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(&response.body)?;
    Ok(())
}

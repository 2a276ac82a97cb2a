// Infrastructure implementations for tracegen.

pub mod command_file;
pub mod concurrency;
pub mod interceptor;
pub mod logsink;
pub mod project_loader;
pub mod runtime_stub;

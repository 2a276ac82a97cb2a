// The persisted command document. Written by the driver before handing
// control to the build tool, read back by the intercepted compile step
// so both sides agree on what to rewrite.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const COMMAND_FILE_NAME: &str = "tracegen_cmd.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterceptorConfig {
    pub project_paths: Vec<String>,
    pub package_pattern: String,
    /// The driver command being relayed, e.g. `inject` or `prune`.
    pub command: String,
    /// When false the interceptor leaves sources alone and only forwards
    /// the compile.
    pub replace: bool,
}

impl InterceptorConfig {
    pub fn store(&self, dir: &Path) -> Result<()> {
        let path = dir.join(COMMAND_FILE_NAME);
        let body = serde_json::to_string_pretty(self)?;
        fs::write(&path, body)
            .with_context(|| format!("writing command file {}", path.display()))
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(COMMAND_FILE_NAME);
        let body = fs::read_to_string(&path)
            .with_context(|| format!("reading command file {}", path.display()))?;
        serde_json::from_str(&body)
            .with_context(|| format!("parsing command file {}", path.display()))
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(COMMAND_FILE_NAME).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = InterceptorConfig {
            project_paths: vec!["proj_a".to_string(), "proj_b".to_string()],
            package_pattern: "proj_a".to_string(),
            command: "inject".to_string(),
            replace: true,
        };
        config.store(dir.path()).unwrap();
        assert!(InterceptorConfig::exists(dir.path()));

        let loaded = InterceptorConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.project_paths, config.project_paths);
        assert_eq!(loaded.package_pattern, "proj_a");
        assert_eq!(loaded.command, "inject");
        assert!(loaded.replace);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InterceptorConfig::load(dir.path()).is_err());
        assert!(!InterceptorConfig::exists(dir.path()));
    }
}

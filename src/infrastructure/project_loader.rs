use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use cargo_metadata::MetadataCommand;
use log::warn;

use crate::infrastructure::runtime_stub::TLS_FILE_NAME;

pub struct ProjectLoader;

impl ProjectLoader {
    /// Load all sources selected by the project paths and the package
    /// pattern. Each entry is `(crate_name, file_path, file_content)`.
    /// The pattern is a plain substring filter over the crate name and
    /// the file path; empty matches everything.
    pub fn load_many(
        project_paths: &[String],
        pattern: &str,
    ) -> Result<Vec<(String, String, String)>> {
        let mut files = Vec::new();
        for path in project_paths {
            files.extend(Self::load(path, pattern)?);
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));
        files.dedup_by(|a, b| a.1 == b.1);
        Ok(files)
    }

    pub fn load(project_path: &str, pattern: &str) -> Result<Vec<(String, String, String)>> {
        let manifest = Path::new(project_path).join("Cargo.toml");
        let mut files = if manifest.exists() {
            Self::load_workspace(&manifest)?
        } else {
            let mut out = Vec::new();
            let crate_name = fallback_crate_name(Path::new(project_path));
            Self::collect_rs_recursive(Path::new(project_path), &crate_name, &mut out)?;
            out
        };
        if !pattern.is_empty() {
            files.retain(|(crate_name, path, _)| {
                crate_name.contains(pattern) || path.contains(pattern)
            });
        }
        Ok(files)
    }

    fn load_workspace(manifest_path: &Path) -> Result<Vec<(String, String, String)>> {
        let metadata = match MetadataCommand::new()
            .manifest_path(manifest_path)
            .no_deps()
            .exec()
        {
            Ok(m) => m,
            Err(err) => {
                // cargo may be unavailable where the interceptor runs;
                // fall back to the manifest's own package name
                warn!("cargo metadata failed ({err}), walking the directory instead");
                let dir = manifest_path.parent().unwrap_or(Path::new("."));
                let crate_name = crate_name_from_manifest(manifest_path)
                    .unwrap_or_else(|| fallback_crate_name(dir));
                let mut out = Vec::new();
                Self::collect_rs_recursive(dir, &crate_name, &mut out)?;
                return Ok(out);
            }
        };

        let mut files = Vec::new();
        for package_id in &metadata.workspace_members {
            if let Some(package) = metadata.packages.iter().find(|p| &p.id == package_id) {
                let crate_name = &package.name;
                for target in &package.targets {
                    if !target
                        .kind
                        .iter()
                        .any(|k| k == "lib" || k == "bin" || k == "proc-macro")
                    {
                        continue;
                    }
                    let src_path = &target.src_path;
                    let src_dir = src_path.parent().unwrap_or(src_path.as_path());
                    Self::collect_rs_recursive(src_dir.as_std_path(), crate_name, &mut files)?;
                }
            }
        }

        files.sort_by(|a, b| a.1.cmp(&b.1));
        files.dedup_by(|a, b| a.1 == b.1);
        Ok(files)
    }

    fn collect_rs_recursive(
        dir: &Path,
        crate_name: &str,
        out: &mut Vec<(String, String, String)>,
    ) -> Result<()> {
        if dir.ends_with("target") || dir.ends_with(".git") {
            return Ok(());
        }
        if !dir.exists() {
            return Ok(());
        }

        if dir.is_file() {
            // the generated accessor module is runtime plumbing, not a
            // subject of analysis
            if dir.file_name().is_some_and(|n| n == TLS_FILE_NAME) {
                return Ok(());
            }
            if dir.extension().is_some_and(|ext| ext == "rs") {
                match fs::read_to_string(dir) {
                    Ok(content) => {
                        out.push((crate_name.to_string(), dir.display().to_string(), content))
                    }
                    Err(err) => warn!("skipping unreadable file {}: {err}", dir.display()),
                }
            }
            return Ok(());
        }

        for entry in
            fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::collect_rs_recursive(&path, crate_name, out)?;
            } else if path.file_name().is_some_and(|n| n == TLS_FILE_NAME) {
                continue;
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                match fs::read_to_string(&path) {
                    Ok(content) => {
                        out.push((crate_name.to_string(), path.display().to_string(), content))
                    }
                    Err(err) => warn!("skipping unreadable file {}: {err}", path.display()),
                }
            }
        }
        Ok(())
    }
}

fn crate_name_from_manifest(manifest_path: &Path) -> Option<String> {
    let text = fs::read_to_string(manifest_path).ok()?;
    let value: toml::Value = text.parse().ok()?;
    value
        .get("package")?
        .get("name")?
        .as_str()
        .map(|s| s.to_string())
}

fn fallback_crate_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "app".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn directory_mode_collects_rs_and_skips_target() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        fs::create_dir(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target").join("gen.rs"), "fn gen() {}").unwrap();

        let files =
            ProjectLoader::load(dir.path().to_str().unwrap(), "").unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].1.ends_with("main.rs"));
    }

    #[test]
    fn pattern_filters_by_path_substring() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.rs"), "fn a() {}").unwrap();
        fs::write(dir.path().join("beta.rs"), "fn b() {}").unwrap();

        let files =
            ProjectLoader::load(dir.path().to_str().unwrap(), "alpha").unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].1.contains("alpha"));
    }

    #[test]
    fn manifest_name_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("Cargo.toml");
        fs::write(&manifest, "[package]\nname = \"demo_app\"\nversion = \"0.1.0\"\n").unwrap();
        assert_eq!(
            crate_name_from_manifest(&manifest).as_deref(),
            Some("demo_app")
        );
    }
}

// Generation of the task-local accessor module. The instrumented code
// reaches its ambient tracing context through these two functions; the
// file is emitted once per package and never patched afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const TLS_FILE_NAME: &str = "instrgen_tls.rs";

const TLS_SOURCE: &str = r#"// Generated by tracegen. Do not edit.
use std::cell::RefCell;

use tracegen_rt::context::Context;

thread_local! {
    static INSTRGEN_TLS: RefCell<Option<Context>> = RefCell::new(None);
}

pub fn instrgen_get_tls() -> Context {
    INSTRGEN_TLS.with(|slot| slot.borrow().clone().unwrap_or_else(Context::background))
}

pub fn instrgen_set_tls(ctx: &Context) {
    INSTRGEN_TLS.with(|slot| *slot.borrow_mut() = Some(ctx.clone()));
}
"#;

/// Write the accessor file into `src_dir` unless one already exists.
/// Returns the path when a file was newly written, so the interceptor
/// knows to add it to the compile step.
pub fn write_tls_accessor(src_dir: &Path) -> Result<Option<PathBuf>> {
    let path = src_dir.join(TLS_FILE_NAME);
    if path.exists() {
        return Ok(None);
    }
    fs::write(&path, TLS_SOURCE)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_once_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_tls_accessor(dir.path()).unwrap();
        assert!(first.is_some());
        let second = write_tls_accessor(dir.path()).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn generated_accessor_parses_and_names_both_fns() {
        let ast: syn::File = syn::parse_str(TLS_SOURCE).unwrap();
        let names: Vec<String> = ast
            .items
            .iter()
            .filter_map(|item| match item {
                syn::Item::Fn(f) => Some(f.sig.ident.to_string()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"instrgen_get_tls".to_string()));
        assert!(names.contains(&"instrgen_set_tls".to_string()));
    }

    #[test]
    fn existing_file_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TLS_FILE_NAME);
        fs::write(&path, "// user edit").unwrap();
        assert!(write_tls_accessor(dir.path()).unwrap().is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), "// user edit");
    }
}

// The analysis log file. Everything worth showing in the control panel
// terminal goes through here; the `/terminal` endpoint tails this file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use anyhow::{Context, Result};

pub const LOG_FILE_NAME: &str = "tracegen.log";

static SINK: OnceLock<(PathBuf, Mutex<File>)> = OnceLock::new();

/// Open (or create) the log file in `dir`. Later calls are no-ops.
pub fn init(dir: &Path) -> Result<()> {
    if SINK.get().is_some() {
        return Ok(());
    }
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let _ = SINK.set((path, Mutex::new(file)));
    Ok(())
}

/// Append one line. Silently drops the line when the sink is not
/// initialized or the file write fails; logging never aborts a rewrite.
pub fn line(msg: &str) {
    if let Some((_, file)) = SINK.get() {
        if let Ok(mut f) = file.lock() {
            let _ = writeln!(f, "{msg}");
        }
    }
}

pub fn path() -> Option<&'static Path> {
    SINK.get().map(|(p, _)| p.as_path())
}

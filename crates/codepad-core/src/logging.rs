//! Log-file helpers.
//!
//! The `tracing-subscriber` setup lives in the binary crate; this module only
//! prepares the file it writes to and normalizes level names.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Size at which the current log file is rotated (5 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// Number of rotated files kept next to the live one.
pub const DEFAULT_KEEP_LOG_FILES: u32 = 3;

/// Name of the live log file.
pub const LOG_FILE_NAME: &str = "codepad.log";

/// Default log file location under a platform data directory.
///
/// Falls back to the system temp directory when no data directory is known.
pub fn default_log_file_path(data_dir: Option<&Path>) -> PathBuf {
    match data_dir {
        Some(dir) => dir.join("codepad").join(LOG_FILE_NAME),
        None => std::env::temp_dir().join("codepad").join(LOG_FILE_NAME),
    }
}

/// Create the parent directory of `log_path` and rotate the file if it has
/// grown past `max_size` bytes.
///
/// Rotation shifts `codepad.log` → `codepad.log.1` → … → `codepad.log.<keep>`;
/// the oldest file is deleted.
pub fn prepare_log_file(log_path: &Path, max_size: u64, keep: u32) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let too_big = match fs::metadata(log_path) {
        Ok(meta) => meta.len() >= max_size,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };
    if !too_big {
        return Ok(());
    }
    if keep == 0 {
        return fs::remove_file(log_path);
    }

    let oldest = numbered(log_path, keep);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for index in (1..keep).rev() {
        let from = numbered(log_path, index);
        if from.exists() {
            fs::rename(&from, numbered(log_path, index + 1))?;
        }
    }
    fs::rename(log_path, numbered(log_path, 1))
}

/// Map a configured level name to an `EnvFilter` directive.
/// Unknown names fall back to `"info"`.
pub fn level_filter(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn numbered(base: &Path, index: u32) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{index}"));
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_uses_data_dir() {
        let path = default_log_file_path(Some(Path::new("/data")));
        assert_eq!(path, PathBuf::from("/data/codepad/codepad.log"));
    }

    #[test]
    fn default_path_without_data_dir_is_in_temp() {
        let path = default_log_file_path(None);
        assert!(path.starts_with(std::env::temp_dir()));
        assert!(path.ends_with("codepad/codepad.log"));
    }

    #[test]
    fn numbered_appends_index() {
        let base = Path::new("/tmp/codepad.log");
        assert_eq!(numbered(base, 2), PathBuf::from("/tmp/codepad.log.2"));
    }

    #[test]
    fn prepare_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("a").join("b").join(LOG_FILE_NAME);
        prepare_log_file(&log, DEFAULT_MAX_LOG_SIZE, DEFAULT_KEEP_LOG_FILES).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
        assert!(!log.exists());
    }

    #[test]
    fn prepare_leaves_small_file_alone() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join(LOG_FILE_NAME);
        fs::write(&log, "short").unwrap();
        prepare_log_file(&log, 1024, 3).unwrap();
        assert_eq!(fs::read_to_string(&log).unwrap(), "short");
    }

    #[test]
    fn prepare_rotates_and_drops_oldest() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join(LOG_FILE_NAME);
        fs::write(dir.path().join("codepad.log.1"), "gen1").unwrap();
        fs::write(dir.path().join("codepad.log.2"), "gen2").unwrap();
        fs::write(&log, "x".repeat(64)).unwrap();

        prepare_log_file(&log, 32, 2).unwrap();

        assert!(!log.exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("codepad.log.1")).unwrap(),
            "x".repeat(64)
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("codepad.log.2")).unwrap(),
            "gen1"
        );
        assert!(!dir.path().join("codepad.log.3").exists());
    }

    #[test]
    fn prepare_with_zero_keep_deletes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join(LOG_FILE_NAME);
        fs::write(&log, "x".repeat(10)).unwrap();
        prepare_log_file(&log, 5, 0).unwrap();
        assert!(!log.exists());
    }

    #[test]
    fn level_filter_normalizes_names() {
        assert_eq!(level_filter("TRACE"), "trace");
        assert_eq!(level_filter(" debug "), "debug");
        assert_eq!(level_filter("Warning"), "warn");
        assert_eq!(level_filter("error"), "error");
        assert_eq!(level_filter("info"), "info");
        assert_eq!(level_filter("chatty"), "info");
    }
}

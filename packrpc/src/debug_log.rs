//! Append-only debug log file.
//!
//! One line per event: `[YYYY-MM-DD HH:MM:SS] <context>: <message>`.
//! Write failures are reported through `tracing` and otherwise ignored.

use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

/// Debug log sink enabled by [`Config::debug`](crate::Config::debug).
#[derive(Debug)]
pub struct DebugLog {
    /// File path, kept for diagnostics.
    path: PathBuf,
    /// Open handle in append mode.
    file: File,
}

impl DebugLog {
    /// Opens `path` for appending, creating it and its parent directories.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one event stamped with the local time.
    pub fn record(&mut self, context: &str, message: impl Display) {
        let line = format_line(Local::now().naive_local(), context, message);
        if let Err(e) = self.file.write_all(line.as_bytes()) {
            tracing::warn!(path = %self.path.display(), error = %e, "debug log write failed");
        }
    }
}

/// Renders one log line, newline included.
fn format_line(at: NaiveDateTime, context: &str, message: impl Display) -> String {
    format!("[{}] {context}: {message}\n", at.format("%Y-%m-%d %H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn line_format() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap();
        assert_eq!(
            format_line(at, "connect", "tcp://localhost:8000"),
            "[2024-03-09 07:05:01] connect: tcp://localhost:8000\n"
        );
    }

    #[test]
    fn appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/client.log");

        let mut log = DebugLog::open(&path).unwrap();
        log.record("write", "13 bytes");
        log.record("read", 42);
        drop(log);

        let mut log = DebugLog::open(&path).unwrap();
        assert_eq!(log.path(), path.as_path());
        log.record("close", "bye");
        drop(log);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("] write: 13 bytes"));
        assert!(lines[1].ends_with("] read: 42"));
        assert!(lines[2].ends_with("] close: bye"));
        assert_eq!(lines[0].find(']'), Some(20));
    }
}

//! Audit records for tool executions.
//!
//! Records are ordinary `tracing` events on the [`AUDIT_TARGET`] target. The binary routes
//! that target to a JSON file in the log directory through a [`RotatingFile`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `tracing` target carrying audit records.
pub const AUDIT_TARGET: &str = "audit";

/// Audit log file name inside the log directory.
pub const AUDIT_LOG_FILE: &str = "audit.log";

/// Rolled-over audit logs kept beside the active one.
pub const AUDIT_LOG_BACKUPS: usize = 5;

/// Maximum characters of tool output kept in an audit record.
pub const OUTPUT_PREVIEW_CHARS: usize = 500;

/// Maximum characters of tool input (prompt, command) kept in an audit record.
pub const INPUT_PREVIEW_CHARS: usize = 100;

/// Truncate `text` to `max_len` characters, noting the original length.
#[must_use]
pub fn truncate_for_log(text: &str, max_len: usize) -> String {
    let total = text.chars().count();
    if total <= max_len {
        return text.to_owned();
    }
    let head: String = text.chars().take(max_len).collect();
    format!("{head}... [truncated, total {total} chars]")
}

/// First `max_len` characters of `text`, without annotation.
#[must_use]
pub fn preview(text: &str, max_len: usize) -> String {
    text.chars().take(max_len).collect()
}

/// One completed tool execution.
#[derive(Debug)]
pub struct AuditRecord<'a> {
    pub tool: &'a str,
    pub input: &'a str,
    pub working_directory: &'a Path,
    /// `None` when the process timed out.
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
    pub output: &'a str,
}

impl AuditRecord<'_> {
    /// Emit the record on the `audit` target.
    pub fn emit(&self) {
        let elapsed_seconds = (self.elapsed.as_secs_f64() * 100.0).round() / 100.0;
        tracing::info!(
            target: AUDIT_TARGET,
            tool = self.tool,
            input_preview = %preview(self.input, INPUT_PREVIEW_CHARS),
            working_directory = %self.working_directory.display(),
            exit_code = self.exit_code,
            elapsed_seconds,
            output_length = self.output.len(),
            output_preview = %truncate_for_log(self.output, OUTPUT_PREVIEW_CHARS),
            "tool_completed"
        );
    }
}

/// Append-only file that rolls over once it would grow past `max_bytes`.
///
/// Backups are `<name>.1` (newest) through `<name>.<backups>`; the oldest is dropped.
/// A single write larger than `max_bytes` still lands whole in a fresh file.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    len: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self { path, file, len, max_bytes, backups })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn roll_over(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups == 0 {
            self.file = OpenOptions::new().write(true).truncate(true).open(&self.path)?;
        } else {
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
            self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        }
        self.len = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.len > 0 && self.len.saturating_add(buf.len() as u64) > self.max_bytes {
            self.roll_over()?;
        }
        let written = self.file.write(buf)?;
        self.len += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_for_log("hello", 500), "hello");
    }

    #[test]
    fn test_long_text_truncated_with_total() {
        let text = "a".repeat(600);
        let out = truncate_for_log(&text, 500);
        assert!(out.starts_with(&"a".repeat(500)));
        assert!(out.ends_with("... [truncated, total 600 chars]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let text = "é".repeat(10);
        assert_eq!(preview(&text, 3), "ééé");
        assert!(truncate_for_log(&text, 3).starts_with("ééé..."));
    }

    fn record(n: usize) -> Vec<u8> {
        format!("{{\"seq\":{n:04}}}\n").into_bytes()
    }

    #[test]
    fn test_rotating_file_keeps_bounded_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join(AUDIT_LOG_FILE);
        let line = record(0).len() as u64;

        let mut file = RotatingFile::open(&path, line * 2, 2).unwrap();
        for n in 0..8 {
            file.write_all(&record(n)).unwrap();
        }
        file.flush().unwrap();

        let read = |p: &Path| fs::read_to_string(p).unwrap();
        assert_eq!(read(&path), "{\"seq\":0006}\n{\"seq\":0007}\n");
        assert_eq!(read(&dir.path().join("logs/audit.log.1")), "{\"seq\":0004}\n{\"seq\":0005}\n");
        assert_eq!(read(&dir.path().join("logs/audit.log.2")), "{\"seq\":0002}\n{\"seq\":0003}\n");
        assert!(!dir.path().join("logs/audit.log.3").exists());
    }

    #[test]
    fn test_rotating_file_appends_to_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(AUDIT_LOG_FILE);
        fs::write(&path, record(0)).unwrap();
        let line = record(0).len() as u64;

        let mut file = RotatingFile::open(&path, line * 2, AUDIT_LOG_BACKUPS).unwrap();
        file.write_all(&record(1)).unwrap();
        assert!(!dir.path().join("audit.log.1").exists());

        file.write_all(&record(2)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"seq\":0002}\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("audit.log.1")).unwrap(),
            "{\"seq\":0000}\n{\"seq\":0001}\n"
        );
    }

    #[test]
    fn test_oversized_record_written_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(AUDIT_LOG_FILE);

        let mut file = RotatingFile::open(&path, 4, 0).unwrap();
        file.write_all(b"0123456789\n").unwrap();
        file.write_all(b"abcdefghij\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "abcdefghij\n");
    }
}

//! Human-readable run log.
//!
//! Every component receives an [`ExportLog`] explicitly; lines fan out to the
//! configured sinks and are mirrored into `tracing`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::errors::ExportError;

pub const LOG_DIR_NAME: &str = "导出日志";
pub const LOG_FILE_NAME: &str = "导出错误日志.txt";

/// Destination for run-log lines. Implementations must never fail the caller.
pub trait LogSink: Send + Sync {
    fn record(&self, line: &str);
}

/// Appends timestamped lines to `{root}/导出日志/导出错误日志.txt`.
pub struct FileLogSink {
    path: PathBuf,
    writer: Mutex<RollingFileAppender>,
}

impl FileLogSink {
    pub fn new(root: &Path) -> Result<Self, ExportError> {
        let dir = root.join(LOG_DIR_NAME);
        let writer = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILE_NAME)
            .build(&dir)
            .map_err(|e| {
                ExportError::Config(format!("cannot open run log in {}: {e}", dir.display()))
            })?;
        Ok(Self {
            path: dir.join(LOG_FILE_NAME),
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(
            writer,
            "{}: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            line
        )?;
        writer.flush()
    }
}

impl LogSink for FileLogSink {
    fn record(&self, line: &str) {
        if let Err(e) = self.append(line) {
            warn!(path = %self.path.display(), "failed to append run log: {e}");
        }
    }
}

/// Forwards lines to another task, typically a UI.
pub struct ChannelLogSink {
    sender: UnboundedSender<String>,
}

impl ChannelLogSink {
    pub fn new(sender: UnboundedSender<String>) -> Self {
        Self { sender }
    }
}

impl LogSink for ChannelLogSink {
    fn record(&self, line: &str) {
        // receiver gone means nobody is watching any more
        let _ = self.sender.send(line.to_string());
    }
}

/// Keeps lines in memory.
#[derive(Default, Clone)]
pub struct MemoryLogSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl LogSink for MemoryLogSink {
    fn record(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(line.to_string());
    }
}

/// Append-only log stream shared by all components of a run.
#[derive(Clone, Default)]
pub struct ExportLog {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl ExportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(target: "custody_export::run_log", "{message}");
        for sink in &self.sinks {
            sink.record(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(dir.path()).unwrap();
        sink.record("first");
        sink.record("second");

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": first"));
        assert!(lines[1].ends_with(": second"));
        assert!(sink.path().ends_with(Path::new(LOG_DIR_NAME).join(LOG_FILE_NAME)));
    }

    #[test]
    fn test_file_sink_keeps_earlier_runs() {
        let dir = tempfile::tempdir().unwrap();
        FileLogSink::new(dir.path()).unwrap().record("run one");
        FileLogSink::new(dir.path()).unwrap().record("run two");

        let path = dir.path().join(LOG_DIR_NAME).join(LOG_FILE_NAME);
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains(": run one\n"));
        assert!(content.ends_with(": run two\n"));
    }

    #[test]
    fn test_file_sink_reports_unusable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let err = FileLogSink::new(&blocker).err().unwrap();
        assert!(matches!(err, ExportError::Config(_)));
    }

    #[test]
    fn test_export_log_fans_out() {
        let memory = MemoryLogSink::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let log = ExportLog::new()
            .with_sink(Arc::new(memory.clone()))
            .with_sink(Arc::new(ChannelLogSink::new(tx)));

        log.line("hello");

        assert_eq!(memory.lines(), vec!["hello".to_string()]);
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }
}

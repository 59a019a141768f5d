//! Activity and audit sinks.
//!
//! Both sinks are plain append-only text files. Every line is
//! `[YYYY-MM-DD HH:MM:SS]: <message>` in local time; the file is opened,
//! appended and closed per line so external rotation is always safe.
//! Activity lines are also echoed to stderr unless the journal is quiet.
//!
//! A sink that cannot be written is reported through `log::warn!` and
//! otherwise ignored: losing a log line never aborts a transfer.

use crate::profile::Mode;
use chrono::Local;
use log::warn;
use std::io::Write;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Default)]
pub struct Journal {
    transfer_log: Option<PathBuf>,
    audit_log: Option<PathBuf>,
    echo: bool,
}

impl Journal {
    pub fn new(transfer_log: Option<PathBuf>, audit_log: Option<PathBuf>) -> Self {
        Self {
            transfer_log,
            audit_log,
            echo: true,
        }
    }

    /// Stop echoing activity lines to stderr.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Append one activity line.
    pub fn log(&self, message: impl AsRef<str>) {
        let line = format_line(message.as_ref());
        if self.echo {
            eprint!("{}", line);
        }
        if let Some(path) = &self.transfer_log {
            append_line(path, &line);
        }
    }

    pub fn error(&self, message: impl std::fmt::Display) {
        self.log(format!("[ERROR] {}", message));
    }

    pub fn fatal(&self, message: impl std::fmt::Display) {
        self.log(format!("[FATAL] {}", message));
    }

    /// Append one audit record for a completed upload.
    pub fn audit(&self, mode: Mode, source: &str, target: &str, bytes: u64) {
        let Some(path) = &self.audit_log else {
            return;
        };
        append_line(path, &format_line(&audit_message(mode, source, target, bytes)));
    }

    pub fn transfer_log(&self) -> Option<&Path> {
        self.transfer_log.as_deref()
    }

    pub fn audit_log(&self) -> Option<&Path> {
        self.audit_log.as_deref()
    }
}

pub fn audit_message(mode: Mode, source: &str, target: &str, bytes: u64) -> String {
    let (from, to) = mode.schemes();
    format!(
        "Transfer {}://{} -> {}://{} ({} bytes)",
        from, source, to, target, bytes
    )
}

fn format_line(message: &str) -> String {
    format!("[{}]: {}\n", Local::now().format(TIMESTAMP_FORMAT), message)
}

fn append_line(path: &Path, line: &str) {
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(e) = result {
        warn!("Failed to append to {}: {}", path.display(), e);
    }
}

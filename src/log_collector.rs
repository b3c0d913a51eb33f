//! Decoupled logging pipeline for build-graph runs.
//!
//! ```text
//! log::info!() / log::debug!()
//!     |
//! [LogCollector] (log::Log, non-blocking)
//!     | (crossbeam unbounded channel)
//!     v
//! [writer thread] ---> <log_dir>/full/<ts>.log     (every record)
//!                 ---> <log_dir>/parsed/<ts>.log   (target "parsed" only)
//! ```
//!
//! Records at or above the console level are also mirrored to stderr from
//! the calling thread.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Target that routes a record to the parsed (summary) log as well.
pub const PARSED_TARGET: &str = "parsed";

/// Which log files a line lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Full,
    Parsed,
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    pub kind: LogKind,
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            kind: LogKind::Full,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            kind: LogKind::Parsed,
            ..LogLine::new(message)
        }
    }

    fn format(&self) -> String {
        format!("[{}] {}\n", self.timestamp, self.message)
    }
}

enum LogMessage {
    Line(LogLine),
    /// Flush marker; the writer answers once everything before it is on disk.
    Flush(std::sync::mpsc::Sender<()>),
}

/// `log` backend writing to per-run files on a background thread.
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    log_dir: PathBuf,
    full_path: PathBuf,
    parsed_path: PathBuf,
    level: LevelFilter,
    console_level: LevelFilter,
}

impl LogCollector {
    /// Create the log directories and files and start the writer thread.
    pub fn new(
        log_dir: impl Into<PathBuf>,
        level: LevelFilter,
        console_level: LevelFilter,
    ) -> io::Result<Self> {
        let log_dir = log_dir.into();
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let full_path = log_dir.join("full").join(format!("{}_full.log", stamp));
        let parsed_path = log_dir.join("parsed").join(format!("{}_parsed.log", stamp));

        let mut full = open_log(&full_path)?;
        let mut parsed = open_log(&parsed_path)?;

        let (tx, rx) = unbounded::<LogMessage>();

        // OS thread, not a tokio task: records from any runtime reach disk.
        std::thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(line) => {
                        let formatted = line.format();
                        let _ = full.write_all(formatted.as_bytes());
                        if line.kind == LogKind::Parsed {
                            let _ = parsed.write_all(formatted.as_bytes());
                        }
                    }
                    LogMessage::Flush(done) => {
                        let _ = full.flush();
                        let _ = parsed.flush();
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(LogCollector {
            tx,
            log_dir,
            full_path,
            parsed_path,
            level,
            console_level,
        })
    }

    /// Install as the global logger.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let max = self.level.max(self.console_level);
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max);
        Ok(())
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn full_log_path(&self) -> &Path {
        &self.full_path
    }

    pub fn parsed_log_path(&self) -> &Path {
        &self.parsed_path
    }

    /// Queue a line. Never blocks.
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    pub fn log_str(&self, message: impl Into<String>) {
        self.log_line(LogLine::new(message.into()));
    }

    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log_line(LogLine::parsed(message.into()));
    }

    /// Block until every line queued so far has been written.
    pub fn wait_for_empty(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level || metadata.level() <= self.console_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if record.level() <= self.console_level {
            eprintln!("{}: {}", level_label(record.level()), record.args());
        }

        if record.level() <= self.level {
            let message = format!("[{}] {}", record.level(), record.args());
            if record.target() == PARSED_TARGET {
                self.log_parsed(message);
            } else {
                self.log_str(message);
            }
        }
    }

    fn flush(&self) {
        let _ = self.wait_for_empty();
    }
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::Error => "error",
        Level::Warn => "warning",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "trace",
    }
}

/// Default log directory: `<cache dir>/kbuild-graph/logs`.
pub fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kbuild-graph")
        .join("logs")
}

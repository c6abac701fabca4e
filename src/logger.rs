use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Log level enum for type-safe logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// A single buffered log line
///
/// The engine performs no I/O; the shell periodically drains this buffer to
/// render its log panel. `source` distinguishes engine-originated lines from
/// lines the shell pushes in.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: &'static str, // "engine" or "shell"
}

/// How many entries the ring buffer retains before dropping the oldest
const LOG_CAPACITY: usize = 1000;

/// Commands for the logger thread
enum LogCommand {
    Log(LogEntry),
    GetLogs(crossbeam_channel::Sender<Vec<LogEntry>>),
    Clear,
}

pub struct Logger {
    sender: Sender<LogCommand>,
    min_level: Arc<AtomicU8>,
}

impl Logger {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(LOG_CAPACITY);
        let min_level = Arc::new(AtomicU8::new(LogLevel::Debug as u8));

        // Spawn background thread to own the buffer
        std::thread::spawn(move || {
            Self::logger_thread(receiver);
        });

        Self { sender, min_level }
    }

    /// Background thread that manages the log ring buffer
    fn logger_thread(receiver: Receiver<LogCommand>) {
        let mut buffer: VecDeque<LogEntry> = VecDeque::with_capacity(LOG_CAPACITY);

        for cmd in receiver {
            match cmd {
                LogCommand::Log(entry) => {
                    if buffer.len() == LOG_CAPACITY {
                        buffer.pop_front();
                    }
                    buffer.push_back(entry);
                }
                LogCommand::GetLogs(response_tx) => {
                    let _ = response_tx.send(buffer.iter().cloned().collect());
                }
                LogCommand::Clear => {
                    buffer.clear();
                }
            }
        }
    }

    /// Log with enum level (non-blocking)
    pub fn log(&self, level: LogLevel, message: &str, source: &'static str) {
        // Check if this log level should be recorded
        if (level as u8) < self.min_level.load(Ordering::Relaxed) {
            return;
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            source,
        };

        // Non-blocking send (drops log if channel is full)
        let _ = self.sender.try_send(LogCommand::Log(entry));
    }

    /// Set minimum log level (runtime filtering)
    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    /// Get current minimum log level
    pub fn get_min_level(&self) -> LogLevel {
        match self.min_level.load(Ordering::Relaxed) {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    pub fn get_logs(&self) -> Vec<LogEntry> {
        let (response_tx, response_rx) = bounded(1);
        if self.sender.send(LogCommand::GetLogs(response_tx)).is_ok() {
            response_rx.recv().unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    pub fn clear_logs(&self) {
        let _ = self.sender.try_send(LogCommand::Clear);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

// Global logger instance
lazy_static::lazy_static! {
    pub static ref LOGGER: Logger = Logger::new();
}

// Macro for easy logging
#[macro_export]
macro_rules! engine_log {
	($level:expr, $($arg:tt)*) => {
		{
			let message = format!($($arg)*);
			$crate::logger::LOGGER.log($level, &message, "engine");
			// Also log to regular log for development
			match $level {
				$crate::logger::LogLevel::Error => log::error!("{}", message),
				$crate::logger::LogLevel::Warn => log::warn!("{}", message),
				$crate::logger::LogLevel::Info => log::info!("{}", message),
				$crate::logger::LogLevel::Debug => log::debug!("{}", message),
			}
		}
	};
}

use crate::error::DaylogError;
use crate::levels::Level;
use crate::logs::console::ConsoleSink;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot, watch};

/// Lifecycle of one cached log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Spawned, waiting for the open to complete; writes queue up
    Opening,
    /// Accepting writes
    Open,
    /// Closed after a rotation or an explicit close
    Closed,
    /// Open or write failed; file logging is disabled
    Disabled,
}

impl StreamState {
    /// Whether the stream still accepts writes
    pub fn is_writable(&self) -> bool {
        matches!(self, StreamState::Opening | StreamState::Open)
    }
}

/// Commands processed by a writer task, in order
#[derive(Debug)]
pub(crate) enum StreamCommand {
    Write(String),
    Flush(oneshot::Sender<()>),
    Close,
}

/// Everything a writer task needs besides its command queue
pub(crate) struct StreamWriter {
    pub(crate) path: PathBuf,
    pub(crate) log_name: String,
    /// Console of the logger that opened the stream, used for notices
    pub(crate) notifier: ConsoleSink,
    pub(crate) state: watch::Sender<StreamState>,
    pub(crate) disabled: Arc<AtomicBool>,
}

impl StreamWriter {
    /// Open the file and drain commands until closed or failed
    pub(crate) async fn run(self, mut commands: mpsc::UnboundedReceiver<StreamCommand>) {
        let file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(source) => {
                self.fail(DaylogError::LogFileError {
                    path: self.path.display().to_string(),
                    source,
                });
                return;
            }
        };

        self.state.send_replace(StreamState::Open);
        tracing::debug!("Opened log file {}", self.path.display());
        self.notifier
            .write(Level::Debug.as_str(), &format!("Opened {} log", self.log_name));

        let mut file = BufWriter::new(file);

        while let Some(command) = commands.recv().await {
            match command {
                StreamCommand::Write(line) => {
                    if let Err(source) = file.write_all(line.as_bytes()).await {
                        self.fail(self.write_error(source));
                        return;
                    }
                }
                StreamCommand::Flush(ack) => {
                    if let Err(source) = file.flush().await {
                        self.fail(self.write_error(source));
                        return;
                    }
                    let _ = ack.send(());
                }
                StreamCommand::Close => break,
            }
        }

        if let Err(source) = file.flush().await {
            tracing::error!("Failed to flush {} on close: {}", self.path.display(), source);
        }

        self.state.send_replace(StreamState::Closed);
        tracing::debug!("Closed log file {}", self.path.display());
        self.notifier
            .write(Level::Debug.as_str(), &format!("Closing {} log", self.log_name));
    }

    fn write_error(&self, source: std::io::Error) -> DaylogError {
        DaylogError::LogWriteError {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Report the error, disable file logging registry-wide and stop
    pub(crate) fn fail(&self, error: DaylogError) {
        self.state.send_replace(StreamState::Disabled);
        self.disabled.store(true, Ordering::SeqCst);
        tracing::warn!("{}; file logging disabled", error);
        self.notifier.write(
            Level::Error.as_str(),
            &format!("{} (disabling log files)", error),
        );
    }
}

/// `[YYYY-MM-DD HH:MM:SS]`
pub(crate) fn timestamp_tag(now: &NaiveDateTime) -> String {
    now.format("[%Y-%m-%d %H:%M:%S]").to_string()
}

/// `YYYY-MM-DD`
pub(crate) fn rotation_key(now: &NaiveDateTime) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// `<dir>/<log_name>[-<rotation_key>].log`
pub(crate) fn log_file_path(log_dir: &Path, log_name: &str, rotation_key: Option<&str>) -> PathBuf {
    match rotation_key {
        Some(key) => log_dir.join(format!("{}-{}.log", log_name, key)),
        None => log_dir.join(format!("{}.log", log_name)),
    }
}

/// `<timestamp>[<label>][<LEVEL>] <message>\n`
pub(crate) fn format_log_entry(timestamp: &str, label: &str, level: &str, message: &str) -> String {
    format!(
        "{}[{}][{}] {}\n",
        timestamp,
        label,
        level.to_uppercase(),
        message
    )
}

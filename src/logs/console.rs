// Console sink - colorized single-line output

use crate::levels::{paint, LevelFilter, DEFAULT_LABEL_CONSOLE_CODES};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Where console lines go
#[derive(Debug, Clone, Default)]
pub enum ConsoleOutput {
    /// Process standard output
    #[default]
    Stdout,
    /// In-memory capture
    Capture(ConsoleCapture),
}

/// Shared buffer of console lines
#[derive(Debug, Clone, Default)]
pub struct ConsoleCapture {
    lines: Arc<Mutex<Vec<String>>>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of captured lines containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    fn push(&self, line: String) {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).push(line);
    }
}

impl ConsoleOutput {
    fn write_line(&self, line: String) {
        match self {
            ConsoleOutput::Stdout => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                let _ = writeln!(handle, "{}", line);
            }
            ConsoleOutput::Capture(capture) => capture.push(line),
        }
    }
}

/// Writes `[label] level: message` lines for one logger
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    label: String,
    filter: LevelFilter,
    enabled: bool,
    output: ConsoleOutput,
}

impl ConsoleSink {
    pub fn new(
        label: impl Into<String>,
        filter: LevelFilter,
        enabled: bool,
        output: ConsoleOutput,
    ) -> Self {
        Self {
            label: label.into(),
            filter,
            enabled,
            output,
        }
    }

    /// Write one line if `level` passes the threshold and the console is enabled.
    ///
    /// Returns whether a line was written.
    pub fn write(&self, level: &str, message: &str) -> bool {
        if !self.filter.is_loggable(level) || !self.enabled {
            return false;
        }

        let (codes, level_label) = match self.filter.levels().get(level) {
            Some(descriptor) => (descriptor.console_codes.as_str(), descriptor.display_label()),
            None => ("0", level),
        };

        let line = format!(
            "[{}] {} {}",
            paint(DEFAULT_LABEL_CONSOLE_CODES, &self.label),
            paint(codes, &format!("{}:", level_label)),
            message
        );
        self.output.write_line(line);

        true
    }
}

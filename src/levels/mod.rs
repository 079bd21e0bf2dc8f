// Levels module - Severity table and threshold filtering

use colored::{Color, ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Threshold used when neither the logger nor the defaults name one
pub const DEFAULT_LEVEL_THRESHOLD: &str = "debug";

/// SGR codes used for the logger label on the console
pub const DEFAULT_LABEL_CONSOLE_CODES: &str = "97";

/// The standard levels every table contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Emerg,
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Emerg,
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
    ];

    /// Name of the level as used in level tables
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Emerg => "emerg",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }

    fn descriptor(&self) -> LevelDescriptor {
        match self {
            Level::Emerg => LevelDescriptor::new("emerg", 0, "41"),
            Level::Error => LevelDescriptor::new("error", 3, "31"),
            Level::Warn => LevelDescriptor::new("warn", 4, "33").with_label("warning"),
            Level::Info => LevelDescriptor::new("info", 6, "32"),
            Level::Debug => LevelDescriptor::new("debug", 7, "90"),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity and display metadata for one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDescriptor {
    /// Level name; filled from the table key when deserialized
    #[serde(default)]
    pub name: String,

    /// Numeric severity, lower is more severe
    pub severity: u32,

    /// SGR codes for the console, e.g. "31" or "1;41"
    #[serde(default = "default_console_codes")]
    pub console_codes: String,

    /// Display label for the console (defaults to the name)
    #[serde(default)]
    pub label: Option<String>,
}

fn default_console_codes() -> String {
    "0".to_string()
}

impl LevelDescriptor {
    pub fn new(name: impl Into<String>, severity: u32, console_codes: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            severity,
            console_codes: console_codes.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label shown on the console
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Map of level name to descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    levels: BTreeMap<String, LevelDescriptor>,
}

impl LevelTable {
    /// Standard table merged with caller-supplied entries (caller wins)
    pub fn with_overrides(overrides: HashMap<String, LevelDescriptor>) -> Self {
        let mut table = Self::default();
        for (name, mut descriptor) in overrides {
            descriptor.name = name.clone();
            table.levels.insert(name, descriptor);
        }
        table
    }

    pub fn get(&self, name: &str) -> Option<&LevelDescriptor> {
        self.levels.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.levels.contains_key(name)
    }

    /// Registered level names, most severe first
    pub fn names(&self) -> Vec<&str> {
        let mut descriptors: Vec<&LevelDescriptor> = self.levels.values().collect();
        descriptors.sort_by(|a, b| a.severity.cmp(&b.severity).then(a.name.cmp(&b.name)));
        descriptors.into_iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        let levels = Level::ALL
            .iter()
            .map(|level| (level.as_str().to_string(), level.descriptor()))
            .collect();
        Self { levels }
    }
}

/// Threshold check against a level table
#[derive(Debug, Clone)]
pub struct LevelFilter {
    levels: Arc<LevelTable>,
    threshold: String,
}

impl LevelFilter {
    pub fn new(levels: Arc<LevelTable>, threshold: impl Into<String>) -> Self {
        Self {
            levels,
            threshold: threshold.into(),
        }
    }

    /// True iff `level` is at least as severe as the threshold.
    ///
    /// A level or threshold missing from the table is never loggable.
    pub fn is_loggable(&self, level: &str) -> bool {
        match (self.levels.get(level), self.levels.get(&self.threshold)) {
            (Some(level), Some(threshold)) => level.severity <= threshold.severity,
            _ => false,
        }
    }

    pub fn threshold(&self) -> &str {
        &self.threshold
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }
}

/// Apply SGR codes (e.g. "1;31", "41", "97") to text through `colored`.
///
/// Unsupported codes are ignored.
pub fn paint(codes: &str, text: &str) -> ColoredString {
    codes
        .split(';')
        .filter_map(|code| code.trim().parse::<u8>().ok())
        .fold(text.normal(), |styled, code| match code {
            1 => styled.bold(),
            2 => styled.dimmed(),
            3 => styled.italic(),
            4 => styled.underline(),
            30..=37 => styled.color(base_color(code - 30)),
            90..=97 => styled.color(bright_color(code - 90)),
            40..=47 => styled.on_color(base_color(code - 40)),
            100..=107 => styled.on_color(bright_color(code - 100)),
            _ => styled,
        })
}

fn base_color(index: u8) -> Color {
    match index {
        0 => Color::Black,
        1 => Color::Red,
        2 => Color::Green,
        3 => Color::Yellow,
        4 => Color::Blue,
        5 => Color::Magenta,
        6 => Color::Cyan,
        _ => Color::White,
    }
}

fn bright_color(index: u8) -> Color {
    match index {
        0 => Color::BrightBlack,
        1 => Color::BrightRed,
        2 => Color::BrightGreen,
        3 => Color::BrightYellow,
        4 => Color::BrightBlue,
        5 => Color::BrightMagenta,
        6 => Color::BrightCyan,
        _ => Color::BrightWhite,
    }
}

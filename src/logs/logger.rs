use crate::config::{LogDefaults, LoggerOptions, DEFAULT_LOG_NAME};
use crate::levels::{Level, LevelFilter, LevelTable, DEFAULT_LEVEL_THRESHOLD};
use crate::logs::console::ConsoleSink;
use crate::logs::registry::{StreamRegistry, WriteRequest};
use crate::render::{render_line, ErrorValue, Renderable};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolved, immutable settings of one logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub label: String,
    pub log_name: String,
    pub log_dir: Option<PathBuf>,
    pub threshold: String,
    pub levels: Arc<LevelTable>,
    pub console_enabled: bool,
    pub rotation_enabled: bool,
    pub handle_exceptions: bool,
}

impl LoggerConfig {
    /// Merge caller options over the defaults
    pub fn resolve(label: Option<&str>, options: &LoggerOptions, defaults: &LogDefaults) -> Self {
        let log_name = options
            .log_name
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_NAME.to_string());

        let log_dir = if options.no_file {
            None
        } else {
            options.log_dir.clone().or_else(|| defaults.log_dir.clone())
        };

        let threshold = options
            .log_level
            .clone()
            .or_else(|| defaults.log_level.clone())
            .unwrap_or_else(|| DEFAULT_LEVEL_THRESHOLD.to_string());

        Self {
            label: label.map(str::to_string).unwrap_or_else(|| log_name.clone()),
            log_name,
            log_dir,
            threshold,
            levels: Arc::new(LevelTable::with_overrides(options.levels.clone())),
            console_enabled: !options.no_console,
            rotation_enabled: !options.no_rotation,
            handle_exceptions: options.handle_exceptions,
        }
    }
}

/// Which sinks a log call wrote to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dispatch {
    pub file: bool,
    pub console: bool,
}

impl Dispatch {
    pub fn any(&self) -> bool {
        self.file || self.console
    }
}

struct LoggerInner {
    config: LoggerConfig,
    filter: LevelFilter,
    console: ConsoleSink,
    registry: StreamRegistry,
}

/// A labelled logger writing to the console and to a shared log file.
///
/// Cloning yields another handle to the same logger.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    /// Create a logger on `registry`.
    ///
    /// `label` defaults to the logical log name. Unset options fall back to
    /// `defaults`, then to built-in values.
    pub fn new(
        registry: &StreamRegistry,
        label: Option<&str>,
        options: LoggerOptions,
        defaults: &LogDefaults,
    ) -> Self {
        let config = LoggerConfig::resolve(label, &options, defaults);
        let filter = LevelFilter::new(config.levels.clone(), config.threshold.clone());

        if !config.levels.contains(&config.threshold) {
            tracing::warn!(
                "Unknown log level threshold '{}' for {}; nothing will be logged",
                config.threshold,
                config.label
            );
        }

        let console = ConsoleSink::new(
            config.label.clone(),
            filter.clone(),
            config.console_enabled,
            options.console_output,
        );

        let logger = Self {
            inner: Arc::new(LoggerInner {
                config,
                filter,
                console,
                registry: registry.clone(),
            }),
        };

        if logger.inner.config.handle_exceptions {
            logger.install_panic_hook();
        }

        logger
    }

    /// Logger on the process-wide registry with no defaults
    pub fn with_options(label: Option<&str>, options: LoggerOptions) -> Self {
        Self::new(StreamRegistry::global(), label, options, &LogDefaults::default())
    }

    /// Render `args` as one line and send it to both sinks.
    ///
    /// Never fails; unknown or filtered levels write nothing.
    pub fn log<I>(&self, level: &str, args: I) -> Dispatch
    where
        I: IntoIterator,
        I::Item: Into<Renderable>,
    {
        let line = render_line(args);
        Dispatch {
            file: self.write_file(level, &line),
            console: self.inner.console.write(level, &line),
        }
    }

    pub fn emerg<I>(&self, args: I) -> Dispatch
    where
        I: IntoIterator,
        I::Item: Into<Renderable>,
    {
        self.log(Level::Emerg.as_str(), args)
    }

    pub fn error<I>(&self, args: I) -> Dispatch
    where
        I: IntoIterator,
        I::Item: Into<Renderable>,
    {
        self.log(Level::Error.as_str(), args)
    }

    pub fn warn<I>(&self, args: I) -> Dispatch
    where
        I: IntoIterator,
        I::Item: Into<Renderable>,
    {
        self.log(Level::Warn.as_str(), args)
    }

    pub fn info<I>(&self, args: I) -> Dispatch
    where
        I: IntoIterator,
        I::Item: Into<Renderable>,
    {
        self.log(Level::Info.as_str(), args)
    }

    pub fn debug<I>(&self, args: I) -> Dispatch
    where
        I: IntoIterator,
        I::Item: Into<Renderable>,
    {
        self.log(Level::Debug.as_str(), args)
    }

    /// Handle for a level registered in this logger's table, including custom ones
    pub fn level<'a>(&'a self, name: &'a str) -> Option<LevelLogger<'a>> {
        self.inner.config.levels.contains(name).then_some(LevelLogger {
            logger: self,
            level: name,
        })
    }

    /// Whether `level` passes this logger's threshold
    pub fn is_level_loggable(&self, level: &str) -> bool {
        self.inner.filter.is_loggable(level)
    }

    /// Log panics at `emerg` with an `uncaughtException:` prefix, then hand
    /// them to the previously installed hook.
    pub fn install_panic_hook(&self) {
        let logger = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let error = ErrorValue::from_panic(info.payload(), info.location());
            logger.emerg([Renderable::from("uncaughtException:"), Renderable::from(error)]);
            previous(info);
        }));
    }

    fn write_file(&self, level: &str, line: &str) -> bool {
        let config = &self.inner.config;
        let log_dir = match &config.log_dir {
            Some(dir) => dir,
            None => return false,
        };
        if !self.is_level_loggable(level) {
            return false;
        }

        self.inner.registry.write(WriteRequest {
            log_dir,
            log_name: &config.log_name,
            label: &config.label,
            level,
            rotation: config.rotation_enabled,
            message: line,
            notifier: &self.inner.console,
        })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.inner.config
    }

    pub fn label(&self) -> &str {
        &self.inner.config.label
    }

    pub fn log_name(&self) -> &str {
        &self.inner.config.log_name
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.inner.config.log_dir.as_deref()
    }

    pub fn threshold(&self) -> &str {
        &self.inner.config.threshold
    }

    pub fn levels(&self) -> &LevelTable {
        &self.inner.config.levels
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.inner.registry
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("config", &self.inner.config)
            .finish()
    }
}

/// A logger bound to one level name
#[derive(Debug, Clone, Copy)]
pub struct LevelLogger<'a> {
    logger: &'a Logger,
    level: &'a str,
}

impl LevelLogger<'_> {
    pub fn log<I>(&self, args: I) -> Dispatch
    where
        I: IntoIterator,
        I::Item: Into<Renderable>,
    {
        self.logger.log(self.level, args)
    }

    pub fn name(&self) -> &str {
        self.level
    }
}

use crate::error::DaylogError;
use crate::levels::Level;
use crate::logs::clock::{Clock, SystemClock};
use crate::logs::console::ConsoleSink;
use crate::logs::writer::{
    format_log_entry, log_file_path, rotation_key, timestamp_tag, StreamCommand, StreamState,
    StreamWriter,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// One cached log file for a logical log name
struct StreamEntry {
    path: PathBuf,
    rotation_key: Option<String>,
    sender: mpsc::UnboundedSender<StreamCommand>,
    state: watch::Receiver<StreamState>,
    task: JoinHandle<()>,
}

impl StreamEntry {
    fn is_writable(&self) -> bool {
        !self.sender.is_closed() && self.state.borrow().is_writable()
    }
}

struct RegistryInner {
    streams: Mutex<HashMap<String, StreamEntry>>,
    /// Writer tasks that were told to close but have not been awaited yet
    closing: Mutex<Vec<JoinHandle<()>>>,
    disabled: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
    /// Runtime that owns the writer tasks, whichever thread issues the write
    runtime: Option<Handle>,
}

/// A file write issued by a logger
pub(crate) struct WriteRequest<'a> {
    pub(crate) log_dir: &'a Path,
    pub(crate) log_name: &'a str,
    pub(crate) label: &'a str,
    pub(crate) level: &'a str,
    pub(crate) rotation: bool,
    pub(crate) message: &'a str,
    pub(crate) notifier: &'a ConsoleSink,
}

/// Shared cache of open log files, keyed by logical log name.
///
/// Every logger built on the same registry shares its files and its disabled
/// flag. Cloning is cheap and yields a handle to the same cache.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<RegistryInner>,
}

impl StreamRegistry {
    /// Create an empty registry using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty registry with a custom clock.
    ///
    /// Writer tasks run on the runtime current at construction, or on the
    /// writing thread's runtime when there was none.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::build(clock, Handle::try_current().ok())
    }

    /// Create an empty registry whose writer tasks run on `runtime`
    pub fn with_runtime(clock: Arc<dyn Clock>, runtime: Handle) -> Self {
        Self::build(clock, Some(runtime))
    }

    fn build(clock: Arc<dyn Clock>, runtime: Option<Handle>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                streams: Mutex::new(HashMap::new()),
                closing: Mutex::new(Vec::new()),
                disabled: Arc::new(AtomicBool::new(false)),
                clock,
                runtime,
            }),
        }
    }

    /// Process-wide registry
    pub fn global() -> &'static StreamRegistry {
        static GLOBAL: OnceLock<StreamRegistry> = OnceLock::new();
        GLOBAL.get_or_init(StreamRegistry::new)
    }

    /// Whether a file error has disabled file logging
    pub fn is_disabled(&self) -> bool {
        self.inner.disabled.load(Ordering::SeqCst)
    }

    /// State of the cached stream for `log_name`, if any
    pub fn state(&self, log_name: &str) -> Option<StreamState> {
        self.streams()
            .get(log_name)
            .map(|entry| *entry.state.borrow())
    }

    /// Path of the cached stream for `log_name`, if any
    pub fn path(&self, log_name: &str) -> Option<PathBuf> {
        self.streams().get(log_name).map(|entry| entry.path.clone())
    }

    /// Number of cached streams
    pub fn stream_count(&self) -> usize {
        self.streams().len()
    }

    /// Append one record for the request's logical log name.
    ///
    /// Returns whether a write was issued. The caller has already checked the
    /// level against its threshold.
    pub(crate) fn write(&self, request: WriteRequest<'_>) -> bool {
        if self.is_disabled() {
            return false;
        }

        let now = self.inner.clock.now();
        let timestamp = timestamp_tag(&now);
        let key = request.rotation.then(|| rotation_key(&now));
        let line = format_log_entry(&timestamp, request.label, request.level, request.message);

        let mut streams = self.streams();

        let stale = match streams.get(request.log_name) {
            Some(entry) => entry.rotation_key != key || !entry.is_writable(),
            None => false,
        };
        if stale {
            if let Some(entry) = streams.remove(request.log_name) {
                tracing::debug!(
                    "Retiring {} log stream at {}",
                    request.log_name,
                    entry.path.display()
                );
                self.retire(entry);
            }
        }

        if !streams.contains_key(request.log_name) {
            match self.open(&request, key) {
                Ok(entry) => {
                    streams.insert(request.log_name.to_string(), entry);
                }
                Err(error) => {
                    drop(streams);
                    self.inner.disabled.store(true, Ordering::SeqCst);
                    tracing::warn!("{}; file logging disabled", error);
                    request.notifier.write(
                        Level::Error.as_str(),
                        &format!("{} (disabling log files)", error),
                    );
                    return false;
                }
            }
        }

        match streams.get(request.log_name) {
            Some(entry) => {
                if entry.sender.send(StreamCommand::Write(line)).is_err() {
                    tracing::error!("Log stream for {} is gone; record dropped", request.log_name);
                }
                true
            }
            None => false,
        }
    }

    /// Close every cached stream and re-enable file logging
    pub fn close(&self) {
        let entries: Vec<StreamEntry> = self.streams().drain().map(|(_, entry)| entry).collect();
        for entry in entries {
            self.retire(entry);
        }
        self.inner.disabled.store(false, Ordering::SeqCst);
    }

    /// Wait until closing streams have finished and open streams have flushed
    /// everything sent to them so far
    pub async fn flush(&self) {
        let acks: Vec<oneshot::Receiver<()>> = self
            .streams()
            .values()
            .filter_map(|entry| {
                let (ack, done) = oneshot::channel();
                entry.sender.send(StreamCommand::Flush(ack)).ok().map(|_| done)
            })
            .collect();
        let closing = std::mem::take(&mut *self.closing());

        for task in closing {
            if let Err(e) = task.await {
                tracing::error!("Log stream task failed: {}", e);
            }
        }
        for done in acks {
            let _ = done.await;
        }
    }

    /// Close everything and wait for the files to be released
    pub async fn shutdown(&self) {
        self.close();
        self.flush().await;
    }

    fn open(&self, request: &WriteRequest<'_>, key: Option<String>) -> Result<StreamEntry, DaylogError> {
        let path = log_file_path(request.log_dir, request.log_name, key.as_deref());
        let runtime = self
            .runtime()
            .ok_or_else(|| DaylogError::NoRuntime(path.display().to_string()))?;

        let (sender, commands) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(StreamState::Opening);
        let writer = StreamWriter {
            path: path.clone(),
            log_name: request.log_name.to_string(),
            notifier: request.notifier.clone(),
            state,
            disabled: self.inner.disabled.clone(),
        };

        tracing::debug!("Opening {} log at {}", request.log_name, path.display());
        let task = runtime.spawn(writer.run(commands));

        Ok(StreamEntry {
            path,
            rotation_key: key,
            sender,
            state: state_rx,
            task,
        })
    }

    /// Runtime captured at construction, else the caller's runtime
    fn runtime(&self) -> Option<Handle> {
        self.inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    fn retire(&self, entry: StreamEntry) {
        let _ = entry.sender.send(StreamCommand::Close);
        let mut closing = self.closing();
        closing.retain(|task| !task.is_finished());
        closing.push(entry.task);
    }

    #[cfg(test)]
    fn closing_count(&self) -> usize {
        self.closing().len()
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<String, StreamEntry>> {
        self.inner.streams.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn closing(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.closing.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.stream_count())
            .field("disabled", &self.is_disabled())
            .field("clock", &self.inner.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::{LevelFilter, LevelTable};
    use crate::logs::clock::ManualClock;
    use crate::logs::console::{ConsoleCapture, ConsoleOutput};
    use chrono::{Duration, NaiveDate};
    use tempfile::TempDir;

    fn clock() -> ManualClock {
        ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(14, 0, 0)
                .unwrap(),
        )
    }

    fn notifier() -> (ConsoleSink, ConsoleCapture) {
        colored::control::set_override(false);
        let capture = ConsoleCapture::new();
        let sink = ConsoleSink::new(
            "app",
            LevelFilter::new(Arc::new(LevelTable::default()), "debug"),
            true,
            ConsoleOutput::Capture(capture.clone()),
        );
        (sink, capture)
    }

    fn request<'a>(dir: &'a Path, rotation: bool, message: &'a str, notifier: &'a ConsoleSink) -> WriteRequest<'a> {
        WriteRequest {
            log_dir: dir,
            log_name: "app",
            label: "app",
            level: "info",
            rotation,
            message,
            notifier,
        }
    }

    #[tokio::test]
    async fn test_write_opens_once_per_day() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StreamRegistry::with_clock(Arc::new(clock()));
        let (sink, capture) = notifier();

        for message in ["one", "two", "three"] {
            assert!(registry.write(request(temp_dir.path(), true, message, &sink)));
        }
        registry.flush().await;

        assert_eq!(registry.stream_count(), 1);
        assert_eq!(registry.state("app"), Some(StreamState::Open));
        assert_eq!(
            registry.path("app"),
            Some(temp_dir.path().join("app-2024-03-01.log"))
        );
        assert_eq!(capture.count_containing("Opened app log"), 1);

        let content = std::fs::read_to_string(temp_dir.path().join("app-2024-03-01.log")).unwrap();
        assert_eq!(
            content,
            "[2024-03-01 14:00:00][app][INFO] one\n\
             [2024-03-01 14:00:00][app][INFO] two\n\
             [2024-03-01 14:00:00][app][INFO] three\n"
        );

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_write_rotates_on_day_change() {
        let temp_dir = TempDir::new().unwrap();
        let clock = clock();
        let registry = StreamRegistry::with_clock(Arc::new(clock.clone()));
        let (sink, capture) = notifier();

        assert!(registry.write(request(temp_dir.path(), true, "before", &sink)));
        registry.flush().await;

        clock.advance(Duration::hours(10));
        assert!(registry.write(request(temp_dir.path(), true, "after", &sink)));
        registry.flush().await;

        assert_eq!(capture.count_containing("Opened app log"), 2);
        assert_eq!(capture.count_containing("Closing app log"), 1);
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("app-2024-03-01.log")).unwrap(),
            "[2024-03-01 14:00:00][app][INFO] before\n"
        );
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("app-2024-03-02.log")).unwrap(),
            "[2024-03-02 00:00:00][app][INFO] after\n"
        );

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_write_without_rotation_uses_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let clock = clock();
        let registry = StreamRegistry::with_clock(Arc::new(clock.clone()));
        let (sink, capture) = notifier();

        registry.write(request(temp_dir.path(), false, "first", &sink));
        clock.advance(Duration::days(2));
        registry.write(request(temp_dir.path(), false, "second", &sink));
        registry.flush().await;

        assert_eq!(capture.count_containing("Opened app log"), 1);
        let content = std::fs::read_to_string(temp_dir.path().join("app.log")).unwrap();
        assert_eq!(content.lines().count(), 2);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_error_disables_until_close() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        let registry = StreamRegistry::with_clock(Arc::new(clock()));
        let (sink, capture) = notifier();

        assert!(registry.write(request(&missing, true, "lost", &sink)));
        registry.flush().await;

        assert!(registry.is_disabled());
        assert_eq!(registry.state("app"), Some(StreamState::Disabled));
        assert_eq!(capture.count_containing("(disabling log files)"), 1);
        assert!(!registry.write(request(temp_dir.path(), true, "skipped", &sink)));

        registry.close();
        assert!(!registry.is_disabled());
        assert_eq!(registry.stream_count(), 0);

        assert!(registry.write(request(temp_dir.path(), true, "resumed", &sink)));
        registry.shutdown().await;

        let content = std::fs::read_to_string(temp_dir.path().join("app-2024-03-01.log")).unwrap();
        assert_eq!(content, "[2024-03-01 14:00:00][app][INFO] resumed\n");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StreamRegistry::with_clock(Arc::new(clock()));
        let (sink, capture) = notifier();

        registry.write(request(temp_dir.path(), true, "one", &sink));
        registry.close();
        registry.close();
        registry.flush().await;

        assert!(!registry.is_disabled());
        assert_eq!(registry.stream_count(), 0);
        assert_eq!(capture.count_containing("Closing app log"), 1);
    }

    #[test]
    fn test_write_from_thread_without_runtime_uses_stored_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let clock = clock();
        let registry = StreamRegistry::with_runtime(Arc::new(clock.clone()), runtime.handle().clone());
        let (sink, capture) = notifier();

        assert!(registry.write(request(temp_dir.path(), true, "day one", &sink)));
        clock.advance(Duration::days(1));

        let worker = registry.clone();
        let worker_sink = sink.clone();
        let dir = temp_dir.path().to_path_buf();
        let wrote = std::thread::spawn(move || {
            worker.write(request(&dir, true, "day two", &worker_sink))
        })
        .join()
        .unwrap();

        assert!(wrote);
        assert!(!registry.is_disabled());
        runtime.block_on(registry.shutdown());

        assert_eq!(capture.count_containing("(disabling log files)"), 0);
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("app-2024-03-02.log")).unwrap(),
            "[2024-03-02 14:00:00][app][INFO] day two\n"
        );
    }

    #[tokio::test]
    async fn test_retire_drops_finished_tasks() {
        let temp_dir = TempDir::new().unwrap();
        let clock = clock();
        let registry = StreamRegistry::with_clock(Arc::new(clock.clone()));
        let (sink, _capture) = notifier();

        for _ in 0..5 {
            assert!(registry.write(request(temp_dir.path(), true, "tick", &sink)));
            clock.advance(Duration::days(1));
            while registry.closing().iter().any(|task| !task.is_finished()) {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        }

        assert_eq!(registry.closing_count(), 1);
        registry.shutdown().await;
        assert_eq!(registry.closing_count(), 0);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 5);
    }

    #[test]
    fn test_write_without_runtime_disables() {
        let temp_dir = TempDir::new().unwrap();
        let registry = StreamRegistry::with_clock(Arc::new(clock()));
        let (sink, capture) = notifier();

        assert!(!registry.write(request(temp_dir.path(), true, "no runtime", &sink)));
        assert!(registry.is_disabled());
        assert_eq!(capture.count_containing("No async runtime"), 1);

        registry.close();
        assert!(!registry.is_disabled());
    }
}

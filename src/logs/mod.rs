// Logs module - Logger instances, console sink and shared log files

mod clock;
mod console;
mod logger;
mod registry;
mod writer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use console::{ConsoleCapture, ConsoleOutput, ConsoleSink};
pub use logger::{Dispatch, LevelLogger, Logger, LoggerConfig};
pub use registry::StreamRegistry;
pub use writer::StreamState;

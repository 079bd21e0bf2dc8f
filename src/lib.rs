// Library exports for daylog, a leveled console and daily-rotating file logger

pub mod config;
pub mod error;
pub mod levels;
pub mod logs;
pub mod render;

pub use config::{LogDefaults, LoggerOptions};
pub use error::{DaylogError, Result};
pub use levels::{Level, LevelDescriptor, LevelFilter, LevelTable};
pub use logs::{ConsoleCapture, ConsoleOutput, Dispatch, Logger, StreamRegistry, StreamState};
pub use render::{ErrorValue, Renderable};

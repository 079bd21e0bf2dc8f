// Rendering of log call arguments into a single line

use serde::Serialize;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;

/// One argument of a log call
#[derive(Debug, Clone, PartialEq)]
pub enum Renderable {
    /// Rendered verbatim
    Text(String),
    /// Rendered as compact JSON
    Structured(serde_json::Value),
    /// Rendered as `<kind>: <message>\nStack: <stack>`
    Error(ErrorValue),
}

impl Renderable {
    /// Wrap any serializable value
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Renderable::Structured(value),
            Err(e) => Renderable::Text(format!("[unserializable: {}]", e)),
        }
    }

    /// Wrap an error value
    pub fn error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        Renderable::Error(ErrorValue::from_error(error))
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Renderable::Text(text) => f.write_str(text),
            Renderable::Structured(value) => write!(f, "{}", value),
            Renderable::Error(error) => write!(f, "{}", error),
        }
    }
}

/// Join rendered arguments with a single space
pub fn render_line<I>(args: I) -> String
where
    I: IntoIterator,
    I::Item: Into<Renderable>,
{
    args.into_iter()
        .map(|arg| arg.into().render())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Error kind, message and stack text captured for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub kind: String,
    pub message: String,
    pub stack: String,
}

impl ErrorValue {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            stack: String::new(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }

    /// Capture an error: short type name, `Display` message and the chain of
    /// sources. Without sources the stack is a captured backtrace, or the
    /// error's `Debug` output when backtraces are off.
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        let stack = if causes.is_empty() {
            captured_backtrace().unwrap_or_else(|| format!("{:?}", error))
        } else {
            causes.join("\n")
        };

        Self {
            kind: short_type_name(std::any::type_name::<E>()).to_string(),
            message: error.to_string(),
            stack,
        }
    }

    /// Capture a panic payload and location
    pub fn from_panic(payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };

        let mut stack = String::new();
        if let Some(location) = location {
            stack.push_str(&format!("at {}\n", location));
        }
        if let Some(backtrace) = forced_backtrace() {
            stack.push_str(&backtrace);
        }

        Self {
            kind: "panic".to_string(),
            message,
            stack,
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}\nStack: {}", self.kind, self.message, self.stack)
    }
}

/// Backtrace text, only when `RUST_BACKTRACE` enables capturing
fn captured_backtrace() -> Option<String> {
    backtrace_text(Backtrace::capture())
}

fn forced_backtrace() -> Option<String> {
    backtrace_text(Backtrace::force_capture())
}

fn backtrace_text(backtrace: Backtrace) -> Option<String> {
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

/// Last path segment of a type name, without generic arguments
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl From<ErrorValue> for Renderable {
    fn from(value: ErrorValue) -> Self {
        Renderable::Error(value)
    }
}

impl From<serde_json::Value> for Renderable {
    fn from(value: serde_json::Value) -> Self {
        Renderable::Structured(value)
    }
}

impl From<&serde_json::Value> for Renderable {
    fn from(value: &serde_json::Value) -> Self {
        Renderable::Structured(value.clone())
    }
}

impl From<&str> for Renderable {
    fn from(value: &str) -> Self {
        Renderable::Text(value.to_string())
    }
}

impl From<String> for Renderable {
    fn from(value: String) -> Self {
        Renderable::Text(value)
    }
}

impl From<&String> for Renderable {
    fn from(value: &String) -> Self {
        Renderable::Text(value.clone())
    }
}

macro_rules! impl_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Renderable {
                fn from(value: $ty) -> Self {
                    Renderable::Text(value.to_string())
                }
            }
        )*
    };
}

impl_from_display!(bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// Build an array of [`Renderable`] from heterogeneous arguments.
///
/// ```
/// use daylog::log_args;
///
/// let args = log_args!["retry", 3, serde_json::json!({"ok": false})];
/// assert_eq!(daylog::render::render_line(args), r#"retry 3 {"ok":false}"#);
/// ```
#[macro_export]
macro_rules! log_args {
    ($($arg:expr),* $(,)?) => {
        [$($crate::render::Renderable::from($arg)),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct DiskFull;

    impl fmt::Display for DiskFull {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("no space left")
        }
    }

    impl std::error::Error for DiskFull {}

    #[derive(Debug)]
    struct WriteFailed(DiskFull);

    impl fmt::Display for WriteFailed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("write failed")
        }
    }

    impl std::error::Error for WriteFailed {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_plain_values_render_verbatim() {
        assert_eq!(render_line(["disk", "full"]), "disk full");
        assert_eq!(render_line(log_args!["count", 42, 1.5, true]), "count 42 1.5 true");
        assert_eq!(render_line(Vec::<String>::new()), "");
    }

    #[test]
    fn test_structured_values_render_as_json() {
        let line = render_line(log_args!["state", json!({"pid": 7, "up": true})]);
        assert_eq!(line, r#"state {"pid":7,"up":true}"#);

        let list = Renderable::structured(&vec![1, 2, 3]);
        assert_eq!(list.render(), "[1,2,3]");
    }

    #[test]
    fn test_error_value_format() {
        let value = ErrorValue::new("TypeError", "bad input").with_stack("at main");
        assert_eq!(value.to_string(), "TypeError: bad input\nStack: at main");
    }

    #[test]
    fn test_from_error_uses_type_name_and_sources() {
        let rendered = Renderable::error(&WriteFailed(DiskFull));
        match rendered {
            Renderable::Error(ref value) => {
                assert_eq!(value.kind, "WriteFailed");
                assert_eq!(value.message, "write failed");
                assert_eq!(value.stack, "caused by: no space left");
            }
            _ => panic!("expected an error value"),
        }
        assert!(rendered
            .render()
            .starts_with("WriteFailed: write failed\nStack: caused by"));
    }

    #[test]
    fn test_from_error_without_source_has_no_placeholder_stack() {
        let value = ErrorValue::from_error(&DiskFull);
        assert_eq!(value.kind, "DiskFull");
        assert_eq!(value.message, "no space left");
        assert!(!value.stack.contains("disabled backtrace"));
        assert!(!value.stack.contains("unsupported backtrace"));

        if Backtrace::capture().status() != BacktraceStatus::Captured {
            assert_eq!(value.stack, "DiskFull");
        }
    }

    #[test]
    fn test_from_panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let value = ErrorValue::from_panic(payload.as_ref(), None);
        assert_eq!(value.kind, "panic");
        assert_eq!(value.message, "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(ErrorValue::from_panic(payload.as_ref(), None).message, "owned boom");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("std::io::error::Error"), "Error");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}

//! Leveled logging for the `natbridge` workspace.
//!
//! The bridge runs on whatever thread calls into it, native or managed, so
//! logging has to be usable from anywhere without setup. This crate keeps a
//! single process-wide level behind an atomic and writes colored lines to
//! stderr, tagged with the module path of the call site.
//!
//! # Example
//!
//! ```
//! use natbridge_log::{Level, debug, error, info, warn};
//!
//! natbridge_log::set_level(Level::Debug);
//!
//! let peer = 0x2au64;
//! info!("bridge initialized");
//! debug!("allocated peer {peer:#x}");
//! warn!("autorelease with no pool in place");
//! error!("managed exception swallowed");
//! ```

use std::fmt::Arguments;
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable read by [`init_from_env`] when no name is given.
pub const DEFAULT_ENV_VAR: &str = "NATBRIDGE_LOG";

/// Severity of a log record.
///
/// Lower numeric values are more severe. A logger set to `Info` emits
/// `Error`, `Warn` and `Info` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Failures the bridge recovered from by dropping information.
    Error = 0,
    /// Suspicious but tolerated usage.
    Warn = 1,
    /// Lifecycle milestones.
    Info = 2,
    /// Class synthesis, thread attachment.
    Debug = 3,
    /// Per-object traffic.
    Trace = 4,
}

impl Level {
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            3 => Level::Debug,
            4 => Level::Trace,
            _ => Level::Info,
        }
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name, case-insensitively.
    ///
    /// ```
    /// use natbridge_log::Level;
    ///
    /// assert_eq!("trace".parse::<Level>(), Ok(Level::Trace));
    /// assert_eq!("WARN".parse::<Level>(), Ok(Level::Warn));
    /// assert!("loud".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(ParseLevelError {
                input: s.to_string(),
            }),
        }
    }
}

/// Error returned when a string does not name a [`Level`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    input: String,
}

impl std::fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid log level: {}", self.input)
    }
}

impl std::error::Error for ParseLevelError {}

/// Process-wide logger state.
pub struct Logger {
    level: AtomicU8,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
        }
    }

    /// Sets the most verbose level that will be emitted.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the current level.
    #[must_use]
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Returns whether a record at `level` would be emitted.
    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, creating it at `Level::Warn` on first use.
///
/// The bridge is a library; by default it only speaks up when something is
/// wrong.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Warn))
}

/// Sets the global level.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the global level from a level name.
///
/// # Errors
///
/// Returns [`ParseLevelError`] if `s` is not a level name. The current level
/// is left untouched in that case.
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    let level = s.parse::<Level>()?;
    set_level(level);
    Ok(())
}

/// Sets the global level from an environment variable.
///
/// `var` defaults to [`DEFAULT_ENV_VAR`]. Returns the level that was applied,
/// or `None` if the variable is unset or does not name a level.
pub fn init_from_env(var: Option<&str>) -> Option<Level> {
    let value = std::env::var(var.unwrap_or(DEFAULT_ENV_VAR)).ok()?;
    let level = value.parse::<Level>().ok()?;
    set_level(level);
    Some(level)
}

#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments<'_>) {
    const RESET: &str = "\x1b[0m";

    if !get_logger().enabled(level) {
        return;
    }

    let color = level.color_code();
    let name = level.as_str();
    // A closed stderr must never take the bridge down with it.
    let _ = writeln!(
        std::io::stderr().lock(),
        "{color}[{name}]{RESET} {target}: {args}"
    );
}

/// Logs at an explicit level.
///
/// ```
/// use natbridge_log::{Level, log};
///
/// log!(level: Level::Info, "released {} objects", 3);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {{
        let level = $level;
        if $crate::get_logger().enabled(level) {
            $crate::__log_with_target(level, module_path!(), format_args!($($arg)*));
        }
    }};
}

/// Logs at `Level::Error`.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs at `Level::Warn`.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs at `Level::Info`.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs at `Level::Debug`.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs at `Level::Trace`.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Info < Level::Debug);
        assert!(Level::Debug < Level::Trace);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("error".parse::<Level>(), Ok(Level::Error));
        assert_eq!("Warning".parse::<Level>(), Ok(Level::Warn));
        assert_eq!(" info ".parse::<Level>(), Ok(Level::Info));
        assert_eq!("DEBUG".parse::<Level>(), Ok(Level::Debug));
        assert_eq!("trace".parse::<Level>(), Ok(Level::Trace));

        let err = "verbose".parse::<Level>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid log level: verbose");
    }

    #[test]
    fn test_logger_filtering() {
        let logger = Logger::new(Level::Info);

        assert!(logger.enabled(Level::Error));
        assert!(logger.enabled(Level::Info));
        assert!(!logger.enabled(Level::Debug));

        logger.set_level(Level::Trace);
        assert!(logger.enabled(Level::Trace));
        assert_eq!(logger.level(), Level::Trace);
    }

    #[test]
    fn test_set_level_from_str_keeps_level_on_error() {
        set_level(Level::Warn);
        assert!(set_level_from_str("nonsense").is_err());
        assert_eq!(get_logger().level(), Level::Warn);
    }

    #[test]
    fn test_init_from_env_missing_variable() {
        assert_eq!(init_from_env(Some("NATBRIDGE_LOG_TEST_UNSET_VARIABLE")), None);
    }

    #[test]
    fn test_logging_from_threads() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    error!("thread {i} reporting");
                    trace!("thread {i} trace");
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}

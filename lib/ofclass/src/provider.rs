// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Providers let the embedding switch plug its own implementation of a
//! core service into the engine. Only logging is a provider today; a
//! unit test wants `println!`, a switch daemon wants its structured
//! logger.

use std::fmt;
use std::fmt::Display;

/// The set of services a flow table is built with.
pub struct Providers {
    pub log: Box<dyn LogProvider>,
}

impl Default for Providers {
    fn default() -> Self {
        Self { log: Box::new(PrintlnLog) }
    }
}

/// A logging provider provides the means to log messages to some
/// destination based on the context the engine is running in.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Discard every message.
#[derive(Clone, Copy)]
pub struct NullLog;

impl LogProvider for NullLog {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}

#[cfg(feature = "slog")]
pub use self::slog_log::SlogLog;

#[cfg(feature = "slog")]
mod slog_log {
    use super::LogLevel;
    use super::LogProvider;

    /// Forward engine messages to an [`slog::Logger`].
    #[derive(Clone)]
    pub struct SlogLog {
        log: slog::Logger,
    }

    impl SlogLog {
        pub fn new(log: slog::Logger) -> Self {
            Self { log }
        }
    }

    impl LogProvider for SlogLog {
        fn log(&self, level: LogLevel, msg: &str) {
            match level {
                LogLevel::Note => slog::info!(self.log, "{}", msg),
                LogLevel::Warn => slog::warn!(self.log, "{}", msg),
                LogLevel::Error => slog::error!(self.log, "{}", msg),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl LogProvider for Collect {
        fn log(&self, level: LogLevel, msg: &str) {
            self.0.lock().unwrap().push(format!("{level} {msg}"));
        }
    }

    #[test]
    fn levels_render() {
        let c = Collect::default();
        c.log(LogLevel::Warn, "table 0: add failed");
        c.log(LogLevel::Note, "table 0: strategy now tree");
        let lines = c.0.into_inner().unwrap();
        assert_eq!(lines[0], "[WARN] table 0: add failed");
        assert!(lines[1].starts_with("[NOTE]"));

        Providers::default().log.log(LogLevel::Error, "to stdout");
        NullLog.log(LogLevel::Error, "dropped");
    }
}

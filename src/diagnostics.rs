//! Diagnostic sink injected into every reader and processing step.
//!
//! Components never log through a global instance; they receive a `&dyn Diagnostics`
//! and report through it. [`LogDiagnostics`] forwards everything to the `log` facade.

use log::Level;
use std::fmt;

/// Receiver of diagnostic messages emitted while importing.
pub trait Diagnostics {
    /// Whether messages at `level` are wanted at all.
    fn enabled(&self, level: Level) -> bool {
        let _ = level;
        true
    }

    /// Records one message.
    fn record(&self, level: Level, args: fmt::Arguments<'_>);
}

/// Forwards diagnostics to the `log` facade under a fixed target.
#[derive(Copy, Clone, Debug)]
pub struct LogDiagnostics {
    target: &'static str,
}

impl LogDiagnostics {
    pub const fn new(target: &'static str) -> Self {
        LogDiagnostics { target }
    }
}

impl Default for LogDiagnostics {
    fn default() -> Self {
        LogDiagnostics::new("sheet_import")
    }
}

impl Diagnostics for LogDiagnostics {
    fn enabled(&self, level: Level) -> bool {
        log::log_enabled!(target: self.target, level)
    }

    fn record(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: self.target, level, "{}", args);
    }
}

/// Discards every message.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoDiagnostics;

impl Diagnostics for NoDiagnostics {
    fn enabled(&self, _level: Level) -> bool {
        false
    }

    fn record(&self, _level: Level, _args: fmt::Arguments<'_>) {}
}

/// Reports a formatted message to a diagnostic sink if its level is enabled.
#[macro_export]
macro_rules! diag {
    ($sink:expr, $level:expr, $($arg:tt)+) => {{
        let sink: &dyn $crate::diagnostics::Diagnostics = $sink;
        let level: log::Level = $level;
        if sink.enabled(level) {
            sink.record(level, format_args!($($arg)+));
        }
    }};
}

/// Keeps every message in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryDiagnostics {
    pub(crate) messages: std::cell::RefCell<Vec<(Level, String)>>,
}

#[cfg(test)]
impl MemoryDiagnostics {
    pub(crate) fn contains(&self, level: Level, fragment: &str) -> bool {
        self.messages
            .borrow()
            .iter()
            .any(|(recorded, message)| *recorded == level && message.contains(fragment))
    }
}

#[cfg(test)]
impl Diagnostics for MemoryDiagnostics {
    fn record(&self, level: Level, args: fmt::Arguments<'_>) {
        self.messages.borrow_mut().push((level, args.to_string()));
    }
}

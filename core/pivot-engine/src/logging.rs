//! FILENAME: core/pivot-engine/src/logging.rs
// PURPOSE: Category-tagged logging for the pivot engine.
// CONTEXT: Lines go through the `log` facade with the category as target, so
//          the host application decides where they end up.

use std::sync::atomic::{AtomicU64, Ordering};

pub use log::Level;

/// Sequence counter so interleaved lines from the two load tasks can be ordered.
static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

/// Get next sequence number
pub fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst) + 1
}

/// Write a log line in unified format
pub fn write_log(level: Level, category: &str, message: &str) {
    let seq = next_seq();
    log::log!(target: category, level, "{}|{}", seq, message);
}

/// Write an ENTER log line for function entry
pub fn write_log_enter(level: Level, category: &str, func_name: &str, params: &str) {
    let message = if params.is_empty() {
        format!("ENTER {}", func_name)
    } else {
        format!("ENTER {} {}", func_name, params)
    };
    write_log(level, category, &message);
}

/// Write an EXIT log line for function exit
pub fn write_log_exit(level: Level, category: &str, func_name: &str, result: &str) {
    let message = if result.is_empty() {
        format!("EXIT {}", func_name)
    } else {
        format!("EXIT {} {}", func_name, result)
    };
    write_log(level, category, &message);
}

// ============================================================================
// MACRO DEFINITIONS & EXPORTS
// ============================================================================

#[macro_export]
macro_rules! log_debug {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::write_log($crate::logging::Level::Debug, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::write_log($crate::logging::Level::Info, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::write_log($crate::logging::Level::Warn, $cat, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($cat:expr, $($arg:tt)*) => {
        $crate::logging::write_log($crate::logging::Level::Error, $cat, &format!($($arg)*))
    };
}

// ENTER/EXIT macros for function tracing

#[macro_export]
macro_rules! log_enter {
    ($cat:expr, $func:expr) => {
        $crate::logging::write_log_enter($crate::logging::Level::Debug, $cat, $func, "")
    };
    ($cat:expr, $func:expr, $($arg:tt)*) => {
        $crate::logging::write_log_enter($crate::logging::Level::Debug, $cat, $func, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_exit {
    ($cat:expr, $func:expr) => {
        $crate::logging::write_log_exit($crate::logging::Level::Debug, $cat, $func, "")
    };
    ($cat:expr, $func:expr, $($arg:tt)*) => {
        $crate::logging::write_log_exit($crate::logging::Level::Debug, $cat, $func, &format!($($arg)*))
    };
}

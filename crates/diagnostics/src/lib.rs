//! Shared logging facade for the aggregated-log crates.
//!
//! Log output is controlled by the AGGLOG_LOG environment variable:
//! - AGGLOG_LOG=off (default) - silent
//! - AGGLOG_LOG=error|warn|info|debug - emit at or above that level
//!
//! All crates in the workspace log through the `log_*` macros below so a
//! single `init()` at process startup configures everything.

use std::sync::Once;

// Re-export emit so the macros expand against our copy of it.
pub use emit;

static INIT: Once = Once::new();

/// Initialize logging from the AGGLOG_LOG environment variable.
///
/// Safe to call more than once; only the first call does any setup.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let level = std::env::var("AGGLOG_LOG").unwrap_or_else(|_| "off".to_string());

        let min = match level.as_str() {
            "off" => return,
            "error" => emit::Level::Error,
            "warn" => emit::Level::Warn,
            "info" => emit::Level::Info,
            "debug" => emit::Level::Debug,
            other => {
                eprintln!("Unknown AGGLOG_LOG value '{}', using 'info'", other);
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(min))
            .init();

        // The emit runtime must outlive the process; there is no shutdown
        // point where flushing it would be observable.
        std::mem::forget(rt);
    });
}

pub use init_diagnostics as init;

/// Log routine operations: cycle published, file opened, retention swept.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log per-record detail: segment counts, byte totals, cache hits.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log recoverable trouble: a skipped file, a swallowed deletion failure.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures surfaced to callers: publish errors, unreadable bundles.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

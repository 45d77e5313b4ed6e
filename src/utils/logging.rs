//! Logging macros gated by a per-module switch.
//!
//! A module opts in by declaring `const ENABLE_LOGS: bool` and then calling
//! `log_info!`, `log_warn!` or `log_error!` (exported at the crate root). The
//! cadence loops use these so their per-tick chatter can be silenced without
//! touching the global `RUST_LOG` filter.
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! log_info!("preview cadence re-armed at {fps} Hz");
//! ```

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

//! Logging abstraction
//!
//! Unified logging macros across build targets:
//! - Hardware (`stm32f072` feature): defmt over RTT
//! - Host tests: println!
//! - Host non-test builds: no-op

/// Log informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "stm32f072")]
        ::defmt::info!($($arg)*);

        #[cfg(all(not(feature = "stm32f072"), test))]
        println!("[INFO] {}", format!($($arg)*));
    }};
}

/// Log warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "stm32f072")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "stm32f072"), test))]
        println!("[WARN] {}", format!($($arg)*));
    }};
}

/// Log error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "stm32f072")]
        ::defmt::error!($($arg)*);

        #[cfg(all(not(feature = "stm32f072"), test))]
        println!("[ERROR] {}", format!($($arg)*));
    }};
}

use core::fmt::Display;

use tracing::{error, warn};

fn log_and_panic<Err: Display>(error: Err, message: &str) -> ! {
    error!("{message}: {error}");

    panic!("{message}: {error}");
}

/// Extension trait for results.
pub trait Failure<T> {
    /// Log an error and panic.
    ///
    /// Only for startup paths where there is nothing sensible left to do.
    fn or_log_and_panic(self, message: &str) -> T;

    /// Log an error as a warning and discard it.
    fn or_log(self, message: &str) -> Option<T>;
}

impl<T, E: Display> Failure<T> for Result<T, E> {
    fn or_log_and_panic(self, message: &str) -> T {
        match self {
            Ok(value) => value,
            Err(error) => log_and_panic(error, message),
        }
    }

    fn or_log(self, message: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                warn!("{message}: {error}");
                None
            }
        }
    }
}

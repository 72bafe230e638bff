//! env_logger setup shared by the binary and embedding applications.
use log::SetLoggerError;

/// Initialise logging from `RUST_LOG`, defaulting to `info`.
/// Returns an error instead of panicking when a logger is already set.
pub fn init() -> Result<(), SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
}

/// Logging for tests: captured by the harness, never fails.
#[cfg(test)]
pub fn init_for_tests() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

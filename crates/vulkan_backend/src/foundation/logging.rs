//! Logging utilities
//!
//! The crate logs through the `log` facade; binaries pick the sink. `env_logger`
//! is the default sink and honours `RUST_LOG`.

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize logging with a default filter used when `RUST_LOG` is unset
pub fn init_with_level(level: log::LevelFilter) {
    let env = env_logger::Env::default().default_filter_or(level.as_str());
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init_with_level(log::LevelFilter::Debug);
        init();
        info!("logging initialised twice without panicking");
    }
}

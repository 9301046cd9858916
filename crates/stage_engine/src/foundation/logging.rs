//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    // A second init (e.g. from several tests) is harmless
    let _ = env_logger::try_init();
}

/// Initialize the logging system with a default level when `RUST_LOG` is unset
pub fn init_with_level(level: log::LevelFilter) {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

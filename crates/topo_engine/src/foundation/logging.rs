//! Logging utilities

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
///
/// Honours `RUST_LOG`; falls back to `info` when the variable is unset.
pub fn init() {
    let env = env_logger::Env::default().default_filter_or("info");
    // A second init (tests, tools embedding the engine) is harmless.
    let _ = env_logger::Builder::from_env(env).try_init();
}

//! Logging setup.

use log::LevelFilter;

/// Initialize the global logger, honoring `RUST_LOG` if set and otherwise
/// falling back to `level`.
///
/// Mirrors the `env_logger::Builder::from_default_env()` setup used across
/// the Cincinnati binaries, reduced to the single `--debug` flag this tool
/// exposes instead of a verbosity counter.
pub fn init(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

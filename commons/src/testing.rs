//! Test helpers.

/// Initialize logging for a test run; safe to call more than once.
pub fn init_logger() {
    let _ = env_logger::try_init_from_env(env_logger::Env::default());
}

//! Error taxonomy for the registry-client adapter (spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The external tool returned a non-zero status. `command` never
    /// contains secret material — see [`crate::secret::Secret`].
    #[error("command `{command}` finished with error:\n{output}")]
    Command { command: String, output: String },

    /// A bounded operation exceeded its timeout.
    #[error("'{operation}' timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// The subprocess itself could not be spawned.
    #[error("failed to run external tool: {0}")]
    Spawn(#[from] std::io::Error),
}

use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The number of workers cannot be zero.
    #[error("`workers` cannot be zero")]
    WorkersZero,
    /// The maximum number of source connections cannot be zero.
    #[error("`connections` cannot be zero")]
    ConnectionsZero,
    /// The maximum number of build attempts cannot be zero.
    #[error("`maxRetries` cannot be zero")]
    MaxRetriesZero,
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A schema declares nested schemas without a key to correlate them.
    #[error("{path}: a key is required to include nested objects")]
    MissingNestedKey { path: String },
}

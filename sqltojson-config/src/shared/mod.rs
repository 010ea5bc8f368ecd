//! Shared configuration types for export runs.

mod base;
mod connection;
mod export;
mod files;
mod schema;

pub use base::ValidationError;
pub use connection::{DefaultPgConnectionOptions, IntoConnectOptions, PgConnectionConfig, TlsConfig};
pub use export::ExportConfig;
pub use files::{FilesConfig, OutputTarget, STDOUT_TARGET};
pub use schema::SchemaConfig;

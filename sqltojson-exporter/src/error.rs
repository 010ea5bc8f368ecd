use std::error::Error;
use std::fmt::Write;

use sqltojson::error::EtlError;
use thiserror::Error;

pub type ExporterResult<T> = Result<T, ExporterError>;

/// Failure of the exporter binary.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// The export itself failed, including connecting to the source.
    #[error(transparent)]
    Export(#[from] EtlError),
    /// The configuration could not be loaded or is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[source] Box<dyn Error + Send + Sync>),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl ExporterError {
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ExporterError::Config(Box::new(err))
    }

    fn category(&self) -> &'static str {
        match self {
            ExporterError::Export(_) => "export",
            ExporterError::Config(_) => "configuration",
            ExporterError::Io(_) => "i/o",
        }
    }

    /// Renders the error, its causes and, with `RUST_BACKTRACE` enabled, the backtrace of the
    /// export failure for the terminal.
    pub fn render_report(&self) -> String {
        let mut report = format!("sqltojson failed ({} error)\n{self}\n", self.category());

        // Grouped export errors already render every member.
        let grouped = matches!(self, ExporterError::Export(err) if err.errors().is_some());
        if !grouped {
            let mut cause = self.source();
            while let Some(err) = cause {
                let _ = writeln!(report, "caused by: {err}");
                cause = err.source();
            }
        }

        let backtrace_enabled = matches!(
            std::env::var("RUST_BACKTRACE").as_deref(),
            Ok("1" | "full")
        );
        if backtrace_enabled
            && let ExporterError::Export(err) = self
            && let Some(backtrace) = err.backtrace()
        {
            let _ = writeln!(report, "backtrace:\n{backtrace}");
        }

        report
    }
}

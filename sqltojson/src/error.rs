//! Errors raised while exporting.
//!
//! An [`EtlError`] is either one classified failure, carrying where it was raised and what caused
//! it, or a group of failures collected from several workers of the same run.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used across the export pipeline.
pub type EtlResult<T> = Result<T, EtlError>;

/// Classification of export failures.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The source database could not be reached or its pool is unusable.
    SourceConnectionFailed,
    /// A query was rejected or failed while executing.
    SourceQueryFailed,
    /// A column value could not be decoded.
    ConversionError,
    InvalidData,
    ConfigError,
    IoError,
    SerializationError,
    /// A root record failed to build on every allowed attempt.
    BuildRetriesExhausted,
    WorkerPanic,
    Unknown,
}

/// Failure raised at a single call site.
#[derive(Debug, Clone)]
struct Failure {
    kind: ErrorKind,
    description: &'static str,
    detail: Option<Cow<'static, str>>,
    cause: Option<Arc<dyn error::Error + Send + Sync>>,
    backtrace: Arc<Backtrace>,
}

#[derive(Debug, Clone)]
enum Body {
    Failure(Failure),
    Group(Vec<EtlError>),
}

/// Error type of the export pipeline.
#[derive(Debug, Clone)]
pub struct EtlError {
    body: Body,
    location: &'static Location<'static>,
}

impl EtlError {
    #[track_caller]
    fn failure(kind: ErrorKind, description: &'static str, detail: Option<Cow<'static, str>>) -> Self {
        Self {
            body: Body::Failure(Failure {
                kind,
                description,
                detail,
                cause: None,
                backtrace: Arc::new(Backtrace::capture()),
            }),
            location: Location::caller(),
        }
    }

    /// Builds an error whose detail is the rendered `cause`, keeping `cause` as the source.
    #[track_caller]
    fn caused_by<E>(kind: ErrorKind, description: &'static str, cause: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        Self::failure(kind, description, Some(Cow::Owned(cause.to_string()))).with_source(cause)
    }

    /// Returns the kind of this error, or of the first grouped error.
    pub fn kind(&self) -> ErrorKind {
        match &self.body {
            Body::Failure(failure) => failure.kind,
            Body::Group(errors) => errors.first().map_or(ErrorKind::Unknown, EtlError::kind),
        }
    }

    /// Returns the kinds of every failure, flattening groups.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match &self.body {
            Body::Failure(failure) => vec![failure.kind],
            Body::Group(errors) => errors.iter().flat_map(EtlError::kinds).collect(),
        }
    }

    /// Returns the dynamic detail, or the first one found in a group.
    pub fn detail(&self) -> Option<&str> {
        match &self.body {
            Body::Failure(failure) => failure.detail.as_deref(),
            Body::Group(errors) => errors.iter().find_map(EtlError::detail),
        }
    }

    /// Returns the grouped errors when this error collects several failures.
    pub fn errors(&self) -> Option<&[EtlError]> {
        match &self.body {
            Body::Failure(_) => None,
            Body::Group(errors) => Some(errors),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match &self.body {
            Body::Failure(failure) => Some(&failure.backtrace),
            Body::Group(_) => None,
        }
    }

    /// Returns where the error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Records `source` as the cause of this error. Groups are left unchanged.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let Body::Failure(failure) = &mut self.body {
            failure.cause = Some(Arc::new(source));
        }
        self
    }
}

/// Kinds compare for single failures; groups compare element-wise.
impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        match (&self.body, &other.body) {
            (Body::Failure(a), Body::Failure(b)) => a.kind == b.kind,
            (Body::Group(a), Body::Group(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = self.location;

        match &self.body {
            Body::Failure(failure) => {
                write!(
                    f,
                    "{:?}: {} (at {}:{})",
                    failure.kind,
                    failure.description,
                    at.file(),
                    at.line()
                )?;

                if let Some(detail) = failure.detail.as_deref().filter(|d| !d.trim().is_empty()) {
                    for line in detail.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                Ok(())
            }
            Body::Group(errors) => {
                write!(f, "{} errors (at {}:{})", errors.len(), at.file(), at.line())?;

                for (position, err) in errors.iter().enumerate() {
                    let rendered = err.to_string();
                    for (line_no, line) in rendered.lines().enumerate() {
                        if line_no == 0 {
                            write!(f, "\n  {}) {line}", position + 1)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.body {
            Body::Failure(failure) => failure
                .cause
                .as_deref()
                .map(|cause| cause as &(dyn error::Error + 'static)),
            Body::Group(errors) => errors.first().map(|err| err as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> EtlError {
        EtlError::failure(kind, description, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::failure(kind, description, Some(detail.into()))
    }
}

/// Groups several errors. A single error is returned as is.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();
        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();

        match errors.pop() {
            Some(only) if errors.is_empty() => only,
            Some(last) => {
                errors.push(last);
                EtlError {
                    body: Body::Group(errors),
                    location,
                }
            }
            None => EtlError {
                body: Body::Group(errors),
                location,
            },
        }
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::caused_by(ErrorKind::IoError, "I/O operation failed", err)
    }
}

/// JSON is only ever written, so every non-I/O failure is a serialization error.
impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        if err.is_io() {
            EtlError::caused_by(ErrorKind::IoError, "Failed to write JSON", err)
        } else {
            EtlError::caused_by(ErrorKind::SerializationError, "Failed to encode JSON", err)
        }
    }
}

/// Decoding failures become [`ErrorKind::ConversionError`] so that a bad row can be told apart from
/// a failed query.
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let (kind, description) = match &err {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. } => {
                (ErrorKind::ConversionError, "Failed to decode row")
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut => {
                (ErrorKind::SourceConnectionFailed, "Source connection failed")
            }
            _ => (ErrorKind::SourceQueryFailed, "Source query failed"),
        };

        EtlError::caused_by(kind, description, err)
    }
}

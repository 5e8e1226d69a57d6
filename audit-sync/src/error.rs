//! Error types of the audit sync pipeline.
//!
//! [`SyncError`] carries a classification, a static description, optional dynamic detail, the
//! originating error and the callsite where it was raised. Errors raised by independent tasks
//! can be aggregated into a single value, which is how worker failures surface on shutdown.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type of fallible pipeline operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Error raised by the pipeline, its stores and its sinks.
#[derive(Debug, Clone)]
pub struct SyncError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Errors of several tasks, e.g. every worker that panicked.
    Many {
        errors: Vec<SyncError>,
        location: &'static Location<'static>,
    },
}

/// Classification of a [`SyncError`].
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Source
    SourceConnectionFailed,
    SourceQueryFailed,
    SourceLockTimeout,
    SourceOperationCanceled,
    SourceSchemaError,

    // Sink
    SinkConnectionFailed,
    SinkRequestFailed,
    SinkRejected,
    SinkTimeout,

    // Data
    InvalidData,
    ConversionError,
    SerializationError,
    DeserializationError,

    // Configuration & security
    ConfigError,
    AuthenticationError,

    // Runtime
    IoError,
    InvalidState,
    PollerPanic,
    WorkerPanic,
    ReaperPanic,

    Unknown,

    /// Raised by fault injection in tests.
    #[cfg(feature = "failpoints")]
    InjectedFailure,
}

impl SyncError {
    /// Returns the kind of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns the kinds of every contained error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error. Ignored on aggregates.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SyncError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail:", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace:", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, header: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {header}")?;
    if body.trim().is_empty() {
        return write!(f, " <empty>");
    }

    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for SyncError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for SyncError
where
    E: Into<SyncError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> SyncError {
        let location = Location::caller();

        let mut errors: Vec<SyncError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1 {
            return errors.remove(0);
        }

        SyncError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for SyncError {
    #[track_caller]
    fn from(err: std::io::Error) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for SyncError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SyncError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Data if err.line() == 0 => {
                // Raised while serializing, e.g. an invalid raw payload.
                (ErrorKind::SerializationError, "JSON serialization failed")
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Classifies database errors by SQLSTATE class.
impl From<sqlx::Error> for SyncError {
    #[track_caller]
    fn from(err: sqlx::Error) -> SyncError {
        let (kind, description) = match &err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|code| code.into_owned()).unwrap_or_default();
                match code.as_str() {
                    "55P03" => (
                        ErrorKind::SourceLockTimeout,
                        "PostgreSQL lock not available",
                    ),
                    "57014" => (
                        ErrorKind::SourceOperationCanceled,
                        "PostgreSQL query canceled",
                    ),
                    code if code.starts_with("08") || code.starts_with("53") => (
                        ErrorKind::SourceConnectionFailed,
                        "PostgreSQL connection failed",
                    ),
                    code if code.starts_with("28") => (
                        ErrorKind::AuthenticationError,
                        "PostgreSQL authentication failed",
                    ),
                    "42P01" | "42703" | "3F000" => (
                        ErrorKind::SourceSchemaError,
                        "PostgreSQL schema object not found",
                    ),
                    code if code.starts_with("22") => (
                        ErrorKind::ConversionError,
                        "PostgreSQL data conversion failed",
                    ),
                    _ => (ErrorKind::SourceQueryFailed, "Database operation failed"),
                }
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                (ErrorKind::SourceConnectionFailed, "Database connection failed")
            }
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => (
                ErrorKind::SourceConnectionFailed,
                "Database connection pool unavailable",
            ),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => (
                ErrorKind::ConversionError,
                "Database value decoding failed",
            ),
            _ => (ErrorKind::SourceQueryFailed, "Database operation failed"),
        };

        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<sqlx::migrate::MigrateError> for SyncError {
    #[track_caller]
    fn from(err: sqlx::migrate::MigrateError) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::SourceSchemaError,
            Cow::Borrowed("Database migration failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<reqwest::Error> for SyncError {
    #[track_caller]
    fn from(err: reqwest::Error) -> SyncError {
        let (kind, description) = if err.is_timeout() {
            (ErrorKind::SinkTimeout, "Sink request timed out")
        } else if err.is_connect() {
            (ErrorKind::SinkConnectionFailed, "Sink connection failed")
        } else if err.is_status() {
            (ErrorKind::SinkRejected, "Sink rejected the request")
        } else if err.is_builder() {
            (ErrorKind::ConfigError, "Sink request could not be built")
        } else {
            (ErrorKind::SinkRequestFailed, "Sink request failed")
        };

        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::sync_error;

    #[test]
    fn single_error_display_contains_kind_description_and_detail() {
        let err = sync_error!(
            ErrorKind::SinkRejected,
            "Bulk request rejected",
            "status 400"
        );
        let rendered = err.to_string();

        assert!(rendered.starts_with("[SinkRejected] Bulk request rejected @ "));
        assert!(rendered.contains("Detail:\n    status 400"));
        assert_eq!(err.kind(), ErrorKind::SinkRejected);
        assert_eq!(err.detail(), Some("status 400"));
    }

    #[test]
    fn aggregating_one_error_returns_it_unchanged() {
        let err = SyncError::from(vec![sync_error!(ErrorKind::WorkerPanic, "Worker panicked")]);

        assert_eq!(err.kind(), ErrorKind::WorkerPanic);
        assert_eq!(err.kinds(), vec![ErrorKind::WorkerPanic]);
    }

    #[test]
    fn aggregated_errors_keep_every_kind() {
        let err = SyncError::from(vec![
            sync_error!(ErrorKind::WorkerPanic, "Worker panicked"),
            sync_error!(ErrorKind::ReaperPanic, "Reaper panicked"),
        ]);

        assert_eq!(
            err.kinds(),
            vec![ErrorKind::WorkerPanic, ErrorKind::ReaperPanic]
        );
        assert!(err.to_string().starts_with("[Many] 2 errors aggregated"));
        assert!(err.source().is_some());
    }

    #[test]
    fn serde_json_errors_are_classified_by_direction() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            SyncError::from(parse_err).kind(),
            ErrorKind::DeserializationError
        );

        let raw_err = serde_json::value::RawValue::from_string("{".to_string()).unwrap_err();
        assert_eq!(
            SyncError::from(raw_err).kind(),
            ErrorKind::DeserializationError
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = SyncError::from(std::io::Error::other("disk gone"));

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk gone"));
    }
}

//! Error types and result definitions for pipeline operations.
//!
//! Provides an error system with classification and aggregation for the alert
//! pipeline. The [`AlertError`] type supports single errors, errors with
//! additional detail, and multiple aggregated errors for multi-worker failure
//! scenarios.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::sync::Arc;

/// Convenient result type for pipeline operations using [`AlertError`] as the error type.
pub type AlertResult<T> = Result<T, AlertError>;

/// Detailed payload stored for single [`AlertError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
}

/// Main error type for pipeline operations.
///
/// [`AlertError`] can represent a single classified error or multiple
/// aggregated errors, which is mainly useful to capture the failures of
/// several workers at once.
#[derive(Debug, Clone)]
pub struct AlertError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many(Vec<AlertError>),
}

/// Specific categories of errors that can occur during pipeline operations.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Could not connect to the notification source or the backing store.
    SourceConnectionFailed,
    /// A query against the backing store failed.
    SourceQueryFailed,
    /// The bulk append of a staged batch failed.
    SinkFailed,
    /// The merge of staged rows into canonical state failed.
    MergeFailed,
    /// A payload could not be deserialized.
    DeserializationError,
    /// Configuration was invalid or incomplete.
    ConfigError,
    /// An operation was attempted in a state that does not allow it.
    InvalidState,
    /// The ingestion batching worker panicked.
    IngestWorkerPanic,
    /// A notification listener task panicked.
    ListenerPanic,
    /// Uncategorized error.
    Unknown,
}

impl AlertError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the list is empty.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.kind,
            ErrorRepr::Many(errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match &self.repr {
            ErrorRepr::Single(payload) => vec![payload.kind],
            ErrorRepr::Many(errors) => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.detail.as_deref(),
            ErrorRepr::Many(errors) => errors.iter().find_map(|err| err.detail()),
        }
    }

    /// Attaches a source error to this error.
    ///
    /// For aggregated errors, the source is discarded since there is no
    /// single failure it belongs to.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(payload) = &mut self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }
}

impl fmt::Display for AlertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                write!(f, "{:?}: {}", payload.kind, payload.description)?;
                if let Some(detail) = &payload.detail {
                    write!(f, " ({detail})")?;
                }
                if let Some(source) = &payload.source {
                    write!(f, ": {source}")?;
                }

                Ok(())
            }
            ErrorRepr::Many(errors) => {
                write!(f, "{} errors occurred:", errors.len())?;
                for error in errors {
                    write!(f, " [{error}]")?;
                }

                Ok(())
            }
        }
    }
}

impl error::Error for AlertError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many(_) => None,
        }
    }
}

impl<D> From<(ErrorKind, D)> for AlertError
where
    D: Into<Cow<'static, str>>,
{
    fn from((kind, description): (ErrorKind, D)) -> Self {
        Self {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description: description.into(),
                detail: None,
                source: None,
            }),
        }
    }
}

impl<D, T> From<(ErrorKind, D, T)> for AlertError
where
    D: Into<Cow<'static, str>>,
    T: Into<Cow<'static, str>>,
{
    fn from((kind, description, detail): (ErrorKind, D, T)) -> Self {
        Self {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description: description.into(),
                detail: Some(detail.into()),
                source: None,
            }),
        }
    }
}

impl From<Vec<AlertError>> for AlertError {
    fn from(errors: Vec<AlertError>) -> Self {
        Self {
            repr: ErrorRepr::Many(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_error_reports_kind_and_detail() {
        let error = AlertError::from((
            ErrorKind::SinkFailed,
            "Failed to stage batch",
            "batch of 3 rows",
        ));

        assert_eq!(error.kind(), ErrorKind::SinkFailed);
        assert_eq!(error.detail(), Some("batch of 3 rows"));
    }

    #[test]
    fn aggregated_errors_flatten_kinds() {
        let errors = vec![
            AlertError::from((ErrorKind::IngestWorkerPanic, "ingest worker panicked")),
            AlertError::from((ErrorKind::ListenerPanic, "listener panicked")),
        ];
        let aggregated = AlertError::from(errors);

        assert_eq!(aggregated.kind(), ErrorKind::IngestWorkerPanic);
        assert_eq!(
            aggregated.kinds(),
            vec![ErrorKind::IngestWorkerPanic, ErrorKind::ListenerPanic]
        );
    }
}

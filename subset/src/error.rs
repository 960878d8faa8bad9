//! Error types and result definitions for subsetting runs.
//!
//! Every failure in a run is fatal, so [`SubsetError`] carries enough context to explain the
//! failure on its own: an [`ErrorKind`], a static description, optional dynamic detail naming
//! the table or edge involved, the originating error, the call site and a backtrace.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type for subsetting operations.
pub type SubsetResult<T> = Result<T, SubsetError>;

/// Main error type for subsetting operations.
#[derive(Debug, Clone)]
pub struct SubsetError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Specific categories of errors that can occur during a run.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Metadata errors
    MetadataQueryFailed,

    // Closure errors
    ClosureQueryFailed,

    // Ordering errors
    DependencyCycle,

    // Transfer errors
    DestinationTruncateFailed,
    SourceFetchFailed,
    DestinationInsertFailed,

    // Store errors
    SourceConnectionFailed,
    DestinationConnectionFailed,
    SourceQueryFailed,
    DestinationQueryFailed,
    ConversionError,
    UnsupportedColumnType,
    InvalidData,

    // Configuration errors
    ConfigError,

    IoError,
    Unknown,
}

/// Coarse grouping of [`ErrorKind`]s by the stage of the run that failed.
///
/// Lets operators tell bad data (closure) apart from a bad schema graph (ordering).
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
pub enum ErrorCategory {
    /// Introspecting foreign keys failed; nothing was copied.
    Metadata,
    /// Discovering required rows failed; nothing was copied.
    Closure,
    /// The needed tables cannot be ordered; nothing was copied.
    Ordering,
    /// Copying a table failed; earlier tables remain copied.
    Transfer,
    /// A store level failure not yet attributed to a stage.
    Store,
    Config,
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::MetadataQueryFailed => ErrorCategory::Metadata,
            ErrorKind::ClosureQueryFailed => ErrorCategory::Closure,
            ErrorKind::DependencyCycle => ErrorCategory::Ordering,
            ErrorKind::DestinationTruncateFailed
            | ErrorKind::SourceFetchFailed
            | ErrorKind::DestinationInsertFailed => ErrorCategory::Transfer,
            ErrorKind::ConfigError => ErrorCategory::Config,
            ErrorKind::SourceConnectionFailed
            | ErrorKind::DestinationConnectionFailed
            | ErrorKind::SourceQueryFailed
            | ErrorKind::DestinationQueryFailed
            | ErrorKind::ConversionError
            | ErrorKind::UnsupportedColumnType
            | ErrorKind::InvalidData
            | ErrorKind::IoError
            | ErrorKind::Unknown => ErrorCategory::Store,
        }
    }
}

impl SubsetError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the dynamic detail, usually naming the table or edge that failed.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Attaches an originating error, exposed via [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        SubsetError {
            kind,
            description,
            detail,
            source: None,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

impl PartialEq for SubsetError {
    fn eq(&self, other: &SubsetError) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for SubsetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        if let Some(detail) = &self.detail {
            write!(f, "\n  Detail:")?;
            for line in detail.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        let rendered_backtrace = self.backtrace.to_string();
        if !rendered_backtrace.trim().is_empty() && !rendered_backtrace.contains("disabled") {
            write!(f, "\n  Backtrace:")?;
            for line in rendered_backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for SubsetError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<(ErrorKind, &'static str)> for SubsetError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SubsetError {
        SubsetError::from_components(kind, Cow::Borrowed(desc), None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for SubsetError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SubsetError {
        SubsetError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()))
    }
}

impl From<std::io::Error> for SubsetError {
    #[track_caller]
    fn from(err: std::io::Error) -> SubsetError {
        let detail = err.to_string();
        SubsetError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
        )
        .with_source(err)
    }
}

/// Converts [`sqlx::Error`] into a [`SubsetError`].
///
/// Pool and connection failures map to [`ErrorKind::SourceConnectionFailed`] and decoding
/// failures to [`ErrorKind::ConversionError`]. Stores that talk to a destination remap the
/// kind with [`SubsetError::for_destination`].
impl From<sqlx::Error> for SubsetError {
    #[track_caller]
    fn from(err: sqlx::Error) -> SubsetError {
        let (kind, description) = match &err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => (
                ErrorKind::SourceConnectionFailed,
                "Database connection failed",
            ),
            sqlx::Error::Io(_) => (ErrorKind::IoError, "Database I/O failed"),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                (ErrorKind::ConversionError, "Database value decoding failed")
            }
            _ => (ErrorKind::SourceQueryFailed, "Database query failed"),
        };

        let detail = err.to_string();
        SubsetError::from_components(kind, Cow::Borrowed(description), Some(Cow::Owned(detail)))
            .with_source(err)
    }
}

impl SubsetError {
    /// Re-labels a source-side store error as its destination-side counterpart.
    pub fn for_destination(mut self) -> Self {
        self.kind = match self.kind {
            ErrorKind::SourceConnectionFailed => ErrorKind::DestinationConnectionFailed,
            ErrorKind::SourceQueryFailed => ErrorKind::DestinationQueryFailed,
            other => other,
        };
        self
    }
}

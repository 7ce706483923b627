//! Error types and result definitions for processor operations.
//!
//! [`CdcError`] carries a classification, a static description, optional dynamic detail and
//! source, plus the call-site location and a backtrace. Failures of several concurrent workers
//! are aggregated into a single value.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for processor operations using [`CdcError`] as the error type.
pub type CdcResult<T> = Result<T, CdcError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the processor core.
#[derive(Debug, Clone)]
pub struct CdcError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Multiple aggregated errors, mainly produced when several workers fail together.
    Many {
        errors: Vec<CdcError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors that can occur while running a processor.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Coordination store
    CoordinationStoreError,
    InvalidKey,

    // Collaborators
    PullerFailed,
    MountFailed,
    SchemaStorageFailed,
    SinkDeliveryFailed,
    MissingTableSchema,

    // Data & serialization
    InvalidData,
    SerializationError,
    DeserializationError,

    // Configuration & IO
    ConfigError,
    IoError,

    // State & workflow
    InvalidState,
    Cancelled,
    WorkerPanic,
    RetriesExhausted,

    Unknown,

    /// Raised by an armed failpoint in tests.
    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

impl CdcError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if there is none.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the static description of this error, or of the first aggregated one.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("no errors"),
        }
    }

    /// Returns the dynamic detail if available.
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

    /// Returns `true` when this error only records a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.kinds().iter().all(|kind| *kind == ErrorKind::Cancelled)
    }

    /// Attaches an originating error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
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
        CdcError {
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

impl PartialEq for CdcError {
    fn eq(&self, other: &CdcError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for CdcError {
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

                write_block("Detail", payload.detail.as_deref(), f)?;
                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_block("Backtrace", Some(&backtrace), f)?;
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

impl error::Error for CdcError {
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

fn write_block(title: &str, body: Option<&str>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(body) = body else {
        return Ok(());
    };

    if body.trim().is_empty() {
        return write!(f, "\n  {title}: <empty>");
    }

    write!(f, "\n  {title}:")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

/// Creates a [`CdcError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for CdcError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`CdcError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for CdcError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> CdcError {
        CdcError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for CdcError
where
    E: Into<CdcError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> CdcError {
        let location = Location::caller();

        let mut errors: Vec<CdcError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        CdcError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for CdcError {
    #[track_caller]
    fn from(err: std::io::Error) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps syntax and data failures to [`ErrorKind::DeserializationError`].
impl From<serde_json::Error> for CdcError {
    #[track_caller]
    fn from(err: serde_json::Error) -> CdcError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        CdcError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::string::FromUtf8Error> for CdcError {
    #[track_caller]
    fn from(err: std::string::FromUtf8Error) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::InvalidData,
            Cow::Borrowed("UTF-8 string conversion failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<config::shared::ValidationError> for CdcError {
    #[track_caller]
    fn from(err: config::shared::ValidationError) -> CdcError {
        let detail = err.to_string();
        CdcError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid processor configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

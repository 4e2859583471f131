use thiserror::Error;

use crate::ingestion::LoadStage;
use crate::store::StoreError;

/// Convenience result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Error type returned by the load pipeline.
///
/// Every variant names the input it was raised for (`input`), so callers processing many files can
/// surface the offending one. All variants are terminal for the batch; nothing is retried.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The input had no content (or only whitespace).
    #[error("empty input: {input}")]
    EmptyInput { input: String },

    /// The input looked like JSON but could not be parsed into documents.
    #[error("malformed input {input}: {message}")]
    MalformedInput { input: String, message: String },

    /// The input starts with something other than `[` or `{`.
    #[error("unrecognized format in {input}: expected '[' or '{{', found {found:?}")]
    UnrecognizedFormat { input: String, found: char },

    /// A string `_id` could not be turned into an ObjectId.
    #[error("invalid identifier in {input} (document {index}): '{value}' is not a valid ObjectId")]
    InvalidIdentifierFormat {
        input: String,
        index: usize,
        value: String,
    },

    /// Options could not be resolved into a usable configuration.
    #[error("invalid configuration for {input}: {message}")]
    InvalidConfiguration { input: String, message: String },

    /// Connecting to the target database failed.
    #[error("connection to '{address}' failed while loading {input}: {cause}")]
    Connection {
        input: String,
        address: String,
        #[source]
        cause: StoreError,
    },

    /// Dropping the existing collection failed.
    #[error("dropping collection '{collection}' failed while loading {input}: {cause}")]
    Drop {
        input: String,
        collection: String,
        #[source]
        cause: StoreError,
    },

    /// The bulk insert failed. Documents written before the failure are not rolled back.
    #[error("inserting into collection '{collection}' failed while loading {input}: {cause}")]
    Insert {
        input: String,
        collection: String,
        #[source]
        cause: StoreError,
    },

    /// The caller's cancellation signal or deadline fired during a store step.
    #[error("load of {input} cancelled while {stage}")]
    Cancelled { input: String, stage: LoadStage },

    /// Reading the input from disk failed.
    #[error("reading {input} failed: {cause}")]
    Io {
        input: String,
        #[source]
        cause: std::io::Error,
    },
}

/// Discriminant of [`LoadError`] for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadErrorKind {
    EmptyInput,
    MalformedInput,
    UnrecognizedFormat,
    InvalidIdentifierFormat,
    InvalidConfiguration,
    Connection,
    Drop,
    Insert,
    Cancelled,
    Io,
}

impl LoadError {
    /// The kind of this error.
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            LoadError::EmptyInput { .. } => LoadErrorKind::EmptyInput,
            LoadError::MalformedInput { .. } => LoadErrorKind::MalformedInput,
            LoadError::UnrecognizedFormat { .. } => LoadErrorKind::UnrecognizedFormat,
            LoadError::InvalidIdentifierFormat { .. } => LoadErrorKind::InvalidIdentifierFormat,
            LoadError::InvalidConfiguration { .. } => LoadErrorKind::InvalidConfiguration,
            LoadError::Connection { .. } => LoadErrorKind::Connection,
            LoadError::Drop { .. } => LoadErrorKind::Drop,
            LoadError::Insert { .. } => LoadErrorKind::Insert,
            LoadError::Cancelled { .. } => LoadErrorKind::Cancelled,
            LoadError::Io { .. } => LoadErrorKind::Io,
        }
    }

    /// Name of the input this error was raised for.
    pub fn input(&self) -> Option<&str> {
        match self {
            LoadError::EmptyInput { input }
            | LoadError::MalformedInput { input, .. }
            | LoadError::UnrecognizedFormat { input, .. }
            | LoadError::InvalidIdentifierFormat { input, .. }
            | LoadError::InvalidConfiguration { input, .. }
            | LoadError::Connection { input, .. }
            | LoadError::Drop { input, .. }
            | LoadError::Insert { input, .. }
            | LoadError::Cancelled { input, .. }
            | LoadError::Io { input, .. } => Some(input),
        }
    }

    /// True for errors raised before any store call was made.
    pub fn is_parse_stage(&self) -> bool {
        matches!(
            self.kind(),
            LoadErrorKind::EmptyInput
                | LoadErrorKind::MalformedInput
                | LoadErrorKind::UnrecognizedFormat
                | LoadErrorKind::InvalidIdentifierFormat
        )
    }
}

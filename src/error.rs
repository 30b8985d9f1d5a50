// ⚠️ Error types for the attribute transformation engine
//
// Field-level failures (FieldError) are always recovered inside a parser.
// Everything else is a TransformError and follows the propagation rules below:
//   SchemaShape       -> recovered by the owning Transformer (UnexpectedSchema)
//   DataInconsistency -> surfaced by AttributeSet::add; a Transformer records it
//                        as ParserFailed and moves on to the next parser
//   NoConverter / NoTransformer / InvalidArgument / StateConflict -> surfaced, never retried

use crate::converter::{TypeTag, ValueKind};
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, TransformError>;

#[derive(Error, Debug)]
pub enum TransformError {
    /// A parser's whole container is present but has an unexpected shape
    #[error("unexpected raw data schema in {parser}: {reason}")]
    SchemaShape { parser: &'static str, reason: String },

    /// A metadata policy received self-contradictory candidate data
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no converter registered for {input} -> {output}")]
    NoConverter { input: TypeTag, output: ValueKind },

    #[error("no transformer registered for brand: {0}")]
    NoTransformer(String),

    /// Fetched state disagrees with what the caller expected
    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransformError {
    pub fn schema_shape(parser: &'static str, reason: impl Into<String>) -> Self {
        TransformError::SchemaShape {
            parser,
            reason: reason.into(),
        }
    }

    /// Missing registrations (converter or transformer)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TransformError::NoConverter { .. } | TransformError::NoTransformer(_)
        )
    }

    /// Shape failures are expected schema drift; anything else a parser returns is a defect
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransformError::SchemaShape { .. })
    }
}

/// A single title/metadata extraction step failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("missing field: {0}")]
    Missing(String),

    #[error("field {field} has unexpected type, expected {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("un-parsable number: {0:?}")]
    InvalidNumber(String),

    #[error("field {field} has unrecognized value {value:?}")]
    Unrecognized { field: String, value: String },
}

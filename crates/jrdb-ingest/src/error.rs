//! Error taxonomy for the ingestion core
//!
//! Only [`SchemaError`] and store connectivity failures ever reach the caller
//! as `Err`. Everything data-level is recovered near its origin and surfaces
//! as counters in the typed outcomes.

use std::path::PathBuf;

use thiserror::Error;

use crate::entity::EntityKind;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Top-level error returned by `parse` / `load` and the format registry
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("No layout registered for format '{code}' ({})", path.display())]
    UnknownFormat { code: String, path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    /// Whether reprocessing the same file later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Database(_))
    }
}

/// Internally inconsistent layout. Raised while building a schema set, before
/// any file is read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{format}: field label '{label}' is declared twice")]
    DuplicateLabel { format: String, label: String },

    #[error("{format}: field '{label}' must start at byte 1 or later (offsets are 1-based)")]
    ZeroOffset { format: String, label: String },

    #[error("{format}: field '{label}' has zero width")]
    ZeroWidth { format: String, label: String },

    #[error(
        "{format}: array field '{label}' is {width} bytes wide but {count} x {element_width} = {expected}"
    )]
    ArrayWidth {
        format: String,
        label: String,
        width: usize,
        element_width: usize,
        count: usize,
        expected: usize,
    },

    #[error("{format}: array field '{label}' has element kind {element}, only scalar kinds can repeat")]
    ArrayElement {
        format: String,
        label: String,
        element: &'static str,
    },

    #[error("{format}: field '{label}' uses scale {scale}, the maximum is {max}")]
    Scale {
        format: String,
        label: String,
        scale: u32,
        max: u32,
    },

    #[error("{format}: choice field '{label}' has an empty code table")]
    EmptyChoice { format: String, label: String },

    #[error("{format}: derived field '{label}' reads '{input}', which is not declared before it")]
    DerivedInput {
        format: String,
        label: String,
        input: String,
    },

    #[error("{format}: attribute {attribute} is written by both '{first}' and '{second}'")]
    DuplicateTarget {
        format: String,
        attribute: String,
        first: String,
        second: String,
    },

    #[error("{format}: attribute {attribute} is filled from the parent entity and cannot be a field target")]
    ParentColumnTarget { format: String, attribute: String },

    #[error("{format}: {entity} is written but its key attribute {attribute} is not")]
    MissingKey {
        format: String,
        entity: EntityKind,
        attribute: String,
    },

    #[error("{format}: key attribute {attribute} has a type that cannot identify a row")]
    UnkeyableAttribute { format: String, attribute: String },

    #[error("{format}: {entity} is written but its required parent {parent} is not")]
    MissingParent {
        format: String,
        entity: EntityKind,
        parent: EntityKind,
    },

    #[error("{format}: consensus rule references unknown field '{label}'")]
    ConsensusField { format: String, label: String },

    #[error("format code '{0}' is registered twice")]
    DuplicateFormat(String),
}

/// A line that cannot be sliced or decoded. Fatal for that line only.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("line is {actual} bytes, layout requires at least {required}")]
    TooShort { actual: usize, required: usize },

    #[error("field '{label}': {source}")]
    Undecodable {
        label: &'static str,
        #[source]
        source: jrdb_common::CommonError,
    },
}

/// A cell whose content does not match its declared kind. The field becomes
/// null and the row continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldParseError {
    #[error("'{raw}' is not an integer")]
    Integer { raw: String },

    #[error("'{raw}' is not a number")]
    Float { raw: String },

    #[error("'{raw}' does not match date format {format}")]
    Date { raw: String, format: &'static str },

    #[error("'{raw}' is neither '{true_literal}' nor '{false_literal}'")]
    Boolean {
        raw: String,
        true_literal: &'static str,
        false_literal: &'static str,
    },

    #[error("unknown code '{raw}'")]
    Choice { raw: String },
}

/// A natural code with no matching reference row. The link becomes null.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no {entity} row with {natural_key} = '{code}'")]
pub struct ForeignKeyUnresolved {
    pub entity: &'static str,
    pub natural_key: &'static str,
    pub code: String,
}

/// Why an entity batch could not be persisted. Reported per batch; never
/// aborts the file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("transient conflict persisted after {attempts} attempts: {source}")]
    ConflictExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("store rejected the batch: {0}")]
    Rejected(#[source] sqlx::Error),

    /// Connectivity failure. Not a per-batch outcome: the caller aborts the
    /// file with it.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
}

impl LoadError {
    /// Classify an error raised while writing one batch
    pub fn from_attempt(err: sqlx::Error, attempts: u32) -> Self {
        if is_transient_conflict(&err) {
            LoadError::ConflictExhausted {
                attempts,
                source: err,
            }
        } else if is_connectivity_failure(&err) {
            LoadError::Unavailable(err)
        } else {
            LoadError::Rejected(err)
        }
    }
}

/// `serialization_failure` and `deadlock_detected`
const TRANSIENT_SQLSTATES: [&str; 2] = ["40001", "40P01"];

/// Whether `err` is a concurrency conflict that a retry can resolve
pub fn is_transient_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref())),
        _ => false,
    }
}

/// Whether the store could not be reached or the connection broke. Database
/// errors and row decoding errors are local to the batch.
pub fn is_connectivity_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_messages_name_the_format() {
        let err = SchemaError::ArrayWidth {
            format: "OZ".to_string(),
            label: "win_odds".to_string(),
            width: 89,
            element_width: 5,
            count: 18,
            expected: 90,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("OZ:"));
        assert!(msg.contains("18 x 5 = 90"));
    }

    #[test]
    fn test_pool_errors_are_not_conflicts() {
        assert!(!is_transient_conflict(&sqlx::Error::PoolTimedOut));
        assert!(matches!(
            LoadError::from_attempt(sqlx::Error::PoolTimedOut, 1),
            LoadError::Unavailable(_)
        ));
    }

    #[test]
    fn test_row_decoding_errors_reject_only_the_batch() {
        let missing = sqlx::Error::ColumnNotFound("pedigree_reg_num".to_string());
        assert!(!is_connectivity_failure(&missing));
        assert!(matches!(
            LoadError::from_attempt(missing, 1),
            LoadError::Rejected(_)
        ));

        let decode = sqlx::Error::Decode("unexpected null".into());
        assert!(matches!(
            LoadError::from_attempt(decode, 1),
            LoadError::Rejected(_)
        ));
    }

    #[test]
    fn test_only_database_errors_are_retryable() {
        let io = IngestError::Io {
            path: PathBuf::from("SED080126.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(!io.is_retryable());
        assert!(IngestError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }
}

//! Failures surfaced by the record service
//!
//! Every operation fails with exactly one of these; the API layer maps each
//! kind to a status code.

use crate::db::DbError;
use diesel::result::Error as DieselError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    /// The id does not resolve to a row
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    /// A field is outside its enumerated set or breaks a conditional rule
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// A uniqueness constraint matched an existing row
    #[error("{entity} already exists: {message}")]
    Duplicate { entity: &'static str, message: String },

    /// A foreign key points at a row that does not exist
    #[error("{field} references missing {entity} {id}")]
    MissingReference {
        field: &'static str,
        entity: &'static str,
        id: i32,
    },

    /// The storage engine rejected the write, or a restricted delete
    #[error("integrity failure: {0}")]
    Integrity(String),

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl RecordError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        RecordError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Stable machine-readable name, used in error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::NotFound { .. } => "not_found",
            RecordError::Validation { .. } => "validation_failed",
            RecordError::Duplicate { .. } => "duplicate",
            RecordError::MissingReference { .. } => "missing_reference",
            RecordError::Integrity(_) => "integrity_failure",
            RecordError::Storage(_) => "storage_error",
        }
    }

    /// HTTP status for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            RecordError::NotFound { .. } => 404,
            RecordError::Validation { .. }
            | RecordError::Duplicate { .. }
            | RecordError::MissingReference { .. } => 400,
            RecordError::Integrity(_) => 409,
            RecordError::Storage(_) => 500,
        }
    }

    /// The offending field, when the failure is tied to one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            RecordError::Validation { field, .. } | RecordError::MissingReference { field, .. } => {
                Some(*field)
            }
            _ => None,
        }
    }
}

impl From<DieselError> for RecordError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::DatabaseError(kind, info) => {
                tracing::warn!(?kind, message = info.message(), "storage rejected write");
                RecordError::Integrity(info.message().to_string())
            }
            other => RecordError::Storage(DbError::Query(other)),
        }
    }
}

impl From<diesel::r2d2::PoolError> for RecordError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        RecordError::Storage(DbError::Pool(e))
    }
}

pub type Result<T> = std::result::Result<T, RecordError>;

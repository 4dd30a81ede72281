// Error taxonomy for the ETL pipeline.
//
// Sheet- and match-level variants are recorded in the EtlResult and the run
// moves on. Only FileNotFound and MissingSheet stop a run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// Metadata could not be read from a match sheet. Skips that sheet.
    #[error("could not parse sheet `{sheet}`: {message}")]
    Parsing { sheet: String, message: String },

    /// The positional grid did not yield one record per team and period.
    #[error("sheet `{sheet}` produced {found} team-period records, expected {expected}")]
    GridCount {
        sheet: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid value for `{field}` on row {row}: {message}")]
    FieldValidation {
        field: String,
        row: usize,
        message: String,
    },

    /// A KPI key appears more than once. Fails the whole KPI batch.
    #[error("duplicate KPI definition key {key}")]
    DuplicateKey { key: String },

    /// The match already exists. Fails only that match's load.
    #[error("match {match_number} already exists in {competition}")]
    Conflict {
        competition: String,
        match_number: u32,
    },

    /// Any unexpected store failure inside a transaction.
    #[error("transaction failed while {operation}: {message}")]
    Transaction { operation: String, message: String },

    #[error("workbook not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("required sheet missing: {name}")]
    MissingSheet { name: String },

    #[error("import cancelled")]
    Cancelled,
}

impl EtlError {
    /// Stable code recorded against the error in an EtlResult.
    pub fn code(&self) -> &'static str {
        match self {
            EtlError::Parsing { .. } => "PARSING_ERROR",
            EtlError::GridCount { .. } => "GRID_COUNT_ERROR",
            EtlError::FieldValidation { .. } => "FIELD_VALIDATION_ERROR",
            EtlError::DuplicateKey { .. } => "DUPLICATE_KEY_ERROR",
            EtlError::Conflict { .. } => "CONFLICT_ERROR",
            EtlError::Transaction { .. } => "TRANSACTION_FAILURE",
            EtlError::FileNotFound { .. } => "FILE_NOT_FOUND",
            EtlError::MissingSheet { .. } => "MISSING_SHEET",
            EtlError::Cancelled => "CANCELLED",
        }
    }

    /// Whether the error ends the whole run rather than one unit of work.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EtlError::FileNotFound { .. } | EtlError::MissingSheet { .. }
        )
    }

    /// Wrap an unexpected store error as a transaction failure.
    pub fn transaction(operation: &str, err: impl std::fmt::Display) -> Self {
        EtlError::Transaction {
            operation: operation.to_string(),
            message: format!("{err:#}"),
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Table '{table}' is missing required column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("Case '{case_id}' has invalid {field}: {reason}")]
    InvalidCase {
        case_id: String,
        field: &'static str,
        reason: String,
    },

    #[error("Case '{case_id}' appears more than once in the case table")]
    DuplicateCase { case_id: String },

    #[error("Refund '{refund_id}' has invalid refund_amount_eur: {reason}")]
    InvalidRefund { refund_id: String, reason: String },

    #[error("Cannot write artifact {path}: a directory is in the way")]
    ArtifactBlocked { path: String },

    #[error("Timeline event for case '{case_id}' has unparseable timestamp '{value}'")]
    InvalidTimestamp { case_id: String, value: String },
}

pub type OfiResult<T> = Result<T, OfiError>;

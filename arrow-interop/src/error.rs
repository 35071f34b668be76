use arrow_schema::{ArrowError, DataType};
use thiserror::Error;

pub type Result<T, E = InteropError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum InteropError {
    /// The columnar-IPC bytes could not be framed or decoded.
    #[error("IPC schema format error: {0}")]
    SchemaFormat(String),

    #[error("unsupported dtype {0:?} for epoch conversion")]
    TypeMismatch(DataType),

    #[error("invalid timestamp precision: {0}")]
    InvalidPrecision(i32),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Device record-batch metadata does not agree with the schema.
    #[error("device buffer layout: {0}")]
    Layout(String),

    #[error("unknown column type name '{0}'")]
    UnknownType(String),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

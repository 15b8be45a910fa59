use thiserror::Error;

/// Failure conditions raised inside the view models.
///
/// Only `InvariantViolation` is returned across the model boundary. The other
/// variants are recovered where they occur: a missing field renders an empty
/// cell, an unsortable column keeps the current order, and a stale or failed
/// fetch leaves the last snapshot on screen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("field `{0}` is missing from the record")]
    FieldMissing(String),

    #[error("sort key unavailable for column `{column}`")]
    SortKeyUnavailable { column: String },

    #[error("stale response discarded (fetched for {fetched}, now showing {current})")]
    StaleResponse { fetched: String, current: String },

    #[error("snapshot fetch failed: {0}")]
    FetchFailed(String),

    #[error("tree invariant violated: {0}")]
    InvariantViolation(String),
}

impl ModelError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

pub type ModelResult<T> = Result<T, ModelError>;

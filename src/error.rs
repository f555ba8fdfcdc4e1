use serde_json::json;

/// Errors raised by the classroom core. Every variant is recoverable; the IPC
/// layer turns them into `{code, message, details}` error objects.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("duplicate {kind} id: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("score {score} is outside the allowed range 0..={max_score}")]
    InvalidScore { score: f64, max_score: f64 },

    #[error("{0}")]
    BadParams(String),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        CoreError::BadParams(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "not_found",
            CoreError::Duplicate { .. } => "duplicate_id",
            CoreError::InvalidScore { .. } => "invalid_score",
            CoreError::BadParams(_) => "bad_params",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CoreError::NotFound { kind, id } | CoreError::Duplicate { kind, id } => {
                Some(json!({ "kind": kind, "id": id }))
            }
            CoreError::InvalidScore { score, max_score } => {
                Some(json!({ "score": score, "maxScore": max_score }))
            }
            CoreError::BadParams(_) => None,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

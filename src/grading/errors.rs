use thiserror::Error;

/// Failure of a single AI analysis attempt. Every variant is retryable inside
/// the executor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub(crate) enum AnalysisError {
    #[error("AI transport failed: {0}")]
    Transport(String),
    #[error("failed to parse AI response: {0}")]
    Parse(String),
    #[error("AI response failed schema validation: {0}")]
    Schema(String),
}

impl AnalysisError {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Parse(_) => "parse_error",
            Self::Schema(_) => "schema_error",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub(crate) enum ValidationError {
    #[error("no grade criteria configured")]
    EmptyCriteria,
    #[error("invalid check configuration: {0}")]
    InvalidCheck(String),
    #[error("no reference answers configured for variant {0}")]
    MissingReferences(u32),
    #[error("AI response for an essay check carries no essay_analysis")]
    MissingEssayAnalysis,
}

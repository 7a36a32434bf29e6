use thiserror::Error;

/// Everything a transition attempt can fail with.
///
/// The first four variants are recoverable caller errors; the rest are
/// anomalies (registry misconfiguration or storage trouble) that callers
/// cannot fix and outer layers should log and sanitize.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("'{reference}' does not match any work item")]
    NotFound { reference: String },

    #[error(
        "invalid transition: {entity_code} cannot move from '{from_status}' to '{to_status}' (legal next statuses: {})",
        fmt_statuses(.valid)
    )]
    InvalidTransition {
        entity_code: String,
        from_status: String,
        to_status: String,
        valid: Vec<String>,
    },

    #[error("condition '{condition}' not met: {reason}")]
    ConditionNotMet { condition: String, reason: String },

    #[error("required side effect '{effect}' did not complete: {detail}")]
    EffectFailed { effect: String, detail: String },

    #[error("transition rule references unknown condition '{name}'")]
    UnknownCondition { name: String },

    #[error("transition rule references unknown side effect '{name}'")]
    UnknownEffect { name: String },

    #[error("cascade depth limit of {limit} exceeded; the transition registry likely contains a cycle")]
    CascadeDepthExceeded { limit: u32 },

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Configuration or storage trouble, as opposed to a caller mistake.
    /// Anomalies always propagate (rolling back the whole transition) and
    /// are logged before being sanitized at the public boundary.
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self,
            Self::UnknownCondition { .. }
                | Self::UnknownEffect { .. }
                | Self::CascadeDepthExceeded { .. }
                | Self::Storage(_)
        )
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

fn fmt_statuses(valid: &[String]) -> String {
    if valid.is_empty() {
        "none".to_string()
    } else {
        valid.join(", ")
    }
}

use super::types::UserId;

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("{actor} is not entitled to {action}")]
    Unauthorized { actor: UserId, action: String },
    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: String, state: String },
    #[error("Invalid approval configuration: {0}")]
    InvalidConfiguration(String),
    #[error("{0} was not found")]
    NotFound(String),
    #[error("Proposal {0} kept changing underneath us, giving up")]
    Contention(String),
    #[error(transparent)]
    Storage(#[from] sled::Error),
    #[error("Failed to encode or decode a proposal: {0}")]
    Encoding(String),
}

impl WorkflowError {
    pub(crate) fn unauthorized(actor: &UserId, action: impl Into<String>) -> Self {
        Self::Unauthorized {
            actor: actor.clone(),
            action: action.into(),
        }
    }

    pub(crate) fn transition(action: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            action: action.into(),
            state: state.to_string(),
        }
    }
}

impl From<minicbor::decode::Error> for WorkflowError {
    fn from(value: minicbor::decode::Error) -> Self {
        Self::Encoding(value.to_string())
    }
}

impl From<minicbor::encode::Error<std::convert::Infallible>> for WorkflowError {
    fn from(value: minicbor::encode::Error<std::convert::Infallible>) -> Self {
        Self::Encoding(value.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    InvalidEnvOverride { key: String, value: String },
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

use shared::{
    domain::QuestionId,
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

/// Failures talking to the interview API.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("interview API unreachable: {0}")]
    Connectivity(#[source] reqwest::Error),
    #[error("interview API rejected the request with status {status}: {}", .error.message)]
    Rejected { status: u16, error: ApiError },
    #[error("unexpected response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid API url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl PortalError {
    pub(crate) fn rejected(status: u16, message: impl Into<String>) -> Self {
        PortalError::Rejected {
            status,
            error: ApiError::from_status(status, message),
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PortalError::Connectivity(_) | PortalError::Rejected { .. }
        )
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            PortalError::Rejected { error, .. } => Some(error.code),
            _ => None,
        }
    }

    /// Short text suitable for showing to the candidate.
    pub fn user_message(&self) -> String {
        match self {
            PortalError::Connectivity(_) => "Connection error. Please try again.".to_string(),
            PortalError::Rejected { error, .. } => error.message.clone(),
            PortalError::Decode { .. } | PortalError::InvalidUrl { .. } => {
                "Unexpected response from the interview service.".to_string()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("interview duration must be a positive number of minutes")]
    InvalidDuration,
    #[error("interview has already been started")]
    AlreadyStarted,
    #[error("interview has not been started")]
    NotStarted,
    #[error("interview no longer accepts changes")]
    NotInProgress,
    #[error("question {0} is not part of this interview")]
    UnknownQuestion(QuestionId),
    #[error("'{option}' is not an option of question {question_id}")]
    UnknownOption {
        question_id: QuestionId,
        option: String,
    },
    #[error("no questions are assigned to this interview yet")]
    NoQuestions,
    #[error("please login again: {0}")]
    Reauthenticate(String),
    #[error("failed to submit interview: {0}")]
    Submission(#[source] PortalError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SessionError {
    /// Whether the host should send the candidate back to the login step.
    pub fn requires_login(&self) -> bool {
        matches!(self, SessionError::Reauthenticate(_))
    }
}

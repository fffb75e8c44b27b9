//! Error handling for the election core
//!
//! Every failure carries a stable [`ErrorKind`] plus a human-readable detail.
//! Only [`ErrorKind::Storage`] is worth retrying; every other kind is a
//! terminal rejection of the request.

use serde::{Deserialize, Serialize};

/// Result type alias for the election core
pub type Result<T> = std::result::Result<T, Error>;

/// Stable classification of a failure, independent of its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    VoterNotFound,
    InvalidTransition,
    AlreadyActive,
    AlreadyClosed,
    NotDraft,
    NotAttended,
    NotOpen,
    NotAssigned,
    LimitReached,
    CandidateLimitReached,
    DuplicateVote,
    Conflict,
    Forbidden,
    Validation,
    Storage,
    Internal,
}

/// Main error type for the election core
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An entity id did not resolve
    #[error("{entity} not found with id: {id}")]
    NotFound { entity: &'static str, id: String },

    /// No voter carries the given shareholder id
    #[error("Voter not found with shareholder id: {shareholder_id}")]
    VoterNotFound { shareholder_id: String },

    /// Lifecycle transition that the state machine does not allow
    #[error("{entity} {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("{entity} {id} is already active")]
    AlreadyActive { entity: &'static str, id: String },

    #[error("{entity} {id} is already closed")]
    AlreadyClosed { entity: &'static str, id: String },

    /// Structural change attempted outside the DRAFT state
    #[error("{entity} {id} is {status}; only DRAFT accepts this change")]
    NotDraft {
        entity: &'static str,
        id: String,
        status: String,
    },

    #[error("Voter {shareholder_id} has not attended the assembly")]
    NotAttended { shareholder_id: String },

    #[error("{entity} {id} is not open for voting (status {status})")]
    NotOpen {
        entity: &'static str,
        id: String,
        status: String,
    },

    #[error("Candidate {candidate_id} is not assigned to position {position_id}")]
    NotAssigned {
        candidate_id: String,
        position_id: String,
    },

    #[error(
        "Voter {shareholder_id} has reached the maximum of {max_votes} votes for position {position_id}"
    )]
    LimitReached {
        shareholder_id: String,
        position_id: String,
        max_votes: u32,
    },

    #[error("Position {position_id} already holds its maximum of {max_candidates} candidates")]
    CandidateLimitReached {
        position_id: String,
        max_candidates: u32,
    },

    /// Second vote for the same candidate, or second vote on a single-choice issue
    #[error("Duplicate vote: {message}")]
    DuplicateVote { message: String },

    /// Uniqueness violation outside the vote log
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Storage or transport fault, the only retryable class
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn duplicate_vote(message: impl Into<String>) -> Self {
        Self::DuplicateVote {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::VoterNotFound { .. } => ErrorKind::VoterNotFound,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::AlreadyActive { .. } => ErrorKind::AlreadyActive,
            Self::AlreadyClosed { .. } => ErrorKind::AlreadyClosed,
            Self::NotDraft { .. } => ErrorKind::NotDraft,
            Self::NotAttended { .. } => ErrorKind::NotAttended,
            Self::NotOpen { .. } => ErrorKind::NotOpen,
            Self::NotAssigned { .. } => ErrorKind::NotAssigned,
            Self::LimitReached { .. } => ErrorKind::LimitReached,
            Self::CandidateLimitReached { .. } => ErrorKind::CandidateLimitReached,
            Self::DuplicateVote { .. } => ErrorKind::DuplicateVote,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Serialization(_) | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same request could change the outcome
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}

/// Convenience macros for creating specific error types
#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::Error::validation($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::validation(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr) => {
        $crate::Error::storage($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::storage(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = Error::not_found("Position", 42);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Position not found with id: 42");

        let err = Error::duplicate_vote("same candidate");
        assert_eq!(err.kind(), ErrorKind::DuplicateVote);

        let err = Error::internal("boom");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_only_storage_is_retryable() {
        assert!(Error::storage("connection reset").is_retryable());
        assert!(!Error::validation("page_size").is_retryable());
        assert!(!Error::forbidden("observer").is_retryable());
        assert!(
            !Error::NotAttended {
                shareholder_id: "SH-1".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_macros() {
        let err = validation_error!("max_votes must be at least {}", 1);
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("at least 1"));

        let err = storage_error!("lock poisoned");
        assert!(matches!(err, Error::Storage { .. }));
    }
}

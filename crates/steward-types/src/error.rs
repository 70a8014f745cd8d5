use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from repository operations (used by trait definitions in steward-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Typed failure of an action handler.
///
/// Recorded on the Action Execution; never halts the remaining actions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("invalid action config: {0}")]
    InvalidConfig(String),

    #[error("downstream unavailable: {0}")]
    DownstreamUnavailable(String),

    #[error("{0}")]
    Unknown(String),
}

impl ActionError {
    pub fn kind(&self) -> ActionErrorKind {
        match self {
            ActionError::RecipientNotFound(_) => ActionErrorKind::RecipientNotFound,
            ActionError::InvalidConfig(_) => ActionErrorKind::InvalidConfig,
            ActionError::DownstreamUnavailable(_) => ActionErrorKind::DownstreamUnavailable,
            ActionError::Unknown(_) => ActionErrorKind::Unknown,
        }
    }
}

/// Stable tag of an `ActionError`, persisted alongside the error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    RecipientNotFound,
    InvalidConfig,
    DownstreamUnavailable,
    Unknown,
}

impl ActionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionErrorKind::RecipientNotFound => "recipient_not_found",
            ActionErrorKind::InvalidConfig => "invalid_config",
            ActionErrorKind::DownstreamUnavailable => "downstream_unavailable",
            ActionErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recipient_not_found" => Ok(ActionErrorKind::RecipientNotFound),
            "invalid_config" => Ok(ActionErrorKind::InvalidConfig),
            "downstream_unavailable" => Ok(ActionErrorKind::DownstreamUnavailable),
            "unknown" => Ok(ActionErrorKind::Unknown),
            other => Err(format!("unknown action error kind: '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_action_error_kind() {
        let err = ActionError::RecipientNotFound("member m1".to_string());
        assert_eq!(err.kind(), ActionErrorKind::RecipientNotFound);
        assert_eq!(err.to_string(), "recipient not found: member m1");

        let err = ActionError::DownstreamUnavailable("smtp timeout".to_string());
        assert_eq!(err.kind().as_str(), "downstream_unavailable");
    }

    #[test]
    fn test_action_error_kind_parse() {
        for kind in [
            ActionErrorKind::RecipientNotFound,
            ActionErrorKind::InvalidConfig,
            ActionErrorKind::DownstreamUnavailable,
            ActionErrorKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<ActionErrorKind>().unwrap(), kind);
        }
        assert!("boom".parse::<ActionErrorKind>().is_err());
    }
}

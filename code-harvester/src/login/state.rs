use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Progress of a single login attempt.
///
/// `Idle → CodeRequested → (AwaitingPassword) → Authenticated → Finalized`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    Idle,
    CodeRequested,
    AwaitingPassword,
    Authenticated,
    Finalized,
    Failed,
}

impl LoginState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: LoginState) -> bool {
        use LoginState::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Idle, CodeRequested)
            | (CodeRequested, AwaitingPassword)
            | (CodeRequested, Authenticated)
            | (AwaitingPassword, Authenticated)
            | (Authenticated, Finalized) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::CodeRequested => "code_requested",
            Self::AwaitingPassword => "awaiting_password",
            Self::Authenticated => "authenticated",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What to do when a login is started for a phone that already has one in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateLoginPolicy {
    /// Tear down the pending attempt and start over.
    #[default]
    Supersede,
    /// Fail the new attempt with `LoginInProgress`.
    Reject,
}

impl FromStr for DuplicateLoginPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supersede" => Ok(Self::Supersede),
            "reject" => Ok(Self::Reject),
            other => Err(Error::config(format!(
                "unknown duplicate login policy {other:?} (expected \"supersede\" or \"reject\")"
            ))),
        }
    }
}

impl fmt::Display for DuplicateLoginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supersede => f.write_str("supersede"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use LoginState::*;
        assert!(Idle.can_transition_to(CodeRequested));
        assert!(CodeRequested.can_transition_to(AwaitingPassword));
        assert!(AwaitingPassword.can_transition_to(Authenticated));
        assert!(Authenticated.can_transition_to(Finalized));
        assert!(!CodeRequested.can_transition_to(Finalized));
    }

    #[test]
    fn test_failed_only_from_non_terminal() {
        use LoginState::*;
        assert!(AwaitingPassword.can_transition_to(Failed));
        assert!(!Finalized.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            " Reject ".parse::<DuplicateLoginPolicy>().unwrap(),
            DuplicateLoginPolicy::Reject
        );
        assert_eq!(
            "supersede".parse::<DuplicateLoginPolicy>().unwrap(),
            DuplicateLoginPolicy::Supersede
        );
        assert!("queue".parse::<DuplicateLoginPolicy>().is_err());
    }
}

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Lifecycle of a loan. A loan starts `Active` and can only move to
/// `Returned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    #[default]
    Active,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "ACTIVE",
            LoanStatus::Returned => "RETURNED",
        }
    }

    pub fn can_transition_to(&self, target: LoanStatus) -> bool {
        matches!((self, target), (LoanStatus::Active, LoanStatus::Returned))
    }

    /// Validates a transition and returns the new status.
    pub fn transition_to(self, target: LoanStatus) -> Result<LoanStatus, DomainError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(DomainError::BusinessRuleViolation(format!(
                "loan status cannot change from {self} to {target}"
            )))
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(LoanStatus::Active),
            "RETURNED" => Ok(LoanStatus::Returned),
            _ => Err(DomainError::InvalidInput(format!(
                "unknown loan status {s:?}"
            ))),
        }
    }
}

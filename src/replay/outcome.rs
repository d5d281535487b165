//! Step outcome classification

use crate::error::BrowserError;
use crate::model::{Locator, StepStatus};
use thiserror::Error;

/// Why a step failed. Every variant is step-local: it becomes a FAIL result
/// and never aborts the run by itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    #[error("Locator not found: {0}")]
    LocatorNotFound(String),

    #[error("Element not interactable: {0}")]
    ElementNotInteractable(String),

    #[error("{0}")]
    AssertionFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Browser error: {0}")]
    Driver(String),
}

impl From<BrowserError> for StepFailure {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::NavigationFailed(msg) => StepFailure::NavigationFailed(msg),
            BrowserError::ElementNotFound(msg) => StepFailure::LocatorNotFound(msg),
            other => StepFailure::Driver(other.to_string()),
        }
    }
}

/// Classified result of executing one step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Pass {
        used_locator: Option<Locator>,
    },
    Fail {
        failure: StepFailure,
        used_locator: Option<Locator>,
    },
    /// Only produced for redacted secrets that could not be supplied
    Skipped { reason: String },
}

impl StepOutcome {
    pub fn status(&self) -> StepStatus {
        match self {
            StepOutcome::Pass { .. } => StepStatus::Pass,
            StepOutcome::Fail { .. } => StepStatus::Fail,
            StepOutcome::Skipped { .. } => StepStatus::Skipped,
        }
    }

    pub fn used_locator(&self) -> Option<&Locator> {
        match self {
            StepOutcome::Pass { used_locator } | StepOutcome::Fail { used_locator, .. } => {
                used_locator.as_ref()
            }
            StepOutcome::Skipped { .. } => None,
        }
    }

    /// Human-readable message persisted as the step's `error_message`
    pub fn message(&self) -> Option<String> {
        match self {
            StepOutcome::Pass { .. } => None,
            StepOutcome::Fail { failure, .. } => Some(failure.to_string()),
            StepOutcome::Skipped { reason } => Some(reason.clone()),
        }
    }
}

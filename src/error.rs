use crate::model::MacroId;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("Browser engine '{0}' is not supported by the Chromium driver")]
    UnsupportedEngine(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("No page available")]
    NoPage,

    #[error("Script execution failed: {0}")]
    Script(String),

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

/// Failures that abort a replay before or outside of step execution.
///
/// Step-level problems never surface here; they are recorded as FAIL step
/// results instead.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown environment '{name}' (known: {known})")]
    UnknownEnvironment { name: String, known: String },

    #[error("Macro {0} not found")]
    MacroNotFound(MacroId),

    #[error("Macro {macro_id} is invalid: {details}")]
    InvalidMacro { macro_id: MacroId, details: String },

    #[error("Initial navigation to {url} failed: {reason}")]
    InitialNavigation { url: String, reason: String },

    #[error("Failed to start browser session: {0}")]
    Launch(#[from] BrowserError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl ReplayError {
    /// Whether this error belongs to the configuration class (bad input, not
    /// a runtime failure).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ReplayError::Configuration(_)
                | ReplayError::UnknownEnvironment { .. }
                | ReplayError::MacroNotFound(_)
                | ReplayError::InvalidMacro { .. }
        )
    }
}

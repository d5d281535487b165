//! Macro, step and run records
//!
//! These are the shapes exchanged with the persistence layer and consumed by
//! the replay engine. Locators arrive from the recorder as raw JSON and are
//! only turned into typed [`Locator`] values after shape validation.

use crate::config::BrowserEngine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value a recorder stores instead of a typed credential.
pub const SECRET_SENTINEL: &str = "__SECRET__";

macro_rules! record_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(MacroId);
record_id!(StepId);
record_id!(RunId);

/// A named, ordered, persisted sequence of recorded steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macro {
    pub id: MacroId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Recorded action kind.
///
/// Unknown names are preserved in [`ActionType::Unsupported`] so that a macro
/// recorded by a newer recorder still loads; such steps fail at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Click,
    DblClick,
    Hover,
    ClickAt,
    Type,
    Select,
    Check,
    Uncheck,
    Navigation,
    WaitFor,
    Assert,
    ScrollTo,
    AssertCss,
    AssertCursor,
    Unsupported(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Click => "click",
            ActionType::DblClick => "dblclick",
            ActionType::Hover => "hover",
            ActionType::ClickAt => "clickAt",
            ActionType::Type => "type",
            ActionType::Select => "select",
            ActionType::Check => "check",
            ActionType::Uncheck => "uncheck",
            ActionType::Navigation => "navigation",
            ActionType::WaitFor => "waitFor",
            ActionType::Assert => "assert",
            ActionType::ScrollTo => "scrollTo",
            ActionType::AssertCss => "assertCss",
            ActionType::AssertCursor => "assertCursor",
            ActionType::Unsupported(name) => name,
        }
    }

    /// Whether a step of this kind must resolve an element.
    ///
    /// `navigation`, `scrollTo`, URL-keyed `waitFor`/`assert` and absolute
    /// `clickAt` steps work without locators.
    pub fn requires_element(&self, value: Option<&str>) -> bool {
        let value = value.unwrap_or_default();
        match self {
            ActionType::Navigation | ActionType::ScrollTo | ActionType::Unsupported(_) => false,
            ActionType::WaitFor | ActionType::Assert => !value.starts_with("url:"),
            ActionType::ClickAt => {
                matches!(
                    crate::replay::value::ClickAtTarget::parse(value),
                    Ok(crate::replay::value::ClickAtTarget::Offset { .. })
                )
            }
            _ => true,
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "click" => ActionType::Click,
            "dblclick" => ActionType::DblClick,
            "hover" => ActionType::Hover,
            "clickAt" => ActionType::ClickAt,
            "type" => ActionType::Type,
            "select" => ActionType::Select,
            "check" => ActionType::Check,
            "uncheck" => ActionType::Uncheck,
            "navigation" => ActionType::Navigation,
            "waitFor" => ActionType::WaitFor,
            "assert" => ActionType::Assert,
            "scrollTo" => ActionType::ScrollTo,
            "assertCss" => ActionType::AssertCss,
            "assertCursor" => ActionType::AssertCursor,
            _ => ActionType::Unsupported(value),
        }
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        ActionType::from(value.to_string())
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One strategy for finding a DOM element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Locator {
    /// CSS attribute selector built from `data-testid` / `data-qa`
    Data { value: String },
    /// Accessibility role with an optional accessible name
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Structurally derived CSS path
    Css { value: String },
    /// Structurally derived absolute XPath
    Xpath { value: String },
}

/// Discriminant of a [`Locator`], ordered by resolution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    Data,
    Role,
    Css,
    Xpath,
}

impl Locator {
    pub fn kind(&self) -> LocatorKind {
        match self {
            Locator::Data { .. } => LocatorKind::Data,
            Locator::Role { .. } => LocatorKind::Role,
            Locator::Css { .. } => LocatorKind::Css,
            Locator::Xpath { .. } => LocatorKind::Xpath,
        }
    }

    /// Re-validate a recorder-supplied locator before it is trusted.
    pub fn from_untrusted(raw: &serde_json::Value) -> std::result::Result<Self, String> {
        let object = raw
            .as_object()
            .ok_or_else(|| format!("expected an object, got {}", raw))?;
        let kind = object
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| "missing string field 'type'".to_string())?;

        let non_empty = |field: &str| -> std::result::Result<String, String> {
            match object.get(field).and_then(|v| v.as_str()) {
                Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
                Some(_) => Err(format!("'{}' locator has an empty '{}'", kind, field)),
                None => Err(format!("'{}' locator is missing string field '{}'", kind, field)),
            }
        };

        match kind {
            "data" => {
                let value = non_empty("value")?;
                if !(value.contains("data-testid") || value.contains("data-qa"))
                    || !value.starts_with('[')
                {
                    return Err(format!(
                        "data locator '{}' is not a data-testid/data-qa attribute selector",
                        value
                    ));
                }
                Ok(Locator::Data { value })
            }
            "role" => {
                let role = non_empty("role")?;
                if !role.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
                    return Err(format!("role '{}' is not a valid ARIA role name", role));
                }
                let name = match object.get("name") {
                    None | Some(serde_json::Value::Null) => None,
                    Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
                    Some(serde_json::Value::String(s)) => Some(s.clone()),
                    Some(other) => {
                        return Err(format!("role locator name must be a string, got {}", other))
                    }
                };
                Ok(Locator::Role { role, name })
            }
            "css" => Ok(Locator::Css {
                value: non_empty("value")?,
            }),
            "xpath" => {
                let value = non_empty("value")?;
                if !value.starts_with('/') && !value.starts_with("(") {
                    return Err(format!("xpath locator '{}' is not an absolute path", value));
                }
                Ok(Locator::Xpath { value })
            }
            other => Err(format!("unknown locator type '{}'", other)),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Data { value } => write!(f, "data={}", value),
            Locator::Role {
                role,
                name: Some(name),
            } => write!(f, "role={}[name=\"{}\"]", role, name),
            Locator::Role { role, name: None } => write!(f, "role={}", role),
            Locator::Css { value } => write!(f, "css={}", value),
            Locator::Xpath { value } => write!(f, "xpath={}", value),
        }
    }
}

/// A locator candidate that failed shape validation
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedLocator {
    /// Position in the recorded candidate list (0-based)
    pub position: usize,
    pub reason: String,
}

/// One recorded action with its locator candidates and parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub macro_id: MacroId,

    /// 1-based stable position, unique within the macro
    pub order_index: u32,

    pub action_type: ActionType,

    /// Locator candidates as recorded, highest priority first
    #[serde(default)]
    pub locators: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Per-step element wait override in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    pub enabled: bool,
}

impl Step {
    /// Split the recorded candidates into usable locators and rejects,
    /// preserving stored order.
    pub fn locator_candidates(&self) -> (Vec<Locator>, Vec<RejectedLocator>) {
        let mut accepted = Vec::with_capacity(self.locators.len());
        let mut rejected = Vec::new();

        for (position, raw) in self.locators.iter().enumerate() {
            match Locator::from_untrusted(raw) {
                Ok(locator) => accepted.push(locator),
                Err(reason) => rejected.push(RejectedLocator { position, reason }),
            }
        }

        (accepted, rejected)
    }

    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }

    pub fn is_secret(&self) -> bool {
        self.action_type == ActionType::Type && self.value.as_deref() == Some(SECRET_SENTINEL)
    }
}

/// Terminal or in-flight status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Pass,
    Fail,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Pass => "PASS",
            RunStatus::Fail => "FAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(RunStatus::Running),
            "PASS" => Some(RunStatus::Pass),
            "FAIL" => Some(RunStatus::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Pass,
    Fail,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pass => "PASS",
            StepStatus::Fail => "FAIL",
            StepStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(StepStatus::Pass),
            "FAIL" => Some(StepStatus::Fail),
            "SKIPPED" => Some(StepStatus::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counts of a run plus the trace pointer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_path: Option<String>,
}

impl RunSummary {
    /// Recompute counts from step statuses.
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = StepStatus>,
    {
        let mut summary = RunSummary::default();
        for status in statuses {
            summary.record(status);
        }
        summary
    }

    /// Count one step outcome
    pub fn record(&mut self, status: StepStatus) {
        self.total += 1;
        match status {
            StepStatus::Pass => self.passed += 1,
            StepStatus::Fail => self.failed += 1,
            StepStatus::Skipped => self.skipped += 1,
        }
    }

    /// Terminal status implied by the counts
    pub fn status(&self) -> RunStatus {
        if self.failed > 0 {
            RunStatus::Fail
        } else {
            RunStatus::Pass
        }
    }

    /// Counts only, without the trace pointer
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (self.total, self.passed, self.failed, self.skipped)
    }
}

/// One replay attempt of a macro against an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub macro_id: MacroId,
    pub env_name: String,
    pub browser: BrowserEngine,
    pub headless: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

/// Outcome of one step within a run, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub run_id: RunId,
    pub step_id: StepId,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_locator: Option<Locator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
}

/// Kind of side file attached to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Screenshot,
    Trace,
    Video,
    Log,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::Trace => "trace",
            ArtifactKind::Video => "video",
            ArtifactKind::Log => "log",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "screenshot" => Some(ArtifactKind::Screenshot),
            "trace" => Some(ArtifactKind::Trace),
            "video" => Some(ArtifactKind::Video),
            "log" => Some(ArtifactKind::Log),
            _ => None,
        }
    }
}

/// Typed pointer to a captured side file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub run_id: RunId,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub storage_url: String,
}

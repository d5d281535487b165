//! Persistence contract
//!
//! The replay engine reads macros and writes run results through [`RunStore`];
//! authoring tools use [`MacroCatalog`]. Both are storage-engine agnostic.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::BrowserEngine;
use crate::model::{
    ActionType, Artifact, Macro, MacroId, Run, RunId, RunStatus, RunSummary, Step, StepId,
    StepResult, StepStatus,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Descriptors of a run at creation time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRun {
    pub macro_id: MacroId,
    pub env_name: String,
    pub browser: BrowserEngine,
    pub headless: bool,
}

/// One persisted step result joined with its step's position and action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStepEntry {
    pub step_id: StepId,
    pub order_index: u32,
    pub action_type: ActionType,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub used_locator: Option<crate::model::Locator>,
    pub screenshot_path: Option<String>,
}

/// Storage consumed by the replay engine and the report assembler.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn get_macro(&self, id: MacroId) -> Result<Option<Macro>, StoreError>;

    /// All steps of a macro, disabled ones included, ordered by order_index.
    async fn get_all_steps(&self, macro_id: MacroId) -> Result<Vec<Step>, StoreError>;

    /// Create a run in `RUNNING` state.
    async fn create_run(&self, run: NewRun) -> Result<RunId, StoreError>;

    async fn add_step_result(&self, result: &StepResult) -> Result<(), StoreError>;

    async fn add_artifact(&self, artifact: &Artifact) -> Result<(), StoreError>;

    async fn finish_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        summary: &RunSummary,
    ) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: RunId) -> Result<Option<Run>, StoreError>;

    /// Step results of a run ordered by the steps' order_index.
    async fn get_run_step_results(&self, run_id: RunId) -> Result<Vec<RunStepEntry>, StoreError>;

    async fn get_artifacts(&self, run_id: RunId) -> Result<Vec<Artifact>, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMacro {
    pub name: String,
    pub description: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStep {
    pub action_type: ActionType,
    pub locators: Vec<serde_json::Value>,
    pub value: Option<String>,
    pub timeout_ms: Option<u64>,
    pub enabled: bool,
}

/// Macro authoring operations.
///
/// Steps are append-only; the only mutation is a permanent soft delete.
#[async_trait]
pub trait MacroCatalog: Send + Sync {
    async fn create_macro(&self, new: NewMacro) -> Result<MacroId, StoreError>;

    /// Append a step at `max(order_index) + 1`.
    async fn append_step(&self, macro_id: MacroId, step: NewStep) -> Result<Step, StoreError>;

    async fn disable_step(&self, step_id: StepId) -> Result<(), StoreError>;

    async fn rename_macro(&self, macro_id: MacroId, name: &str) -> Result<(), StoreError>;
}

/// Recorder export format accepted by `import`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub steps: Vec<MacroFileStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroFileStep {
    pub action_type: ActionType,
    #[serde(default)]
    pub locators: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl MacroFile {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read macro file {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse macro file {}", path.display()))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Create the macro and append its steps in file order.
    pub async fn import_into(&self, catalog: &dyn MacroCatalog) -> Result<MacroId, StoreError> {
        let macro_id = catalog
            .create_macro(NewMacro {
                name: self.name.clone(),
                description: self.description.clone(),
                base_url: self.base_url.clone(),
            })
            .await?;

        for step in &self.steps {
            catalog
                .append_step(
                    macro_id,
                    NewStep {
                        action_type: step.action_type.clone(),
                        locators: step.locators.clone(),
                        value: step.value.clone(),
                        timeout_ms: step.timeout_ms,
                        enabled: step.enabled,
                    },
                )
                .await?;
        }

        log::info!(
            "Imported macro '{}' as {} ({} steps)",
            self.name,
            macro_id,
            self.steps.len()
        );
        Ok(macro_id)
    }
}

//! In-memory store for tests and one-shot replays of macro files

use super::{MacroCatalog, NewMacro, NewRun, NewStep, RunStepEntry, RunStore, StoreError};
use crate::model::{
    Artifact, Macro, MacroId, Run, RunId, RunStatus, RunSummary, Step, StepId, StepResult,
};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    macros: Vec<Macro>,
    steps: Vec<Step>,
    runs: Vec<Run>,
    results: Vec<StepResult>,
    artifacts: Vec<Artifact>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every step result recorded so far, in insertion order
    pub async fn step_results(&self) -> Vec<StepResult> {
        self.state.lock().await.results.clone()
    }

    pub async fn runs(&self) -> Vec<Run> {
        self.state.lock().await.runs.clone()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn get_macro(&self, id: MacroId) -> Result<Option<Macro>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.macros.iter().find(|m| m.id == id).cloned())
    }

    async fn get_all_steps(&self, macro_id: MacroId) -> Result<Vec<Step>, StoreError> {
        let state = self.state.lock().await;
        let mut steps: Vec<Step> = state
            .steps
            .iter()
            .filter(|s| s.macro_id == macro_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.order_index);
        Ok(steps)
    }

    async fn create_run(&self, run: NewRun) -> Result<RunId, StoreError> {
        let mut state = self.state.lock().await;
        let id = RunId(state.next_id());
        state.runs.push(Run {
            id,
            macro_id: run.macro_id,
            env_name: run.env_name,
            browser: run.browser,
            headless: run.headless,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            summary: None,
        });
        Ok(id)
    }

    async fn add_step_result(&self, result: &StepResult) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.runs.iter().any(|r| r.id == result.run_id) {
            return Err(StoreError::NotFound {
                entity: "run",
                id: result.run_id.0,
            });
        }
        if state
            .results
            .iter()
            .any(|r| r.run_id == result.run_id && r.step_id == result.step_id)
        {
            return Err(StoreError::Conflict(format!(
                "step {} already has a result in run {}",
                result.step_id, result.run_id
            )));
        }
        state.results.push(result.clone());
        Ok(())
    }

    async fn add_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        self.state.lock().await.artifacts.push(artifact.clone());
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        summary: &RunSummary,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or(StoreError::NotFound {
                entity: "run",
                id: run_id.0,
            })?;
        run.status = status;
        run.finished_at = Some(Utc::now());
        run.summary = Some(summary.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<Run>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.runs.iter().find(|r| r.id == run_id).cloned())
    }

    async fn get_run_step_results(&self, run_id: RunId) -> Result<Vec<RunStepEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut entries = Vec::new();
        for result in state.results.iter().filter(|r| r.run_id == run_id) {
            let step = state
                .steps
                .iter()
                .find(|s| s.id == result.step_id)
                .ok_or(StoreError::NotFound {
                    entity: "step",
                    id: result.step_id.0,
                })?;
            entries.push(RunStepEntry {
                step_id: step.id,
                order_index: step.order_index,
                action_type: step.action_type.clone(),
                status: result.status,
                started_at: result.started_at,
                finished_at: result.finished_at,
                error_message: result.error_message.clone(),
                used_locator: result.used_locator.clone(),
                screenshot_path: result.screenshot_path.clone(),
            });
        }
        entries.sort_by_key(|e| e.order_index);
        Ok(entries)
    }

    async fn get_artifacts(&self, run_id: RunId) -> Result<Vec<Artifact>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .artifacts
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MacroCatalog for MemoryStore {
    async fn create_macro(&self, new: NewMacro) -> Result<MacroId, StoreError> {
        let mut state = self.state.lock().await;
        let id = MacroId(state.next_id());
        state.macros.push(Macro {
            id,
            name: new.name,
            description: new.description,
            base_url: new.base_url,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn append_step(&self, macro_id: MacroId, step: NewStep) -> Result<Step, StoreError> {
        let mut state = self.state.lock().await;
        if !state.macros.iter().any(|m| m.id == macro_id) {
            return Err(StoreError::NotFound {
                entity: "macro",
                id: macro_id.0,
            });
        }
        let order_index = state
            .steps
            .iter()
            .filter(|s| s.macro_id == macro_id)
            .map(|s| s.order_index)
            .max()
            .unwrap_or(0)
            + 1;
        let stored = Step {
            id: StepId(state.next_id()),
            macro_id,
            order_index,
            action_type: step.action_type,
            locators: step.locators,
            value: step.value,
            timeout_ms: step.timeout_ms,
            enabled: step.enabled,
        };
        state.steps.push(stored.clone());
        Ok(stored)
    }

    async fn disable_step(&self, step_id: StepId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let step = state
            .steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or(StoreError::NotFound {
                entity: "step",
                id: step_id.0,
            })?;
        step.enabled = false;
        Ok(())
    }

    async fn rename_macro(&self, macro_id: MacroId, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .macros
            .iter_mut()
            .find(|m| m.id == macro_id)
            .ok_or(StoreError::NotFound {
                entity: "macro",
                id: macro_id.0,
            })?;
        stored.name = name.to_string();
        Ok(())
    }
}

//! Run reports
//!
//! [`assemble_report`] rebuilds the canonical report of a run from persisted
//! records only, so a report can be regenerated long after the browser is
//! gone. Renderers (JSON file, [`junit`]) consume the [`Report`].

pub mod junit;

use crate::config::BrowserEngine;
use crate::model::{MacroId, RunId, RunStatus, RunSummary, StepStatus};
use crate::store::{RunStore, StoreError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Canonical record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub run_id: RunId,
    pub macro_id: MacroId,
    pub macro_name: String,
    pub env_name: String,
    pub browser: BrowserEngine,
    pub headless: bool,
    pub status: RunStatus,
    pub summary: RunSummary,
    pub steps: Vec<ReportStep>,
}

/// Per-step entry, in order_index order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStep {
    pub order_index: u32,
    pub action_type: String,
    pub locators: Vec<serde_json::Value>,
    pub value: Option<String>,
    pub status: StepStatus,
    pub error_message: Option<String>,
    pub screenshot_path: Option<String>,
}

impl Report {
    /// Write pretty-printed JSON
    pub async fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        log::info!("Wrote JSON report: {}", path.display());
        Ok(())
    }

    /// The first failing step, if any
    pub fn first_failure(&self) -> Option<&ReportStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Fail)
    }
}

/// Rebuild the report of a run from Run + StepResult + Step records.
///
/// The summary counts are recomputed from the step statuses; only the trace
/// pointer comes from the persisted summary.
pub async fn assemble_report(store: &dyn RunStore, run_id: RunId) -> Result<Report, StoreError> {
    let run = store.get_run(run_id).await?.ok_or(StoreError::NotFound {
        entity: "run",
        id: run_id.0,
    })?;
    let macro_record = store
        .get_macro(run.macro_id)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "macro",
            id: run.macro_id.0,
        })?;

    let steps: HashMap<_, _> = store
        .get_all_steps(run.macro_id)
        .await?
        .into_iter()
        .map(|step| (step.id, step))
        .collect();
    let entries = store.get_run_step_results(run_id).await?;

    let mut report_steps = Vec::with_capacity(entries.len());
    for entry in entries {
        let step = steps.get(&entry.step_id).ok_or(StoreError::NotFound {
            entity: "step",
            id: entry.step_id.0,
        })?;
        report_steps.push(ReportStep {
            order_index: entry.order_index,
            action_type: entry.action_type.as_str().to_string(),
            locators: step.locators.clone(),
            value: step.value.clone(),
            status: entry.status,
            error_message: entry.error_message,
            screenshot_path: entry.screenshot_path,
        });
    }

    let mut summary = RunSummary::from_statuses(report_steps.iter().map(|s| s.status));
    summary.trace_path = run.summary.and_then(|s| s.trace_path);

    let status = match run.status {
        RunStatus::Running => RunStatus::Running,
        _ => summary.status(),
    };

    Ok(Report {
        run_id,
        macro_id: macro_record.id,
        macro_name: macro_record.name,
        env_name: run.env_name,
        browser: run.browser,
        headless: run.headless,
        status,
        summary,
        steps: report_steps,
    })
}

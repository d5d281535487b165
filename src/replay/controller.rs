//! Run Controller
//!
//! Drives one macro through one browser session. Every step yields exactly
//! one persisted result: disabled steps and steps cut off by stop-on-fail are
//! recorded as SKIPPED instead of being dropped. The session is closed on
//! every exit path.

use super::executor::{navigate_and_verify, ExecutionContext, StepExecutor};
use super::outcome::StepOutcome;
use crate::artifacts::{ArtifactWriter, TraceRecorder};
use crate::browser::session::PageSession;
use crate::config::RunConfig;
use crate::error::ReplayError;
use crate::model::{
    Artifact, ArtifactKind, MacroId, RunId, RunStatus, RunSummary, Step, StepResult, StepStatus,
};
use crate::secrets::{EnvSecretSource, SecretSource};
use crate::store::{NewRun, RunStore};
use crate::validation::MacroValidator;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const STOP_ON_FAIL_MESSAGE: &str = "not executed (stop-on-fail)";

/// Terminal result of a replay
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub summary: RunSummary,
    /// order_index and reason of the first failing step
    pub first_failure: Option<(u32, String)>,
}

pub struct RunController {
    store: Arc<dyn RunStore>,
    config: RunConfig,
    secrets: Arc<dyn SecretSource>,
}

impl RunController {
    pub fn new(store: Arc<dyn RunStore>, config: RunConfig) -> Self {
        Self {
            store,
            config,
            secrets: Arc::new(EnvSecretSource),
        }
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Replay a macro and close the session afterwards, whatever happened.
    pub async fn replay(
        &self,
        macro_id: MacroId,
        mut session: Box<dyn PageSession>,
    ) -> Result<RunOutcome, ReplayError> {
        let result = self.run(macro_id, session.as_ref()).await;

        if let Err(e) = session.close().await {
            log::warn!("Failed to close browser session: {}", e);
        }

        result
    }

    async fn run(
        &self,
        macro_id: MacroId,
        session: &dyn PageSession,
    ) -> Result<RunOutcome, ReplayError> {
        let macro_record = self
            .store
            .get_macro(macro_id)
            .await?
            .ok_or(ReplayError::MacroNotFound(macro_id))?;

        let mut steps = self.store.get_all_steps(macro_id).await?;
        steps.sort_by_key(|s| s.order_index);

        let validation = MacroValidator::new().validate(&steps);
        for warning in &validation.warnings {
            log::warn!("Macro {}: {}", macro_id, warning);
        }
        if !validation.is_valid {
            return Err(ReplayError::InvalidMacro {
                macro_id,
                details: validation.error_summary(),
            });
        }

        let base_url = self
            .config
            .base_url
            .clone()
            .or_else(|| macro_record.base_url.clone());

        if let Some(url) = &base_url {
            log::info!("Initial navigation to {}", url);
            navigate_and_verify(session, url, self.config.timeouts.navigation_duration())
                .await
                .map_err(|failure| ReplayError::InitialNavigation {
                    url: url.clone(),
                    reason: failure.to_string(),
                })?;
        }

        let run_id = self
            .store
            .create_run(NewRun {
                macro_id,
                env_name: self.config.env_name.clone(),
                browser: self.config.browser,
                headless: self.config.headless,
            })
            .await?;

        log::info!(
            "Run {} started: macro '{}' ({} steps) on '{}' [{}, headless={}]",
            run_id,
            macro_record.name,
            steps.len(),
            self.config.env_name,
            self.config.browser,
            self.config.headless
        );

        let writer = ArtifactWriter::for_run(&self.config.artifacts_dir, run_id);
        let mut trace = TraceRecorder::start(run_id, macro_id);
        let executor = StepExecutor::new(
            session,
            ExecutionContext {
                base_url: base_url.clone(),
                timeouts: self.config.timeouts,
                secrets: self.secrets.as_ref(),
            },
        );

        let mut summary = RunSummary::default();
        let mut first_failure: Option<(u32, String)> = None;
        let mut halted = false;

        for step in &steps {
            let started_at = Utc::now();

            if halted || !step.enabled {
                let message = (halted && step.enabled).then(|| STOP_ON_FAIL_MESSAGE.to_string());
                let outcome = StepOutcome::Skipped {
                    reason: message.clone().unwrap_or_default(),
                };
                if let Err(e) = self
                    .record(
                        run_id,
                        step,
                        &outcome,
                        message,
                        None,
                        started_at,
                        &mut summary,
                        &mut trace,
                        None,
                    )
                    .await
                {
                    return Err(self.abandon_run(run_id, &summary, e).await);
                }
                continue;
            }

            let outcome = executor.execute(step).await;

            let mut screenshot_path = None;
            if let StepOutcome::Fail { .. } = outcome {
                match writer.capture_failure_screenshot(session, step).await {
                    Ok(info) => {
                        self.add_artifact(run_id, ArtifactKind::Screenshot, &info.path)
                            .await;
                        screenshot_path = Some(info.path);
                    }
                    Err(e) => log::warn!(
                        "ArtifactCaptureError: screenshot for step {} not saved: {}",
                        step.order_index,
                        e
                    ),
                }
            }

            let url = session.current_url().await.ok();
            if let Err(e) = self
                .record(
                    run_id,
                    step,
                    &outcome,
                    outcome.message(),
                    screenshot_path,
                    started_at,
                    &mut summary,
                    &mut trace,
                    url,
                )
                .await
            {
                return Err(self.abandon_run(run_id, &summary, e).await);
            }

            if let StepOutcome::Fail { failure, .. } = &outcome {
                if first_failure.is_none() {
                    first_failure = Some((step.order_index, failure.to_string()));
                }
                if self.config.stop_on_fail {
                    log::info!(
                        "Stop-on-fail: skipping the steps after step {}",
                        step.order_index
                    );
                    halted = true;
                }
            }
        }

        let status = summary.status();

        if status == RunStatus::Fail {
            match trace.write(session, &writer).await {
                Ok(path) => {
                    let path = path.to_string_lossy().to_string();
                    self.add_artifact(run_id, ArtifactKind::Trace, &path).await;
                    summary.trace_path = Some(path);
                }
                Err(e) => log::warn!("ArtifactCaptureError: trace not saved: {}", e),
            }
        }

        self.store.finish_run(run_id, status, &summary).await?;

        log::info!(
            "Run {} finished: {} (total={}, passed={}, failed={}, skipped={})",
            run_id,
            status,
            summary.total,
            summary.passed,
            summary.failed,
            summary.skipped
        );
        if let Some((order_index, reason)) = &first_failure {
            log::error!(
                "Run {} failed at step {}: {}",
                run_id,
                order_index,
                reason
            );
        }

        Ok(RunOutcome {
            run_id,
            status,
            summary,
            first_failure,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        run_id: RunId,
        step: &Step,
        outcome: &StepOutcome,
        error_message: Option<String>,
        screenshot_path: Option<String>,
        started_at: DateTime<Utc>,
        summary: &mut RunSummary,
        trace: &mut TraceRecorder,
        url: Option<String>,
    ) -> Result<(), ReplayError> {
        let status = outcome.status();
        let result = StepResult {
            run_id,
            step_id: step.id,
            status,
            started_at,
            finished_at: Utc::now(),
            error_message,
            used_locator: outcome.used_locator().cloned(),
            screenshot_path,
        };

        self.store.add_step_result(&result).await?;
        summary.record(status);
        trace.record(step, &result, url);

        match (status, &result.error_message) {
            (StepStatus::Pass, _) => log::info!(
                "Step {} {}: PASS{}",
                step.order_index,
                step.action_type,
                result
                    .used_locator
                    .as_ref()
                    .map(|l| format!(" via {}", l))
                    .unwrap_or_default()
            ),
            (status, Some(message)) => log::info!(
                "Step {} {}: {} ({})",
                step.order_index,
                step.action_type,
                status,
                message
            ),
            (status, None) => {
                log::info!("Step {} {}: {}", step.order_index, step.action_type, status)
            }
        }
        Ok(())
    }

    /// Close a run whose results could not be stored so it does not stay
    /// RUNNING. The store error is returned unchanged.
    async fn abandon_run(
        &self,
        run_id: RunId,
        summary: &RunSummary,
        error: ReplayError,
    ) -> ReplayError {
        log::error!("Run {}: step result not stored: {}", run_id, error);
        if let Err(e) = self.store.finish_run(run_id, RunStatus::Fail, summary).await {
            log::warn!("Run {} could not be marked FAIL: {}", run_id, e);
        }
        error
    }

    async fn add_artifact(&self, run_id: RunId, kind: ArtifactKind, path: &str) {
        let artifact = Artifact {
            run_id,
            kind,
            storage_url: path.to_string(),
        };
        if let Err(e) = self.store.add_artifact(&artifact).await {
            log::warn!("Failed to record {} artifact {}: {}", kind.as_str(), path, e);
        }
    }
}

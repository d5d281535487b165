//! Step Executor
//!
//! Performs one recorded step against a live page and classifies the result.
//! Dispatch is by action type, in the same shape as a CDP method router: one
//! arm per action, each delegating to a small `execute_*` routine. Nothing
//! escapes as an error; every failure becomes a [`StepOutcome::Fail`].

use super::locator::{resolve_within, wait_until_interactable, wait_until_visible, Resolved};
use super::outcome::{StepFailure, StepOutcome};
use super::value::{
    resolve_url, ClickAtTarget, CssExpectation, Directive, ScrollTarget, UrlExpectation,
};
use crate::browser::session::{NavigationResponse, PageSession};
use crate::config::Timeouts;
use crate::model::{ActionType, Locator, Step};
use crate::secrets::SecretSource;
use std::time::Duration;
use tokio::time::Instant;

/// Document fragments that identify a browser or server error page
const ERROR_PAGE_SIGNATURES: &[&str] = &[
    "ERR_NAME_NOT_RESOLVED",
    "ERR_CONNECTION_REFUSED",
    "ERR_CONNECTION_RESET",
    "ERR_INTERNET_DISCONNECTED",
    "This site can\u{2019}t be reached",
    "This site can't be reached",
    "<title>404 Not Found</title>",
    "<title>502 Bad Gateway</title>",
    "<title>503 Service Unavailable</title>",
];

/// Run-wide inputs the executor needs for every step
pub struct ExecutionContext<'a> {
    pub base_url: Option<String>,
    pub timeouts: Timeouts,
    pub secrets: &'a dyn SecretSource,
}

enum Completion {
    Done,
    Skipped(String),
}

pub struct StepExecutor<'a> {
    session: &'a dyn PageSession,
    context: ExecutionContext<'a>,
}

impl<'a> StepExecutor<'a> {
    pub fn new(session: &'a dyn PageSession, context: ExecutionContext<'a>) -> Self {
        Self { session, context }
    }

    /// Execute one step. Never fails outward.
    pub async fn execute(&self, step: &Step) -> StepOutcome {
        let (candidates, rejected) = step.locator_candidates();
        for reject in &rejected {
            log::warn!(
                "Step {}: ignoring locator #{}: {}",
                step.order_index,
                reject.position,
                reject.reason
            );
        }

        let mut used_locator = None;
        match self.dispatch(step, &candidates, &mut used_locator).await {
            Ok(Completion::Done) => StepOutcome::Pass { used_locator },
            Ok(Completion::Skipped(reason)) => StepOutcome::Skipped { reason },
            Err(failure) => StepOutcome::Fail {
                failure,
                used_locator,
            },
        }
    }

    fn element_timeout(&self, step: &Step) -> Duration {
        step.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.context.timeouts.step_duration())
    }

    fn navigation_timeout(&self, step: &Step) -> Duration {
        step.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.context.timeouts.navigation_duration())
    }

    async fn dispatch(
        &self,
        step: &Step,
        candidates: &[Locator],
        used: &mut Option<Locator>,
    ) -> Result<Completion, StepFailure> {
        let deadline = Instant::now() + self.element_timeout(step);

        match &step.action_type {
            ActionType::Navigation => self.execute_navigation(step).await,
            ActionType::WaitFor => self.execute_wait_for(step, candidates, deadline, used).await,
            ActionType::Assert => self.execute_assert(step, candidates, deadline, used).await,
            ActionType::Type => self.execute_type(step, candidates, deadline, used).await,
            ActionType::Click => {
                let target = self.interactable(candidates, deadline, used).await?;
                self.session.click(&target.query).await?;
                Ok(Completion::Done)
            }
            ActionType::DblClick => {
                let target = self.interactable(candidates, deadline, used).await?;
                self.session.double_click(&target.query).await?;
                Ok(Completion::Done)
            }
            ActionType::Hover => {
                let target = self.interactable(candidates, deadline, used).await?;
                self.session.hover(&target.query).await?;
                Ok(Completion::Done)
            }
            ActionType::Check => self.execute_set_checked(candidates, deadline, used, true).await,
            ActionType::Uncheck => {
                self.execute_set_checked(candidates, deadline, used, false)
                    .await
            }
            ActionType::Select => self.execute_select(step, candidates, deadline, used).await,
            ActionType::ClickAt => self.execute_click_at(step, candidates, deadline, used).await,
            ActionType::ScrollTo => self.execute_scroll_to(step).await,
            ActionType::AssertCss => {
                self.execute_assert_css(step, candidates, deadline, used)
                    .await
            }
            ActionType::AssertCursor => {
                self.execute_assert_cursor(step, candidates, deadline, used)
                    .await
            }
            ActionType::Unsupported(name) => Err(StepFailure::UnsupportedAction(name.clone())),
        }
    }

    /// Resolve and wait until the element can receive input
    async fn interactable(
        &self,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
    ) -> Result<Resolved, StepFailure> {
        let resolved = resolve_within(self.session, candidates, deadline).await?;
        *used = Some(resolved.locator.clone());
        wait_until_interactable(self.session, &resolved, deadline).await?;
        Ok(resolved)
    }

    /// Resolve and wait until the element is shown
    async fn visible(
        &self,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
    ) -> Result<Resolved, StepFailure> {
        let resolved = resolve_within(self.session, candidates, deadline).await?;
        *used = Some(resolved.locator.clone());
        wait_until_visible(self.session, &resolved, deadline).await?;
        Ok(resolved)
    }

    // ===== NAVIGATION =====

    async fn execute_navigation(&self, step: &Step) -> Result<Completion, StepFailure> {
        let url = resolve_url(step.value_str(), self.context.base_url.as_deref())
            .map_err(StepFailure::InvalidValue)?;
        navigate_and_verify(self.session, &url, self.navigation_timeout(step)).await?;
        Ok(Completion::Done)
    }

    // ===== WAITS AND ASSERTIONS =====

    async fn execute_wait_for(
        &self,
        step: &Step,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
    ) -> Result<Completion, StepFailure> {
        match Directive::parse(step.value_str()) {
            Directive::Url(expected) => {
                let expectation = UrlExpectation::parse(expected);
                let current = self
                    .wait_for_url(&expectation, deadline, false)
                    .await
                    .map_err(|failure| match failure {
                        StepFailure::AssertionFailed(current) => StepFailure::AssertionFailed(
                            format!("Timed out waiting for URL {} (current: {})", expected, current),
                        ),
                        other => other,
                    })?;
                log::debug!("URL wait satisfied by {}", current);
            }
            Directive::Text(_) | Directive::Visible => {
                self.interactable(candidates, deadline, used).await?;
            }
        }
        Ok(Completion::Done)
    }

    async fn execute_assert(
        &self,
        step: &Step,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
    ) -> Result<Completion, StepFailure> {
        match Directive::parse(step.value_str()) {
            Directive::Url(expected) => {
                let expectation = UrlExpectation::parse(expected);
                self.wait_for_url(&expectation, deadline, true)
                    .await
                    .map_err(|failure| match failure {
                        StepFailure::AssertionFailed(current) => StepFailure::AssertionFailed(
                            format!("URL does not contain {} (current: {})", expected, current),
                        ),
                        other => other,
                    })?;
            }
            Directive::Text(expected) => {
                let target = self.interactable(candidates, deadline, used).await?;
                self.wait_for_text(&target, expected, deadline).await?;
            }
            Directive::Visible => {
                self.visible(candidates, deadline, used).await?;
            }
        }
        Ok(Completion::Done)
    }

    /// Poll the current URL until it satisfies the expectation.
    ///
    /// On timeout the error carries the last URL seen.
    async fn wait_for_url(
        &self,
        expected: &UrlExpectation,
        deadline: Instant,
        containment: bool,
    ) -> Result<String, StepFailure> {
        loop {
            let current = self.session.current_url().await?;
            let matched = if containment {
                expected.contained_in(&current)
            } else {
                expected.matches(&current)
            };
            if matched {
                return Ok(current);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StepFailure::AssertionFailed(current));
            }
            tokio::time::sleep(super::locator::POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn wait_for_text(
        &self,
        target: &Resolved,
        expected: &str,
        deadline: Instant,
    ) -> Result<(), StepFailure> {
        loop {
            let text = self.session.text_content(&target.query).await?;
            if text.contains(expected) {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StepFailure::AssertionFailed(format!(
                    "Text does not contain {}",
                    expected
                )));
            }
            tokio::time::sleep(super::locator::POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn execute_assert_css(
        &self,
        step: &Step,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
    ) -> Result<Completion, StepFailure> {
        let expectation =
            CssExpectation::parse(step.value_str()).map_err(StepFailure::InvalidValue)?;
        let target = self.visible(candidates, deadline, used).await?;

        loop {
            let actual = self
                .session
                .computed_style(&target.query, &expectation.property)
                .await?;
            if actual.contains(&expectation.expected) {
                return Ok(Completion::Done);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StepFailure::AssertionFailed(format!(
                    "CSS {} is '{}', expected it to contain '{}'",
                    expectation.property, actual, expectation.expected
                )));
            }
            tokio::time::sleep(super::locator::POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn execute_assert_cursor(
        &self,
        step: &Step,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
    ) -> Result<Completion, StepFailure> {
        let expected = step.value_str().trim();
        if expected.is_empty() {
            return Err(StepFailure::InvalidValue(
                "assertCursor needs the expected cursor keyword".to_string(),
            ));
        }
        let target = self.visible(candidates, deadline, used).await?;

        loop {
            let actual = self.session.computed_style(&target.query, "cursor").await?;
            if actual.trim() == expected {
                return Ok(Completion::Done);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StepFailure::AssertionFailed(format!(
                    "Cursor is '{}', expected '{}'",
                    actual.trim(),
                    expected
                )));
            }
            tokio::time::sleep(super::locator::POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    // ===== INPUT =====

    async fn execute_type(
        &self,
        step: &Step,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
    ) -> Result<Completion, StepFailure> {
        let text = if step.is_secret() {
            match self.context.secrets.secret_for(step) {
                Some(secret) => secret,
                None => return Ok(Completion::Skipped(self.context.secrets.describe(step))),
            }
        } else {
            step.value_str().to_string()
        };

        let target = self.interactable(candidates, deadline, used).await?;
        self.session.fill(&target.query, &text).await?;
        Ok(Completion::Done)
    }

    async fn execute_set_checked(
        &self,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
        checked: bool,
    ) -> Result<Completion, StepFailure> {
        let target = self.interactable(candidates, deadline, used).await?;

        if self.session.is_checked(&target.query).await? != checked {
            self.session.click(&target.query).await?;
            if self.session.is_checked(&target.query).await? != checked {
                return Err(StepFailure::ElementNotInteractable(format!(
                    "{} did not become {}",
                    target.locator,
                    if checked { "checked" } else { "unchecked" }
                )));
            }
        }
        Ok(Completion::Done)
    }

    async fn execute_select(
        &self,
        step: &Step,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
    ) -> Result<Completion, StepFailure> {
        let option = step
            .value
            .as_deref()
            .ok_or_else(|| StepFailure::InvalidValue("select needs an option value".to_string()))?;
        let target = self.interactable(candidates, deadline, used).await?;
        self.session.select_option(&target.query, option).await?;
        Ok(Completion::Done)
    }

    // ===== POINTER AND VIEWPORT =====

    async fn execute_click_at(
        &self,
        step: &Step,
        candidates: &[Locator],
        deadline: Instant,
        used: &mut Option<Locator>,
    ) -> Result<Completion, StepFailure> {
        let (x, y) = match ClickAtTarget::parse(step.value_str())
            .map_err(StepFailure::InvalidValue)?
        {
            ClickAtTarget::Absolute { x, y } => (x, y),
            ClickAtTarget::Offset { dx, dy } => {
                let target = self.interactable(candidates, deadline, used).await?;
                let bounds = self.session.bounding_box(&target.query).await?;
                (bounds.x + dx, bounds.y + dy)
            }
        };

        self.session.mouse_click(x, y).await?;
        Ok(Completion::Done)
    }

    async fn execute_scroll_to(&self, step: &Step) -> Result<Completion, StepFailure> {
        let target = ScrollTarget::parse(step.value_str()).map_err(StepFailure::InvalidValue)?;
        self.session.scroll_to(target.x, target.y).await?;
        Ok(Completion::Done)
    }
}

/// Navigate and treat HTTP errors and error documents as failures even when
/// the browser reports the navigation itself as successful.
pub async fn navigate_and_verify(
    session: &dyn PageSession,
    url: &str,
    timeout: Duration,
) -> Result<NavigationResponse, StepFailure> {
    let response = session
        .navigate(url, timeout)
        .await
        .map_err(|e| StepFailure::NavigationFailed(e.to_string()))?;

    if let Some(status) = response.status {
        if status >= 400 {
            return Err(StepFailure::NavigationFailed(format!(
                "{} responded with HTTP {}",
                url, status
            )));
        }
    }

    if response.url.starts_with("chrome-error://") {
        return Err(StepFailure::NavigationFailed(format!(
            "{} loaded the browser error page",
            url
        )));
    }

    match session.page_source().await {
        Ok(html) => {
            if let Some(signature) = ERROR_PAGE_SIGNATURES
                .iter()
                .find(|signature| html.contains(*signature))
            {
                return Err(StepFailure::NavigationFailed(format!(
                    "{} shows an error page ({})",
                    url, signature
                )));
            }
        }
        Err(e) => log::debug!("Could not read document after navigating to {}: {}", url, e),
    }

    Ok(response)
}

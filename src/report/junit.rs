//! JUnit XML rendering
//!
//! One `testsuite` per run, one `testcase` per step named
//! `step-{order}-{actionType}`.

use super::Report;
use crate::model::StepStatus;
use anyhow::Context;
use std::fmt::Write as _;
use std::path::Path;

pub fn render(report: &Report) -> String {
    let suite = escape(&report.macro_name);
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let _ = writeln!(
        xml,
        "<testsuites name=\"macro-replay\" tests=\"{}\" failures=\"{}\" skipped=\"{}\">",
        report.summary.total, report.summary.failed, report.summary.skipped
    );
    let _ = writeln!(
        xml,
        "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\">",
        suite, report.summary.total, report.summary.failed, report.summary.skipped
    );
    let _ = writeln!(xml, "    <properties>");
    for (name, value) in [
        ("runId", report.run_id.to_string()),
        ("envName", report.env_name.clone()),
        ("browser", report.browser.to_string()),
        ("headless", report.headless.to_string()),
    ] {
        let _ = writeln!(
            xml,
            "      <property name=\"{}\" value=\"{}\"/>",
            name,
            escape(&value)
        );
    }
    let _ = writeln!(xml, "    </properties>");

    for step in &report.steps {
        let name = escape(&format!("step-{}-{}", step.order_index, step.action_type));
        match step.status {
            StepStatus::Pass => {
                let _ = writeln!(xml, "    <testcase name=\"{}\" classname=\"{}\"/>", name, suite);
            }
            StepStatus::Fail => {
                let message = step.error_message.as_deref().unwrap_or("step failed");
                let _ = writeln!(xml, "    <testcase name=\"{}\" classname=\"{}\">", name, suite);
                let _ = writeln!(
                    xml,
                    "      <failure message=\"{}\">{}</failure>",
                    escape(message),
                    escape(message)
                );
                if let Some(path) = &step.screenshot_path {
                    let _ = writeln!(
                        xml,
                        "      <system-out>[[ATTACHMENT|{}]]</system-out>",
                        escape(path)
                    );
                }
                let _ = writeln!(xml, "    </testcase>");
            }
            StepStatus::Skipped => {
                let _ = writeln!(xml, "    <testcase name=\"{}\" classname=\"{}\">", name, suite);
                match &step.error_message {
                    Some(message) => {
                        let _ = writeln!(xml, "      <skipped message=\"{}\"/>", escape(message));
                    }
                    None => {
                        let _ = writeln!(xml, "      <skipped/>");
                    }
                }
                let _ = writeln!(xml, "    </testcase>");
            }
        }
    }

    let _ = writeln!(xml, "  </testsuite>");
    let _ = writeln!(xml, "</testsuites>");
    xml
}

pub async fn write(report: &Report, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, render(report))
        .await
        .with_context(|| format!("Failed to write JUnit report {}", path.display()))?;
    log::info!("Wrote JUnit report: {}", path.display());
    Ok(())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // XML 1.0 forbids most control characters outright
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserEngine;
    use crate::model::{MacroId, RunId, RunStatus, RunSummary};
    use crate::report::ReportStep;

    fn step(order_index: u32, action: &str, status: StepStatus, error: Option<&str>) -> ReportStep {
        ReportStep {
            order_index,
            action_type: action.to_string(),
            locators: vec![],
            value: None,
            status,
            error_message: error.map(str::to_string),
            screenshot_path: None,
        }
    }

    fn report(steps: Vec<ReportStep>) -> Report {
        Report {
            run_id: RunId(12),
            macro_id: MacroId(3),
            macro_name: "Login & <check>".to_string(),
            env_name: "staging".to_string(),
            browser: BrowserEngine::Chromium,
            headless: true,
            status: RunStatus::Fail,
            summary: RunSummary::from_statuses(steps.iter().map(|s| s.status)),
            steps,
        }
    }

    #[test]
    fn test_testcase_per_step() {
        let xml = render(&report(vec![
            step(1, "click", StepStatus::Pass, None),
            step(2, "assert", StepStatus::Fail, Some("Text does not contain \"Welcome\"")),
            step(3, "waitFor", StepStatus::Skipped, Some("not executed (stop-on-fail)")),
            step(4, "hover", StepStatus::Skipped, None),
        ]));

        assert!(xml.contains("<testcase name=\"step-1-click\" classname=\"Login &amp; &lt;check&gt;\"/>"));
        assert!(xml.contains("<testcase name=\"step-2-assert\""));
        assert!(xml.contains(
            "<failure message=\"Text does not contain &quot;Welcome&quot;\">"
        ));
        assert!(xml.contains("<skipped message=\"not executed (stop-on-fail)\"/>"));
        assert!(xml.contains("<skipped/>"));
        assert_eq!(xml.matches("<testcase").count(), 4);
        assert_eq!(xml.matches("<failure").count(), 1);
        assert!(xml.contains("tests=\"4\" failures=\"1\" errors=\"0\" skipped=\"2\""));
    }

    #[test]
    fn test_pass_steps_have_no_children() {
        let xml = render(&report(vec![step(1, "navigation", StepStatus::Pass, None)]));
        assert!(!xml.contains("<failure"));
        assert!(!xml.contains("<skipped"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&'\""), "a&lt;b&gt;&amp;&apos;&quot;");
        assert_eq!(escape("bell\u{7}"), "bell");
        assert_eq!(escape("tab\tok"), "tab\tok");
    }
}

//! Locator resolution
//!
//! Candidates are tried strictly in stored order; the first one matching at
//! least one element wins and its first match (document order) becomes the
//! target. Query errors count as zero matches. A full pass is repeated until
//! the step's deadline so that asynchronously rendered elements are found.

use crate::browser::session::{ElementQuery, PageSession};
use crate::model::Locator;
use crate::replay::outcome::StepFailure;
use std::time::Duration;
use tokio::time::Instant;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A candidate that currently resolves to at least one live element
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub locator: Locator,
    pub query: ElementQuery,
    pub match_count: usize,
}

/// Translate a locator into the native query the session understands.
pub fn to_query(locator: &Locator) -> ElementQuery {
    match locator {
        Locator::Data { value } | Locator::Css { value } => ElementQuery::Css(value.clone()),
        Locator::Xpath { value } => ElementQuery::XPath(value.clone()),
        Locator::Role { role, name } => ElementQuery::XPath(role_xpath(role, name.as_deref())),
    }
}

/// Element tests that carry an implicit ARIA role
fn implicit_role_elements(role: &str) -> &'static [&'static str] {
    match role {
        "button" => &[
            "self::button",
            "self::input[@type='button' or @type='submit' or @type='reset' or @type='image']",
            "self::summary",
        ],
        "link" => &["self::a[@href]", "self::area[@href]"],
        "textbox" => &[
            "self::textarea",
            "self::input[not(@type) or @type='text' or @type='email' or @type='tel' or @type='url']",
        ],
        "searchbox" => &["self::input[@type='search']"],
        "checkbox" => &["self::input[@type='checkbox']"],
        "radio" => &["self::input[@type='radio']"],
        "combobox" => &["self::select[not(@multiple)]"],
        "listbox" => &["self::select[@multiple]", "self::datalist"],
        "option" => &["self::option"],
        "heading" => &[
            "self::h1", "self::h2", "self::h3", "self::h4", "self::h5", "self::h6",
        ],
        "img" => &["self::img"],
        "list" => &["self::ul", "self::ol"],
        "listitem" => &["self::li"],
        "navigation" => &["self::nav"],
        "main" => &["self::main"],
        "dialog" => &["self::dialog"],
        "table" => &["self::table"],
        "row" => &["self::tr"],
        "cell" => &["self::td"],
        "form" => &["self::form"],
        // tab, menuitem and friends only exist as explicit roles
        _ => &[],
    }
}

/// XPath 1.0 string literal for arbitrary text
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        let parts: Vec<String> = text.split('\'').map(|part| format!("'{}'", part)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Build the XPath for a role locator: explicit `@role`, or an element with
/// the matching implicit role, constrained by accessible name when given.
pub fn role_xpath(role: &str, name: Option<&str>) -> String {
    let role_literal = xpath_literal(role);
    let implicit = implicit_role_elements(role);

    let role_test = if implicit.is_empty() {
        format!("@role={}", role_literal)
    } else {
        format!(
            "@role={} or (not(@role) and ({}))",
            role_literal,
            implicit.join(" or ")
        )
    };

    match name {
        Some(name) => {
            let name = xpath_literal(name.trim());
            format!(
                "//*[({})][normalize-space(.)={n} or normalize-space(@aria-label)={n} \
                 or normalize-space(@value)={n} or normalize-space(@title)={n} \
                 or normalize-space(@alt)={n} or normalize-space(@placeholder)={n}]",
                role_test,
                n = name
            )
        }
        None => format!("//*[{}]", role_test),
    }
}

/// One resolution pass over the candidates.
pub async fn resolve(session: &dyn PageSession, candidates: &[Locator]) -> Option<Resolved> {
    for locator in candidates {
        let query = to_query(locator);
        match session.count(&query).await {
            Ok(0) => {
                log::debug!("Locator {} matched nothing", locator);
            }
            Ok(match_count) => {
                log::debug!("Locator {} matched {} element(s)", locator, match_count);
                return Some(Resolved {
                    locator: locator.clone(),
                    query,
                    match_count,
                });
            }
            Err(e) => {
                log::debug!("Locator {} query failed, skipping: {}", locator, e);
            }
        }
    }
    None
}

/// Repeat resolution passes until one succeeds or the deadline passes.
pub async fn resolve_within(
    session: &dyn PageSession,
    candidates: &[Locator],
    deadline: Instant,
) -> Result<Resolved, StepFailure> {
    if candidates.is_empty() {
        return Err(StepFailure::LocatorNotFound(
            "step has no usable locator candidates".to_string(),
        ));
    }

    loop {
        if let Some(resolved) = resolve(session, candidates).await {
            return Ok(resolved);
        }

        let now = Instant::now();
        if now >= deadline {
            let tried: Vec<String> = candidates.iter().map(|l| l.to_string()).collect();
            return Err(StepFailure::LocatorNotFound(format!(
                "no candidate matched an element (tried {})",
                tried.join(", ")
            )));
        }
        tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// Wait until the resolved element is attached and visible, then require it
/// to be enabled.
pub async fn wait_until_interactable(
    session: &dyn PageSession,
    resolved: &Resolved,
    deadline: Instant,
) -> Result<(), StepFailure> {
    wait_for_state(session, resolved, deadline, true).await
}

/// Wait until the resolved element is attached and visible.
pub async fn wait_until_visible(
    session: &dyn PageSession,
    resolved: &Resolved,
    deadline: Instant,
) -> Result<(), StepFailure> {
    wait_for_state(session, resolved, deadline, false).await
}

async fn wait_for_state(
    session: &dyn PageSession,
    resolved: &Resolved,
    deadline: Instant,
    require_enabled: bool,
) -> Result<(), StepFailure> {
    loop {
        let (state, last_error) = match session.element_state(&resolved.query).await {
            Ok(state) => (Some(state), None),
            Err(e) => (None, Some(e.to_string())),
        };

        if let Some(state) = state {
            if state.attached && state.visible && (state.enabled || !require_enabled) {
                return Ok(());
            }
        }

        let now = Instant::now();
        if now >= deadline {
            let reason = match (state, last_error) {
                (Some(state), _) if !state.attached => {
                    format!("{} is no longer attached to the document", resolved.locator)
                }
                (Some(state), _) if !state.visible => {
                    format!("{} did not become visible in time", resolved.locator)
                }
                (Some(_), _) => format!("{} is disabled", resolved.locator),
                (None, Some(e)) => format!("{} state could not be read: {}", resolved.locator, e),
                (None, None) => format!("{} state could not be read", resolved.locator),
            };
            return Err(StepFailure::ElementNotInteractable(reason));
        }
        tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_and_css_become_css_queries() {
        assert_eq!(
            to_query(&Locator::Data {
                value: "[data-testid=\"save\"]".to_string()
            }),
            ElementQuery::Css("[data-testid=\"save\"]".to_string())
        );
        assert_eq!(
            to_query(&Locator::Css {
                value: "form > button".to_string()
            }),
            ElementQuery::Css("form > button".to_string())
        );
        assert_eq!(
            to_query(&Locator::Xpath {
                value: "/html/body/button".to_string()
            }),
            ElementQuery::XPath("/html/body/button".to_string())
        );
    }

    #[test]
    fn test_role_xpath_without_name() {
        let xpath = role_xpath("checkbox", None);
        assert_eq!(
            xpath,
            "//*[@role='checkbox' or (not(@role) and (self::input[@type='checkbox']))]"
        );
    }

    #[test]
    fn test_role_xpath_with_name() {
        let xpath = role_xpath("button", Some("Sign in"));
        assert!(xpath.starts_with("//*[(@role='button' or (not(@role) and (self::button"));
        assert!(xpath.contains("normalize-space(.)='Sign in'"));
        assert!(xpath.contains("normalize-space(@aria-label)='Sign in'"));
    }

    #[test]
    fn test_role_xpath_explicit_only_roles() {
        assert_eq!(role_xpath("tab", None), "//*[@role='tab']");
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("plain"), "'plain'");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(
            xpath_literal("it's \"quoted\""),
            "concat('it', \"'\", 's \"quoted\"')"
        );
    }
}

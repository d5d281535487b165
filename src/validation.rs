//! Macro Validation
//!
//! Checks a macro's steps before any of them execute. Errors make the macro
//! unrunnable; warnings are logged and the affected steps are still attempted
//! (malformed locator candidates are simply dropped at resolution time).

use crate::model::{ActionType, Locator, Step};
use crate::replay::value::{ClickAtTarget, CssExpectation, Directive, ScrollTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Detailed validation error with location information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub error_type: ValidationErrorType,

    /// Human-readable error message
    pub message: String,

    pub location: ErrorLocation,

    /// Suggestion for fixing the error
    pub suggestion: Option<String>,
}

/// Types of validation errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorType {
    /// Two steps share an order_index
    DuplicateOrder,

    /// Action needs a value and none was recorded
    MissingValue,

    /// Value does not parse for the step's action
    InvalidValue,
}

/// Where in the macro the problem is
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorLocation {
    pub order_index: u32,

    /// Field path (e.g., "steps[3].value")
    pub field_path: String,
}

/// Result of validation with all errors found
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    /// Non-blocking issues
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// All error messages on one line
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Pre-run macro validator
#[derive(Debug, Default)]
pub struct MacroValidator;

impl MacroValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate all steps of one macro. Disabled steps only take part in the
    /// order_index uniqueness check.
    pub fn validate(&self, steps: &[Step]) -> ValidationResult {
        let mut result = ValidationResult::success();

        let mut seen: HashMap<u32, usize> = HashMap::new();
        for step in steps {
            *seen.entry(step.order_index).or_default() += 1;
        }
        let mut duplicates: Vec<u32> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(order, _)| order)
            .collect();
        duplicates.sort_unstable();
        for order_index in duplicates {
            result.add_error(ValidationError {
                error_type: ValidationErrorType::DuplicateOrder,
                message: format!("order_index {} is used by more than one step", order_index),
                location: ErrorLocation {
                    order_index,
                    field_path: "steps[].order_index".to_string(),
                },
                suggestion: Some("Re-import the macro so every step gets its own position".to_string()),
            });
        }

        for step in steps.iter().filter(|s| s.enabled) {
            self.validate_value(step, &mut result);
            self.validate_locators(step, &mut result);
        }

        result
    }

    fn validate_value(&self, step: &Step, result: &mut ValidationResult) {
        let field_path = format!("steps[{}].value", step.order_index);
        let error = |error_type, message: String, suggestion: &str| ValidationError {
            error_type,
            message,
            location: ErrorLocation {
                order_index: step.order_index,
                field_path: field_path.clone(),
            },
            suggestion: Some(suggestion.to_string()),
        };

        let value = step.value.as_deref();
        let missing = value.map(|v| v.trim().is_empty()).unwrap_or(true);

        match &step.action_type {
            ActionType::Navigation | ActionType::Select | ActionType::AssertCursor if missing => {
                result.add_error(error(
                    ValidationErrorType::MissingValue,
                    format!(
                        "Step {} ({}) has no value",
                        step.order_index, step.action_type
                    ),
                    "Record the target URL, option or cursor keyword",
                ));
            }
            ActionType::ClickAt => {
                if let Err(e) = ClickAtTarget::parse(step.value_str()) {
                    result.add_error(error(
                        ValidationErrorType::InvalidValue,
                        format!("Step {} (clickAt): {}", step.order_index, e),
                        "Use 'x,y', 'offset:dx,dy' or {\"x\":..,\"y\":..}",
                    ));
                }
            }
            ActionType::ScrollTo => {
                if let Err(e) = ScrollTarget::parse(step.value_str()) {
                    result.add_error(error(
                        ValidationErrorType::InvalidValue,
                        format!("Step {} (scrollTo): {}", step.order_index, e),
                        "Use 'x,y', 'y' or {\"x\":..,\"y\":..}",
                    ));
                }
            }
            ActionType::AssertCss => {
                if let Err(e) = CssExpectation::parse(step.value_str()) {
                    result.add_error(error(
                        ValidationErrorType::InvalidValue,
                        format!("Step {} (assertCss): {}", step.order_index, e),
                        "Use 'property:expected'",
                    ));
                }
            }
            ActionType::WaitFor | ActionType::Assert => {
                let empty_payload = match Directive::parse(step.value_str()) {
                    Directive::Url(url) => url.is_empty(),
                    Directive::Text(text) => text.is_empty(),
                    Directive::Visible => false,
                };
                if empty_payload {
                    result.add_error(error(
                        ValidationErrorType::InvalidValue,
                        format!(
                            "Step {} ({}) has an empty '{}' directive",
                            step.order_index,
                            step.action_type,
                            step.value_str().split(':').next().unwrap_or_default()
                        ),
                        "Add the expected URL or text after the prefix",
                    ));
                }
            }
            _ => {}
        }
    }

    fn validate_locators(&self, step: &Step, result: &mut ValidationResult) {
        let (candidates, rejected) = step.locator_candidates();

        for reject in &rejected {
            result.add_warning(format!(
                "Step {}: locator #{} ignored: {}",
                step.order_index, reject.position, reject.reason
            ));
        }

        if candidates.windows(2).any(|pair| pair[0].kind() > pair[1].kind()) {
            let kinds: Vec<String> = candidates
                .iter()
                .map(|l: &Locator| format!("{:?}", l.kind()).to_lowercase())
                .collect();
            result.add_warning(format!(
                "Step {}: locators are not in data > role > css > xpath order ({}); stored order is used",
                step.order_index,
                kinds.join(", ")
            ));
        }

        if candidates.is_empty() && step.action_type.requires_element(step.value.as_deref()) {
            result.add_warning(format!(
                "Step {} ({}) has no usable locator and will fail",
                step.order_index, step.action_type
            ));
        }
    }
}

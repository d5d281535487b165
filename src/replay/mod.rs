//! Macro replay engine
//!
//! Resolution, execution and run control for recorded macros.

pub mod controller;
pub mod executor;
pub mod locator;
pub mod outcome;
pub mod value;

pub use controller::{RunController, RunOutcome};
pub use executor::{ExecutionContext, StepExecutor};
pub use locator::{
    resolve, resolve_within, role_xpath, wait_until_interactable, wait_until_visible, Resolved,
};
pub use outcome::{StepFailure, StepOutcome};

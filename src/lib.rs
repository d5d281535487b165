pub mod artifacts;
pub mod browser;
pub mod config;
pub mod error;
pub mod model;
pub mod replay;
pub mod report;
pub mod secrets;
pub mod store;
pub mod validation;

//  Re-export commonly used items
pub use browser::chrome::{ChromeDriver, LaunchOptions};
pub use browser::session::{ElementQuery, PageSession};
pub use config::{BrowserEngine, EnvironmentFile, RunConfig, RunOverrides, Timeouts};
pub use error::{BrowserError, ReplayError};
pub use model::{
    ActionType, Locator, Macro, MacroId, Run, RunId, RunStatus, RunSummary, Step, StepId,
    StepResult, StepStatus,
};
pub use replay::{RunController, RunOutcome, StepExecutor, StepFailure, StepOutcome};
pub use report::{assemble_report, Report, ReportStep};
pub use secrets::{EnvSecretSource, SecretSource, StaticSecrets};
pub use store::{MacroCatalog, MacroFile, MemoryStore, RunStore, SqliteStore, StoreError};
pub use validation::{
    ErrorLocation, MacroValidator, ValidationError, ValidationErrorType, ValidationResult,
};

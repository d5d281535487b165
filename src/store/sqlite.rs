//! SQLite store (bundled SQLite via rusqlite)

use super::{MacroCatalog, NewMacro, NewRun, NewStep, RunStepEntry, RunStore, StoreError};
use crate::config::BrowserEngine;
use crate::model::{
    ActionType, Artifact, ArtifactKind, Locator, Macro, MacroId, Run, RunId, RunStatus,
    RunSummary, Step, StepId, StepResult, StepStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tokio::sync::Mutex;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS macros (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    base_url TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS steps (
    id INTEGER PRIMARY KEY,
    macro_id INTEGER NOT NULL REFERENCES macros(id),
    order_index INTEGER NOT NULL,
    action_type TEXT NOT NULL,
    locators TEXT NOT NULL DEFAULT '[]',
    value TEXT,
    timeout_ms INTEGER,
    enabled INTEGER NOT NULL DEFAULT 1,
    UNIQUE (macro_id, order_index)
);

CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY,
    macro_id INTEGER NOT NULL REFERENCES macros(id),
    env_name TEXT NOT NULL,
    browser TEXT NOT NULL,
    headless INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL,
    summary TEXT
);

CREATE TABLE IF NOT EXISTS step_results (
    id INTEGER PRIMARY KEY,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    step_id INTEGER NOT NULL REFERENCES steps(id),
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    error_message TEXT,
    used_locator TEXT,
    screenshot_path TEXT,
    UNIQUE (run_id, step_id)
);
CREATE INDEX IF NOT EXISTS idx_step_results_run ON step_results(run_id);

CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    type TEXT NOT NULL,
    storage_url TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_artifacts_run ON artifacts(run_id);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self::with_connection(conn)?;
        log::info!("Opened database at {:?}", path.as_ref());
        Ok(store)
    }

    /// In-memory database (for testing)
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_enum<T>(raw: &str, parsed: Option<T>, what: &str) -> Result<T, StoreError> {
    parsed.ok_or_else(|| StoreError::Serialization(format!("unknown {} '{}'", what, raw)))
}

type StepRow = (i64, i64, u32, String, String, Option<String>, Option<i64>, bool);

fn read_step(row: &Row<'_>) -> rusqlite::Result<StepRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn step_from_row(row: StepRow) -> Result<Step, StoreError> {
    let (id, macro_id, order_index, action_type, locators, value, timeout_ms, enabled) = row;
    Ok(Step {
        id: StepId(id),
        macro_id: MacroId(macro_id),
        order_index,
        action_type: ActionType::from(action_type),
        locators: serde_json::from_str(&locators)?,
        value,
        timeout_ms: timeout_ms.map(|t| t as u64),
        enabled,
    })
}

#[async_trait]
impl RunStore for SqliteStore {
    async fn get_macro(&self, id: MacroId) -> Result<Option<Macro>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT id, name, description, base_url, created_at FROM macros WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, name, description, base_url, created_at)| {
            Ok(Macro {
                id: MacroId(id),
                name,
                description,
                base_url,
                created_at: parse_time(&created_at)?,
            })
        })
        .transpose()
    }

    async fn get_all_steps(&self, macro_id: MacroId) -> Result<Vec<Step>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, macro_id, order_index, action_type, locators, value, timeout_ms, enabled
             FROM steps WHERE macro_id = ?1 ORDER BY order_index",
        )?;
        let rows = stmt
            .query_map(params![macro_id.0], read_step)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(step_from_row).collect()
    }

    async fn create_run(&self, run: NewRun) -> Result<RunId, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO runs (macro_id, env_name, browser, headless, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run.macro_id.0,
                run.env_name,
                run.browser.as_str(),
                run.headless,
                Utc::now().to_rfc3339(),
                RunStatus::Running.as_str(),
            ],
        )?;
        Ok(RunId(conn.last_insert_rowid()))
    }

    async fn add_step_result(&self, result: &StepResult) -> Result<(), StoreError> {
        let used_locator = result
            .used_locator
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO step_results
             (run_id, step_id, status, started_at, finished_at, error_message, used_locator, screenshot_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                result.run_id.0,
                result.step_id.0,
                result.status.as_str(),
                result.started_at.to_rfc3339(),
                result.finished_at.to_rfc3339(),
                result.error_message,
                used_locator,
                result.screenshot_path,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(format!(
                    "step {} cannot take a result in run {}",
                    result.step_id, result.run_id
                ))
            }
            other => other.into(),
        })?;
        Ok(())
    }

    async fn add_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO artifacts (run_id, type, storage_url) VALUES (?1, ?2, ?3)",
            params![artifact.run_id.0, artifact.kind.as_str(), artifact.storage_url],
        )?;
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        summary: &RunSummary,
    ) -> Result<(), StoreError> {
        let summary = serde_json::to_string(summary)?;
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, summary = ?2, finished_at = ?3 WHERE id = ?4",
            params![status.as_str(), summary, Utc::now().to_rfc3339(), run_id.0],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "run",
                id: run_id.0,
            });
        }
        Ok(())
    }

    async fn get_run(&self, run_id: RunId) -> Result<Option<Run>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT id, macro_id, env_name, browser, headless, started_at, finished_at, status, summary
                 FROM runs WHERE id = ?1",
                params![run_id.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, Option<String>>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, macro_id, env_name, browser, headless, started_at, finished_at, status, summary)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(Run {
            id: RunId(id),
            macro_id: MacroId(macro_id),
            env_name,
            browser: browser
                .parse::<BrowserEngine>()
                .map_err(StoreError::Serialization)?,
            headless,
            started_at: parse_time(&started_at)?,
            finished_at: finished_at.as_deref().map(parse_time).transpose()?,
            status: parse_enum(&status, RunStatus::parse(&status), "run status")?,
            summary: summary
                .as_deref()
                .map(serde_json::from_str::<RunSummary>)
                .transpose()?,
        }))
    }

    async fn get_run_step_results(&self, run_id: RunId) -> Result<Vec<RunStepEntry>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.order_index, s.action_type, r.status, r.started_at, r.finished_at,
                    r.error_message, r.used_locator, r.screenshot_path
             FROM step_results r JOIN steps s ON s.id = r.step_id
             WHERE r.run_id = ?1
             ORDER BY s.order_index",
        )?;
        let rows = stmt
            .query_map(params![run_id.0], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(
                    step_id,
                    order_index,
                    action_type,
                    status,
                    started_at,
                    finished_at,
                    error_message,
                    used_locator,
                    screenshot_path,
                )| {
                    Ok(RunStepEntry {
                        step_id: StepId(step_id),
                        order_index,
                        action_type: ActionType::from(action_type),
                        status: parse_enum(&status, StepStatus::parse(&status), "step status")?,
                        started_at: parse_time(&started_at)?,
                        finished_at: parse_time(&finished_at)?,
                        error_message,
                        used_locator: used_locator
                            .as_deref()
                            .map(serde_json::from_str::<Locator>)
                            .transpose()?,
                        screenshot_path,
                    })
                },
            )
            .collect()
    }

    async fn get_artifacts(&self, run_id: RunId) -> Result<Vec<Artifact>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT type, storage_url FROM artifacts WHERE run_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![run_id.0], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(kind, storage_url)| {
                Ok(Artifact {
                    run_id,
                    kind: parse_enum(&kind, ArtifactKind::parse(&kind), "artifact type")?,
                    storage_url,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MacroCatalog for SqliteStore {
    async fn create_macro(&self, new: NewMacro) -> Result<MacroId, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO macros (name, description, base_url, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![new.name, new.description, new.base_url, Utc::now().to_rfc3339()],
        )?;
        Ok(MacroId(conn.last_insert_rowid()))
    }

    async fn append_step(&self, macro_id: MacroId, step: NewStep) -> Result<Step, StoreError> {
        let locators = serde_json::to_string(&step.locators)?;
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM macros WHERE id = ?1",
                params![macro_id.0],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound {
                entity: "macro",
                id: macro_id.0,
            });
        }

        let order_index: u32 = tx.query_row(
            "SELECT COALESCE(MAX(order_index), 0) + 1 FROM steps WHERE macro_id = ?1",
            params![macro_id.0],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO steps (macro_id, order_index, action_type, locators, value, timeout_ms, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                macro_id.0,
                order_index,
                step.action_type.as_str(),
                locators,
                step.value,
                step.timeout_ms.map(|t| t as i64),
                step.enabled,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Step {
            id: StepId(id),
            macro_id,
            order_index,
            action_type: step.action_type,
            locators: step.locators,
            value: step.value,
            timeout_ms: step.timeout_ms,
            enabled: step.enabled,
        })
    }

    async fn disable_step(&self, step_id: StepId) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE steps SET enabled = 0 WHERE id = ?1",
            params![step_id.0],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "step",
                id: step_id.0,
            });
        }
        Ok(())
    }

    async fn rename_macro(&self, macro_id: MacroId, name: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE macros SET name = ?1 WHERE id = ?2",
            params![name, macro_id.0],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "macro",
                id: macro_id.0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_step(action: &str, value: Option<&str>) -> NewStep {
        NewStep {
            action_type: ActionType::from(action),
            locators: vec![json!({"type": "css", "value": "#go"})],
            value: value.map(str::to_string),
            timeout_ms: None,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_catalog_assigns_order_and_disables() {
        let store = SqliteStore::open_memory().unwrap();
        let macro_id = store
            .create_macro(NewMacro {
                name: "checkout".to_string(),
                description: None,
                base_url: Some("https://shop.example.com".to_string()),
            })
            .await
            .unwrap();

        let first = store.append_step(macro_id, new_step("click", None)).await.unwrap();
        let second = store
            .append_step(macro_id, new_step("type", Some("4242")))
            .await
            .unwrap();
        assert_eq!(first.order_index, 1);
        assert_eq!(second.order_index, 2);

        store.disable_step(first.id).await.unwrap();
        store.rename_macro(macro_id, "checkout v2").await.unwrap();

        let stored = store.get_macro(macro_id).await.unwrap().unwrap();
        assert_eq!(stored.name, "checkout v2");
        assert_eq!(stored.base_url.as_deref(), Some("https://shop.example.com"));

        let steps = store.get_all_steps(macro_id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert!(!steps[0].enabled);
        assert_eq!(steps[1].value.as_deref(), Some("4242"));
        assert_eq!(steps[1].locators[0]["value"], "#go");
    }

    #[tokio::test]
    async fn test_run_lifecycle_round_trip() {
        let store = SqliteStore::open_memory().unwrap();
        let macro_id = store
            .create_macro(NewMacro {
                name: "m".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let step = store.append_step(macro_id, new_step("click", None)).await.unwrap();

        let run_id = store
            .create_run(NewRun {
                macro_id,
                env_name: "staging".to_string(),
                browser: BrowserEngine::Chromium,
                headless: true,
            })
            .await
            .unwrap();
        let running = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(running.status, RunStatus::Running);

        let now = Utc::now();
        let result = StepResult {
            run_id,
            step_id: step.id,
            status: StepStatus::Fail,
            started_at: now,
            finished_at: now,
            error_message: Some("Locator not found: x".to_string()),
            used_locator: Some(Locator::Css {
                value: "#go".to_string(),
            }),
            screenshot_path: Some("artifacts/run-1/step-1-click.png".to_string()),
        };
        store.add_step_result(&result).await.unwrap();
        assert!(matches!(
            store.add_step_result(&result).await,
            Err(StoreError::Conflict(_))
        ));

        store
            .add_artifact(&Artifact {
                run_id,
                kind: ArtifactKind::Screenshot,
                storage_url: "artifacts/run-1/step-1-click.png".to_string(),
            })
            .await
            .unwrap();

        let summary = RunSummary::from_statuses([StepStatus::Fail]);
        store.finish_run(run_id, RunStatus::Fail, &summary).await.unwrap();

        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Fail);
        assert_eq!(run.summary, Some(summary));
        assert!(run.finished_at.is_some());

        let entries = store.get_run_step_results(run_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].order_index, 1);
        assert_eq!(entries[0].action_type, ActionType::Click);
        assert_eq!(entries[0].used_locator, result.used_locator);

        let artifacts = store.get_artifacts(run_id).await.unwrap();
        assert_eq!(artifacts[0].kind, ArtifactKind::Screenshot);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.get_macro(MacroId(9)).await.unwrap().is_none());
        assert!(matches!(
            store.append_step(MacroId(9), new_step("click", None)).await,
            Err(StoreError::NotFound { entity: "macro", .. })
        ));
        assert!(matches!(
            store.disable_step(StepId(9)).await,
            Err(StoreError::NotFound { entity: "step", .. })
        ));
    }
}

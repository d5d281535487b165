//! Replays against a real headless Chrome and the local test server.
//!
//! Run with `cargo test -- --ignored` on a machine with Chrome installed.


use macro_replay::browser::session::{ElementQuery, PageSession};
use macro_replay::config::{RunConfig, Timeouts};
use macro_replay::model::{RunStatus, StepStatus};
use macro_replay::report::assemble_report;
use macro_replay::secrets::StaticSecrets;
use macro_replay::store::{MacroFile, MemoryStore};
use macro_replay::{ChromeDriver, LaunchOptions, RunController};
use std::sync::Arc;
use std::time::Duration;
use test_server::TestServer;

async fn create_headless_driver() -> anyhow::Result<ChromeDriver> {
    ChromeDriver::launch(LaunchOptions {
        chrome_path: None,
        no_sandbox: true,
        headless: true,
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to launch Chrome: {}", e))
}

#[tokio::test]
#[ignore = "requires a local Chrome installation"]
async fn test_page_session_basics() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let mut driver = create_headless_driver().await?;

    let response = driver
        .navigate(&server.url(), Duration::from_secs(10))
        .await?;
    assert_eq!(response.status, Some(200));

    let login = ElementQuery::Css("[data-testid=\"login\"]".to_string());
    assert_eq!(driver.count(&login).await?, 1);
    let state = driver.element_state(&login).await?;
    assert!(state.attached && state.visible && state.enabled);
    assert_eq!(
        driver.computed_style(&login, "cursor").await?,
        "pointer".to_string()
    );

    let hidden = ElementQuery::Css("#hidden".to_string());
    assert!(!driver.element_state(&hidden).await?.visible);

    let user = ElementQuery::Css("#user".to_string());
    driver.fill(&user, "alice").await?;
    driver.fill(&user, "bob").await?;

    let remember = ElementQuery::XPath("//input[@id='remember']".to_string());
    assert!(!driver.is_checked(&remember).await?);
    driver.click(&remember).await?;
    assert!(driver.is_checked(&remember).await?);

    let plan = ElementQuery::Css("#plan".to_string());
    driver.select_option(&plan, "Professional").await?;
    assert!(driver.select_option(&plan, "Enterprise").await.is_err());

    let broken = ElementQuery::Css("button[".to_string());
    assert!(driver.count(&broken).await.is_err());

    let png = driver.screenshot().await?;
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome installation"]
async fn test_http_error_status_is_reported() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let mut driver = create_headless_driver().await?;

    let response = driver
        .navigate(&format!("{}/missing", server.url()), Duration::from_secs(10))
        .await?;
    assert_eq!(response.status, Some(404));

    driver.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a local Chrome installation"]
async fn test_replay_login_flow() -> anyhow::Result<()> {
    let server = TestServer::start().await;
    server.wait_ready().await?;
    let artifacts = tempfile::tempdir()?;

    let macro_file = MacroFile::from_json(
        r##"{
            "name": "login",
            "steps": [
                {"action_type": "type", "locators": [{"type": "role", "role": "textbox"}, {"type": "css", "value": "#user"}], "value": "alice"},
                {"action_type": "select", "locators": [{"type": "css", "value": "#plan"}], "value": "pro"},
                {"action_type": "check", "locators": [{"type": "css", "value": "#remember"}]},
                {"action_type": "assertCss", "locators": [{"type": "data", "value": "[data-testid=\"login\"]"}], "value": "color:rgb(0, 128, 0)"},
                {"action_type": "click", "locators": [{"type": "data", "value": "[data-testid=\"login\"]"}, {"type": "role", "role": "button", "name": "Sign in"}]},
                {"action_type": "waitFor", "value": "url:/dashboard"},
                {"action_type": "waitFor", "locators": [{"type": "data", "value": "[data-testid=\"ready\"]"}]},
                {"action_type": "assert", "locators": [{"type": "css", "value": "#greeting"}], "value": "text:Welcome"}
            ]
        }"##,
    )?;

    let store = Arc::new(MemoryStore::new());
    let macro_id = macro_file.import_into(store.as_ref()).await?;

    let mut config = RunConfig::for_environment("local");
    config.base_url = Some(server.url());
    config.timeouts = Timeouts {
        step: 3000,
        global: 10000,
    };
    config.artifacts_dir = artifacts.path().to_path_buf();

    let driver = create_headless_driver().await?;
    let outcome = RunController::new(store.clone(), config)
        .with_secrets(Arc::new(StaticSecrets::new()))
        .replay(macro_id, Box::new(driver))
        .await?;

    let report = assemble_report(store.as_ref(), outcome.run_id).await?;
    let statuses: Vec<StepStatus> = report.steps.iter().map(|s| s.status).collect();
    println!("Step statuses: {:?}", statuses);

    assert_eq!(outcome.status, RunStatus::Fail);
    assert_eq!(outcome.summary.counts(), (8, 7, 1, 0));
    assert_eq!(
        report.steps[7].error_message.as_deref(),
        Some("Text does not contain Welcome")
    );

    let run_dir = artifacts.path().join(format!("run-{}", outcome.run_id));
    assert!(run_dir.join("step-8-assert.png").exists());
    assert!(run_dir.join("trace.json").exists());
    Ok(())
}

// spider_chrome re-exports chromiumoxide API
use super::session::{BoundingBox, ElementQuery, ElementState, NavigationResponse, PageSession};
use crate::config::{BrowserEngine, RunConfig};
use crate::error::{BrowserError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

const LAUNCH_HELP: &str = "\n\n\
    Chrome not found. You can:\n\
    - Install Chrome: https://www.google.com/chrome/\n\
    - Ubuntu/Debian: sudo apt install chromium-browser\n\
    - Fedora: sudo dnf install chromium\n\
    - macOS: brew install --cask google-chrome\n\
    - Or specify path: --chrome-path /path/to/chrome\n\
    - Linux sandbox issue? Try: --no-sandbox";

pub struct ChromeDriver {
    browser: Browser,
    temp_dir: PathBuf,
}

/// How a local Chrome is launched
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub chrome_path: Option<String>,
    pub no_sandbox: bool,
    pub headless: bool,
}

/// Reply shape of the element scripts
#[derive(Debug, Deserialize)]
struct ScriptReply<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    value: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

impl ChromeDriver {
    /// Helper method to get the current active page, excluding Chrome's new-tab-page
    async fn get_active_page(&self) -> Result<Page> {
        let pages = self.browser.pages().await?;

        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }

        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to create page: {}", e)))
    }

    /// Launch the browser a run is configured for.
    ///
    /// Only Chromium can be driven over CDP; other engines are rejected here
    /// rather than silently replaced.
    pub async fn for_run(
        config: &RunConfig,
        chrome_path: Option<String>,
        no_sandbox: bool,
    ) -> Result<Self> {
        if config.browser != BrowserEngine::Chromium {
            return Err(BrowserError::UnsupportedEngine(
                config.browser.as_str().to_string(),
            ));
        }

        Self::launch(LaunchOptions {
            chrome_path,
            no_sandbox: no_sandbox || running_in_ci(),
            headless: config.headless,
        })
        .await
    }

    /// Launch a fresh Chrome with a throwaway profile directory
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let LaunchOptions {
            chrome_path,
            no_sandbox,
            headless,
        } = options;

        // Unique profile directory per browser instance
        let unique_id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let temp_dir = std::env::temp_dir().join(format!("macro-replay-{}", unique_id));
        std::fs::create_dir_all(&temp_dir).map_err(|e| {
            BrowserError::LaunchFailed(format!("Failed to create temp directory: {}", e))
        })?;

        let mut config = if headless {
            BrowserConfig::builder()
        } else {
            BrowserConfig::builder().with_head()
        };

        config = config.user_data_dir(&temp_dir);

        // Linux AppArmor workaround
        if no_sandbox {
            config = config.arg("--no-sandbox");
        }

        if let Some(path) = chrome_path {
            config = config.chrome_executable(path);
        }

        log::debug!(
            "Launching Chrome (headless={}, no_sandbox={}, profile={})",
            headless,
            no_sandbox,
            temp_dir.display()
        );

        let config = config
            .build()
            .map_err(|e| BrowserError::LaunchFailed(format!("{}{}", e, LAUNCH_HELP)))?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("{}{}", e, LAUNCH_HELP)))?;

        tokio::spawn(async move {
            while (handler.next().await).is_some() {
                // Handle browser events
            }
        });

        log::info!("Browser session started");
        Ok(Self { browser, temp_dir })
    }

    /// Evaluate a JavaScript expression and deserialize its value
    async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let page = self.get_active_page().await?;

        let result = page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| BrowserError::Script(format!("Failed to deserialize result: {}", e)))
    }

    /// Run `body` against the first element matching `query`.
    ///
    /// `body` sees the element as `el` and must return `{ ok: true, value }`.
    async fn with_element<T: DeserializeOwned>(&self, query: &ElementQuery, body: &str) -> Result<T> {
        let reply: ScriptReply<T> = self.evaluate(&element_script(query, body)).await?;
        if !reply.ok {
            return Err(BrowserError::ElementNotFound(
                reply.error.unwrap_or_else(|| query.to_string()),
            ));
        }
        reply
            .value
            .ok_or_else(|| BrowserError::Script(format!("{} returned no value", query)))
    }

    /// Scroll the element into view and return its center in viewport coordinates
    async fn element_center(&self, query: &ElementQuery) -> Result<(f64, f64)> {
        let center: BoundingBox = self
            .with_element(
                query,
                r#"
                el.scrollIntoView({ block: 'center', inline: 'center' });
                const r = el.getBoundingClientRect();
                return { ok: true, value: { x: r.x + r.width / 2, y: r.y + r.height / 2, width: r.width, height: r.height } };
                "#,
            )
            .await?;
        Ok((center.x, center.y))
    }

    async fn dispatch_mouse(&self, kind: &str, x: f64, y: f64, click_count: i64) -> Result<()> {
        let page = self.get_active_page().await?;
        let mut event = json!({ "type": kind, "x": x, "y": y });
        if kind != "mouseMoved" {
            event["button"] = json!("left");
            event["clickCount"] = json!(click_count);
        }
        let params: input::DispatchMouseEventParams = serde_json::from_value(event)
            .map_err(|e| BrowserError::Other(format!("Invalid mouse event: {}", e)))?;
        page.execute(params).await?;
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64, clicks: i64) -> Result<()> {
        self.dispatch_mouse("mouseMoved", x, y, 0).await?;
        for click_count in 1..=clicks {
            self.dispatch_mouse("mousePressed", x, y, click_count).await?;
            self.dispatch_mouse("mouseReleased", x, y, click_count).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PageSession for ChromeDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationResponse> {
        log::debug!("Starting navigation to: {}", url);

        let page = self.get_active_page().await?;

        // CDP Page.navigate directly; goto() hides the error text
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| BrowserError::NavigationFailed(format!("Invalid URL {}: {}", url, e)))?;

        let response = page.execute(params).await.map_err(|e| {
            let error_str = e.to_string();
            if error_str.contains("oneshot canceled") {
                BrowserError::NavigationFailed(
                    "Browser connection lost. The browser may have been closed or crashed."
                        .to_string(),
                )
            } else {
                BrowserError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e))
            }
        })?;

        if let Some(error_text) = &response.result.error_text {
            return Err(BrowserError::NavigationFailed(format!(
                "Navigation error: {}",
                error_text
            )));
        }

        match tokio::time::timeout(timeout, page.wait_for_navigation()).await {
            Ok(Ok(_)) => log::debug!("Page load completed"),
            Ok(Err(e)) => log::warn!("Could not wait for page load: {}", e),
            Err(_) => {
                return Err(BrowserError::NavigationFailed(format!(
                    "Timed out after {}ms waiting for {} to load",
                    timeout.as_millis(),
                    url
                )));
            }
        }

        let status: i64 = self
            .evaluate(
                "(() => { const e = performance.getEntriesByType('navigation')[0]; \
                 return e && e.responseStatus ? e.responseStatus : 0; })()",
            )
            .await
            .unwrap_or(0);

        Ok(NavigationResponse {
            url: self.current_url().await?,
            status: u16::try_from(status).ok().filter(|s| *s > 0),
        })
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        page.url()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))?
            .ok_or(BrowserError::NoPage)
    }

    async fn page_source(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        page.content()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))
    }

    async fn count(&self, query: &ElementQuery) -> Result<usize> {
        let script = match query {
            ElementQuery::Css(selector) => format!(
                "document.querySelectorAll({}).length",
                js_string(selector)
            ),
            ElementQuery::XPath(xpath) => format!(
                "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
                js_string(xpath)
            ),
        };
        self.evaluate(&script).await
    }

    async fn element_state(&self, query: &ElementQuery) -> Result<ElementState> {
        self.with_element(
            query,
            r#"
            const style = window.getComputedStyle(el);
            const rect = el.getBoundingClientRect();
            const visible = rect.width > 0 && rect.height > 0
                && style.visibility !== 'hidden' && style.display !== 'none';
            const enabled = !el.matches(':disabled') && el.getAttribute('aria-disabled') !== 'true';
            return { ok: true, value: { attached: el.isConnected, visible, enabled } };
            "#,
        )
        .await
    }

    async fn click(&self, query: &ElementQuery) -> Result<()> {
        let (x, y) = self.element_center(query).await?;
        self.click_at(x, y, 1).await
    }

    async fn double_click(&self, query: &ElementQuery) -> Result<()> {
        let (x, y) = self.element_center(query).await?;
        self.click_at(x, y, 2).await
    }

    async fn hover(&self, query: &ElementQuery) -> Result<()> {
        let (x, y) = self.element_center(query).await?;
        self.dispatch_mouse("mouseMoved", x, y, 0).await
    }

    async fn fill(&self, query: &ElementQuery, text: &str) -> Result<()> {
        let _: bool = self
            .with_element(
                query,
                r#"
                el.focus();
                if ('value' in el) {
                    el.value = '';
                } else if (el.isContentEditable) {
                    el.textContent = '';
                }
                el.dispatchEvent(new Event('input', { bubbles: true }));
                return { ok: true, value: true };
                "#,
            )
            .await?;

        let page = self.get_active_page().await?;
        let params: input::InsertTextParams = serde_json::from_value(json!({ "text": text }))
            .map_err(|e| BrowserError::Other(format!("Invalid text input: {}", e)))?;
        page.execute(params).await?;

        let _: bool = self
            .with_element(
                query,
                "el.dispatchEvent(new Event('change', { bubbles: true })); return { ok: true, value: true };",
            )
            .await?;
        Ok(())
    }

    async fn select_option(&self, query: &ElementQuery, option: &str) -> Result<()> {
        let body = format!(
            r#"
            const wanted = {};
            const options = Array.from(el.options || []);
            const match = options.find(o => o.value === wanted)
                || options.find(o => o.label.trim() === wanted.trim() || o.text.trim() === wanted.trim());
            if (!match) return {{ ok: true, value: false }};
            el.value = match.value;
            match.selected = true;
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ ok: true, value: true }};
            "#,
            js_string(option)
        );
        let selected: bool = self.with_element(query, &body).await?;
        if !selected {
            return Err(BrowserError::Script(format!(
                "{} has no option with value or label '{}'",
                query, option
            )));
        }
        Ok(())
    }

    async fn is_checked(&self, query: &ElementQuery) -> Result<bool> {
        self.with_element(
            query,
            "return { ok: true, value: ('checked' in el) ? !!el.checked : el.getAttribute('aria-checked') === 'true' };",
        )
        .await
    }

    async fn text_content(&self, query: &ElementQuery) -> Result<String> {
        self.with_element(
            query,
            r#"
            const text = (el.innerText || el.textContent || '');
            return { ok: true, value: text || (typeof el.value === 'string' ? el.value : '') };
            "#,
        )
        .await
    }

    async fn computed_style(&self, query: &ElementQuery, property: &str) -> Result<String> {
        let body = format!(
            "return {{ ok: true, value: window.getComputedStyle(el).getPropertyValue({}) }};",
            js_string(property)
        );
        self.with_element(query, &body).await
    }

    async fn bounding_box(&self, query: &ElementQuery) -> Result<BoundingBox> {
        self.with_element(
            query,
            r#"
            el.scrollIntoView({ block: 'center', inline: 'center' });
            const r = el.getBoundingClientRect();
            return { ok: true, value: { x: r.x, y: r.y, width: r.width, height: r.height } };
            "#,
        )
        .await
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        self.click_at(x, y, 1).await
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        let _: bool = self
            .evaluate(&format!("(() => {{ window.scrollTo({}, {}); return true; }})()", x, y))
            .await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let page = self.get_active_page().await?;

        page.screenshot(chromiumoxide::page::ScreenshotParams::default())
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to take screenshot: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))?;
        log::info!("Browser session closed");
        Ok(())
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if self.temp_dir.exists() {
            let _ = std::fs::remove_dir_all(&self.temp_dir);
        }
    }
}

fn running_in_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "JENKINS_HOME", "CIRCLECI"]
        .iter()
        .any(|var| std::env::var(var).is_ok())
}

/// JavaScript string literal (JSON string syntax)
fn js_string(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn element_script(query: &ElementQuery, body: &str) -> String {
    let lookup = match query {
        ElementQuery::Css(selector) => format!("document.querySelector({})", js_string(selector)),
        ElementQuery::XPath(xpath) => format!(
            "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            js_string(xpath)
        ),
    };
    format!(
        "(() => {{\n  const el = {};\n  if (!el) return {{ ok: false, error: {} }};\n{}\n}})()",
        lookup,
        js_string(&format!("no element matches {}", query)),
        body
    )
}

//! Scripted in-memory page for engine tests
//!
//! Elements are registered per native query; a query either matches a list
//! of fake elements or nothing. Clones share state, so a test can keep a
//! handle after boxing one into the controller.

#![allow(dead_code)]

use async_trait::async_trait;
use macro_replay::browser::session::{
    BoundingBox, ElementQuery, ElementState, NavigationResponse, PageSession,
};
use macro_replay::error::{BrowserError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub text: String,
    pub visible: bool,
    pub enabled: bool,
    pub checked: bool,
    pub value: String,
    /// (value, label)
    pub options: Vec<(String, String)>,
    pub styles: HashMap<String, String>,
    pub bbox: BoundingBox,
}

impl FakeElement {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            visible: true,
            enabled: true,
            checked: false,
            value: String::new(),
            options: Vec::new(),
            styles: HashMap::new(),
            bbox: BoundingBox {
                x: 10.0,
                y: 20.0,
                width: 100.0,
                height: 30.0,
            },
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn with_style(mut self, property: &str, value: &str) -> Self {
        self.styles.insert(property.to_string(), value.to_string());
        self
    }

    pub fn with_option(mut self, value: &str, label: &str) -> Self {
        self.options.push((value.to_string(), label.to_string()));
        self
    }

    pub fn with_box(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bbox = BoundingBox {
            x,
            y,
            width,
            height,
        };
        self
    }
}

#[derive(Debug, Clone)]
struct Route {
    status: Option<u16>,
    html: String,
    final_url: Option<String>,
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    html: String,
    elements: HashMap<ElementQuery, Vec<FakeElement>>,
    /// Query -> number of lookups before it starts matching
    appear_after: HashMap<ElementQuery, usize>,
    lookups: HashMap<ElementQuery, usize>,
    broken_queries: HashSet<ElementQuery>,
    routes: HashMap<String, Route>,
    navigation_errors: HashMap<String, String>,
    click_navigates: HashMap<ElementQuery, String>,
    actions: Vec<String>,
    count_log: Vec<ElementQuery>,
    screenshot_error: bool,
    close_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(url: &str) -> Self {
        let page = Self::new();
        page.state().url = url.to_string();
        page
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap()
    }

    pub fn add(&self, query: ElementQuery, element: FakeElement) -> &Self {
        self.state().elements.entry(query).or_default().push(element);
        self
    }

    pub fn css(&self, selector: &str, element: FakeElement) -> &Self {
        self.add(ElementQuery::Css(selector.to_string()), element)
    }

    pub fn xpath(&self, xpath: &str, element: FakeElement) -> &Self {
        self.add(ElementQuery::XPath(xpath.to_string()), element)
    }

    /// Register an element that only shows up after `lookups` count calls
    pub fn css_after(&self, selector: &str, element: FakeElement, lookups: usize) -> &Self {
        let query = ElementQuery::Css(selector.to_string());
        self.state().appear_after.insert(query.clone(), lookups);
        self.add(query, element)
    }

    /// Queries that raise an error (e.g. a selector the page rejects)
    pub fn break_query(&self, query: ElementQuery) -> &Self {
        self.state().broken_queries.insert(query);
        self
    }

    pub fn route(&self, url: &str, status: Option<u16>, html: &str) -> &Self {
        self.state().routes.insert(
            url.to_string(),
            Route {
                status,
                html: html.to_string(),
                final_url: None,
            },
        );
        self
    }

    pub fn redirect(&self, url: &str, final_url: &str) -> &Self {
        self.state().routes.insert(
            url.to_string(),
            Route {
                status: Some(200),
                html: String::new(),
                final_url: Some(final_url.to_string()),
            },
        );
        self
    }

    pub fn fail_navigation(&self, url: &str, reason: &str) -> &Self {
        self.state()
            .navigation_errors
            .insert(url.to_string(), reason.to_string());
        self
    }

    /// Clicking `selector` changes the URL
    pub fn click_navigates(&self, selector: &str, url: &str) -> &Self {
        self.state()
            .click_navigates
            .insert(ElementQuery::Css(selector.to_string()), url.to_string());
        self
    }

    pub fn fail_screenshots(&self) -> &Self {
        self.state().screenshot_error = true;
        self
    }

    pub fn set_url(&self, url: &str) {
        self.state().url = url.to_string();
    }

    pub fn url(&self) -> String {
        self.state().url.clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.state().actions.clone()
    }

    pub fn count_log(&self) -> Vec<ElementQuery> {
        self.state().count_log.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state().close_calls
    }

    pub fn element(&self, selector: &str) -> Option<FakeElement> {
        self.state()
            .elements
            .get(&ElementQuery::Css(selector.to_string()))
            .and_then(|matches| matches.first().cloned())
    }

    fn record(&self, action: String) {
        self.state().actions.push(action);
    }

    fn with_first<T>(
        &self,
        query: &ElementQuery,
        f: impl FnOnce(&mut FakeElement) -> T,
    ) -> Result<T> {
        let mut state = self.state();
        state
            .elements
            .get_mut(query)
            .and_then(|matches| matches.first_mut())
            .map(f)
            .ok_or_else(|| BrowserError::ElementNotFound(query.to_string()))
    }
}

#[async_trait]
impl PageSession for FakePage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<NavigationResponse> {
        let mut state = self.state();
        state.actions.push(format!("navigate {}", url));

        if let Some(reason) = state.navigation_errors.get(url) {
            return Err(BrowserError::NavigationFailed(reason.clone()));
        }

        let route = state.routes.get(url).cloned().unwrap_or(Route {
            status: Some(200),
            html: "<html><body></body></html>".to_string(),
            final_url: None,
        });
        state.url = route.final_url.unwrap_or_else(|| url.to_string());
        state.html = route.html;

        Ok(NavigationResponse {
            url: state.url.clone(),
            status: route.status,
        })
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state().url.clone())
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.state().html.clone())
    }

    async fn count(&self, query: &ElementQuery) -> Result<usize> {
        let mut state = self.state();
        state.count_log.push(query.clone());

        if state.broken_queries.contains(query) {
            return Err(BrowserError::Script(format!("invalid query {}", query)));
        }

        let lookups = {
            let seen = state.lookups.entry(query.clone()).or_insert(0);
            *seen += 1;
            *seen
        };
        if let Some(needed) = state.appear_after.get(query) {
            if lookups <= *needed {
                return Ok(0);
            }
        }

        Ok(state.elements.get(query).map_or(0, Vec::len))
    }

    async fn element_state(&self, query: &ElementQuery) -> Result<ElementState> {
        self.with_first(query, |el| ElementState {
            attached: true,
            visible: el.visible,
            enabled: el.enabled,
        })
    }

    async fn click(&self, query: &ElementQuery) -> Result<()> {
        self.with_first(query, |el| el.checked = !el.checked)?;
        let navigates = self.state().click_navigates.get(query).cloned();
        if let Some(url) = navigates {
            self.set_url(&url);
        }
        self.record(format!("click {}", query));
        Ok(())
    }

    async fn double_click(&self, query: &ElementQuery) -> Result<()> {
        self.with_first(query, |_| ())?;
        self.record(format!("dblclick {}", query));
        Ok(())
    }

    async fn hover(&self, query: &ElementQuery) -> Result<()> {
        self.with_first(query, |_| ())?;
        self.record(format!("hover {}", query));
        Ok(())
    }

    async fn fill(&self, query: &ElementQuery, text: &str) -> Result<()> {
        self.with_first(query, |el| el.value = text.to_string())?;
        self.record(format!("fill {} {}", query, text));
        Ok(())
    }

    async fn select_option(&self, query: &ElementQuery, option: &str) -> Result<()> {
        let chosen = self.with_first(query, |el| {
            let chosen = el
                .options
                .iter()
                .find(|(value, _)| value == option)
                .or_else(|| el.options.iter().find(|(_, label)| label == option))
                .map(|(value, _)| value.clone());
            if let Some(value) = &chosen {
                el.value = value.clone();
            }
            chosen
        })?;
        match chosen {
            Some(value) => {
                self.record(format!("select {} {}", query, value));
                Ok(())
            }
            None => Err(BrowserError::Script(format!(
                "{} has no option '{}'",
                query, option
            ))),
        }
    }

    async fn is_checked(&self, query: &ElementQuery) -> Result<bool> {
        self.with_first(query, |el| el.checked)
    }

    async fn text_content(&self, query: &ElementQuery) -> Result<String> {
        self.with_first(query, |el| el.text.clone())
    }

    async fn computed_style(&self, query: &ElementQuery, property: &str) -> Result<String> {
        self.with_first(query, |el| el.styles.get(property).cloned().unwrap_or_default())
    }

    async fn bounding_box(&self, query: &ElementQuery) -> Result<BoundingBox> {
        self.with_first(query, |el| el.bbox)
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("mouse {},{}", x, y));
        Ok(())
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("scroll {},{}", x, y));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        if self.state().screenshot_error {
            return Err(BrowserError::Other("screenshot unavailable".to_string()));
        }
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        self.state().close_calls += 1;
        Ok(())
    }
}

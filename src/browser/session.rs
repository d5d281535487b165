//! Browser capability consumed by the replay engine
//!
//! The engine never talks to a browser directly. Everything it needs from a
//! page goes through [`PageSession`], which keeps the executor and controller
//! testable against scripted doubles.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Native query a locator translates to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementQuery {
    Css(String),
    XPath(String),
}

impl fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementQuery::Css(selector) => write!(f, "css:{}", selector),
            ElementQuery::XPath(xpath) => write!(f, "xpath:{}", xpath),
        }
    }
}

/// Interactability snapshot of the first matching element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    pub attached: bool,
    pub visible: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// What a completed navigation reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    /// URL after redirects
    pub url: String,
    /// HTTP status of the main document, when the browser exposes it
    pub status: Option<u16>,
}

/// A live page in a browser session.
///
/// Element operations act on the first match of the query in document order.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<NavigationResponse>;

    async fn current_url(&self) -> Result<String>;

    /// Serialized DOM of the current document
    async fn page_source(&self) -> Result<String>;

    /// Number of elements matching the query
    async fn count(&self, query: &ElementQuery) -> Result<usize>;

    async fn element_state(&self, query: &ElementQuery) -> Result<ElementState>;

    async fn click(&self, query: &ElementQuery) -> Result<()>;

    async fn double_click(&self, query: &ElementQuery) -> Result<()>;

    async fn hover(&self, query: &ElementQuery) -> Result<()>;

    /// Clear the field and type `text` into it
    async fn fill(&self, query: &ElementQuery, text: &str) -> Result<()>;

    /// Choose an option by value, falling back to its visible label
    async fn select_option(&self, query: &ElementQuery, option: &str) -> Result<()>;

    async fn is_checked(&self, query: &ElementQuery) -> Result<bool>;

    async fn text_content(&self, query: &ElementQuery) -> Result<String>;

    async fn computed_style(&self, query: &ElementQuery, property: &str) -> Result<String>;

    async fn bounding_box(&self, query: &ElementQuery) -> Result<BoundingBox>;

    /// Raw pointer click at viewport coordinates
    async fn mouse_click(&self, x: f64, y: f64) -> Result<()>;

    async fn scroll_to(&self, x: f64, y: f64) -> Result<()>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Release the browser; called exactly once per run
    async fn close(&mut self) -> Result<()>;
}

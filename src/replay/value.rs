//! Step value encodings
//!
//! A step's free-form `value` means different things per action: a URL, a
//! `url:`/`text:` directive, a coordinate pair, a CSS expectation. Parsing
//! lives here so validation and execution agree on the formats.

use serde_json::Value;
use url::Url;

/// `url:` / `text:` prefix of `waitFor` and `assert` values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive<'a> {
    Url(&'a str),
    Text(&'a str),
    /// No prefix: plain visibility
    Visible,
}

impl<'a> Directive<'a> {
    pub fn parse(value: &'a str) -> Self {
        if let Some(url) = value.strip_prefix("url:") {
            Directive::Url(url.trim())
        } else if let Some(text) = value.strip_prefix("text:") {
            Directive::Text(text)
        } else {
            Directive::Visible
        }
    }
}

/// Where a `clickAt` step clicks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickAtTarget {
    /// Viewport coordinates
    Absolute { x: f64, y: f64 },
    /// Offset from the resolved element box's top-left corner
    Offset { dx: f64, dy: f64 },
}

impl ClickAtTarget {
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();

        if trimmed.starts_with('{') {
            let json: Value = serde_json::from_str(trimmed)
                .map_err(|e| format!("invalid clickAt JSON '{}': {}", trimmed, e))?;
            if let (Some(dx), Some(dy)) = (number_field(&json, "offsetX"), number_field(&json, "offsetY")) {
                return Ok(ClickAtTarget::Offset { dx, dy });
            }
            if let (Some(x), Some(y)) = (number_field(&json, "x"), number_field(&json, "y")) {
                return Ok(ClickAtTarget::Absolute { x, y });
            }
            return Err(format!(
                "clickAt JSON '{}' needs either x/y or offsetX/offsetY",
                trimmed
            ));
        }

        if let Some(rest) = trimmed.strip_prefix("offset:") {
            let (dx, dy) = parse_pair(rest)?;
            return Ok(ClickAtTarget::Offset { dx, dy });
        }

        let rest = trimmed.strip_prefix("abs:").unwrap_or(trimmed);
        let (x, y) = parse_pair(rest)?;
        Ok(ClickAtTarget::Absolute { x, y })
    }
}

/// Scroll destination of a `scrollTo` step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTarget {
    pub x: f64,
    pub y: f64,
}

impl ScrollTarget {
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();

        if trimmed.starts_with('{') {
            let json: Value = serde_json::from_str(trimmed)
                .map_err(|e| format!("invalid scrollTo JSON '{}': {}", trimmed, e))?;
            let y = number_field(&json, "y")
                .ok_or_else(|| format!("scrollTo JSON '{}' needs a numeric y", trimmed))?;
            let x = number_field(&json, "x").unwrap_or(0.0);
            return Ok(ScrollTarget { x, y });
        }

        if trimmed.contains(',') {
            let (x, y) = parse_pair(trimmed)?;
            return Ok(ScrollTarget { x, y });
        }

        let y = parse_number(trimmed)?;
        Ok(ScrollTarget { x: 0.0, y })
    }
}

/// `assertCss` expectation: `"property:expected-substring"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssExpectation {
    pub property: String,
    pub expected: String,
}

impl CssExpectation {
    pub fn parse(value: &str) -> Result<Self, String> {
        let (property, expected) = value
            .split_once(':')
            .ok_or_else(|| format!("assertCss value '{}' must be 'property:expected'", value))?;
        let property = property.trim();
        if property.is_empty() {
            return Err(format!("assertCss value '{}' has an empty property", value));
        }
        Ok(CssExpectation {
            property: property.to_string(),
            expected: expected.trim().to_string(),
        })
    }
}

/// Expected URL of a `url:` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlExpectation {
    Absolute(String),
    /// Path (optionally with query) relative to the site
    Relative(String),
}

impl UrlExpectation {
    pub fn parse(expected: &str) -> Self {
        if absolute_url(expected).is_some() {
            UrlExpectation::Absolute(expected.to_string())
        } else {
            UrlExpectation::Relative(expected.to_string())
        }
    }

    /// Whether the current URL satisfies a `waitFor url:` wait
    pub fn matches(&self, current: &str) -> bool {
        match self {
            UrlExpectation::Absolute(url) => same_url(current, url),
            UrlExpectation::Relative(path) => path_and_query(current).contains(path.as_str()),
        }
    }

    /// Whether the current URL contains the expected fragment (`assert url:`)
    pub fn contained_in(&self, current: &str) -> bool {
        match self {
            UrlExpectation::Absolute(url) => {
                current.contains(url.as_str()) || same_url(current, url)
            }
            UrlExpectation::Relative(path) => path_and_query(current).contains(path.as_str()),
        }
    }
}

/// Parse `url` if it is absolute. `host:port` shorthands parse as a scheme
/// with an opaque path and are treated as relative.
fn absolute_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    (parsed.has_host() || matches!(parsed.scheme(), "about" | "data" | "file")).then_some(parsed)
}

/// Equality after normalization, ignoring a trailing slash
fn same_url(current: &str, expected: &str) -> bool {
    let normalize = |url: &str| {
        Url::parse(url)
            .map(|parsed| parsed.to_string())
            .unwrap_or_else(|_| url.to_string())
    };
    normalize(current).trim_end_matches('/') == normalize(expected).trim_end_matches('/')
}

/// Resolve a possibly-relative navigation target against the base URL.
pub fn resolve_url(target: &str, base_url: Option<&str>) -> Result<String, String> {
    let target = target.trim();
    if target.is_empty() {
        return Err("navigation target is empty".to_string());
    }
    if let Some(url) = absolute_url(target) {
        return Ok(url.to_string());
    }

    let base = base_url.ok_or_else(|| {
        format!("relative URL '{}' cannot be resolved without a base URL", target)
    })?;
    let base = Url::parse(base).map_err(|e| format!("invalid base URL '{}': {}", base, e))?;
    base.join(target)
        .map(|url| url.to_string())
        .map_err(|e| format!("cannot resolve '{}' against {}: {}", target, base, e))
}

/// Path, query and fragment of an absolute URL
pub fn path_and_query(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let mut out = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

fn number_field(json: &Value, field: &str) -> Option<f64> {
    json.get(field).and_then(|v| v.as_f64())
}

fn parse_number(s: &str) -> Result<f64, String> {
    let n: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", s.trim()))?;
    if n.is_finite() {
        Ok(n)
    } else {
        Err(format!("'{}' is not a finite number", s.trim()))
    }
}

fn parse_pair(s: &str) -> Result<(f64, f64), String> {
    let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
    let (a, b) = trimmed
        .split_once(',')
        .ok_or_else(|| format!("'{}' is not an 'x,y' pair", s.trim()))?;
    Ok((parse_number(a)?, parse_number(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_prefixes() {
        assert_eq!(Directive::parse("url:/dashboard"), Directive::Url("/dashboard"));
        assert_eq!(Directive::parse("text:Welcome"), Directive::Text("Welcome"));
        assert_eq!(Directive::parse("Welcome"), Directive::Visible);
        assert_eq!(Directive::parse(""), Directive::Visible);
    }

    #[test]
    fn test_click_at_encodings() {
        assert_eq!(
            ClickAtTarget::parse("120,45").unwrap(),
            ClickAtTarget::Absolute { x: 120.0, y: 45.0 }
        );
        assert_eq!(
            ClickAtTarget::parse("abs:(1.5, 2)").unwrap(),
            ClickAtTarget::Absolute { x: 1.5, y: 2.0 }
        );
        assert_eq!(
            ClickAtTarget::parse("offset:10,5").unwrap(),
            ClickAtTarget::Offset { dx: 10.0, dy: 5.0 }
        );
        assert_eq!(
            ClickAtTarget::parse(r#"{"offsetX": 3, "offsetY": 4}"#).unwrap(),
            ClickAtTarget::Offset { dx: 3.0, dy: 4.0 }
        );
        assert_eq!(
            ClickAtTarget::parse(r#"{"x": 7, "y": 8}"#).unwrap(),
            ClickAtTarget::Absolute { x: 7.0, y: 8.0 }
        );
        assert!(ClickAtTarget::parse("12").is_err());
        assert!(ClickAtTarget::parse("a,b").is_err());
        assert!(ClickAtTarget::parse(r#"{"left": 1}"#).is_err());
    }

    #[test]
    fn test_scroll_encodings() {
        assert_eq!(ScrollTarget::parse("0,600").unwrap(), ScrollTarget { x: 0.0, y: 600.0 });
        assert_eq!(ScrollTarget::parse("250").unwrap(), ScrollTarget { x: 0.0, y: 250.0 });
        assert_eq!(
            ScrollTarget::parse(r#"{"x": 10, "y": 20}"#).unwrap(),
            ScrollTarget { x: 10.0, y: 20.0 }
        );
        assert!(ScrollTarget::parse("down").is_err());
        assert!(ScrollTarget::parse("").is_err());
    }

    #[test]
    fn test_css_expectation() {
        let css = CssExpectation::parse("background-color: rgb(255, 0, 0)").unwrap();
        assert_eq!(css.property, "background-color");
        assert_eq!(css.expected, "rgb(255, 0, 0)");
        assert!(CssExpectation::parse("color").is_err());
        assert!(CssExpectation::parse(":red").is_err());
    }

    #[test]
    fn test_relative_url_matches_path_containment() {
        let expected = UrlExpectation::parse("/dashboard");
        assert!(expected.matches("https://app.example.com/dashboard?x=1"));
        assert!(expected.contained_in("https://app.example.com/dashboard?x=1"));
        assert!(!expected.matches("https://app.example.com/login"));
        assert!(!expected.matches("https://dashboard.example.com/"));
    }

    #[test]
    fn test_absolute_url_matching() {
        let expected = UrlExpectation::parse("https://app.example.com/home");
        assert!(expected.matches("https://app.example.com/home/"));
        assert!(expected.contained_in("https://app.example.com/home?tab=2"));
        assert!(!expected.matches("https://app.example.com/login"));
    }

    #[test]
    fn test_absolute_url_wait_rejects_longer_path() {
        let expected = UrlExpectation::parse("https://app.example.com/home");
        assert!(!expected.matches("https://app.example.com/homepage-old"));
        assert!(!expected.matches("https://app.example.com/home/settings"));
        assert!(expected.matches("https://APP.example.com/home"));
    }

    #[test]
    fn test_host_port_shorthand_is_relative() {
        assert_eq!(
            UrlExpectation::parse("localhost:3000"),
            UrlExpectation::Relative("localhost:3000".to_string())
        );
        assert_eq!(
            UrlExpectation::parse("about:blank"),
            UrlExpectation::Absolute("about:blank".to_string())
        );
    }

    #[test]
    fn test_resolve_url() {
        let base = Some("https://app.example.com/app/");
        assert_eq!(
            resolve_url("/login", base).unwrap(),
            "https://app.example.com/login"
        );
        assert_eq!(
            resolve_url("settings", base).unwrap(),
            "https://app.example.com/app/settings"
        );
        assert_eq!(
            resolve_url("https://other.example.com", base).unwrap(),
            "https://other.example.com/"
        );
        assert_eq!(
            resolve_url("//cdn.example.com/a", base).unwrap(),
            "https://cdn.example.com/a"
        );
        assert_eq!(
            resolve_url("/x", Some("http://localhost:3000")).unwrap(),
            "http://localhost:3000/x"
        );
        assert!(resolve_url("/login", None).is_err());
        assert!(resolve_url("  ", base).is_err());
        assert!(resolve_url("/login", Some("not a url")).is_err());
    }

    #[test]
    fn test_resolve_url_follows_document_relative_rules() {
        assert_eq!(
            resolve_url("settings", Some("https://app.test/app/login")).unwrap(),
            "https://app.test/app/settings"
        );
        assert_eq!(
            resolve_url("../other", Some("https://app.test/a/b/")).unwrap(),
            "https://app.test/a/other"
        );
        assert_eq!(
            resolve_url("?page=2", Some("https://app.test/list?page=1")).unwrap(),
            "https://app.test/list?page=2"
        );
        assert_eq!(
            resolve_url("#top", Some("https://app.test/doc")).unwrap(),
            "https://app.test/doc#top"
        );
    }

    #[test]
    fn test_path_and_query() {
        assert_eq!(path_and_query("https://a.com/b?c=1#d"), "/b?c=1#d");
        assert_eq!(path_and_query("https://a.com"), "/");
        assert_eq!(path_and_query("http://localhost:3000?x=1"), "/?x=1");
        assert_eq!(path_and_query("/relative"), "/relative");
    }
}

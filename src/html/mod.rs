//! HTML source handling
//!
//! Parses the HTML bound to a scenario into a flat element list, resolves step
//! selectors against it, and extracts `data-testid` selector candidates for
//! the step editor.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// Maximum number of characters of element text shown next to a candidate
const CANDIDATE_TEXT_LEN: usize = 50;

/// Elements that never have a closing tag in HTML
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Error)]
#[error("HTML parse error at byte {position}: {message}")]
pub struct HtmlError {
    pub position: usize,
    pub message: String,
}

/// Decode common HTML entities in a string
fn decode_html_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut result = s
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    let numeric = NUMERIC.get_or_init(|| Regex::new(r"&#(x[0-9A-Fa-f]+|\d+);").unwrap());
    result = numeric
        .replace_all(&result, |caps: &regex::Captures| {
            let code = &caps[1];
            let parsed = match code.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse::<u32>().ok(),
            };
            parsed
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string();

    // Last so that "&amp;lt;" decodes to "&lt;" and not "<"
    result.replace("&amp;", "&")
}

/// Collapse runs of whitespace into single spaces and trim
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A single element of a parsed HTML document
#[derive(Debug, Clone)]
pub struct HtmlElement {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    /// Concatenated text of all descendant text nodes (like DOM `textContent`)
    pub text: String,
    pub parent: Option<usize>,
}

impl HtmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Whitespace-normalized text content
    pub fn normalized_text(&self) -> String {
        normalize_whitespace(&self.text)
    }

    pub fn is_form_control(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select")
            || self.attr("contenteditable").is_some()
    }
}

/// Parsed HTML document
#[derive(Debug, Clone, Default)]
pub struct HtmlDocument {
    pub elements: Vec<HtmlElement>,
}

impl HtmlDocument {
    /// Parse HTML leniently: unclosed and mismatched tags are tolerated,
    /// `<script>`/`<style>` bodies are skipped.
    pub fn parse(html: &str) -> Result<Self, HtmlError> {
        static RAW_TEXT: OnceLock<Regex> = OnceLock::new();
        let raw_text = RAW_TEXT.get_or_init(|| {
            Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").unwrap()
        });
        let stripped = raw_text.replace_all(html, "");

        let mut reader = Reader::from_str(&stripped);
        reader.trim_text(false);
        reader.check_end_names(false);

        let mut elements: Vec<HtmlElement> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let idx = push_element(&mut elements, e, open.last().copied());
                    if !VOID_ELEMENTS.contains(&elements[idx].tag.as_str()) {
                        open.push(idx);
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    push_element(&mut elements, e, open.last().copied());
                }
                Ok(Event::End(ref e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                    // Close up to the nearest matching open element, ignore stray end tags
                    if let Some(pos) = open.iter().rposition(|&i| elements[i].tag == name) {
                        open.truncate(pos);
                    }
                }
                Ok(Event::Text(ref t)) => {
                    let text = decode_html_entities(&String::from_utf8_lossy(t));
                    for &i in &open {
                        elements[i].text.push_str(&text);
                    }
                }
                Ok(Event::CData(ref t)) => {
                    let text = String::from_utf8_lossy(t).to_string();
                    for &i in &open {
                        elements[i].text.push_str(&text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(HtmlError {
                        position: reader.buffer_position(),
                        message: e.to_string(),
                    })
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(Self { elements })
    }

    /// Contents of the first `<title>` element
    pub fn title(&self) -> Option<String> {
        self.elements
            .iter()
            .find(|e| e.tag == "title")
            .map(|e| e.normalized_text())
    }

    /// First element matching a step selector
    pub fn find(&self, selector: &str) -> Option<&HtmlElement> {
        let query = ElementQuery::parse(selector);
        self.elements.iter().find(|e| query.matches(e))
    }

    /// All elements carrying a `data-testid`, in document order
    pub fn selector_candidates(&self) -> Vec<SelectorCandidate> {
        self.elements
            .iter()
            .filter_map(|e| {
                let testid = e.attr("data-testid")?;
                Some(SelectorCandidate {
                    testid: testid.to_string(),
                    tag: e.tag.clone(),
                    text: e.normalized_text().chars().take(CANDIDATE_TEXT_LEN).collect(),
                    selector: format!(r#"[data-testid="{}"]"#, testid),
                })
            })
            .collect()
    }
}

fn push_element(elements: &mut Vec<HtmlElement>, e: &BytesStart, parent: Option<usize>) -> usize {
    let tag = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
    let attrs = e
        .html_attributes()
        .filter_map(|a| a.ok())
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).to_lowercase(),
                decode_html_entities(&String::from_utf8_lossy(&a.value)),
            )
        })
        .collect();
    elements.push(HtmlElement {
        tag,
        attrs,
        text: String::new(),
        parent,
    });
    elements.len() - 1
}

/// A selectable element offered to the step editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub testid: String,
    pub tag: String,
    pub text: String,
    pub selector: String,
}

/// Extract `data-testid` candidates from an HTML source
pub fn extract_selector_candidates(html: &str) -> Result<Vec<SelectorCandidate>, HtmlError> {
    Ok(HtmlDocument::parse(html)?.selector_candidates())
}

/// How a step selector is resolved against a document
///
/// Bare tokens are `data-testid` values. Anything starting with `#`, `.` or
/// `[` (optionally after a tag name) is a compound CSS selector; for
/// descendant selectors only the last compound is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementQuery {
    TestId(String),
    Css {
        tag: Option<String>,
        id: Option<String>,
        classes: Vec<String>,
        attrs: Vec<(String, Option<String>)>,
    },
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl ElementQuery {
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();
        let compound = selector.split_whitespace().last().unwrap_or("");

        let tag_len = compound
            .chars()
            .take_while(|c| is_ident_char(*c))
            .count();
        let is_css = compound[tag_len..].starts_with(['#', '.', '['])
            && (tag_len == 0 || compound.starts_with(|c: char| c.is_ascii_alphabetic()));
        if !is_css {
            return ElementQuery::TestId(selector.to_string());
        }

        let tag = (tag_len > 0).then(|| compound[..tag_len].to_lowercase());
        let mut id = None;
        let mut classes = Vec::new();
        let mut attrs = Vec::new();

        let mut rest = &compound[tag_len..];
        while let Some(first) = rest.chars().next() {
            match first {
                '#' | '.' => {
                    let len = rest[1..].chars().take_while(|c| is_ident_char(*c)).count();
                    let name = rest[1..1 + len].to_string();
                    if first == '#' {
                        id = Some(name);
                    } else {
                        classes.push(name);
                    }
                    rest = &rest[1 + len..];
                }
                '[' => {
                    let end = rest.find(']').unwrap_or(rest.len());
                    let inner = &rest[1..end];
                    match inner.split_once('=') {
                        Some((name, value)) => attrs.push((
                            name.trim().to_lowercase(),
                            Some(value.trim().trim_matches(['"', '\'']).to_string()),
                        )),
                        None => attrs.push((inner.trim().to_lowercase(), None)),
                    }
                    rest = rest.get(end + 1..).unwrap_or("");
                }
                _ => {
                    // Unsupported syntax (pseudo-classes etc.) ends the compound
                    break;
                }
            }
        }

        ElementQuery::Css {
            tag,
            id,
            classes,
            attrs,
        }
    }

    pub fn matches(&self, element: &HtmlElement) -> bool {
        match self {
            ElementQuery::TestId(testid) => element.attr("data-testid") == Some(testid.as_str()),
            ElementQuery::Css {
                tag,
                id,
                classes,
                attrs,
            } => {
                tag.as_ref().map_or(true, |t| &element.tag == t)
                    && id
                        .as_ref()
                        .map_or(true, |i| element.attr("id") == Some(i.as_str()))
                    && classes.iter().all(|c| element.has_class(c))
                    && attrs.iter().all(|(name, value)| match value {
                        Some(v) => element.attr(name) == Some(v.as_str()),
                        None => element.attr(name).is_some(),
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Spring   Sale</title>
    <style>.hero > a { color: red; }</style>
    <script>if (a < b) { run(); }</script>
</head>
<body>
    <div data-testid="hero" class="hero main">
        <h1 data-testid="Hero-Btn">Start <b>Now</b></h1>
        <a data-testid="cta" href="https://example.com/x?y=1&amp;z=2">Shop</a>
        <br>
        <input data-testid="email" type=email disabled>
        <p>Unclosed paragraph
    </div>
</body>
</html>"#;

    #[test]
    fn test_parse_tolerates_html_quirks() {
        let doc = HtmlDocument::parse(PAGE).unwrap();
        assert_eq!(doc.title(), Some("Spring Sale".to_string()));
        let input = doc.find("email").unwrap();
        assert_eq!(input.tag, "input");
        assert_eq!(input.attr("type"), Some("email"));
    }

    #[test]
    fn test_text_content_includes_descendants() {
        let doc = HtmlDocument::parse(PAGE).unwrap();
        assert_eq!(doc.find("Hero-Btn").unwrap().normalized_text(), "Start Now");
    }

    #[test]
    fn test_attribute_entities_are_decoded() {
        let doc = HtmlDocument::parse(PAGE).unwrap();
        assert_eq!(
            doc.find("cta").unwrap().attr("href"),
            Some("https://example.com/x?y=1&z=2")
        );
    }

    #[test]
    fn test_selector_candidates_in_document_order() {
        let candidates = extract_selector_candidates(PAGE).unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.testid.as_str()).collect();
        assert_eq!(ids, vec!["hero", "Hero-Btn", "cta", "email"]);
        assert_eq!(candidates[1].selector, r#"[data-testid="Hero-Btn"]"#);
        assert_eq!(candidates[1].tag, "h1");
        assert_eq!(candidates[2].text, "Shop");
    }

    #[test]
    fn test_candidate_text_is_truncated() {
        let long = "x".repeat(80);
        let html = format!(r#"<div data-testid="long">{}</div>"#, long);
        let candidates = extract_selector_candidates(&html).unwrap();
        assert_eq!(candidates[0].text.chars().count(), 50);
    }

    #[test]
    fn test_query_parse() {
        assert_eq!(
            ElementQuery::parse("start-button"),
            ElementQuery::TestId("start-button".to_string())
        );
        assert_eq!(
            ElementQuery::parse(r#"a.cta[data-kind="primary"]"#),
            ElementQuery::Css {
                tag: Some("a".to_string()),
                id: None,
                classes: vec!["cta".to_string()],
                attrs: vec![("data-kind".to_string(), Some("primary".to_string()))],
            }
        );
    }

    #[test]
    fn test_css_queries_match() {
        let doc = HtmlDocument::parse(PAGE).unwrap();
        assert_eq!(doc.find(".hero.main").unwrap().attr("data-testid"), Some("hero"));
        assert_eq!(doc.find(r#"[data-testid="cta"]"#).unwrap().tag, "a");
        assert_eq!(doc.find("div h1[data-testid]").unwrap().tag, "h1");
        assert!(doc.find("#missing").is_none());
        assert!(doc.find("nope").is_none());
    }

    #[test]
    fn test_decode_html_entities() {
        assert_eq!(decode_html_entities("Devices &amp; Groups"), "Devices & Groups");
        assert_eq!(decode_html_entities("&#65;&#x42;C"), "ABC");
        assert_eq!(decode_html_entities("&amp;lt;"), "&lt;");
    }
}

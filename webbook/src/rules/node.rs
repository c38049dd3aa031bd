//! Parsed response bodies and the nodes rules walk over.

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a response body is parsed before rules run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    /// An HTML document.
    Html,
    /// A JSON document.
    Json,
    /// Plain text.
    Text,
}

impl BodyFormat {
    /// Guesses the format from the first non-whitespace character.
    #[must_use]
    pub fn sniff(body: &str) -> Self {
        match body.trim_start().chars().next() {
            Some('{' | '[') => Self::Json,
            Some('<') => Self::Html,
            _ => Self::Text,
        }
    }
}

/// A parsed response body.
#[derive(Debug)]
pub enum Document {
    /// Parsed HTML.
    Html(Html),
    /// Parsed JSON.
    Json(Value),
    /// Anything else, kept verbatim.
    Text(String),
}

impl Document {
    /// Parses `body`, sniffing the format unless one is forced.
    ///
    /// A body that claims to be JSON but does not parse is kept as text.
    #[must_use]
    pub fn parse(body: &str, forced: Option<BodyFormat>) -> Self {
        match forced.unwrap_or_else(|| BodyFormat::sniff(body)) {
            BodyFormat::Html => Self::Html(Html::parse_document(body)),
            BodyFormat::Json => serde_json::from_str(body).map_or_else(|_| Self::Text(body.to_string()), Self::Json),
            BodyFormat::Text => Self::Text(body.to_string()),
        }
    }

    /// The format the body was parsed as.
    #[must_use]
    pub fn format(&self) -> BodyFormat {
        match self {
            Self::Html(_) => BodyFormat::Html,
            Self::Json(_) => BodyFormat::Json,
            Self::Text(_) => BodyFormat::Text,
        }
    }

    /// The node rules start from.
    #[must_use]
    pub fn root(&self) -> Node<'_> {
        match self {
            Self::Html(html) => Node::Element(html.root_element()),
            Self::Json(value) => Node::Json(value.clone()),
            Self::Text(text) => Node::Text(text.clone()),
        }
    }
}

/// A value rules operate on.
///
/// Elements borrow from the [`Document`] they were selected from, so list
/// entries keep their position in the original tree (table rows stay rows).
#[derive(Debug, Clone)]
pub enum Node<'a> {
    /// An element of the parsed document.
    Element(ElementRef<'a>),
    /// Markup detached from the document.
    Html(String),
    /// A JSON value.
    Json(Value),
    /// A string value.
    Text(String),
}

impl Node<'_> {
    /// String form of the node.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Element(el) => element_text(*el),
            Self::Html(markup) => element_text(Html::parse_fragment(markup).root_element()),
            Self::Json(Value::String(s)) | Self::Text(s) => s.clone(),
            Self::Json(Value::Null) => String::new(),
            Self::Json(value) => value.to_string(),
        }
    }

    /// Whether the node carries no usable value. Elements never count as blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Element(_) => false,
            Self::Json(Value::Array(items)) => items.is_empty(),
            Self::Json(Value::Object(map)) => map.is_empty(),
            _ => self.text().trim().is_empty(),
        }
    }

    /// Detaches the node from its document.
    #[must_use]
    pub fn into_owned(self) -> Node<'static> {
        match self {
            Self::Element(el) => Node::Html(el.html()),
            Self::Html(markup) => Node::Html(markup),
            Self::Json(value) => Node::Json(value),
            Self::Text(text) => Node::Text(text),
        }
    }
}

/// Whitespace-normalised text of an element and its descendants.
///
/// Line breaks and block boundaries separate words.
#[must_use]
pub fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            scraper::Node::Text(text) => out.push_str(text),
            scraper::Node::Element(element) if BREAKING.contains(&element.name()) => out.push(' '),
            _ => {}
        }
    }
    normalize_whitespace(&out)
}

/// Whitespace-normalised text of the direct text children.
#[must_use]
pub fn own_text(el: ElementRef<'_>) -> String {
    let parts: Vec<String> = el
        .children()
        .filter_map(|child| child.value().as_text().map(|t| t.trim().to_string()))
        .collect();
    normalize_whitespace(&parts.join(" "))
}

/// Each non-blank direct text child, trimmed.
#[must_use]
pub fn text_nodes(el: ElementRef<'_>) -> Vec<String> {
    el.children()
        .filter_map(|child| child.value().as_text().map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
        .collect()
}

const BREAKING: [&str; 12] = ["br", "p", "div", "li", "tr", "td", "h1", "h2", "h3", "h4", "dd", "dt"];

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sniff() {
        assert_eq!(BodyFormat::sniff("  {\"a\": 1}"), BodyFormat::Json);
        assert_eq!(BodyFormat::sniff("\n[1, 2]"), BodyFormat::Json);
        assert_eq!(BodyFormat::sniff("<!DOCTYPE html><html></html>"), BodyFormat::Html);
        assert_eq!(BodyFormat::sniff("plain words"), BodyFormat::Text);
        assert_eq!(BodyFormat::sniff(""), BodyFormat::Text);
    }

    #[test]
    fn test_forced_format_and_broken_json() {
        let doc = Document::parse("<p>x</p>", Some(BodyFormat::Text));
        assert_eq!(doc.format(), BodyFormat::Text);

        let doc = Document::parse("{broken", None);
        assert_eq!(doc.format(), BodyFormat::Text);

        let doc = Document::parse(r#"{"a": 1}"#, None);
        assert_eq!(doc.format(), BodyFormat::Json);
    }

    #[test]
    fn test_text_accessors() {
        let html = Html::parse_fragment("<div>  Chapter <b>One</b>\n line<br>second  </div>");
        let div = html
            .select(&scraper::Selector::parse("div").unwrap())
            .next()
            .unwrap();

        assert_eq!(element_text(div), "Chapter One line second");
        assert_eq!(own_text(div), "Chapter line second");
        assert_eq!(text_nodes(div), vec!["Chapter", "line", "second"]);
    }

    #[test]
    fn test_node_text_and_blank() {
        assert_eq!(Node::Json(json!("x")).text(), "x");
        assert_eq!(Node::Json(json!(12)).text(), "12");
        assert_eq!(Node::Json(Value::Null).text(), "");
        assert!(Node::Json(json!([])).is_blank());
        assert!(Node::Text("  ".to_string()).is_blank());
        assert_eq!(Node::Html("<p>a <i>b</i></p>".to_string()).text(), "a b");
    }
}

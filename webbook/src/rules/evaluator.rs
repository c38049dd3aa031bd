//! Rule evaluation: one dispatcher over compiled [`RuleStep`]s.

use dashmap::DashMap;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::Arc;

use super::json_path::JsonPath;
use super::node::{element_text, own_text, text_nodes, Node};
use super::step::{Accessor, RuleChain, RuleStep};
use super::RuleError;
use crate::cancellation::CancellationToken;
use crate::http::resolve_url;
use crate::script::{ScriptEngine, ScriptInput};

/// Process-wide cache of compiled rules, keyed by rule string.
#[derive(Debug, Default)]
pub struct RuleCache {
    chains: DashMap<String, Arc<RuleChain>>,
}

impl RuleCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `rule`, reusing an earlier compilation. Failures are not cached.
    pub fn compile(&self, rule: &str) -> Result<Arc<RuleChain>, RuleError> {
        if let Some(chain) = self.chains.get(rule) {
            return Ok(Arc::clone(&chain));
        }
        let chain = Arc::new(RuleChain::parse(rule)?);
        self.chains.insert(rule.to_string(), Arc::clone(&chain));
        Ok(chain)
    }

    /// Number of cached rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// Nodes selected by a list rule.
#[derive(Debug, Clone)]
pub struct NodeList<'d> {
    /// Selected nodes, in document order.
    pub nodes: Vec<Node<'d>>,
    /// Whether the rule asked for the list to be reversed.
    pub reverse: bool,
}

/// Evaluates rules against the nodes of one response.
///
/// `base_url` is the final URL of the response; relative URLs resolve against it.
pub struct RuleEvaluator<'e> {
    cache: &'e RuleCache,
    scripts: &'e dyn ScriptEngine,
    token: &'e Arc<CancellationToken>,
    base_url: &'e str,
    source_url: &'e str,
}

impl<'e> RuleEvaluator<'e> {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(
        cache: &'e RuleCache,
        scripts: &'e dyn ScriptEngine,
        token: &'e Arc<CancellationToken>,
        base_url: &'e str,
        source_url: &'e str,
    ) -> Self {
        Self {
            cache,
            scripts,
            token,
            base_url,
            source_url,
        }
    }

    /// The URL relative links resolve against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
    }

    /// Selects the list a list rule names. JSON arrays are expanded into items.
    pub fn list<'d>(&self, rule: &str, node: &Node<'d>) -> Result<NodeList<'d>, RuleError> {
        let chain = self.cache.compile(rule)?;
        let nodes = self
            .evaluate(&chain, node)?
            .into_iter()
            .flat_map(expand_array)
            .collect();
        Ok(NodeList {
            nodes,
            reverse: chain.reverse,
        })
    }

    /// Selects a single node, the first the rule reaches.
    pub fn first<'d>(&self, rule: &str, node: &Node<'d>) -> Result<Option<Node<'d>>, RuleError> {
        let chain = self.cache.compile(rule)?;
        Ok(self.evaluate(&chain, node)?.into_iter().next())
    }

    /// Every non-blank value the rule yields, trimmed.
    pub fn strings(&self, rule: &str, node: &Node<'_>) -> Result<Vec<String>, RuleError> {
        let chain = self.cache.compile(rule)?;
        Ok(self
            .evaluate(&chain, node)?
            .iter()
            .map(|n| n.text().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// All values joined by newlines. Empty when nothing matched.
    pub fn string(&self, rule: &str, node: &Node<'_>) -> Result<String, RuleError> {
        Ok(self.strings(rule, node)?.join("\n"))
    }

    /// The first value, resolved against the base URL.
    pub fn url(&self, rule: &str, node: &Node<'_>) -> Result<String, RuleError> {
        Ok(self
            .strings(rule, node)?
            .first()
            .map(|href| resolve_url(self.base_url, href))
            .unwrap_or_default())
    }

    /// Every value, resolved against the base URL.
    pub fn urls(&self, rule: &str, node: &Node<'_>) -> Result<Vec<String>, RuleError> {
        Ok(self
            .strings(rule, node)?
            .iter()
            .map(|href| resolve_url(self.base_url, href))
            .filter(|url| !url.is_empty())
            .collect())
    }

    fn evaluate<'d>(&self, chain: &RuleChain, node: &Node<'d>) -> Result<Vec<Node<'d>>, RuleError> {
        let mut last_error = None;
        for steps in &chain.alternatives {
            match self.run_steps(steps, vec![node.clone()]) {
                Ok(nodes) if nodes.iter().any(|n| !n.is_blank()) => return Ok(nodes),
                Ok(_) => {}
                Err(e) => last_error = Some(e),
            }
        }
        last_error.map_or_else(|| Ok(Vec::new()), Err)
    }

    fn run_steps<'d>(&self, steps: &[RuleStep], input: Vec<Node<'d>>) -> Result<Vec<Node<'d>>, RuleError> {
        let mut nodes = input;
        for step in steps {
            nodes = match step {
                RuleStep::Css { selector, accessor } => nodes
                    .iter()
                    .flat_map(|n| select_css(n, selector.as_ref(), accessor.as_ref()))
                    .collect(),
                RuleStep::JsonPath(path) => nodes.iter().flat_map(|n| select_json(n, path)).collect(),
                RuleStep::RegexCapture(pattern) => nodes.iter().flat_map(|n| capture(pattern, &n.text())).collect(),
                RuleStep::RegexReplace {
                    pattern,
                    replacement,
                    first_only,
                } => nodes
                    .iter()
                    .map(|n| {
                        let text = n.text();
                        let replaced = if *first_only {
                            pattern.replace(&text, replacement.as_str())
                        } else {
                            pattern.replace_all(&text, replacement.as_str())
                        };
                        Node::Text(replaced.into_owned())
                    })
                    .collect(),
                RuleStep::Script(script) => {
                    let joined = nodes.iter().map(Node::text).collect::<Vec<_>>().join("\n");
                    vec![Node::Text(self.run_script(script, joined)?)]
                }
            };
        }
        Ok(nodes)
    }

    fn run_script(&self, script: &str, result: String) -> Result<String, RuleError> {
        let input = ScriptInput {
            result,
            base_url: self.base_url.to_string(),
            source_url: self.source_url.to_string(),
        };
        self.scripts
            .eval(script, &input, self.token)
            .map_err(|e| RuleError::new(e.to_string()))
    }
}

impl std::fmt::Debug for RuleEvaluator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEvaluator")
            .field("base_url", &self.base_url)
            .field("source_url", &self.source_url)
            .finish_non_exhaustive()
    }
}

fn select_css<'d>(node: &Node<'d>, selector: Option<&Selector>, accessor: Option<&Accessor>) -> Vec<Node<'d>> {
    match node {
        Node::Element(el) => select_in(*el, selector, accessor),
        Node::Html(markup) | Node::Text(markup) | Node::Json(Value::String(markup)) => {
            let fragment = Html::parse_fragment(markup);
            select_in(fragment.root_element(), selector, accessor)
                .into_iter()
                .map(|n| -> Node<'d> { n.into_owned() })
                .collect()
        }
        Node::Json(_) => Vec::new(),
    }
}

fn select_in<'d>(el: ElementRef<'d>, selector: Option<&Selector>, accessor: Option<&Accessor>) -> Vec<Node<'d>> {
    let selected: Vec<ElementRef<'d>> = match selector {
        Some(selector) => el.select(selector).collect(),
        None => vec![el],
    };

    let Some(accessor) = accessor else {
        return selected.into_iter().map(Node::Element).collect();
    };

    selected
        .into_iter()
        .flat_map(|e| match accessor {
            Accessor::Text => vec![Node::Text(element_text(e))],
            Accessor::OwnText => vec![Node::Text(own_text(e))],
            Accessor::TextNodes => text_nodes(e).into_iter().map(Node::Text).collect(),
            Accessor::Html => vec![Node::Text(e.html())],
            Accessor::Attr(name) => e
                .value()
                .attr(name)
                .map(|v| Node::Text(v.to_string()))
                .into_iter()
                .collect(),
        })
        .collect()
}

fn select_json<'d>(node: &Node<'d>, path: &JsonPath) -> Vec<Node<'d>> {
    let parsed;
    let value = match node {
        Node::Json(Value::String(text)) | Node::Text(text) | Node::Html(text) => {
            match serde_json::from_str::<Value>(text) {
                Ok(v) => {
                    parsed = v;
                    &parsed
                }
                Err(_) => return Vec::new(),
            }
        }
        Node::Json(value) => value,
        Node::Element(el) => match serde_json::from_str::<Value>(&el.text().collect::<String>()) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(_) => return Vec::new(),
        },
    };
    path.select(value).into_iter().map(Node::Json).collect()
}

fn capture<'d>(pattern: &Regex, text: &str) -> Vec<Node<'d>> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(if caps.len() > 1 { 1 } else { 0 }))
        .map(|m| Node::Text(m.as_str().to_string()))
        .collect()
}

fn expand_array(node: Node<'_>) -> Vec<Node<'_>> {
    match node {
        Node::Json(Value::Array(items)) => items.into_iter().map(Node::Json).collect(),
        Node::Text(text) if text.trim_start().starts_with('[') => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => items.into_iter().map(Node::Json).collect(),
            _ => vec![Node::Text(text)],
        },
        other => vec![other],
    }
}

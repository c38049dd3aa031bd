//! Rule string parsing.
//!
//! ```text
//! rule        := ['-'] alternative ('||' alternative)* ['@js:' script]
//! alternative := segment* ['##' pattern ['##' replacement] ['###']]
//! segment     := css | '@css:' css | '$…' | '@json:' jsonpath | '@regex:' pattern
//! css         := [selector] ['@' accessor]
//! ```

use regex::Regex;
use scraper::Selector;

use super::json_path::JsonPath;
use super::RuleError;

/// What a CSS step reads off each selected element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// Whitespace-normalised text of the element and its descendants.
    Text,
    /// Text of the direct text children only.
    OwnText,
    /// Each non-blank direct text child as its own value.
    TextNodes,
    /// Outer HTML.
    Html,
    /// An attribute value.
    Attr(String),
}

impl Accessor {
    fn parse(name: &str) -> Self {
        match name {
            "text" => Self::Text,
            "ownText" => Self::OwnText,
            "textNodes" => Self::TextNodes,
            "html" => Self::Html,
            other => Self::Attr(other.to_string()),
        }
    }
}

/// One compiled step of a rule alternative.
#[derive(Debug, Clone)]
pub enum RuleStep {
    /// CSS selection, then an optional accessor.
    Css {
        /// `None` keeps the current node.
        selector: Option<Selector>,
        accessor: Option<Accessor>,
    },
    /// JSONPath selection.
    JsonPath(JsonPath),
    /// Every regex match, capture group 1 when the pattern has groups.
    RegexCapture(Regex),
    /// Regex replacement over each value.
    RegexReplace {
        pattern: Regex,
        replacement: String,
        first_only: bool,
    },
    /// Script post-processing over the joined values.
    Script(String),
}

/// A compiled rule: alternatives tried in order, the first non-empty result wins.
#[derive(Debug, Clone)]
pub struct RuleChain {
    /// The rule string this chain was compiled from.
    pub source: String,
    /// Alternatives, each a left-to-right list of steps.
    pub alternatives: Vec<Vec<RuleStep>>,
    /// Whether a list selected by this rule is reversed.
    pub reverse: bool,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Css,
    Json,
    Regex,
}

const MARKERS: [(&str, Mode); 3] = [("@css:", Mode::Css), ("@json:", Mode::Json), ("@regex:", Mode::Regex)];

impl RuleChain {
    /// Compiles a rule string.
    pub fn parse(rule: &str) -> Result<Self, RuleError> {
        let mut rest = rule.trim();
        let reverse = rest.starts_with('-');
        if reverse {
            rest = rest[1..].trim_start();
        }

        let (body, script) = match rest.find("@js:") {
            Some(pos) => (&rest[..pos], Some(rest[pos + 4..].trim())),
            None => (rest, None),
        };

        let mut alternatives = Vec::new();
        for alternative in body.split("||") {
            let mut steps = parse_alternative(alternative)?;
            if let Some(script) = script.filter(|s| !s.is_empty()) {
                steps.push(RuleStep::Script(script.to_string()));
            }
            alternatives.push(steps);
        }

        Ok(Self {
            source: rule.to_string(),
            alternatives,
            reverse,
        })
    }
}

fn parse_alternative(alternative: &str) -> Result<Vec<RuleStep>, RuleError> {
    let alternative = alternative.trim();
    let (primary, replace) = match alternative.find("##") {
        Some(pos) => (&alternative[..pos], Some(&alternative[pos + 2..])),
        None => (alternative, None),
    };

    let mut steps = parse_segments(primary)?;

    if let Some(replace) = replace {
        let (replace, first_only) = match replace.strip_suffix("###") {
            Some(stripped) => (stripped, true),
            None => (replace, false),
        };
        let (pattern, replacement) = replace.split_once("##").unwrap_or((replace, ""));
        steps.push(RuleStep::RegexReplace {
            pattern: compile_regex(pattern)?,
            replacement: replacement.to_string(),
            first_only,
        });
    }

    Ok(steps)
}

fn parse_segments(text: &str) -> Result<Vec<RuleStep>, RuleError> {
    let mut steps = Vec::new();
    let mut mode = None;
    let mut rest = text;

    loop {
        let next = MARKERS
            .iter()
            .filter_map(|(marker, kind)| rest.find(marker).map(|pos| (pos, marker.len(), *kind)))
            .min_by_key(|(pos, ..)| *pos);

        let (segment, following) = match next {
            Some((pos, len, kind)) => (&rest[..pos], Some((&rest[pos + len..], kind))),
            None => (rest, None),
        };

        let segment = segment.trim();
        if !segment.is_empty() || mode.is_some() {
            steps.push(compile_segment(segment, mode)?);
        }

        match following {
            Some((remaining, kind)) => {
                rest = remaining;
                mode = Some(kind);
            }
            None => break,
        }
    }

    Ok(steps)
}

fn compile_segment(segment: &str, mode: Option<Mode>) -> Result<RuleStep, RuleError> {
    match mode {
        Some(Mode::Json) => Ok(RuleStep::JsonPath(JsonPath::parse(segment)?)),
        None if segment.starts_with('$') => Ok(RuleStep::JsonPath(JsonPath::parse(segment)?)),
        Some(Mode::Regex) => Ok(RuleStep::RegexCapture(compile_regex(segment)?)),
        Some(Mode::Css) | None => compile_css(segment),
    }
}

fn compile_css(segment: &str) -> Result<RuleStep, RuleError> {
    let (selector, accessor) = match segment.rfind('@') {
        Some(pos) if is_accessor_name(&segment[pos + 1..]) => {
            (&segment[..pos], Some(Accessor::parse(&segment[pos + 1..])))
        }
        _ => (segment, None),
    };

    let selector = selector.trim();
    let selector = if selector.is_empty() {
        None
    } else {
        Some(
            Selector::parse(selector)
                .map_err(|e| RuleError::new(format!("invalid selector '{selector}': {e}")))?,
        )
    };

    Ok(RuleStep::Css { selector, accessor })
}

fn is_accessor_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
}

fn compile_regex(pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|e| RuleError::new(format!("invalid regex '{pattern}': {e}")))
}

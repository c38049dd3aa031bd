//! Source profiles: the declarative description of one content source.
//!
//! A profile is usually deserialized from a persisted JSON record
//! (camelCase field names) and shared read-only, as `Arc<SourceProfile>`,
//! by every stage call made against that source.

mod rules;

pub use rules::{BookInfoRule, BookListRule, ContentRule, TocRule};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{Result, TemplateError, WebBookError};
use crate::models::SourceType;
use crate::rules::BodyFormat;

/// Declarative description of a content source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceProfile {
    /// Base URL; also the source origin identifier.
    pub source_url: String,
    /// Display name.
    pub source_name: String,
    /// Content kind tag copied onto books.
    pub source_type: SourceType,
    /// Extra request headers.
    pub header: Option<HeaderTemplate>,
    /// Search request template. Empty disables search.
    pub search_url: Option<String>,
    /// Explore entries, `title::url` separated by newlines or `&&`.
    pub explore_url: Option<String>,
    /// Regex matching detail page URLs; lets list stages recognise a
    /// search that redirected straight to a book.
    pub book_url_pattern: Option<String>,
    /// Forces the body format instead of sniffing it.
    pub body_format: Option<BodyFormat>,
    /// Search result rules.
    pub rule_search: BookListRule,
    /// Explore result rules; falls back to `rule_search` when its list rule is empty.
    pub rule_explore: BookListRule,
    /// Detail page rules.
    pub rule_book_info: BookInfoRule,
    /// Table-of-contents rules.
    pub rule_toc: TocRule,
    /// Content page rules.
    pub rule_content: ContentRule,
}

/// A titled explore entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploreKind {
    /// Display title.
    pub title: String,
    /// Request template for the entry.
    pub url: String,
}

impl SourceProfile {
    /// Creates a profile for a base URL.
    #[must_use]
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            ..Default::default()
        }
    }

    /// Parses one profile from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| WebBookError::profile(e.to_string()))
    }

    /// Parses a JSON array of profiles.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        serde_json::from_str(json).map_err(|e| WebBookError::profile(e.to_string()))
    }

    /// Reads one profile from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Display name, falling back to the URL.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.source_name.is_empty() {
            &self.source_url
        } else {
            &self.source_name
        }
    }

    /// The search template, if search is enabled.
    #[must_use]
    pub fn search_template(&self) -> Option<&str> {
        non_empty(self.search_url.as_deref())
    }

    /// The list rules used for a stage: explore falls back to search.
    #[must_use]
    pub fn list_rule(&self, explore: bool) -> &BookListRule {
        if explore && non_empty(self.rule_explore.book_list.as_deref()).is_some() {
            &self.rule_explore
        } else {
            &self.rule_search
        }
    }

    /// Resolves the header template into concrete pairs.
    pub fn header_map(&self) -> std::result::Result<BTreeMap<String, String>, TemplateError> {
        self.header
            .as_ref()
            .map_or_else(|| Ok(BTreeMap::new()), HeaderTemplate::resolve)
    }

    /// Parses the explore entries.
    #[must_use]
    pub fn explore_kinds(&self) -> Vec<ExploreKind> {
        let Some(raw) = non_empty(self.explore_url.as_deref()) else {
            return Vec::new();
        };

        raw.split("&&")
            .flat_map(str::lines)
            .filter_map(|entry| {
                let entry = entry.trim();
                if entry.is_empty() {
                    return None;
                }
                match entry.split_once("::") {
                    Some((title, url)) => Some(ExploreKind {
                        title: title.trim().to_string(),
                        url: url.trim().to_string(),
                    }),
                    None => Some(ExploreKind {
                        title: entry.to_string(),
                        url: String::new(),
                    }),
                }
            })
            .collect()
    }
}

/// Extra headers of a profile: either a map or the persisted JSON string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderTemplate {
    /// Header pairs.
    Map(BTreeMap<String, String>),
    /// A JSON object of header pairs, stored as text.
    Raw(String),
}

impl HeaderTemplate {
    /// Resolves into concrete header pairs.
    pub fn resolve(&self) -> std::result::Result<BTreeMap<String, String>, TemplateError> {
        match self {
            Self::Map(map) => Ok(map.clone()),
            Self::Raw(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Self::Raw(raw) => serde_json::from_str(raw)
                .map_err(|e| TemplateError::new(raw.as_str(), format!("header template is not a JSON object: {e}"))),
        }
    }
}

/// Returns the trimmed value when it is present and not blank.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r##"{
        "sourceUrl": "http://fixture",
        "sourceName": "Fixture",
        "sourceType": "text",
        "header": "{\"Referer\": \"http://fixture/\"}",
        "searchUrl": "/search?q={{key}}&p={{page}}",
        "exploreUrl": "Fantasy::/list/fantasy/{{page}}\nSci-Fi::/list/scifi/{{page}}&&Top",
        "ruleSearch": {"bookList": "li.book", "name": ".name@text", "bookUrl": "a@href"},
        "ruleBookInfo": {"name": "h1@text", "tocUrl": "a.toc@href"},
        "ruleToc": {"chapterList": "ul.toc li a", "chapterName": "@text", "chapterUrl": "@href"},
        "ruleContent": {"content": "#content@textNodes", "sourceRegex": "var data = (.*);"}
    }"##;

    #[test]
    fn test_profile_from_json() {
        let profile = SourceProfile::from_json(PROFILE).unwrap();
        assert_eq!(profile.source_url, "http://fixture");
        assert_eq!(profile.display_name(), "Fixture");
        assert_eq!(profile.search_template(), Some("/search?q={{key}}&p={{page}}"));
        assert_eq!(profile.rule_search.book_list.as_deref(), Some("li.book"));
        assert_eq!(profile.rule_content.source_regex.as_deref(), Some("var data = (.*);"));
        assert!(profile.rule_content.web_js.is_none());
        assert_eq!(profile.rule_content.content.as_deref(), Some("#content@textNodes"));
    }

    #[test]
    fn test_header_template_forms() {
        let profile = SourceProfile::from_json(PROFILE).unwrap();
        let headers = profile.header_map().unwrap();
        assert_eq!(headers.get("Referer").map(String::as_str), Some("http://fixture/"));

        let map: HeaderTemplate = serde_json::from_str(r#"{"X-Token": "abc"}"#).unwrap();
        assert_eq!(map.resolve().unwrap().get("X-Token").map(String::as_str), Some("abc"));

        let broken = HeaderTemplate::Raw("{not json".to_string());
        assert!(broken.resolve().is_err());

        assert!(HeaderTemplate::Raw("  ".to_string()).resolve().unwrap().is_empty());
    }

    #[test]
    fn test_explore_kinds() {
        let profile = SourceProfile::from_json(PROFILE).unwrap();
        let kinds = profile.explore_kinds();
        assert_eq!(kinds.len(), 3);
        assert_eq!(kinds[0].title, "Fantasy");
        assert_eq!(kinds[0].url, "/list/fantasy/{{page}}");
        assert_eq!(kinds[1].title, "Sci-Fi");
        assert_eq!(kinds[2].title, "Top");
        assert!(kinds[2].url.is_empty());
    }

    #[test]
    fn test_blank_search_template_disables_search() {
        let mut profile = SourceProfile::new("http://fixture");
        assert!(profile.search_template().is_none());
        profile.search_url = Some("   ".to_string());
        assert!(profile.search_template().is_none());
    }

    #[test]
    fn test_explore_rule_falls_back_to_search() {
        let mut profile = SourceProfile::from_json(PROFILE).unwrap();
        assert_eq!(profile.list_rule(true).book_list.as_deref(), Some("li.book"));

        profile.rule_explore.book_list = Some("div.item".to_string());
        assert_eq!(profile.list_rule(true).book_list.as_deref(), Some("div.item"));
        assert_eq!(profile.list_rule(false).book_list.as_deref(), Some("li.book"));
    }

    #[test]
    fn test_profile_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.json");
        std::fs::write(&path, PROFILE).unwrap();
        let profile = SourceProfile::from_path(&path).unwrap();
        assert_eq!(profile.source_name, "Fixture");

        assert!(SourceProfile::from_path(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_profile_list_from_json() {
        let list = SourceProfile::list_from_json(&format!("[{PROFILE}, {{\"sourceUrl\": \"http://b\"}}]")).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].source_url, "http://b");
        assert_eq!(list[1].source_type, SourceType::Text);
    }
}

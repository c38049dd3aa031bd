//! Request templates.
//!
//! A template is a URL, optionally followed by a comma and a JSON options
//! object:
//!
//! ```text
//! /search?q={{key}}&page={{page}}
//! /search,{"method": "POST", "body": "q={{key}}", "headers": {"Referer": "{{baseUrl}}"}}
//! /list/<hot,new,top>
//! ```
//!
//! Placeholders are `{name}` or `{{name}}` with `name` one of `key`, `page`
//! (optionally `page+N` / `page-N`), `bookName`, `bookUrl`, `tocUrl` and
//! `baseUrl`. A `<a,b,c>` page list picks the entry for the current page.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

use super::urls::form_encode;
use crate::config::FetchConfig;
use crate::errors::TemplateError;
use crate::models::Book;
use crate::profile::SourceProfile;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    fn parse(method: &str, template: &str) -> Result<Self, TemplateError> {
        match method.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(TemplateError::new(template, format!("unsupported method '{other}'"))),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// A fully resolved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRequest {
    /// Absolute URL.
    pub url: String,
    /// Method.
    pub method: HttpMethod,
    /// Headers, including the configured defaults.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Option<String>,
    /// Charset to decode the body with when the response does not declare one.
    pub charset: Option<String>,
}

impl ResolvedRequest {
    /// A plain GET request without headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
            charset: None,
        }
    }

    /// Looks a header up case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Values available to placeholders.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// URL relative templates resolve against.
    pub base_url: String,
    /// Search key.
    pub key: Option<String>,
    /// Page number, 1-based.
    pub page: Option<u32>,
    /// Title of the current book.
    pub book_name: Option<String>,
    /// Detail URL of the current book.
    pub book_url: Option<String>,
    /// Toc URL of the current book.
    pub toc_url: Option<String>,
}

impl RequestContext {
    /// Creates a context resolving against `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the search key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the page.
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Exposes the book's name and URLs.
    #[must_use]
    pub fn with_book(mut self, book: &Book) -> Self {
        self.book_name = Some(book.name.clone()).filter(|s| !s.is_empty());
        self.book_url = Some(book.book_url.clone()).filter(|s| !s.is_empty());
        self.toc_url = Some(book.effective_toc_url().to_string()).filter(|s| !s.is_empty());
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequestOptions {
    method: Option<String>,
    body: Option<Value>,
    headers: BTreeMap<String, String>,
    charset: Option<String>,
}

/// Resolves request templates of one profile.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    profile: &'a SourceProfile,
    config: &'a FetchConfig,
}

impl<'a> RequestBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(profile: &'a SourceProfile, config: &'a FetchConfig) -> Self {
        Self { profile, config }
    }

    /// Resolves `template` into a request.
    pub fn build(&self, template: &str, ctx: &RequestContext) -> Result<ResolvedRequest, TemplateError> {
        let (url_part, options_part) = split_options(template.trim());

        let options: RequestOptions = match options_part {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| TemplateError::new(template, format!("invalid request options: {e}")))?,
            None => RequestOptions::default(),
        };

        let url_part = select_page_entry(url_part, ctx.page);
        let url = expand(&url_part, ctx, Encoding::Form, template)?;
        let url = join_base(&ctx.base_url, &url, template)?;

        let method = match options.method.as_deref() {
            Some(method) => HttpMethod::parse(method, template)?,
            None => HttpMethod::Get,
        };

        let body = match options.body {
            None | Some(Value::Null) => None,
            Some(Value::String(body)) => Some(expand(&body, ctx, Encoding::Form, template)?),
            Some(structured) => Some(expand_json(structured, ctx, template)?.to_string()),
        };

        let mut headers = BTreeMap::new();
        for (name, value) in &self.config.headers {
            set_header(&mut headers, name, value.clone());
        }
        set_header(&mut headers, "User-Agent", self.config.user_agent.clone());
        for (name, value) in self.profile.header_map()? {
            set_header(&mut headers, &name, expand(&value, ctx, Encoding::Raw, template)?);
        }
        for (name, value) in &options.headers {
            set_header(&mut headers, name, expand(value, ctx, Encoding::Raw, template)?);
        }

        Ok(ResolvedRequest {
            url,
            method,
            headers,
            body,
            charset: options.charset.filter(|c| !c.trim().is_empty()),
        })
    }
}

/// Splits `url,{"...": ...}` at the comma that opens the options object.
fn split_options(template: &str) -> (&str, Option<&str>) {
    for (idx, _) in template.match_indices(',') {
        let rest = template[idx + 1..].trim_start();
        if let Some(inner) = rest.strip_prefix('{') {
            let inner = inner.trim_start();
            if inner.starts_with('"') || inner.starts_with('}') {
                return (template[..idx].trim_end(), Some(rest));
            }
        }
    }
    (template, None)
}

/// Replaces a `<a,b,c>` page list with the entry for `page`.
fn select_page_entry(url: &str, page: Option<u32>) -> String {
    let (Some(open), Some(close)) = (url.find('<'), url.rfind('>')) else {
        return url.to_string();
    };
    if close < open {
        return url.to_string();
    }

    let entries: Vec<&str> = url[open + 1..close].split(',').map(str::trim).collect();
    let index = page.unwrap_or(1).saturating_sub(1) as usize;
    let entry = entries.get(index).or_else(|| entries.last()).copied().unwrap_or_default();

    format!("{}{}{}", &url[..open], entry, &url[close + 1..])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Form,
    Raw,
}

fn expand(text: &str, ctx: &RequestContext, encoding: Encoding, template: &str) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let (name, consumed) = if let Some(inner) = after.strip_prefix("{{") {
            let close = inner
                .find("}}")
                .ok_or_else(|| TemplateError::new(template, "unclosed '{{'"))?;
            (&inner[..close], close + 4)
        } else {
            let close = after
                .find('}')
                .ok_or_else(|| TemplateError::new(template, "unclosed '{'"))?;
            (&after[1..close], close + 1)
        };
        out.push_str(&resolve_placeholder(name.trim(), ctx, encoding, template)?);
        rest = &after[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

fn expand_json(value: Value, ctx: &RequestContext, template: &str) -> Result<Value, TemplateError> {
    Ok(match value {
        Value::String(s) => Value::String(expand(&s, ctx, Encoding::Raw, template)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| expand_json(v, ctx, template))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| Ok((k, expand_json(v, ctx, template)?)))
                .collect::<Result<_, TemplateError>>()?,
        ),
        other => other,
    })
}

fn resolve_placeholder(
    name: &str,
    ctx: &RequestContext,
    encoding: Encoding,
    template: &str,
) -> Result<String, TemplateError> {
    let missing = || TemplateError::new(template, format!("no value for '{name}'"));

    if let Some(offset) = name.strip_prefix("page") {
        let page = ctx.page.ok_or_else(missing)?;
        let offset: i64 = match offset.trim() {
            "" => 0,
            o => o
                .strip_prefix('+')
                .unwrap_or(o)
                .trim()
                .parse()
                .map_err(|_| TemplateError::new(template, format!("bad page offset in '{name}'")))?,
        };
        return i64::from(page)
            .checked_add(offset)
            .map(|p| p.to_string())
            .ok_or_else(|| TemplateError::new(template, format!("page offset out of range in '{name}'")));
    }

    let value = match name {
        "key" => ctx.key.as_deref(),
        "bookName" => ctx.book_name.as_deref(),
        "bookUrl" => ctx.book_url.as_deref(),
        "tocUrl" => ctx.toc_url.as_deref(),
        "baseUrl" => Some(ctx.base_url.as_str()).filter(|s| !s.is_empty()),
        other => {
            return Err(TemplateError::new(template, format!("unknown placeholder '{other}'")));
        }
    }
    .ok_or_else(missing)?;

    Ok(match (name, encoding) {
        ("key" | "bookName", Encoding::Form) => form_encode(value),
        _ => value.to_string(),
    })
}

fn join_base(base: &str, url: &str, template: &str) -> Result<String, TemplateError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(TemplateError::new(template, "empty url"));
    }
    if let Ok(absolute) = Url::parse(url) {
        return Ok(absolute.into());
    }
    Url::parse(base.trim())
        .and_then(|base| base.join(url))
        .map(String::from)
        .map_err(|e| TemplateError::new(template, format!("cannot resolve '{url}' against '{base}': {e}")))
}

fn set_header(headers: &mut BTreeMap<String, String>, name: &str, value: String) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::HeaderTemplate;
    use pretty_assertions::assert_eq;

    fn profile() -> SourceProfile {
        let mut profile = SourceProfile::new("http://fixture");
        profile.header = Some(HeaderTemplate::Raw(
            r#"{"Referer": "{{baseUrl}}/", "user-agent": "ProfileAgent"}"#.to_string(),
        ));
        profile
    }

    fn build(template: &str, ctx: &RequestContext) -> Result<ResolvedRequest, TemplateError> {
        let profile = profile();
        let config = FetchConfig::default();
        RequestBuilder::new(&profile, &config).build(template, ctx)
    }

    fn search_ctx() -> RequestContext {
        RequestContext::new("http://fixture").with_key("a b&c").with_page(2)
    }

    #[test]
    fn test_get_with_placeholders() {
        let req = build("/search?q={{key}}&p={{page}}&prev={page-1}", &search_ctx()).unwrap();
        assert_eq!(req.url, "http://fixture/search?q=a+b%26c&p=2&prev=1");
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.body.is_none());
    }

    #[test]
    fn test_post_options_and_header_precedence() {
        let req = build(
            r#"/search,{"method": "post", "body": "q={{key}}&p={{page+1}}", "headers": {"Referer": "http://x/{{key}}"}}"#,
            &search_ctx(),
        )
        .unwrap();

        assert_eq!(req.url, "http://fixture/search");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.body.as_deref(), Some("q=a+b%26c&p=3"));
        // Option headers beat profile headers, which beat config defaults; key is raw in headers.
        assert_eq!(req.header("referer"), Some("http://x/a b&c"));
        assert_eq!(req.header("User-Agent"), Some("ProfileAgent"));
        assert_eq!(req.headers.keys().filter(|k| k.eq_ignore_ascii_case("user-agent")).count(), 1);
    }

    #[test]
    fn test_json_body_is_raw() {
        let req = build(
            r#"/api/search, {"method": "POST", "body": {"keyword": "{{key}}", "page": 1}}"#,
            &search_ctx(),
        )
        .unwrap();
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["keyword"], "a b&c");
        assert_eq!(body["page"], 1);
    }

    #[test]
    fn test_page_list() {
        let ctx = RequestContext::new("http://fixture/");
        assert_eq!(build("/list/<hot,new,top>", &ctx.clone().with_page(1)).unwrap().url, "http://fixture/list/hot");
        assert_eq!(build("/list/<hot,new,top>", &ctx.clone().with_page(3)).unwrap().url, "http://fixture/list/top");
        assert_eq!(build("/list/<hot,new,top>", &ctx.with_page(9)).unwrap().url, "http://fixture/list/top");
    }

    #[test]
    fn test_absolute_template_and_book_context() {
        let mut book = Book::new("http://fixture/book/7", "http://fixture");
        book.name = "Dune".to_string();
        let ctx = RequestContext::new("http://fixture").with_book(&book);

        let req = build("{{tocUrl}}?from={{bookName}}", &ctx).unwrap();
        assert_eq!(req.url, "http://fixture/book/7?from=Dune");
    }

    #[test]
    fn test_template_errors() {
        let ctx = RequestContext::new("http://fixture").with_page(1);
        assert!(build("/search?q={{key}}", &ctx).is_err());
        assert!(build("/search?q={{nope}}", &search_ctx()).is_err());
        assert!(build("/search?q={{key", &search_ctx()).is_err());
        assert!(build("/search?q={key", &search_ctx()).is_err());
        assert!(build(r#"/search,{"method": "PUT"}"#, &search_ctx()).is_err());
        assert!(build(r#"/search,{"method": "#, &search_ctx()).is_err());
    }

    #[test]
    fn test_page_offset_overflow_is_a_template_error() {
        let err = build("/list/{{page+9223372036854775807}}", &search_ctx()).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(build("/list/{{page+99999999999999999999}}", &search_ctx()).is_err());
    }

    #[test]
    fn test_malformed_profile_header_is_a_template_error() {
        let mut profile = SourceProfile::new("http://fixture");
        profile.header = Some(HeaderTemplate::Raw("{oops".to_string()));
        let config = FetchConfig::default();
        let err = RequestBuilder::new(&profile, &config)
            .build("/x", &RequestContext::new("http://fixture"))
            .unwrap_err();
        assert!(err.message.contains("header"));
    }

    #[test]
    fn test_split_options_ignores_commas_in_url() {
        assert_eq!(split_options("/a?x=1,2"), ("/a?x=1,2", None));
        assert_eq!(split_options("/a,{\"method\":\"POST\"}"), ("/a", Some("{\"method\":\"POST\"}")));
        assert_eq!(split_options("/a?ids={{key}},{{page}}"), ("/a?ids={{key}},{{page}}", None));
    }
}

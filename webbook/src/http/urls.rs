use url::Url;

/// Resolves `href` against `base`.
///
/// Absolute links are returned unchanged; blank links resolve to an empty
/// string; links that cannot be resolved are returned trimmed.
#[must_use]
pub fn resolve_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if Url::parse(href).is_ok() {
        return href.to_string();
    }
    Url::parse(base.trim())
        .and_then(|base| base.join(href))
        .map_or_else(|_| href.to_string(), String::from)
}

/// Form-url-encodes a value (`a b&c` becomes `a+b%26c`).
#[must_use]
pub fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

//! Search and explore result lists.

use regex::Regex;

use super::book_info::fill_info;
use super::ExtractEnv;
use crate::errors::{ExtractionFieldError, Result, WebBookError};
use crate::models::{calculate_relevance_score, sort_by_relevance, Book, ListKind, SearchBook};
use crate::profile::{non_empty, BookListRule};
use crate::rules::{Node, RuleEvaluator};

/// Extracts the result list of a search or explore page.
///
/// A page whose final URL matches the profile's `book_url_pattern` is a
/// detail page the source redirected to; it yields a single result parsed
/// with the detail rules. The same happens when the list rule selects
/// nothing and no pattern is configured. Entries keep document order unless
/// the list rule reverses it or relevance sorting is enabled.
pub fn analyze_book_list(
    env: &ExtractEnv,
    body: &str,
    final_url: &str,
    list_kind: ListKind,
    key: Option<&str>,
) -> Result<Vec<SearchBook>> {
    let doc = env.document(body)?;
    let ev = env.evaluator(final_url);
    let root = doc.root();
    let profile = &env.profile;

    let pattern = non_empty(profile.book_url_pattern.as_deref())
        .map(Regex::new)
        .transpose()
        .map_err(|e| WebBookError::profile(format!("invalid bookUrlPattern: {e}")))?;

    if pattern.as_ref().is_some_and(|p| p.is_match(final_url)) {
        env.tracer.log("≡ url matches bookUrlPattern, parsing as a detail page");
        return Ok(vec![detail_entry(env, &ev, &root, final_url, list_kind, key)]);
    }

    let rule = profile.list_rule(list_kind == ListKind::Explore);
    let entries = match non_empty(rule.book_list.as_deref()) {
        Some(list_rule) => match ev.list(list_rule, &root) {
            Ok(list) => list,
            Err(e) => {
                env.tracer
                    .field_error(&ExtractionFieldError::new("bookList", list_rule, e.message));
                return Ok(Vec::new());
            }
        },
        None => {
            env.tracer.log("≡ no list rule");
            return Ok(Vec::new());
        }
    };

    if entries.nodes.is_empty() {
        if pattern.is_none() && has_detail_rules(env) {
            env.tracer.log("≡ list is empty, trying the page as a detail page");
            let entry = detail_entry(env, &ev, &root, final_url, list_kind, key);
            if !entry.name.is_empty() {
                return Ok(vec![entry]);
            }
        }
        env.tracer.log("≡ list is empty");
        return Ok(Vec::new());
    }

    env.tracer.log(format!("≡ found {} entries", entries.nodes.len()));
    let mut books = Vec::with_capacity(entries.nodes.len());
    for (index, node) in entries.nodes.iter().enumerate() {
        env.check_cancelled()?;
        books.push(list_entry(env, &ev, rule, node, final_url, list_kind, key, index == 0));
    }

    if entries.reverse {
        env.tracer.log("≡ reversing the list");
        books.reverse();
    }
    if list_kind == ListKind::Search && env.config.sort_search_by_relevance && key.is_some() {
        sort_by_relevance(&mut books);
    }

    env.tracer.log(format!("◇ {} results", books.len()));
    Ok(books)
}

#[allow(clippy::too_many_arguments)]
fn list_entry(
    env: &ExtractEnv,
    ev: &RuleEvaluator<'_>,
    rule: &BookListRule,
    node: &Node<'_>,
    final_url: &str,
    list_kind: ListKind,
    key: Option<&str>,
    trace: bool,
) -> SearchBook {
    let profile = &env.profile;
    let field = |name: &str, r: Option<&String>| {
        let value = env.text(ev, name, r.map(String::as_str), node);
        if trace {
            env.trace_field(name, &value);
        }
        value
    };

    let mut book = SearchBook {
        name: field("name", rule.name.as_ref()),
        author: field("author", rule.author.as_ref()),
        kind: field("kind", rule.kind.as_ref()).replace('\n', ","),
        word_count: field("wordCount", rule.word_count.as_ref()),
        latest_chapter_title: field("lastChapter", rule.last_chapter.as_ref()),
        update_time: field("updateTime", rule.update_time.as_ref()),
        intro: field("intro", rule.intro.as_ref()),
        cover_url: env.url(ev, "coverUrl", rule.cover_url.as_deref(), node),
        book_url: env.url(ev, "bookUrl", rule.book_url.as_deref(), node),
        origin: profile.source_url.clone(),
        origin_name: profile.display_name().to_string(),
        book_type: profile.source_type,
        list_kind,
        relevance: None,
    };

    if book.book_url.is_empty() {
        book.book_url = final_url.to_string();
    }
    if trace {
        env.trace_field("bookUrl", &book.book_url);
    }
    if list_kind == ListKind::Search {
        book.relevance = key.map(|k| calculate_relevance_score(&book, k));
    }
    book
}

fn detail_entry(
    env: &ExtractEnv,
    ev: &RuleEvaluator<'_>,
    root: &Node<'_>,
    final_url: &str,
    list_kind: ListKind,
    key: Option<&str>,
) -> SearchBook {
    let profile = &env.profile;
    let mut book = Book::new(final_url, profile.source_url.as_str());
    book.origin_name = profile.display_name().to_string();
    book.book_type = profile.source_type;
    fill_info(env, ev, root, &mut book);

    let mut entry = SearchBook::from_book(&book, list_kind);
    if list_kind == ListKind::Search {
        entry.relevance = key.map(|k| calculate_relevance_score(&entry, k));
    }
    entry
}

fn has_detail_rules(env: &ExtractEnv) -> bool {
    non_empty(env.profile.rule_book_info.name.as_deref()).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::extract::test_env::env;
    use crate::profile::SourceProfile;
    use crate::testing::{book_page, fixture_profile, search_page};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entries_in_document_order() {
        let (env, _) = env(fixture_profile(), "search");
        let body = search_page(&[("Dune", "Frank Herbert", "/book/1"), ("Emma", "Jane Austen", "book/2")]);

        let books = analyze_book_list(&env, &body, "http://fixture/search/", ListKind::Search, Some("dune")).unwrap();

        assert_eq!(books.len(), 2);
        assert_eq!(books[0].name, "Dune");
        assert_eq!(books[0].author, "Frank Herbert");
        assert_eq!(books[0].book_url, "http://fixture/book/1");
        assert_eq!(books[1].book_url, "http://fixture/search/book/2");
        assert_eq!(books[0].origin, "http://fixture");
        assert_eq!(books[0].origin_name, "Fixture");
        assert_eq!(books[0].relevance, Some(1.0));
        assert!(books.iter().all(|b| b.list_kind == ListKind::Search));
    }

    #[test]
    fn test_malformed_entry_keeps_the_list() {
        let (env, _) = env(fixture_profile(), "search");
        let body = r#"<html><body>
            <div class="result"><a class="name" href="/book/1">One</a></div>
            <div class="result"><a class="name" href="/book/2">Two</a></div>
            <div class="result"><span>no link, no name</span></div>
            <div class="result"><a class="name" href="/book/4">Four</a></div>
        </body></html>"#;

        let books = analyze_book_list(&env, body, "http://fixture/search", ListKind::Search, None).unwrap();

        assert_eq!(books.len(), 4);
        assert_eq!(books[2].name, "");
        assert_eq!(books[2].book_url, "http://fixture/search");
        assert_eq!(books[3].name, "Four");
    }

    #[test]
    fn test_field_error_is_traced_not_fatal() {
        let mut profile = fixture_profile();
        profile.rule_search.author = Some("@regex:[".into());
        let (env, sink) = env(profile, "search");
        let body = search_page(&[("Dune", "Frank Herbert", "/book/1")]);

        let books = analyze_book_list(&env, &body, "http://fixture/search", ListKind::Search, None).unwrap();

        assert_eq!(books[0].name, "Dune");
        assert_eq!(books[0].author, "");
        assert!(sink.messages().iter().any(|m| m.contains("field 'author' failed")));
    }

    #[test]
    fn test_detail_page_by_pattern() {
        let (env, _) = env(fixture_profile(), "search");
        let body = book_page("Dune", "Frank Herbert", "/book/1/toc");

        let books = analyze_book_list(&env, &body, "http://fixture/book/1", ListKind::Search, Some("dune")).unwrap();

        assert_eq!(books.len(), 1);
        assert_eq!(books[0].name, "Dune");
        assert_eq!(books[0].book_url, "http://fixture/book/1");
        assert_eq!(books[0].kind, "Science Fiction");
    }

    #[test]
    fn test_empty_list_falls_back_to_detail_rules() {
        let mut profile = fixture_profile();
        profile.book_url_pattern = None;
        let (env, _) = env(profile, "search");
        let body = book_page("Dune", "Frank Herbert", "/book/1/toc");

        let books = analyze_book_list(&env, &body, "http://fixture/b?id=1", ListKind::Search, None).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].book_url, "http://fixture/b?id=1");

        let none = analyze_book_list(&env, "<html><body></body></html>", "http://fixture/s", ListKind::Search, None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_explore_uses_search_rules_and_reverse() {
        let mut profile = fixture_profile();
        profile.rule_search.book_list = Some("-div.result".into());
        let (env, _) = env(profile, "explore");
        let body = search_page(&[("A", "x", "/book/1"), ("B", "y", "/book/2"), ("C", "z", "/book/3")]);

        let books = analyze_book_list(&env, &body, "http://fixture/list/1", ListKind::Explore, None).unwrap();

        let names: Vec<&str> = books.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);
        assert!(books.iter().all(|b| b.list_kind == ListKind::Explore && b.relevance.is_none()));
    }

    #[test]
    fn test_relevance_sort_is_opt_in() {
        let (mut env, _) = env(fixture_profile(), "search");
        let body = search_page(&[("Emma", "Jane Austen", "/book/2"), ("Dune", "Frank Herbert", "/book/1")]);

        let books = analyze_book_list(&env, &body, "http://fixture/s", ListKind::Search, Some("dune")).unwrap();
        assert_eq!(books[0].name, "Emma");

        env.config = PipelineConfig::default().with_relevance_sort(true);
        let books = analyze_book_list(&env, &body, "http://fixture/s", ListKind::Search, Some("dune")).unwrap();
        assert_eq!(books[0].name, "Dune");
    }

    #[test]
    fn test_json_list() {
        let mut profile = SourceProfile::new("http://fixture");
        profile.rule_search.book_list = Some("$.data[*]".into());
        profile.rule_search.name = Some("$.title".into());
        profile.rule_search.book_url = Some("$.id@js:\"/book/\" + result".into());
        let (env, _) = env(profile, "search");

        let books = analyze_book_list(
            &env,
            r#"{"data": [{"title": "Dune", "id": 1}, {"title": "Emma", "id": 2}]}"#,
            "http://fixture/api/search",
            ListKind::Search,
            None,
        )
        .unwrap();

        assert_eq!(books.len(), 2);
        assert_eq!(books[1].name, "Emma");
        // Scripts are unavailable in this environment; the URL falls back to the page.
        assert_eq!(books[1].book_url, "http://fixture/api/search");
    }

    #[test]
    fn test_invalid_pattern_is_profile_error() {
        let mut profile = fixture_profile();
        profile.book_url_pattern = Some("(".into());
        let (env, _) = env(profile, "search");

        let err = analyze_book_list(&env, "<p>x</p>", "http://fixture/s", ListKind::Search, None).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Profile);
    }
}

//! Detail page extraction.

use super::ExtractEnv;
use crate::errors::{ExtractionFieldError, Result};
use crate::models::Book;
use crate::profile::non_empty;
use crate::rules::{Node, RuleEvaluator};

/// Fills `book` from its detail page.
///
/// Fields are only overwritten with non-empty values, so metadata carried
/// over from a search result survives a sparse detail page. The toc URL
/// defaults to the book URL; when both are the same page, the body is kept
/// as the cached toc body.
pub fn analyze_book_info(env: &ExtractEnv, book: &mut Book, body: &str, final_url: &str) -> Result<()> {
    let doc = env.document(body)?;
    let ev = env.evaluator(final_url);
    let root = doc.root();
    let node = narrow(env, &ev, &root);

    env.tracer.log("≡ parsing book info");
    fill_info(env, &ev, &node, book);
    env.check_cancelled()?;

    let toc_url = env.url(&ev, "tocUrl", env.profile.rule_book_info.toc_url.as_deref(), &node);
    if toc_url.is_empty() {
        env.tracer.log("≡ no toc url, using the book url");
        book.toc_url.clone_from(&book.book_url);
    } else {
        env.trace_field("tocUrl", &toc_url);
        book.toc_url = toc_url;
    }

    if book.toc_url == book.book_url {
        book.toc_html = Some(body.to_string());
    }
    Ok(())
}

/// Applies the `init` rule, falling back to the whole document.
fn narrow<'d>(env: &ExtractEnv, ev: &RuleEvaluator<'_>, root: &Node<'d>) -> Node<'d> {
    let Some(init) = non_empty(env.profile.rule_book_info.init.as_deref()) else {
        return root.clone();
    };
    match ev.first(init, root) {
        Ok(Some(node)) => {
            env.tracer.log("≡ init rule narrowed the page");
            node
        }
        Ok(None) => root.clone(),
        Err(e) => {
            env.tracer
                .field_error(&ExtractionFieldError::new("init", init, e.message));
            root.clone()
        }
    }
}

/// Extracts the detail fields of `node` into `book`, leaving the toc URL alone.
pub(crate) fn fill_info(env: &ExtractEnv, ev: &RuleEvaluator<'_>, node: &Node<'_>, book: &mut Book) {
    let rule = &env.profile.rule_book_info;
    let fields: [(&str, Option<&str>, &mut String); 6] = [
        ("name", rule.name.as_deref(), &mut book.name),
        ("author", rule.author.as_deref(), &mut book.author),
        ("kind", rule.kind.as_deref(), &mut book.kind),
        ("wordCount", rule.word_count.as_deref(), &mut book.word_count),
        ("lastChapter", rule.last_chapter.as_deref(), &mut book.latest_chapter_title),
        ("updateTime", rule.update_time.as_deref(), &mut book.update_time),
    ];
    for (field, rule, slot) in fields {
        let value = env.text(ev, field, rule, node);
        if !value.is_empty() {
            env.trace_field(field, &value);
            *slot = if field == "kind" { value.replace('\n', ",") } else { value };
        }
    }

    let intro = env.text(ev, "intro", rule.intro.as_deref(), node);
    if !intro.is_empty() {
        env.trace_field("intro", &intro);
        book.intro = intro;
    }

    let cover = env.url(ev, "coverUrl", rule.cover_url.as_deref(), node);
    if !cover.is_empty() {
        env.trace_field("coverUrl", &cover);
        book.cover_url = cover;
    }
}

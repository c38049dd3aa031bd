use std::fmt::Write as _;

use crate::profile::SourceProfile;

/// Origin of the fixture source.
pub const FIXTURE_ORIGIN: &str = "http://fixture";

const FIXTURE_PROFILE: &str = r##"{
    "sourceUrl": "http://fixture",
    "sourceName": "Fixture",
    "searchUrl": "http://fixture/search?q={key}&p={page}",
    "exploreUrl": "Fantasy::/list/fantasy/{{page}}",
    "bookUrlPattern": "^http://fixture/book/\\d+$",
    "ruleSearch": {
        "bookList": "div.result",
        "name": "a.name@text",
        "author": ".author@text",
        "bookUrl": "a.name@href",
        "coverUrl": "img@src",
        "intro": ".intro@text",
        "lastChapter": ".latest@text"
    },
    "ruleBookInfo": {
        "name": "h1@text",
        "author": ".author@text",
        "intro": "#intro@text",
        "kind": ".kind@text",
        "coverUrl": "img.cover@src",
        "lastChapter": ".latest@text",
        "tocUrl": "a.toc@href"
    },
    "ruleToc": {
        "chapterList": "ul.toc li a",
        "chapterName": "@text",
        "chapterUrl": "@href",
        "nextTocUrl": "a.next@href"
    },
    "ruleContent": {
        "content": "#content@textNodes",
        "nextContentUrl": "a.next@href"
    }
}"##;

/// The fixture source: HTML pages under [`FIXTURE_ORIGIN`].
pub fn fixture_profile() -> SourceProfile {
    SourceProfile::from_json(FIXTURE_PROFILE).expect("fixture profile parses")
}

/// A search result page; entries are `(name, author, href)`.
pub fn search_page(entries: &[(&str, &str, &str)]) -> String {
    let mut html = String::from("<html><body><div class=\"results\">");
    for (name, author, href) in entries {
        let _ = write!(
            html,
            "<div class=\"result\"><a class=\"name\" href=\"{href}\">{name}</a>\
             <span class=\"author\">{author}</span><img src=\"/covers/{name}.jpg\"></div>"
        );
    }
    html.push_str("</div></body></html>");
    html
}

/// A detail page linking its table of contents at `toc_href`.
pub fn book_page(name: &str, author: &str, toc_href: &str) -> String {
    format!(
        "<html><body><h1>{name}</h1><span class=\"author\">{author}</span>\
         <span class=\"kind\">Science Fiction</span><p id=\"intro\">A desert planet.</p>\
         <img class=\"cover\" src=\"/covers/1.jpg\"><a class=\"toc\" href=\"{toc_href}\">Contents</a></body></html>"
    )
}

/// A table-of-contents page; chapters are `(title, href)`.
pub fn toc_page(chapters: &[(&str, &str)], next: Option<&str>) -> String {
    let mut html = String::from("<html><body><ul class=\"toc\">");
    for (title, href) in chapters {
        let _ = write!(html, "<li><a href=\"{href}\">{title}</a></li>");
    }
    html.push_str("</ul>");
    if let Some(next) = next {
        let _ = write!(html, "<a class=\"next\" href=\"{next}\">Next</a>");
    }
    html.push_str("</body></html>");
    html
}

/// A content page with one text line per entry.
pub fn chapter_page(lines: &[&str], next: Option<&str>) -> String {
    let mut html = String::from("<html><body><div id=\"content\">");
    html.push_str(&lines.join("<br>"));
    html.push_str("</div>");
    if let Some(next) = next {
        let _ = write!(html, "<a class=\"next\" href=\"{next}\">Next page</a>");
    }
    html.push_str("</body></html>");
    html
}

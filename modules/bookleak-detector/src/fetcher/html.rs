// Text extraction from fetched HTML.
//
// Everything here is pure: HTML string in, text out. The network side lives
// in `fetcher/mod.rs`.

use scraper::{ElementRef, Html, Selector};

/// Upper bound on the text handed to the judge, in characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Number of leading `<p>` elements sampled from the body.
const PARAGRAPH_LIMIT: usize = 5;

const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Title and opening paragraphs of a page, formatted for the judge.
/// Returns `None` when the page carries neither.
pub fn extract_page_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let title = first_text(&document, "title").unwrap_or_default();
    let body = select_all(&document, "p")
        .into_iter()
        .map(visible_text)
        .filter(|t| !t.is_empty())
        .take(PARAGRAPH_LIMIT)
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() && body.is_empty() {
        return None;
    }

    Some(truncate_chars(
        &format!("Title: {title}\n\nBody: {body}"),
        MAX_CONTENT_CHARS,
    ))
}

/// Open Graph / description meta tags, used when a platform page can only be
/// read from its `<head>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
}

impl PageMeta {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

pub fn extract_meta(html: &str) -> PageMeta {
    let document = Html::parse_document(html);

    let title = meta_content(&document, "property", "og:title")
        .or_else(|| meta_content(&document, "name", "twitter:title"))
        .or_else(|| first_text(&document, "title"));
    let description = meta_content(&document, "property", "og:description")
        .or_else(|| meta_content(&document, "name", "twitter:description"))
        .or_else(|| meta_content(&document, "name", "description"));
    let site_name = meta_content(&document, "property", "og:site_name");

    PageMeta {
        title,
        description,
        site_name,
    }
}

fn meta_content(document: &Html, attr: &str, key: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[{attr}="{key}"]"#)).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|c| !c.is_empty())
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    select_all(document, css)
        .into_iter()
        .map(visible_text)
        .find(|t| !t.is_empty())
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Text content of an element, skipping script/style subtrees.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_TAGS.contains(&el.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

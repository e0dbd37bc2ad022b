//! Turning article HTML into text the model can read.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use debrief_shared::{DebriefError, Result};

/// Elements whose text never counts as article content.
const SKIP_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Content containers tried in priority order before falling back to `<body>`.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    ".article-body",
    ".post-content",
    ".content",
];

/// All visible text of the document, one trimmed line per text line.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut raw = String::new();

    for node in doc.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| SKIP_TEXT_TAGS.contains(&el.name()))
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    normalize_lines(&raw)
}

/// Main content converted to Markdown, page chrome dropped.
pub fn extract_markdown(html: &str) -> Result<String> {
    let content_html = extract_content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
            "form",
        ])
        .build();

    let markdown = converter
        .convert(&content_html)
        .map_err(|e| DebriefError::parse(format!("htmd conversion failed: {e}")))?;

    Ok(collapse_blank_lines(markdown.trim()))
}

/// First `<h1>`, else the document `<title>`.
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    ["h1", "title"].iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        doc.select(&selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .find(|t| !t.is_empty())
    })
}

/// Extract the main content HTML, stripping chrome (nav, header, footer, etc.).
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    for sel_str in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    // Fallback: use <body> content
    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            return body.inner_html();
        }
    }

    html.to_string()
}

/// Trim every line and keep at most one blank line between paragraphs.
fn normalize_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && lines.last().is_none_or(|prev| prev.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Collapse runs of 3+ newlines into a single blank line.
fn collapse_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

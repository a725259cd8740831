//! Whitelist HTML sanitizer.
//!
//! Rich-text fields arrive as HTML. `purify` keeps a small set of
//! formatting tags, drops everything else (script-like elements together
//! with their content) and produces a plain-text rendition alongside the
//! cleaned markup.

use scraper::{ElementRef, Html, Node};

/// Plain-text and sanitized-HTML variants of one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Purified {
    pub text: String,
    pub html: String,
}

const ALLOWED: &[&str] = &[
    "p", "br", "b", "strong", "i", "em", "u", "s", "strike", "sub", "sup", "ul", "ol", "li", "a",
    "span", "div", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "code", "hr", "table",
    "thead", "tbody", "tr", "th", "td", "img",
];

const DROPPED_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "head", "title",
];

const VOID: &[&str] = &["br", "hr", "img"];

const BLOCK: &[&str] = &[
    "p", "br", "div", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "tr", "hr",
];

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn safe_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    match lower.split_once(':') {
        Some((scheme, _)) if !scheme.contains('/') => {
            matches!(scheme, "http" | "https" | "mailto")
        }
        _ => true,
    }
}

fn allowed_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "title"],
        "img" => &["src", "alt", "width", "height"],
        "td" | "th" => &["colspan", "rowspan"],
        _ => &[],
    }
}

fn walk(el: ElementRef<'_>, html: &mut String, text: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                html.push_str(&escape_html(t));
                text.push_str(t);
            }
            Node::Element(e) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let tag = e.name();
                if DROPPED_WITH_CONTENT.contains(&tag) {
                    continue;
                }
                if !ALLOWED.contains(&tag) {
                    walk(child_el, html, text);
                    continue;
                }

                html.push('<');
                html.push_str(tag);
                for name in allowed_attrs(tag) {
                    if let Some(value) = e.attr(name) {
                        if matches!(*name, "href" | "src") && !safe_url(value) {
                            continue;
                        }
                        html.push_str(&format!(" {}=\"{}\"", name, escape_html(value)));
                    }
                }
                if tag == "a" {
                    html.push_str(" rel=\"noopener\"");
                }
                html.push('>');

                if VOID.contains(&tag) {
                    if BLOCK.contains(&tag) {
                        text.push('\n');
                    }
                    continue;
                }
                walk(child_el, html, text);
                html.push_str(&format!("</{}>", tag));
                if BLOCK.contains(&tag) {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn normalize_text(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() && lines.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        lines.push(collapsed);
    }
    lines.join("\n").trim().to_string()
}

pub fn purify(input: &str) -> Purified {
    let fragment = Html::parse_fragment(input);
    let mut html = String::new();
    let mut text = String::new();
    walk(fragment.root_element(), &mut html, &mut text);
    Purified {
        text: normalize_text(&text),
        html: html.trim().to_string(),
    }
}

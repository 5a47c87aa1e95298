//! HTML link extraction and rewriting
//!
//! Links are discovered on the parsed document, in document order, and then
//! substituted in the original markup so everything the parser would not
//! round-trip (comments, whitespace, attribute order) is preserved.
use crate::process::css::{collect_css, rewrite_css};
use crate::process::LinkResolver;
use crate::state::ResourceKind;
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use std::sync::OnceLock;

/// Link-bearing attributes of an element
fn link_attributes(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" | "area" | "link" => &["href"],
        "img" | "source" => &["src", "srcset"],
        "script" | "iframe" | "frame" | "embed" | "input" | "track" | "audio" => &["src"],
        "video" => &["src", "poster"],
        "object" => &["data"],
        _ => &[],
    }
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(\s)(href|src|poster|data|srcset|style)(\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
        )
        .expect("valid attribute regex")
    })
}

/// Markup tokens whose attributes may be rewritten
///
/// Comments are matched so they are passed through whole; script and style
/// blocks are matched so their bodies are never read as tags.
fn markup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        const TAG: &str = r#"[^\s/>]*(?:[^>"']|"[^"]*"|'[^']*')*>"#;
        Regex::new(&format!(
            r"(?is)(?P<comment><!--.*?-->)|(?P<script_open><script\b{tag})(?P<script_body>.*?)(?P<script_close></script\s*>)|(?P<style_open><style\b{tag})(?P<style_body>.*?)(?P<style_close></style\s*>)|(?P<tag><[a-z]{tag})",
            tag = TAG
        ))
        .expect("valid markup regex")
    })
}

/// URL candidates of a `srcset` value
fn srcset_urls(srcset: &str) -> impl Iterator<Item = &str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
}

fn is_stylesheet(rel: Option<&str>) -> bool {
    rel.is_some_and(|rel| {
        rel.split_whitespace()
            .any(|r| r.eq_ignore_ascii_case("stylesheet"))
    })
}

/// Visits every link in the document, in document order
pub fn collect_html(resolver: &mut LinkResolver<'_>, html: &str) {
    let document = Html::parse_document(html);

    let Ok(selector) = Selector::parse("*") else {
        return;
    };

    for element in document.select(&selector) {
        let node = element.value();
        let tag = node.name();

        if tag == "style" {
            let css: String = element.text().collect();
            collect_css(resolver, &css);
        }

        for attr in link_attributes(tag) {
            let Some(value) = node.attr(attr) else {
                continue;
            };

            if *attr == "srcset" {
                for url in srcset_urls(value) {
                    resolver.visit(url, Some(tag), None);
                }
                continue;
            }

            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            let hint = (tag == "link" && is_stylesheet(node.attr("rel")))
                .then_some(ResourceKind::Css);
            resolver.visit(value, Some(tag), hint);
        }

        if let Some(style) = node.attr("style") {
            collect_css(resolver, style);
        }
    }
}

/// Character referenced by an entity body (the text between `&` and `;`)
fn entity_char(entity: &str) -> Option<char> {
    let code = match entity.strip_prefix('#') {
        Some(num) => match num.strip_prefix(|c: char| c == 'x' || c == 'X') {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        },
        None => {
            return match entity {
                "quot" => Some('"'),
                "apos" => Some('\''),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "nbsp" => Some('\u{a0}'),
                _ => None,
            }
        }
    };
    char::from_u32(code)
}

/// Decodes character references in an attribute value; unknown ones are kept
fn decode_entities(value: &str) -> String {
    let mut decoded = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        rest = &rest[start..];

        let entity = rest[1..]
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| entity_char(&rest[1..=end]).map(|c| (c, end + 2)));
        match entity {
            Some((c, len)) => {
                decoded.push(c);
                rest = &rest[len..];
            }
            None => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }

    decoded.push_str(rest);
    decoded
}

fn escape_attribute(value: &str, quote: char) -> String {
    let escaped = value.replace('&', "&amp;");
    match quote {
        '\'' => escaped.replace('\'', "&#39;"),
        _ => escaped.replace('"', "&quot;"),
    }
}

/// New value for one attribute, or `None` to leave it as written
fn rewrite_attribute(resolver: &LinkResolver<'_>, name: &str, value: &str) -> Option<String> {
    match name {
        "style" => {
            let rewritten = rewrite_css(resolver, value);
            (rewritten != value).then_some(rewritten)
        }
        "srcset" => {
            let mut changed = false;
            let candidates: Vec<String> = value
                .split(',')
                .map(|candidate| {
                    let trimmed = candidate.trim();
                    let (url, descriptor) = match trimmed.split_once(char::is_whitespace) {
                        Some((url, descriptor)) => (url, Some(descriptor.trim())),
                        None => (trimmed, None),
                    };
                    let url = match resolver.replacement(url) {
                        Some(replacement) => {
                            changed = true;
                            replacement
                        }
                        None => url.to_string(),
                    };
                    match descriptor {
                        Some(d) if !d.is_empty() => format!("{} {}", url, d),
                        _ => url.to_string(),
                    }
                })
                .collect();
            changed.then(|| candidates.join(", "))
        }
        _ => resolver.replacement(value.trim()),
    }
}

/// Rewrites the link-bearing attributes of one start tag
fn rewrite_tag(resolver: &LinkResolver<'_>, tag: &str) -> String {
    attribute_re()
        .replace_all(tag, |caps: &Captures<'_>| {
            let (raw, quote) = match (caps.get(4), caps.get(5), caps.get(6)) {
                (Some(m), _, _) => (m.as_str(), '"'),
                (_, Some(m), _) => (m.as_str(), '\''),
                (_, _, Some(m)) => (m.as_str(), '"'),
                _ => return caps[0].to_string(),
            };

            let name = caps[2].to_ascii_lowercase();
            match rewrite_attribute(resolver, &name, &decode_entities(raw)) {
                Some(value) => format!(
                    "{}{}{}{}{}{}",
                    &caps[1],
                    &caps[2],
                    &caps[3],
                    quote,
                    escape_attribute(&value, quote),
                    quote
                ),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Returns the document with each link visited by [`collect_html`] replaced
/// by its local reference
///
/// Only start tags and `<style>` bodies are rewritten; comments and script
/// bodies are copied as written.
pub fn rewrite_html(resolver: &LinkResolver<'_>, html: &str) -> String {
    markup_re()
        .replace_all(html, |caps: &Captures<'_>| {
            if let Some(tag) = caps.name("tag") {
                return rewrite_tag(resolver, tag.as_str());
            }
            if let Some(open) = caps.name("script_open") {
                return format!(
                    "{}{}{}",
                    rewrite_tag(resolver, open.as_str()),
                    &caps["script_body"],
                    &caps["script_close"]
                );
            }
            if let Some(open) = caps.name("style_open") {
                return format!(
                    "{}{}{}",
                    rewrite_tag(resolver, open.as_str()),
                    rewrite_css(resolver, &caps["style_body"]),
                    &caps["style_close"]
                );
            }
            caps[0].to_string()
        })
        .into_owned()
}

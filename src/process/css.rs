//! Stylesheet link extraction and rewriting
use crate::process::LinkResolver;
use crate::state::ResourceKind;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// `@import "x.css"` / `@import 'x.css'`
fn import_string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)@import\s+(?:"([^"]*)"|'([^']*)')"#).expect("valid import regex")
    })
}

/// `@import url(x.css)` in any quoting
fn import_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)@import\s+url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"\s]*))\s*\)"#)
            .expect("valid import url regex")
    })
}

/// `url(x)` in any quoting
fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"\s]*))\s*\)"#)
            .expect("valid url regex")
    })
}

/// The quoted or bare value of a match, with the quote character used
fn captured_value<'t>(caps: &Captures<'t>) -> Option<(&'t str, Option<char>)> {
    if let Some(m) = caps.get(1) {
        return Some((m.as_str(), Some('"')));
    }
    if let Some(m) = caps.get(2) {
        return Some((m.as_str(), Some('\'')));
    }
    caps.get(3).map(|m| (m.as_str(), None))
}

/// Feeds every stylesheet reference in `css` to the resolver
///
/// Imports are visited first so an imported sheet is classified as CSS even
/// when the same address also appears in a plain `url()`.
pub fn collect_css(resolver: &mut LinkResolver<'_>, css: &str) {
    for caps in import_string_re()
        .captures_iter(css)
        .chain(import_url_re().captures_iter(css))
    {
        if let Some((value, _)) = captured_value(&caps) {
            let value = value.trim();
            if !value.is_empty() {
                resolver.visit(value, None, Some(ResourceKind::Css));
            }
        }
    }

    for caps in url_re().captures_iter(css) {
        if let Some((value, _)) = captured_value(&caps) {
            let value = value.trim();
            if !value.is_empty() {
                resolver.visit(value, None, None);
            }
        }
    }
}

/// Rewrites every reference the resolver has a replacement for
///
/// References left untouched are those that were skipped or never visited.
pub fn rewrite_css(resolver: &LinkResolver<'_>, css: &str) -> String {
    let rewritten = import_string_re().replace_all(css, |caps: &Captures<'_>| {
        let original = caps[0].to_string();
        match captured_value(caps) {
            Some((value, quote)) => match resolver.replacement(value.trim()) {
                Some(replacement) => {
                    let q = quote.unwrap_or('"');
                    format!("@import {}{}{}", q, replacement, q)
                }
                None => original,
            },
            None => original,
        }
    });

    let rewritten = url_re().replace_all(&rewritten, |caps: &Captures<'_>| {
        let original = caps[0].to_string();
        match captured_value(caps) {
            Some((value, quote)) => match resolver.replacement(value.trim()) {
                Some(replacement) => match quote {
                    Some(q) => format!("url({}{}{})", q, replacement, q),
                    None => format!("url({})", replacement),
                },
                None => original,
            },
            None => original,
        }
    });

    rewritten.into_owned()
}

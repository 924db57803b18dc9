//! Markup stripping and whitespace normalization for inbound text fragments.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
/// A whole `&amp;amp;...lt;` chain matches at once and decodes to its last entity.
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:amp;)*(nbsp|amp|lt|gt);").expect("valid entity regex")
});
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Strip tags, decode `&nbsp;`/`&amp;`/`&lt;`/`&gt;`, collapse whitespace and trim.
///
/// Decoded `&lt;`/`&gt;` can form new tags, so the pass is repeated until the
/// text stops changing. A changing pass always shortens the text, and entity
/// chains collapse in one match, so this settles within a few passes. The
/// result is a fixed point: `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(text: &str) -> String {
    let mut current = clean_pass(text);
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_pass(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let without_tags = TAG_RE.replace_all(text, " ");
    let decoded = ENTITY_RE.replace_all(&without_tags, |caps: &Captures| match &caps[1] {
        "nbsp" => " ",
        "amp" => "&",
        "lt" => "<",
        _ => ">",
    });
    let collapsed = WHITESPACE_RE.replace_all(&decoded, " ");
    collapsed.trim().to_string()
}

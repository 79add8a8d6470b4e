use std::fmt;

use crate::registry::PlatformCategory;

use super::models::{ContentContext, ContentLimits, LinkStyle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    TooShort { len: usize, min: usize },
    TooLong { len: usize, max: usize },
    MissingLink,
    RepeatedLink { url: usize, anchor: usize },
    PromptEcho,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Empty => f.write_str("empty text"),
            Rejection::TooShort { len, min } => write!(f, "{len} chars, minimum {min}"),
            Rejection::TooLong { len, max } => write!(f, "{len} chars, maximum {max}"),
            Rejection::MissingLink => f.write_str("target url missing"),
            Rejection::RepeatedLink { url, anchor } => {
                write!(f, "link repeated (url {url}x, anchor {anchor}x)")
            }
            Rejection::PromptEcho => f.write_str("prompt text echoed"),
        }
    }
}

/// Non-overlapping, case-insensitive occurrences of `needle`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .to_lowercase()
        .matches(&needle.to_lowercase())
        .count()
}

/// How often the target URL and the anchor text appear. Anchor matches that
/// are part of the URL itself are not counted.
pub fn link_counts(text: &str, context: &ContentContext) -> (usize, usize) {
    let lowered = text.to_lowercase();
    let url = context.target_url.to_lowercase();
    let url_count = count_occurrences(&lowered, &url);
    let anchor = context.anchor.trim().to_lowercase();
    let anchor_count = if anchor.is_empty() || anchor == url {
        0
    } else {
        count_occurrences(&lowered.replace(&url, " "), &anchor)
    };
    (url_count, anchor_count)
}

pub fn detect_link_style(text: &str, context: &ContentContext) -> LinkStyle {
    let lowered = text.to_lowercase();
    let url = context.target_url.to_lowercase();
    if lowered.contains(&format!("href=\"{url}\"")) || lowered.contains(&format!("href='{url}'")) {
        LinkStyle::Anchor
    } else {
        LinkStyle::PlainText
    }
}

/// Checks generated text against length bounds, link placement rules and
/// prompt leakage. Returns the link style found in the text.
pub fn validate(
    text: &str,
    category: PlatformCategory,
    limits: &ContentLimits,
    context: &ContentContext,
    prompt_lines: &[&str],
) -> Result<LinkStyle, Rejection> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Rejection::Empty);
    }
    let len = trimmed.chars().count();
    if len < limits.min_chars {
        return Err(Rejection::TooShort {
            len,
            min: limits.min_chars,
        });
    }
    if len > limits.max_chars {
        return Err(Rejection::TooLong {
            len,
            max: limits.max_chars,
        });
    }
    let (url_count, anchor_count) = link_counts(trimmed, context);
    if url_count == 0 {
        return Err(Rejection::MissingLink);
    }
    if category.is_short_form() && (url_count > 1 || anchor_count > 1) {
        return Err(Rejection::RepeatedLink {
            url: url_count,
            anchor: anchor_count,
        });
    }
    let lowered = trimmed.to_lowercase();
    if prompt_lines
        .iter()
        .any(|line| lowered.contains(&line.to_lowercase()))
    {
        return Err(Rejection::PromptEcho);
    }
    Ok(detect_link_style(trimmed, context))
}

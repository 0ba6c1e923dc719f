use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([^\s#]+)").unwrap());

/// Emphasis delimiters that may wrap a rendered hashtag, e.g. `**#news**`.
const WRAPPERS: &[char] = &['*', '_', '~', '|', '`'];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    pub heading: Option<String>,
    pub body: Option<String>,
    pub tags: Vec<String>,
}

pub fn extract(text: Option<&str>) -> Fields {
    match text {
        Some(t) if !t.trim().is_empty() => Fields {
            heading: extract_heading(t),
            body: extract_body(t),
            tags: extract_tags(t),
        },
        _ => Fields::default(),
    }
}

/// First line, cut at the first `\n` or `\r`.
pub fn extract_heading(text: &str) -> Option<String> {
    let first = text.split(['\n', '\r']).next()?;
    non_empty(first.trim())
}

/// Hashtags from the last line only, `#` stripped, in order, duplicates kept.
pub fn extract_tags(text: &str) -> Vec<String> {
    text.trim().lines().last().map(tag_tokens).unwrap_or_default()
}

/// Everything between the heading and a trailing hashtag line.
///
/// A single-line message is its own body. The last line is only dropped
/// when it actually carries a tag.
pub fn extract_body(text: &str) -> Option<String> {
    let trimmed = text.trim_end();
    let lines: Vec<&str> = trimmed.lines().collect();
    if lines.len() <= 1 {
        return non_empty(trimmed.trim());
    }

    let mut rest = &lines[1..];
    if let Some((last, init)) = rest.split_last() {
        if has_tag(last) {
            rest = init;
        }
    }
    non_empty(rest.join("\n").trim())
}

pub fn has_tag(line: &str) -> bool {
    !tag_tokens(line).is_empty()
}

fn tag_tokens(line: &str) -> Vec<String> {
    line.split_whitespace()
        .flat_map(|token| {
            TAG_RE
                .captures_iter(unwrap_token(token))
                .filter_map(|caps| Some(caps.get(1)?.as_str().to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Strip a leading delimiter run and its mirror at the end, so `**#x**`
/// yields `#x` while `#x_` is left alone.
fn unwrap_token(token: &str) -> &str {
    let inner = token.trim_start_matches(WRAPPERS);
    let opening = &token[..token.len() - inner.len()];
    if opening.is_empty() {
        return token;
    }
    let closing: String = opening.chars().rev().collect();
    inner.strip_suffix(closing.as_str()).unwrap_or(inner)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_body_tags() {
        let f = extract(Some("Title\nSome body\n#tag1 #tag2"));
        assert_eq!(f.heading.as_deref(), Some("Title"));
        assert_eq!(f.body.as_deref(), Some("Some body"));
        assert_eq!(f.tags, vec!["tag1", "tag2"]);
    }

    #[test]
    fn trailing_line_without_tags_stays_in_body() {
        let f = extract(Some("Title\nJust one line, no tags"));
        assert_eq!(f.heading.as_deref(), Some("Title"));
        assert_eq!(f.body.as_deref(), Some("Just one line, no tags"));
        assert!(f.tags.is_empty());
    }

    #[test]
    fn single_line_is_heading_and_body() {
        let f = extract(Some("  Only a heading  "));
        assert_eq!(f.heading.as_deref(), Some("Only a heading"));
        assert_eq!(f.body.as_deref(), Some("Only a heading"));
    }

    #[test]
    fn empty_or_missing_text() {
        assert_eq!(extract(None), Fields::default());
        assert_eq!(extract(Some("  \n ")), Fields::default());
    }

    #[test]
    fn heading_and_tag_line_only() {
        let f = extract(Some("Title\n#a #b"));
        assert_eq!(f.body, None);
        assert_eq!(f.tags, vec!["a", "b"]);
    }

    #[test]
    fn blank_first_line_has_no_heading() {
        let f = extract(Some("\nSecond line\nthird"));
        assert_eq!(f.heading, None);
        assert_eq!(f.body.as_deref(), Some("Second line\nthird"));
    }

    #[test]
    fn tags_only_from_last_line() {
        let tags = extract_tags("Title #early\nbody #mid\nclosing #x #y #x");
        assert_eq!(tags, vec!["x", "y", "x"]);
    }

    #[test]
    fn rendered_hashtags_are_recognised() {
        let f = extract(Some("**News**\nSomething happened\n**#world** **#politics**"));
        assert_eq!(f.tags, vec!["world", "politics"]);
        assert_eq!(f.body.as_deref(), Some("Something happened"));
    }

    #[test]
    fn trailing_delimiters_belong_to_unwrapped_tags() {
        let f = extract(Some("Title\nbody\n#rust_ #__init__ **#news** #a*b"));
        assert_eq!(f.tags, vec!["rust_", "__init__", "news", "a*b"]);
        assert_eq!(f.body.as_deref(), Some("body"));
    }

    #[test]
    fn adjacent_tags_split_on_hash() {
        assert_eq!(extract_tags("#one#two"), vec!["one", "two"]);
        assert!(extract_tags("a lone # sign").is_empty());
    }

    #[test]
    fn crlf_lines() {
        let f = extract(Some("Title\r\nline one\r\nline two\r\n#t\r\n"));
        assert_eq!(f.heading.as_deref(), Some("Title"));
        assert_eq!(f.body.as_deref(), Some("line one\nline two"));
        assert_eq!(f.tags, vec!["t"]);
    }
}

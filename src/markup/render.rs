use super::ranges::{RangeKind, ResolvedRange, SkipReason, SkippedRange};

/// Link bases for mention markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupOptions {
    pub profile_base: String,
    pub user_deeplink: String,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        MarkupOptions {
            profile_base: "https://t.me".to_string(),
            user_deeplink: "tg://user".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub skipped: Vec<SkippedRange>,
}

/// Splice markdown for each range into `text`.
///
/// Ranges are applied in the given order. Each offset is shifted by the
/// drift, the number of UTF-16 units earlier replacements added. A range
/// that no longer fits the current text, or whose bounds would cut a
/// surrogate pair, is left as-is and reported in `skipped`.
pub fn render(text: &str, ranges: &[ResolvedRange], options: &MarkupOptions) -> Rendered {
    if ranges.is_empty() {
        return Rendered {
            text: text.to_string(),
            skipped: Vec::new(),
        };
    }

    let mut units: Vec<u16> = text.encode_utf16().collect();
    let mut skipped = Vec::new();

    ranges.iter().fold(0usize, |drift, resolved| {
        match splice(&mut units, resolved, drift, options) {
            Ok(added) => drift + added,
            Err(reason) => {
                skipped.push(SkippedRange {
                    kind: resolved.range.kind.name().to_string(),
                    offset: resolved.range.offset as i64,
                    length: resolved.range.length as i64,
                    reason,
                });
                drift
            }
        }
    });

    Rendered {
        text: String::from_utf16_lossy(&units),
        skipped,
    }
}

/// Replace one fragment in place and return how many units it added.
fn splice(
    units: &mut Vec<u16>,
    resolved: &ResolvedRange,
    drift: usize,
    options: &MarkupOptions,
) -> Result<usize, SkipReason> {
    let start = resolved.range.offset + drift;
    let end = start + resolved.range.length;
    if end > units.len() {
        return Err(SkipReason::OutOfBounds);
    }
    if splits_pair(units, start) || splits_pair(units, end) {
        return Err(SkipReason::SplitsSurrogate);
    }

    let fragment = String::from_utf16(&units[start..end]).map_err(|_| SkipReason::SplitsSurrogate)?;
    let replacement: Vec<u16> = markup(resolved, &fragment, options).encode_utf16().collect();
    let added = replacement.len().saturating_sub(end - start);
    units.splice(start..end, replacement);
    Ok(added)
}

/// True when `at` falls between the high and low half of a surrogate pair.
fn splits_pair(units: &[u16], at: usize) -> bool {
    at > 0
        && at < units.len()
        && (0xDC00..=0xDFFF).contains(&units[at])
        && (0xD800..=0xDBFF).contains(&units[at - 1])
}

fn markup(resolved: &ResolvedRange, f: &str, options: &MarkupOptions) -> String {
    let label = if resolved.bold_wrapped {
        format!("**{f}**")
    } else {
        f.to_string()
    };

    match &resolved.range.kind {
        RangeKind::Bold | RangeKind::Hashtag => format!("**{f}**"),
        RangeKind::Italic => format!("*{f}*"),
        RangeKind::Code => format!("`{f}`"),
        RangeKind::PreBlock => format!("```\n{f}\n```"),
        RangeKind::Strikethrough => format!("~~{f}~~"),
        RangeKind::Underline => format!("__{f}__"),
        RangeKind::Spoiler => format!("||{f}||"),
        RangeKind::Url => format!("[{label}]({f})"),
        RangeKind::TextUrl { url } => format!("[{label}]({url})"),
        RangeKind::Mention => format!(
            "[{f}]({}/{})",
            options.profile_base.trim_end_matches('/'),
            f.strip_prefix('@').unwrap_or(f)
        ),
        RangeKind::MentionName { user_id } => {
            format!("[{f}]({}?id={user_id})", options.user_deeplink)
        }
        RangeKind::Blockquote => f
            .split('\n')
            .map(|line| format!("> {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

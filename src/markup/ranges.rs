use serde::{Deserialize, Serialize};

/// Styling kinds understood by the renderer. Payload-carrying kinds hold
/// their link target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeKind {
    Bold,
    Italic,
    Code,
    PreBlock,
    Strikethrough,
    Underline,
    Url,
    TextUrl { url: String },
    Mention,
    MentionName { user_id: i64 },
    Hashtag,
    Spoiler,
    Blockquote,
}

impl RangeKind {
    pub fn name(&self) -> &'static str {
        match self {
            RangeKind::Bold => "bold",
            RangeKind::Italic => "italic",
            RangeKind::Code => "code",
            RangeKind::PreBlock => "pre",
            RangeKind::Strikethrough => "strike",
            RangeKind::Underline => "underline",
            RangeKind::Url => "url",
            RangeKind::TextUrl { .. } => "textUrl",
            RangeKind::Mention => "mention",
            RangeKind::MentionName { .. } => "mentionName",
            RangeKind::Hashtag => "hashtag",
            RangeKind::Spoiler => "spoiler",
            RangeKind::Blockquote => "blockquote",
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, RangeKind::Url | RangeKind::TextUrl { .. })
    }
}

/// A styled span. `offset` and `length` count UTF-16 code units of the
/// message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattingRange {
    pub kind: RangeKind,
    pub offset: usize,
    pub length: usize,
}

impl FormattingRange {
    pub fn new(kind: RangeKind, offset: usize, length: usize) -> Self {
        FormattingRange {
            kind,
            offset,
            length,
        }
    }
}

/// A range after pairing, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    pub range: FormattingRange,
    /// Set on a link whose identical-span bold range was folded into it.
    pub bold_wrapped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnknownKind(String),
    MissingPayload,
    NegativeBounds,
    OutOfBounds,
    SplitsSurrogate,
}

/// Diagnostic for a range that was dropped or left unrendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRange {
    pub kind: String,
    pub offset: i64,
    pub length: i64,
    pub reason: SkipReason,
}

/// Range as it arrives from the source. Kind names may use the upstream
/// class style (`MessageEntityTextUrl`) or the short style (`textUrl`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireRange {
    #[serde(rename = "type", alias = "className")]
    pub kind: String,
    pub offset: i64,
    pub length: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl WireRange {
    /// Validate against the text length (in UTF-16 units) and map the kind.
    pub fn validate(&self, text_len: usize) -> Result<FormattingRange, SkippedRange> {
        let skip = |reason| SkippedRange {
            kind: self.kind.clone(),
            offset: self.offset,
            length: self.length,
            reason,
        };

        let kind = self.kind().map_err(skip)?;
        let (Ok(offset), Ok(length)) = (usize::try_from(self.offset), usize::try_from(self.length))
        else {
            return Err(skip(SkipReason::NegativeBounds));
        };
        if offset.checked_add(length).map_or(true, |end| end > text_len) {
            return Err(skip(SkipReason::OutOfBounds));
        }
        Ok(FormattingRange::new(kind, offset, length))
    }

    fn kind(&self) -> Result<RangeKind, SkipReason> {
        let name = self.kind.strip_prefix("MessageEntity").unwrap_or(&self.kind);
        let kind = match name.to_ascii_lowercase().replace('_', "").as_str() {
            "bold" => RangeKind::Bold,
            "italic" => RangeKind::Italic,
            "code" => RangeKind::Code,
            "pre" | "preblock" => RangeKind::PreBlock,
            "strike" | "strikethrough" => RangeKind::Strikethrough,
            "underline" => RangeKind::Underline,
            "url" => RangeKind::Url,
            "texturl" => RangeKind::TextUrl {
                url: self.url.clone().ok_or(SkipReason::MissingPayload)?,
            },
            "mention" => RangeKind::Mention,
            "mentionname" => RangeKind::MentionName {
                user_id: self.user_id.ok_or(SkipReason::MissingPayload)?,
            },
            "hashtag" => RangeKind::Hashtag,
            "spoiler" => RangeKind::Spoiler,
            "blockquote" => RangeKind::Blockquote,
            _ => return Err(SkipReason::UnknownKind(self.kind.clone())),
        };
        Ok(kind)
    }
}

/// Fold identical-span bold ranges into their link and order the rest by
/// offset ascending, then length descending. Equal keys keep input order.
pub fn resolve(ranges: &[FormattingRange]) -> Vec<ResolvedRange> {
    let mut folded = vec![false; ranges.len()];
    let mut wrapped = vec![false; ranges.len()];

    for (i, link) in ranges.iter().enumerate() {
        if !link.kind.is_link() {
            continue;
        }
        let partner = ranges.iter().enumerate().position(|(j, other)| {
            !folded[j]
                && other.kind == RangeKind::Bold
                && other.offset == link.offset
                && other.length == link.length
        });
        if let Some(j) = partner {
            folded[j] = true;
            wrapped[i] = true;
        }
    }

    let mut resolved: Vec<ResolvedRange> = ranges
        .iter()
        .enumerate()
        .filter(|(i, _)| !folded[*i])
        .map(|(i, range)| ResolvedRange {
            range: range.clone(),
            bold_wrapped: wrapped[i],
        })
        .collect();

    resolved.sort_by(|a, b| {
        a.range
            .offset
            .cmp(&b.range.offset)
            .then(b.range.length.cmp(&a.range.length))
    });
    resolved
}

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::markup::ranges::{FormattingRange, SkippedRange, WireRange};

/// Label written to the snapshot for messages without media.
pub const NO_MEDIA_LABEL: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
    WebPage,
    Geo,
    GeoLive,
    Venue,
    Contact,
    Poll,
    Dice,
    Game,
    Invoice,
    Story,
    Giveaway,
    Unsupported,
    Other(String),
}

impl MediaKind {
    /// Accepts upstream class names (`MessageMediaPhoto`) or bare labels.
    pub fn from_label(label: &str) -> Self {
        let name = label.strip_prefix("MessageMedia").unwrap_or(label);
        match name {
            "Photo" => MediaKind::Photo,
            "Document" => MediaKind::Document,
            "WebPage" => MediaKind::WebPage,
            "Geo" => MediaKind::Geo,
            "GeoLive" => MediaKind::GeoLive,
            "Venue" => MediaKind::Venue,
            "Contact" => MediaKind::Contact,
            "Poll" => MediaKind::Poll,
            "Dice" => MediaKind::Dice,
            "Game" => MediaKind::Game,
            "Invoice" => MediaKind::Invoice,
            "Story" => MediaKind::Story,
            "Giveaway" => MediaKind::Giveaway,
            "Unsupported" => MediaKind::Unsupported,
            other => MediaKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MediaKind::Photo => "Photo",
            MediaKind::Document => "Document",
            MediaKind::WebPage => "WebPage",
            MediaKind::Geo => "Geo",
            MediaKind::GeoLive => "GeoLive",
            MediaKind::Venue => "Venue",
            MediaKind::Contact => "Contact",
            MediaKind::Poll => "Poll",
            MediaKind::Dice => "Dice",
            MediaKind::Game => "Game",
            MediaKind::Invoice => "Invoice",
            MediaKind::Story => "Story",
            MediaKind::Giveaway => "Giveaway",
            MediaKind::Unsupported => "Unsupported",
            MediaKind::Other(name) => name,
        };
        f.write_str(label)
    }
}

/// What the media resolver needs to fetch an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: i64,
    pub date: i64,
    pub text: Option<String>,
    pub ranges: Vec<FormattingRange>,
    pub media: Option<Media>,
}

impl RawMessage {
    pub fn media_label(&self) -> String {
        self.media
            .as_ref()
            .map(|m| m.kind.to_string())
            .unwrap_or_else(|| NO_MEDIA_LABEL.to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireMedia {
    #[serde(rename = "type", alias = "className")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Message as delivered by a source page.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireMessage {
    pub id: i64,
    pub date: i64,
    #[serde(default, alias = "message")]
    pub text: Option<String>,
    #[serde(default, alias = "ranges")]
    pub entities: Vec<WireRange>,
    #[serde(default)]
    pub media: Option<WireMedia>,
}

impl WireMessage {
    /// Convert to a `RawMessage`, dropping ranges that do not fit the text.
    pub fn into_raw(self) -> (RawMessage, Vec<SkippedRange>) {
        let text_len = self.text.as_deref().map_or(0, |t| t.encode_utf16().count());
        let mut ranges = Vec::with_capacity(self.entities.len());
        let mut dropped = Vec::new();
        for wire in &self.entities {
            match wire.validate(text_len) {
                Ok(range) => ranges.push(range),
                Err(skip) => {
                    debug!(id = self.id, kind = %skip.kind, offset = skip.offset, reason = ?skip.reason, "dropping range");
                    dropped.push(skip);
                }
            }
        }

        let media = self.media.map(|m| Media {
            kind: MediaKind::from_label(&m.kind),
            download_url: m.url,
        });

        let raw = RawMessage {
            id: self.id,
            date: self.date,
            text: self.text,
            ranges,
            media,
        };
        (raw, dropped)
    }
}

/// A message as kept in the store and written to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NormalizedRecord {
    pub id: i64,
    pub date: i64,
    #[serde(rename = "text", default)]
    pub body: Option<String>,
    #[serde(rename = "media", default = "no_media")]
    pub media_kind: String,
    #[serde(rename = "photoPath", default, skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<String>,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn no_media() -> String {
    NO_MEDIA_LABEL.to_string()
}

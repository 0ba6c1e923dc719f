use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::SourceError;
use crate::model::{RawMessage, WireMessage};

/// Cursor value asking for the newest messages.
pub const START_CURSOR: i64 = 0;

/// One page of history, newest first. An empty page means the history is
/// exhausted.
#[derive(Debug, Default)]
pub struct Page {
    pub messages: Vec<RawMessage>,
    pub dropped_ranges: usize,
}

impl Page {
    pub fn from_wire(messages: Vec<WireMessage>) -> Self {
        let mut page = Page::default();
        for wire in messages {
            let (raw, dropped) = wire.into_raw();
            page.dropped_ranges += dropped.len();
            page.messages.push(raw);
        }
        page
    }

    pub fn is_end(&self) -> bool {
        self.messages.is_empty()
    }

    /// Smallest id on the page, used as the cursor for the next request.
    pub fn next_cursor(&self) -> Option<i64> {
        self.messages.iter().map(|m| m.id).min()
    }
}

/// Paginated message history, walked from newest to oldest. `cursor` is
/// the smallest id seen so far, or [`START_CURSOR`].
#[allow(async_fn_in_trait)]
pub trait MessageSource {
    async fn fetch_page(&mut self, cursor: i64) -> Result<Page, SourceError>;
}

#[derive(Deserialize)]
struct WirePage {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

/// Reads history from a JSON gateway:
/// `GET {base}/channels/{channel}/history?offset_id={cursor}&limit={limit}`
/// answering `{"messages": [...]}`.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    channel: String,
    limit: usize,
}

impl HttpSource {
    pub fn new(base_url: &str, channel: &str, limit: usize) -> Self {
        HttpSource {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            channel: channel.trim_start_matches('@').to_string(),
            limit,
        }
    }

    pub fn page_url(&self, cursor: i64) -> String {
        format!(
            "{}/channels/{}/history?offset_id={}&limit={}",
            self.base_url, self.channel, cursor, self.limit
        )
    }
}

impl MessageSource for HttpSource {
    async fn fetch_page(&mut self, cursor: i64) -> Result<Page, SourceError> {
        let url = self.page_url(cursor);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| SourceError::Http {
                url: url.clone(),
                source,
            })?;
        let page: WirePage = response
            .json()
            .await
            .map_err(|source| SourceError::Decode { url, source })?;
        Ok(Page::from_wire(page.messages))
    }
}

/// Serves pages out of a saved export, with the same cursor semantics as
/// the live history: messages with an id below the cursor, newest first.
pub struct ReplaySource {
    messages: Vec<WireMessage>,
    limit: usize,
}

impl ReplaySource {
    pub fn new(mut messages: Vec<WireMessage>, limit: usize) -> Self {
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        ReplaySource {
            messages,
            limit: limit.max(1),
        }
    }

    /// Accepts either a bare array of messages or `{"messages": [...]}`.
    pub fn from_file(path: &Path, limit: usize) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|source| SourceError::ReplayIo {
            path: path.to_path_buf(),
            source,
        })?;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Export {
            Bare(Vec<WireMessage>),
            Wrapped(WirePage),
        }

        let messages = match serde_json::from_str::<Export>(&content) {
            Ok(Export::Bare(messages)) => messages,
            Ok(Export::Wrapped(page)) => page.messages,
            Err(source) => {
                return Err(SourceError::ReplayParse {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        info!("Replaying {} messages from {}", messages.len(), path.display());
        Ok(ReplaySource::new(messages, limit))
    }
}

impl MessageSource for ReplaySource {
    async fn fetch_page(&mut self, cursor: i64) -> Result<Page, SourceError> {
        let page: Vec<WireMessage> = self
            .messages
            .iter()
            .filter(|m| cursor == START_CURSOR || m.id < cursor)
            .take(self.limit)
            .cloned()
            .collect();
        Ok(Page::from_wire(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "tests/fixtures/channel_export.json";

    #[test]
    fn page_url_layout() {
        let source = HttpSource::new("http://localhost:8080/", "@rustnews", 100);
        assert_eq!(
            source.page_url(0),
            "http://localhost:8080/channels/rustnews/history?offset_id=0&limit=100"
        );
    }

    #[test]
    fn next_cursor_is_min_id() {
        let page = Page::from_wire(
            serde_json::from_str(r#"[{"id": 9, "date": 1}, {"id": 4, "date": 1}, {"id": 6, "date": 1}]"#)
                .unwrap(),
        );
        assert_eq!(page.next_cursor(), Some(4));
        assert!(Page::default().is_end());
        assert_eq!(Page::default().next_cursor(), None);
    }

    #[tokio::test]
    async fn replay_pages_walk_history_downwards() {
        let mut source = ReplaySource::from_file(Path::new(FIXTURE), 2).unwrap();

        let first = source.fetch_page(START_CURSOR).await.unwrap();
        let ids: Vec<i64> = first.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![106, 105]);

        let second = source.fetch_page(first.next_cursor().unwrap()).await.unwrap();
        assert!(second.messages.iter().all(|m| m.id < 105));

        let mut cursor = START_CURSOR;
        let mut seen = 0;
        loop {
            let page = source.fetch_page(cursor).await.unwrap();
            if page.is_end() {
                break;
            }
            seen += page.messages.len();
            cursor = page.next_cursor().unwrap();
        }
        assert_eq!(seen, 6);
    }

    #[test]
    fn replay_rejects_garbage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ReplaySource::from_file(&path, 10),
            Err(SourceError::ReplayParse { .. })
        ));
    }

    #[test]
    fn replay_accepts_wrapped_export() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, r#"{"messages": [{"id": 1, "date": 2, "message": "hi"}]}"#).unwrap();
        let source = ReplaySource::from_file(&path, 10).unwrap();
        assert_eq!(source.messages.len(), 1);
    }
}

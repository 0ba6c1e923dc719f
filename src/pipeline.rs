use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::markup::{self, render::MarkupOptions, Normalized};
use crate::media::MediaResolver;
use crate::source::{MessageSource, Page, START_CURSOR};
use crate::store::MergeStore;

/// Totals for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub photos: usize,
    pub skipped_ranges: usize,
    pub exhausted: bool,
    pub interrupted: bool,
}

struct PageOutcome {
    fetched: usize,
    inserted: usize,
    updated: usize,
    photos: usize,
    skipped_ranges: usize,
}

enum Step {
    Processed { outcome: PageOutcome, next: i64 },
    End,
}

/// Sequential page loop: fetch, normalise, resolve media, merge, persist,
/// pause, repeat with the smallest id seen.
pub struct Pipeline<S, M> {
    source: S,
    media: M,
    store: MergeStore,
    markup: MarkupOptions,
    fetch_delay: Duration,
    progress: ProgressBar,
}

impl<S: MessageSource, M: MediaResolver> Pipeline<S, M> {
    pub fn new(
        source: S,
        media: M,
        store: MergeStore,
        markup: MarkupOptions,
        fetch_delay: Duration,
        show_progress: bool,
    ) -> Self {
        Pipeline {
            source,
            media,
            store,
            markup,
            fetch_delay,
            progress: progress_bar(show_progress),
        }
    }

    pub fn store(&self) -> &MergeStore {
        &self.store
    }

    /// Run until the history is exhausted, the source fails, or `shutdown`
    /// completes. A page interrupted by shutdown is not persisted.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) -> Result<RunSummary> {
        tokio::pin!(shutdown);
        let mut summary = RunSummary::default();
        let mut cursor = START_CURSOR;

        loop {
            let step = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    summary.interrupted = true;
                    break;
                }
                step = self.step(cursor) => step?,
            };

            let (outcome, next) = match step {
                Step::End => {
                    info!("History exhausted after {} pages", summary.pages);
                    summary.exhausted = true;
                    break;
                }
                Step::Processed { outcome, next } => (outcome, next),
            };

            summary.pages += 1;
            summary.fetched += outcome.fetched;
            summary.inserted += outcome.inserted;
            summary.updated += outcome.updated;
            summary.photos += outcome.photos;
            summary.skipped_ranges += outcome.skipped_ranges;
            self.progress.set_message(format!(
                "{} messages, {} in store, cursor {}",
                summary.fetched,
                self.store.len(),
                next
            ));
            info!(
                page = summary.pages,
                size = outcome.fetched,
                total = summary.fetched,
                next_cursor = next,
                "Page saved"
            );

            if cursor != START_CURSOR && next >= cursor {
                warn!("Source returned ids at or above cursor {}, stopping", cursor);
                break;
            }
            cursor = next;

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    summary.interrupted = true;
                    break;
                }
                _ = tokio::time::sleep(self.fetch_delay) => {}
            }
        }

        self.progress.finish_and_clear();
        if summary.interrupted {
            info!("Interrupted, last saved snapshot kept");
        }
        Ok(summary)
    }

    async fn step(&mut self, cursor: i64) -> Result<Step> {
        let page = self
            .source
            .fetch_page(cursor)
            .await
            .with_context(|| format!("Failed to fetch page at cursor {}", cursor))?;
        if page.is_end() {
            return Ok(Step::End);
        }
        let next = page.next_cursor().unwrap_or(cursor);
        let outcome = self.process_page(page).await?;
        Ok(Step::Processed { outcome, next })
    }

    async fn process_page(&mut self, page: Page) -> Result<PageOutcome> {
        let options = &self.markup;
        let normalized: Vec<Normalized> = page
            .messages
            .par_iter()
            .map(|m| markup::normalize(m, options))
            .collect();

        let mut skipped_ranges = page.dropped_ranges;
        let mut photos = 0;
        let mut records = Vec::with_capacity(normalized.len());

        for (message, n) in page.messages.iter().zip(normalized) {
            let mut record = n.record;
            for skip in &n.skipped {
                debug!(
                    id = message.id,
                    kind = %skip.kind,
                    offset = skip.offset,
                    length = skip.length,
                    reason = ?skip.reason,
                    "range not rendered"
                );
            }
            skipped_ranges += n.skipped.len();

            if let Some(media) = &message.media {
                match self.media.resolve(message.id, media).await {
                    Ok(Some(path)) => {
                        record.photo_path = Some(path);
                        photos += 1;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Photo download failed for message {}: {}", message.id, e),
                }
            }
            records.push(record);
        }

        let fetched = records.len();
        let stats = self
            .store
            .upsert(records)
            .with_context(|| format!("Failed to write {}", self.store.path().display()))?;

        Ok(PageOutcome {
            fetched,
            inserted: stats.inserted,
            updated: stats.updated,
            photos,
            skipped_ranges,
        })
    }
}

fn progress_bar(show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

mod error;
mod markup;
mod media;
mod model;
mod pipeline;
mod settings;
mod source;
mod store;

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{error, info};

use media::{HttpFetcher, MediaResolver, PhotoCache};
use pipeline::{Pipeline, RunSummary};
use settings::{Settings, SourceChoice};
use source::{HttpSource, MessageSource, ReplaySource};
use store::MergeStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let settings = Settings::load().context("Failed to load settings")?;
    info!("Archiving channel @{}", settings.channel.trim_start_matches('@'));

    let photos_dir = settings.photos_dir();
    std::fs::create_dir_all(&photos_dir)
        .with_context(|| format!("Failed to create {}", photos_dir.display()))?;
    let store = MergeStore::open(settings.snapshot_path())?;
    let media = PhotoCache::new(photos_dir, HttpFetcher::new());

    let summary = match settings.source()? {
        SourceChoice::Http { base_url } => {
            let source = HttpSource::new(base_url, &settings.channel, settings.page_limit);
            archive(&settings, source, media, store).await?
        }
        SourceChoice::Replay { path } => {
            let source = ReplaySource::from_file(path, settings.page_limit)?;
            archive(&settings, source, media, store).await?
        }
    };

    summary.print();
    println!("\nDone in {}", format_duration(t0.elapsed()));
    Ok(())
}

async fn archive<S: MessageSource, M: MediaResolver>(
    settings: &Settings,
    source: S,
    media: M,
    store: MergeStore,
) -> Result<Summary> {
    let mut pipeline = Pipeline::new(
        source,
        media,
        store,
        settings.markup(),
        settings.fetch_delay(),
        settings.show_progress,
    );
    let run = pipeline.run_until(shutdown_signal()).await?;
    let store = pipeline.store();
    Ok(Summary {
        run,
        records: store.len(),
        span: store.date_span(),
        path: store.path().display().to_string(),
    })
}

struct Summary {
    run: RunSummary,
    records: usize,
    span: Option<(i64, i64)>,
    path: String,
}

impl Summary {
    fn print(&self) {
        let r = &self.run;
        println!(
            "Fetched {} messages over {} pages ({} new, {} updated, {} photos, {} ranges skipped).",
            r.fetched, r.pages, r.inserted, r.updated, r.photos, r.skipped_ranges
        );
        println!("Store: {} records in {}", self.records, self.path);
        if let Some((oldest, newest)) = self.span {
            println!("Covers {} .. {}", format_date(oldest), format_date(newest));
        }
        if r.exhausted {
            println!("Whole history loaded.");
        } else if r.interrupted {
            println!("Interrupted; snapshot is current up to the last saved page.");
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn format_date(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

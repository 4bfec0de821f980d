//! Danmaku Crawler
//!
//! Collects a video's comment history over a window of days and writes it
//! as a time-sorted JSON list.
//!
//! Usage:
//!   danmaku-crawler BV1xx411c7mD --sessdata <cookie> --days 30 -o danmaku.json
//!   danmaku-crawler "https://www.bilibili.com/video/BV1xx411c7mD/?p=2"
//!   danmaku-crawler --cid 279786 --no-segments
//!
//! Environment:
//!   BILIBILI_SESSDATA - Login cookie (history endpoints need it)
//!   DANMAKU_OUTPUT, DANMAKU_DAYS, DANMAKU_CONCURRENCY, DANMAKU_STAGGER_MS

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use danmaku_crawler::config::{ClientConfig, HarvestConfig};
use danmaku_crawler::output::write_records;
use danmaku_crawler::scrapers::{BilibiliClient, VideoRef};
use danmaku_crawler::{Harvester, VideoInfo};

#[derive(Parser, Debug)]
#[command(name = "danmaku-crawler")]
#[command(about = "Collect a video's danmaku history into a JSON file")]
struct Args {
    /// BV id, av id, or video URL
    #[arg(required_unless_present = "cid")]
    video: Option<String>,

    /// Comment-pool id; skips video lookup
    #[arg(long, conflicts_with = "video")]
    cid: Option<u64>,

    /// Page of a multi-part video (overrides ?p= in the URL)
    #[arg(long)]
    page: Option<u32>,

    /// SESSDATA login cookie
    #[arg(long, env = "BILIBILI_SESSDATA", hide_env_values = true)]
    sessdata: Option<String>,

    /// Output file
    #[arg(short, long, env = "DANMAKU_OUTPUT", default_value = "danmaku.json")]
    output: PathBuf,

    /// Days of history to fetch, counting back from the end date
    #[arg(long, env = "DANMAKU_DAYS", default_value = "30")]
    days: u32,

    /// Last day of the window (YYYY-MM-DD); defaults to today
    #[arg(long, env = "DANMAKU_END_DATE")]
    end_date: Option<NaiveDate>,

    /// Max concurrent requests
    #[arg(long, env = "DANMAKU_CONCURRENCY", default_value = "4")]
    concurrency: usize,

    /// Delay between request launches in milliseconds
    #[arg(long, env = "DANMAKU_STAGGER_MS", default_value = "100")]
    stagger_ms: u64,

    /// Fetch real-time segments when history yields fewer unique comments
    #[arg(long, env = "DANMAKU_SEGMENT_FALLBACK", default_value = "500")]
    segment_fallback_threshold: usize,

    /// Fetch the special comment reply when fewer unique comments remain
    /// after the segment stage
    #[arg(long, env = "DANMAKU_SPECIAL_FALLBACK", default_value = "100")]
    special_fallback_threshold: usize,

    /// Only use the history window; skip segments and the special reply
    #[arg(long)]
    no_segments: bool,

    /// HTTP request timeout in seconds
    #[arg(long, env = "DANMAKU_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            sessdata: self.sessdata.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            ..Default::default()
        }
    }

    fn harvest_config(&self) -> HarvestConfig {
        HarvestConfig {
            days: self.days,
            end_date: self.end_date,
            concurrency: self.concurrency.clamp(1, 32),
            stagger: Duration::from_millis(self.stagger_ms),
            segment_fallback_threshold: if self.no_segments {
                0
            } else {
                self.segment_fallback_threshold
            },
            special_fallback_threshold: if self.no_segments {
                0
            } else {
                self.special_fallback_threshold
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let client = BilibiliClient::new(&args.client_config())?;

    match args.sessdata.as_deref().filter(|s| !s.is_empty()) {
        None => warn!("No SESSDATA set; history endpoints will likely return nothing"),
        Some(_) => match client.check_session().await {
            Ok(true) => info!("Session cookie is logged in"),
            Ok(false) => warn!("SESSDATA is not logged in; history may be empty"),
            Err(e) => warn!(error = %e, "Could not verify SESSDATA"),
        },
    }

    let video = resolve_video(&client, &args).await?;
    info!(
        cid = video.cid,
        title = video.title.as_deref().unwrap_or("-"),
        duration_secs = ?video.duration_secs,
        "Video resolved"
    );

    let harvester = Harvester::new(client, args.harvest_config());
    let harvest = harvester.run(&video).await;

    write_records(&args.output, &harvest.records)?;

    let failed = harvest.report.failed_sources();
    if !failed.is_empty() {
        warn!(count = failed.len(), sources = ?failed, "Some payloads were unavailable");
    }
    info!(
        unique = harvest.report.unique_total,
        days = harvest.report.days.len(),
        segments = harvest.report.segments.len(),
        special = harvest.report.special.is_some(),
        output = %args.output.display(),
        "✅ Danmaku saved"
    );

    Ok(())
}

async fn resolve_video(client: &BilibiliClient, args: &Args) -> Result<VideoInfo> {
    if let Some(cid) = args.cid {
        return Ok(VideoInfo {
            cid,
            title: None,
            duration_secs: None,
        });
    }

    let input = args.video.as_deref().context("No video reference given")?;
    let mut video = VideoRef::parse(input)?;
    if let Some(page) = args.page {
        video = video.with_page(page);
    }
    info!(video = %video, "Resolving video");

    client
        .resolve_video(&video)
        .await
        .with_context(|| format!("Failed to resolve {}", video))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "danmaku_crawler=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // Also the crate root, for runs from another directory
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

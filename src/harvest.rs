//! Harvest Driver
//!
//! Walks the history window day by day, decodes each day's payload, and
//! folds the comments into a deduplicated, time-sorted list. Days are fetched
//! concurrently, but merged in calendar order so the result never depends on
//! which request finished first.
//!
//! Sparse histories are topped up in two more stages: real-time segments from
//! both the web and mobile endpoints, then the special (advanced) comment
//! reply with its scripted pool filtered out.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::HarvestConfig;
use crate::models::{DanmakuRecord, DedupKey, VideoInfo};
use crate::wire::{decode_envelope, DanmakuElement, DecodeStatus, Decoded};

/// Seconds of video covered by one real-time segment.
pub const SEGMENT_SECS: u64 = 360;

/// Segments fetched when the video duration is unknown.
const DEFAULT_SEGMENTS: u32 = 10;

/// Where raw segment payloads come from.
#[async_trait]
pub trait DanmakuSource: Send + Sync {
    /// Comment history posted on `date`.
    async fn history_day(&self, cid: u64, date: NaiveDate) -> Result<Vec<u8>>;

    /// Real-time segment `index` (1-based, 6 minutes each) from the web
    /// endpoint.
    async fn segment(&self, cid: u64, index: u32) -> Result<Vec<u8>>;

    /// The same segment from the mobile endpoint. Its contents overlap the
    /// web reply but are not identical.
    async fn segment_mobile(&self, cid: u64, index: u32) -> Result<Vec<u8>>;

    /// Reply carrying special (advanced) comments for the whole video.
    async fn special(&self, cid: u64) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEndpoint {
    Web,
    Mobile,
}

impl SegmentEndpoint {
    pub const ALL: [SegmentEndpoint; 2] = [SegmentEndpoint::Web, SegmentEndpoint::Mobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Mobile => "mobile",
        }
    }
}

/// One real-time segment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentKey {
    pub index: u32,
    pub endpoint: SegmentEndpoint,
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment-{}/{}", self.index, self.endpoint.as_str())
    }
}

/// Requests for segments `1..=count`, each from every endpoint.
pub fn segment_keys(count: u32) -> Vec<SegmentKey> {
    (1..=count)
        .flat_map(|index| {
            SegmentEndpoint::ALL
                .into_iter()
                .map(move |endpoint| SegmentKey { index, endpoint })
        })
        .collect()
}

/// Calendar days ending at `end`, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub end: NaiveDate,
    pub days: u32,
}

impl HistoryWindow {
    pub fn new(end: NaiveDate, days: u32) -> Self {
        Self { end, days }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..self.days)
            .map_while(|i| self.end.checked_sub_days(Days::new(i as u64)))
            .collect()
    }
}

/// Number of real-time segments to request for a video.
pub fn segment_count(duration_secs: Option<u64>, max_segments: u32) -> u32 {
    let count = match duration_secs {
        Some(d) if d > 0 => u32::try_from(d.div_ceil(SEGMENT_SECS)).unwrap_or(u32::MAX),
        _ => DEFAULT_SEGMENTS,
    };
    count.min(max_segments)
}

/// Accumulates comments across payloads, keeping the first of each
/// `(progress, content)` pair.
#[derive(Debug, Default)]
pub struct DanmakuCollector {
    seen: HashSet<DedupKey>,
    records: Vec<DanmakuRecord>,
}

impl DanmakuCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in decoded elements; returns how many were new.
    pub fn absorb<'a, I>(&mut self, elems: I) -> usize
    where
        I: IntoIterator<Item = &'a DanmakuElement>,
    {
        let mut added = 0;
        for elem in elems {
            let Some(key) = DedupKey::from_element(elem) else {
                continue;
            };
            if self.seen.contains(&key) {
                continue;
            }
            if let Some(record) = DanmakuRecord::from_element(elem) {
                self.records.push(record);
                self.seen.insert(key);
                added += 1;
            }
        }
        added
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by playback time. Ties keep insertion order.
    pub fn into_sorted(mut self) -> Vec<DanmakuRecord> {
        self.records.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.records
    }
}

/// Per-payload outcome, for the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct PayloadOutcome {
    /// `YYYY-MM-DD` for history days, `segment-<n>/<endpoint>` for real-time
    /// segments, `special` for the advanced comment reply
    pub source: String,
    pub fetched: bool,
    pub bytes: usize,
    pub elements: usize,
    pub new_unique: usize,
    pub status: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    pub cid: u64,
    pub days: Vec<PayloadOutcome>,
    pub segments: Vec<PayloadOutcome>,
    pub special: Option<PayloadOutcome>,
    pub unique_total: usize,
}

impl HarvestReport {
    pub fn failed_sources(&self) -> Vec<&str> {
        self.days
            .iter()
            .chain(self.segments.iter())
            .chain(self.special.iter())
            .filter(|o| !o.fetched)
            .map(|o| o.source.as_str())
            .collect()
    }
}

pub struct Harvest {
    pub records: Vec<DanmakuRecord>,
    pub report: HarvestReport,
}

/// A fetched-and-decoded payload, or the reason there is none.
type Fetched = Result<(usize, Decoded<Vec<DanmakuElement>>)>;

pub struct Harvester<S> {
    source: S,
    config: HarvestConfig,
}

impl<S: DanmakuSource> Harvester<S> {
    pub fn new(source: S, config: HarvestConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub async fn run(&self, video: &VideoInfo) -> Harvest {
        let cid = video.cid;
        let window = HistoryWindow::new(self.config.end_date_or_today(), self.config.days);
        let dates = window.dates();
        info!(
            cid,
            days = dates.len(),
            end = %window.end,
            concurrency = self.config.concurrency,
            "Fetching comment history"
        );

        let mut collector = DanmakuCollector::new();
        let mut report = HarvestReport {
            cid,
            ..Default::default()
        };

        let source = &self.source;
        let days = self
            .fan_out(dates, |date| async move { source.history_day(cid, date).await })
            .await;
        for (date, fetched) in days {
            let label = date.format("%Y-%m-%d").to_string();
            let outcome = fold_payload(&mut collector, label, fetched, |_| true);
            report.days.push(outcome);
        }
        info!(unique = collector.len(), "History window merged");

        let threshold = self.config.segment_fallback_threshold;
        if threshold > 0 && collector.len() < threshold {
            let count = segment_count(video.duration_secs, self.config.max_segments);
            info!(
                unique = collector.len(),
                threshold,
                segments = count,
                "Too few comments from history, fetching real-time segments"
            );
            let segments = self
                .fan_out(segment_keys(count), |key| async move {
                    match key.endpoint {
                        SegmentEndpoint::Web => source.segment(cid, key.index).await,
                        SegmentEndpoint::Mobile => source.segment_mobile(cid, key.index).await,
                    }
                })
                .await;
            for (key, fetched) in segments {
                let outcome = fold_payload(&mut collector, key.to_string(), fetched, |_| true);
                report.segments.push(outcome);
            }
            info!(unique = collector.len(), "Real-time segments merged");
        }

        let special_threshold = self.config.special_fallback_threshold;
        if special_threshold > 0 && collector.len() < special_threshold {
            info!(
                unique = collector.len(),
                threshold = special_threshold,
                "Still sparse, fetching special comment reply"
            );
            let fetched = source.special(cid).await.map(|payload| {
                let decoded = decode_envelope(&payload);
                (payload.len(), decoded)
            });
            // Scripted pool entries are animations, not text overlays.
            let outcome = fold_payload(&mut collector, "special".to_string(), fetched, |e| {
                !e.is_special()
            });
            report.special = Some(outcome);
        }

        report.unique_total = collector.len();
        Harvest {
            records: collector.into_sorted(),
            report,
        }
    }

    /// Fetch and decode `keys` with bounded concurrency. Launches are spaced
    /// `stagger` apart from the start of the run; results come back in the
    /// order of `keys`.
    async fn fan_out<K, F, Fut>(&self, keys: Vec<K>, fetch: F) -> Vec<(K, Fetched)>
    where
        K: Copy + std::fmt::Display,
        F: Fn(K) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>>>,
    {
        let start = Instant::now();
        let stagger = self.config.stagger;
        let concurrency = self.config.concurrency.max(1);
        let fetch = &fetch;

        let mut results: Vec<(usize, K, Fetched)> = stream::iter(keys.into_iter().enumerate())
            .map(|(i, key)| async move {
                if !stagger.is_zero() {
                    if let Some(at) = launch_deadline(start, stagger, i) {
                        sleep_until(at).await;
                    }
                }
                debug!(%key, "Fetching");
                let fetched = fetch(key).await.map(|payload| {
                    let decoded = decode_envelope(&payload);
                    (payload.len(), decoded)
                });
                (i, key, fetched)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results.sort_by_key(|(i, _, _)| *i);
        results.into_iter().map(|(_, k, f)| (k, f)).collect()
    }
}

fn launch_offset(stagger: Duration, index: usize) -> Duration {
    stagger.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}

/// When launch `index` may start; `None` if that lies beyond what `Instant`
/// can represent, in which case the launch is not delayed.
fn launch_deadline(start: Instant, stagger: Duration, index: usize) -> Option<Instant> {
    start.checked_add(launch_offset(stagger, index))
}

fn fold_payload(
    collector: &mut DanmakuCollector,
    source: String,
    fetched: Fetched,
    keep: impl Fn(&DanmakuElement) -> bool,
) -> PayloadOutcome {
    match fetched {
        Ok((bytes, decoded)) => {
            match decoded.status {
                DecodeStatus::Complete => {}
                DecodeStatus::Truncated(e) => {
                    warn!(source = %source, bytes, error = %e, "Payload truncated, keeping partial result")
                }
                DecodeStatus::Invalid(e) => {
                    warn!(source = %source, bytes, error = %e, "Payload malformed, keeping partial result")
                }
            }
            let elements = decoded.value.len();
            let new_unique = collector.absorb(decoded.value.iter().filter(|e| keep(*e)));
            info!(source = %source, elements, new_unique, "Payload decoded");
            PayloadOutcome {
                source,
                fetched: true,
                bytes,
                elements,
                new_unique,
                status: decoded.status.as_str(),
            }
        }
        Err(e) => {
            warn!(source = %source, error = %e, "No data, skipping");
            PayloadOutcome {
                source,
                fetched: false,
                bytes: 0,
                elements: 0,
                new_unique: 0,
                status: "missing",
            }
        }
    }
}

//! End-to-end harvest tests against an in-memory payload source.
//!
//! Payloads are hand-encoded segment replies, so these exercise the wire
//! decoder, dedup/merge and JSON output together without touching the network.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use danmaku_crawler::config::HarvestConfig;
use danmaku_crawler::output::write_records;
use danmaku_crawler::wire::{write_varint, ElemField};
use danmaku_crawler::{DanmakuRecord, DanmakuSource, Harvester, VideoInfo};

const CID: u64 = 279786;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn key(field: u64, wire_type: u64) -> u64 {
    (field << 3) | wire_type
}

/// Encode one element with progress, content and an optional pool.
fn element(progress: u64, content: &str, pool: Option<u64>) -> Vec<u8> {
    let mut body = Vec::new();
    write_varint(&mut body, key(ElemField::PROGRESS, 0));
    write_varint(&mut body, progress);
    write_varint(&mut body, key(ElemField::CONTENT, 2));
    write_varint(&mut body, content.len() as u64);
    body.extend_from_slice(content.as_bytes());
    if let Some(pool) = pool {
        write_varint(&mut body, key(ElemField::POOL, 0));
        write_varint(&mut body, pool);
    }
    body
}

fn envelope(elems: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    for e in elems {
        write_varint(&mut buf, key(1, 2));
        write_varint(&mut buf, e.len() as u64);
        buf.extend_from_slice(e);
    }
    buf
}

#[derive(Default)]
struct FakeSource {
    days: HashMap<NaiveDate, Vec<u8>>,
    segments: HashMap<u32, Vec<u8>>,
    mobile_segments: HashMap<u32, Vec<u8>>,
    special: Option<Vec<u8>>,
}

#[async_trait]
impl DanmakuSource for FakeSource {
    async fn history_day(&self, cid: u64, date: NaiveDate) -> Result<Vec<u8>> {
        assert_eq!(cid, CID);
        match self.days.get(&date) {
            Some(b) => Ok(b.clone()),
            None => bail!("HTTP 404 for {}", date),
        }
    }

    async fn segment(&self, cid: u64, index: u32) -> Result<Vec<u8>> {
        assert_eq!(cid, CID);
        match self.segments.get(&index) {
            Some(b) => Ok(b.clone()),
            None => bail!("no segment {}", index),
        }
    }

    async fn segment_mobile(&self, cid: u64, index: u32) -> Result<Vec<u8>> {
        assert_eq!(cid, CID);
        match self.mobile_segments.get(&index) {
            Some(b) => Ok(b.clone()),
            None => bail!("no mobile segment {}", index),
        }
    }

    async fn special(&self, cid: u64) -> Result<Vec<u8>> {
        assert_eq!(cid, CID);
        match &self.special {
            Some(b) => Ok(b.clone()),
            None => bail!("no special reply"),
        }
    }
}

fn config(days: u32) -> HarvestConfig {
    HarvestConfig {
        days,
        end_date: Some(date(3)),
        concurrency: 2,
        stagger: Duration::ZERO,
        segment_fallback_threshold: 0,
        special_fallback_threshold: 0,
        ..Default::default()
    }
}

fn video(duration_secs: Option<u64>) -> VideoInfo {
    VideoInfo {
        cid: CID,
        title: None,
        duration_secs,
    }
}

#[tokio::test]
async fn test_single_element_payload() {
    let mut source = FakeSource::default();
    // {1: {2: 1, 7: "hi"}}
    source.days.insert(
        date(3),
        vec![0x0A, 0x06, 0x10, 0x01, 0x3A, 0x02, 0x68, 0x69],
    );

    let harvest = Harvester::new(source, config(1)).run(&video(None)).await;
    assert_eq!(
        harvest.records,
        vec![DanmakuRecord {
            time: 0.001,
            text: "hi".into()
        }]
    );
    assert_eq!(harvest.report.unique_total, 1);
    assert_eq!(harvest.report.days[0].status, "complete");
}

#[tokio::test]
async fn test_dedup_across_days_and_sorted() {
    let mut source = FakeSource::default();
    source.days.insert(
        date(3),
        envelope(&[element(9000, "late", None), element(1500, "same", None)]),
    );
    source.days.insert(
        date(2),
        envelope(&[
            element(1500, "same", None),
            element(1500, "same but different", None),
            element(200, "early", None),
        ]),
    );
    source.days.insert(date(1), envelope(&[element(9000, "late", None)]));

    let harvest = Harvester::new(source, config(3)).run(&video(None)).await;
    let texts: Vec<&str> = harvest.records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["early", "same", "same but different", "late"]);
    assert!(harvest
        .records
        .windows(2)
        .all(|w| w[0].time <= w[1].time));

    let new_per_day: Vec<usize> = harvest.report.days.iter().map(|d| d.new_unique).collect();
    assert_eq!(new_per_day, vec![2, 2, 0]);
    assert_eq!(harvest.report.unique_total, 4);
}

#[tokio::test]
async fn test_failed_and_empty_days_are_skipped() {
    let mut source = FakeSource::default();
    source.days.insert(date(3), Vec::new());
    source.days.insert(date(1), envelope(&[element(10, "ok", None)]));

    let harvest = Harvester::new(source, config(3)).run(&video(None)).await;
    assert_eq!(harvest.records.len(), 1);
    assert_eq!(harvest.report.failed_sources(), vec!["2024-03-02"]);
    assert_eq!(harvest.report.days[0].elements, 0);
    assert!(harvest.report.days[0].fetched);
}

#[tokio::test]
async fn test_truncated_payload_keeps_prefix() {
    let mut payload = envelope(&[element(100, "kept", None), element(200, "lost", None)]);
    payload.truncate(payload.len() - 2);

    let mut source = FakeSource::default();
    source.days.insert(date(3), payload);

    let harvest = Harvester::new(source, config(1)).run(&video(None)).await;
    assert_eq!(harvest.records.len(), 1);
    assert_eq!(harvest.records[0].text, "kept");
    assert_eq!(harvest.report.days[0].status, "truncated");
}

#[tokio::test]
async fn test_segment_fallback_merges_web_and_mobile() {
    let mut source = FakeSource::default();
    source
        .days
        .insert(date(3), envelope(&[element(1000, "history", None)]));
    source.segments.insert(
        1,
        envelope(&[
            element(1000, "history", Some(0)),
            element(2000, "live", Some(0)),
            element(3000, "script", Some(2)),
        ]),
    );
    source.mobile_segments.insert(
        1,
        envelope(&[element(2000, "live", Some(0)), element(2500, "mobile only", None)]),
    );
    source
        .mobile_segments
        .insert(2, envelope(&[element(400_000, "second", Some(1))]));

    let cfg = HarvestConfig {
        segment_fallback_threshold: 500,
        ..config(1)
    };
    let harvest = Harvester::new(source, cfg).run(&video(Some(700))).await;

    // Segment replies keep every pool, including scripted comments.
    let texts: Vec<&str> = harvest.records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["history", "live", "mobile only", "script", "second"]);

    let sources: Vec<&str> = harvest.report.segments.iter().map(|o| o.source.as_str()).collect();
    assert_eq!(
        sources,
        vec![
            "segment-1/web",
            "segment-1/mobile",
            "segment-2/web",
            "segment-2/mobile"
        ]
    );
    assert_eq!(harvest.report.failed_sources(), vec!["segment-2/web"]);
    assert!(harvest.report.special.is_none());
}

#[tokio::test]
async fn test_special_reply_drops_scripted_pool() {
    let mut source = FakeSource::default();
    source
        .days
        .insert(date(3), envelope(&[element(1000, "history", None)]));
    source.special = Some(envelope(&[
        element(1000, "history", Some(0)),
        element(5000, "advanced", Some(0)),
        element(6000, "script", Some(2)),
    ]));

    let cfg = HarvestConfig {
        special_fallback_threshold: 100,
        ..config(1)
    };
    let harvest = Harvester::new(source, cfg).run(&video(None)).await;

    let texts: Vec<&str> = harvest.records.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["history", "advanced"]);
    let special = harvest.report.special.as_ref().unwrap();
    assert_eq!(special.source, "special");
    assert_eq!(special.elements, 3);
    assert_eq!(special.new_unique, 1);
}

#[tokio::test]
async fn test_special_reply_skipped_when_enough_comments() {
    let mut source = FakeSource::default();
    source.days.insert(
        date(3),
        envelope(&[element(1, "a", None), element(2, "b", None)]),
    );
    source.special = Some(envelope(&[element(3, "c", None)]));

    let cfg = HarvestConfig {
        special_fallback_threshold: 2,
        ..config(1)
    };
    let harvest = Harvester::new(source, cfg).run(&video(None)).await;
    assert_eq!(harvest.records.len(), 2);
    assert!(harvest.report.special.is_none());
}

#[tokio::test]
async fn test_supplementary_stages_disabled() {
    let mut source = FakeSource::default();
    source.special = Some(envelope(&[element(1, "unused", None)]));
    let cfg = config(1);

    let harvester = Harvester::new(source, cfg);
    let harvest = harvester.run(&video(Some(700))).await;
    assert!(harvest.records.is_empty());
    assert!(harvest.report.segments.is_empty());
    assert!(harvest.report.special.is_none());
}

#[tokio::test]
async fn test_staggered_launches_still_merge_in_order() {
    let mut source = FakeSource::default();
    for d in 1..=3 {
        source
            .days
            .insert(date(d), envelope(&[element(d as u64 * 10, "x", None)]));
    }
    let cfg = HarvestConfig {
        stagger: Duration::from_millis(5),
        concurrency: 3,
        ..config(3)
    };

    let harvest = Harvester::new(source, cfg).run(&video(None)).await;
    let sources: Vec<&str> = harvest.report.days.iter().map(|d| d.source.as_str()).collect();
    assert_eq!(sources, vec!["2024-03-03", "2024-03-02", "2024-03-01"]);
    assert_eq!(harvest.records.len(), 3);
}

#[tokio::test]
async fn test_output_file_round_trip() {
    let mut source = FakeSource::default();
    source.days.insert(
        date(3),
        envelope(&[element(2500, "前方高能", None), element(500, "233", None)]),
    );

    let harvest = Harvester::new(source, config(1)).run(&video(None)).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("danmaku.json");
    write_records(&path, &harvest.records).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("前方高能"));
    let back: Vec<DanmakuRecord> = serde_json::from_str(&text).unwrap();
    assert_eq!(back, harvest.records);
    assert_eq!(back[0].time, 0.5);
}

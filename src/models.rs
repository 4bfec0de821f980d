use serde::{Deserialize, Serialize};

use crate::wire::DanmakuElement;

/// A comment as written to the output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DanmakuRecord {
    /// Seconds into the video
    pub time: f64,
    pub text: String,
}

impl DanmakuRecord {
    /// Build a record from a decoded element. Elements missing either the
    /// playback offset or non-empty text yield `None`.
    pub fn from_element(elem: &DanmakuElement) -> Option<Self> {
        let key = DedupKey::from_element(elem)?;
        Some(Self {
            time: key.progress as f64 / 1000.0,
            text: key.content,
        })
    }
}

/// Identity of a comment across history days: same offset, same text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub progress: u64,
    pub content: String,
}

impl DedupKey {
    pub fn from_element(elem: &DanmakuElement) -> Option<Self> {
        let progress = elem.progress?;
        let content = elem.content.as_ref().filter(|c| !c.is_empty())?;
        Some(Self {
            progress,
            content: content.clone(),
        })
    }
}

/// Resolved video metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Comment-pool id the danmaku endpoints are keyed by
    pub cid: u64,
    pub title: Option<String>,
    pub duration_secs: Option<u64>,
}

//! Crawler Configuration

use chrono::NaiveDate;
use std::time::Duration;

pub const BILIBILI_API_BASE: &str = "https://api.bilibili.com";

/// Browser UA; the comment endpoints reject obvious bot agents.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const BILIBILI_REFERER: &str = "https://www.bilibili.com";

/// HTTP client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Login cookie value; history endpoints return nothing without it
    pub sessdata: Option<String>,
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sessdata: None,
            base_url: BILIBILI_API_BASE.to_string(),
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Harvest window and fan-out settings
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Number of calendar days to walk back, including `end_date`
    pub days: u32,
    /// Last day of the window; today (local time) when unset
    pub end_date: Option<NaiveDate>,
    /// Max in-flight requests
    pub concurrency: usize,
    /// Spacing between request launches
    pub stagger: Duration,
    /// Fetch real-time segments when history yields fewer unique comments
    /// than this. 0 disables the fallback.
    pub segment_fallback_threshold: usize,
    /// Upper bound on real-time segments fetched
    pub max_segments: u32,
    /// Fetch the special comment reply when fewer unique comments than this
    /// have been collected after the segment stage. 0 disables it.
    pub special_fallback_threshold: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            days: 30,
            end_date: None,
            concurrency: 4,
            stagger: Duration::from_millis(100),
            segment_fallback_threshold: 500,
            max_segments: 15,
            special_fallback_threshold: 100,
        }
    }
}

impl HarvestConfig {
    pub fn end_date_or_today(&self) -> NaiveDate {
        self.end_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

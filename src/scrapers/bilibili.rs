//! Bilibili API Client
//!
//! Video metadata lookups (JSON) and comment segment downloads (protobuf).
//! Retries are left to the caller; a failed day is simply skipped.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::video_ref::{VideoId, VideoRef};
use crate::config::{ClientConfig, BILIBILI_REFERER};
use crate::harvest::DanmakuSource;
use crate::models::VideoInfo;

/// Common `{code, message, data}` wrapper of the JSON endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn into_data(self, what: &str) -> Result<T> {
        if self.code != 0 {
            bail!("{} failed: code {} ({})", what, self.code, self.message);
        }
        self.data
            .ok_or_else(|| anyhow!("{} returned no data", what))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewData {
    pub cid: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub pages: Vec<PageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    pub cid: u64,
    pub page: u32,
    #[serde(default)]
    pub part: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavData {
    #[serde(rename = "isLogin", default)]
    pub is_login: bool,
    #[serde(default)]
    pub uname: Option<String>,
}

impl ViewData {
    /// Pick the requested page, falling back to the main cid when the
    /// page is not listed.
    pub fn into_video_info(self, page: u32) -> VideoInfo {
        if page > 1 {
            if let Some(p) = self.pages.iter().find(|p| p.page == page) {
                return VideoInfo {
                    cid: p.cid,
                    title: self.title.clone(),
                    duration_secs: p.duration.or(self.duration),
                };
            }
            warn!(page, pages = self.pages.len(), "requested page not found, using main cid");
        }
        VideoInfo {
            cid: self.cid,
            title: self.title,
            duration_secs: self.duration,
        }
    }
}

/// Pick `page` out of a pagelist response (1-based, first page as fallback).
fn pick_page(pages: &[PageInfo], page: u32) -> Option<&PageInfo> {
    pages
        .iter()
        .find(|p| p.page == page)
        .or_else(|| pages.first())
}

#[derive(Clone)]
pub struct BilibiliClient {
    client: Client,
    base_url: String,
}

impl BilibiliClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .user_agent(config.user_agent.as_str())
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::REFERER,
                    reqwest::header::HeaderValue::from_static(BILIBILI_REFERER),
                );
                if let Some(sessdata) = config.sessdata.as_deref().filter(|s| !s.is_empty()) {
                    headers.insert(
                        reqwest::header::COOKIE,
                        format!("SESSDATA={}", sessdata)
                            .parse()
                            .context("Invalid SESSDATA cookie value")?,
                    );
                }
                headers
            })
            .build()
            .context("Failed to build BilibiliClient")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>> {
        self.client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?
            .error_for_status()
            .with_context(|| format!("GET {} status", path))?
            .json::<ApiResponse<T>>()
            .await
            .with_context(|| format!("Failed to parse {} response", path))
    }

    async fn get_bytes(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;

        if !resp.status().is_success() {
            bail!("GET {} returned {}", path, resp.status());
        }

        let body = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read {} body", path))?;
        Ok(body.to_vec())
    }

    /// Resolve a video reference to the cid of the requested page.
    pub async fn resolve_video(&self, video: &VideoRef) -> Result<VideoInfo> {
        let query = match &video.id {
            VideoId::Bvid(b) => vec![("bvid", b.clone())],
            VideoId::Aid(a) => vec![("aid", a.to_string())],
        };

        let view = self
            .get_json::<ViewData>("/x/web-interface/view", &query)
            .await
            .and_then(|r| r.into_data("web-interface/view"));

        match (view, &video.id) {
            (Ok(data), _) => {
                let info = data.into_video_info(video.page);
                debug!(video = %video, cid = info.cid, "resolved via web-interface/view");
                Ok(info)
            }
            (Err(e), VideoId::Bvid(_)) => {
                warn!(video = %video, error = %e, "view lookup failed, trying pagelist");
                let pages = self
                    .get_json::<Vec<PageInfo>>("/x/player/pagelist", &query)
                    .await?
                    .into_data("player/pagelist")?;
                let page = pick_page(&pages, video.page)
                    .ok_or_else(|| anyhow!("{} has no pages", video))?;
                Ok(VideoInfo {
                    cid: page.cid,
                    title: page.part.clone(),
                    duration_secs: page.duration,
                })
            }
            (Err(e), VideoId::Aid(_)) => {
                Err(e.context(format!("Failed to resolve cid for {}", video)))
            }
        }
    }

    /// True when the configured cookie belongs to a logged-in session.
    pub async fn check_session(&self) -> Result<bool> {
        let resp = self
            .get_json::<NavData>("/x/web-interface/nav", &[])
            .await?;
        // Logged-out callers get code -101 with a data payload.
        Ok(resp.data.map(|d| d.is_login).unwrap_or(false))
    }

    /// One day of comment history (requires a logged-in cookie).
    pub async fn fetch_history_day(&self, cid: u64, date: NaiveDate) -> Result<Vec<u8>> {
        let query = [
            ("type", "1".to_string()),
            ("oid", cid.to_string()),
            ("date", date.format("%Y-%m-%d").to_string()),
        ];
        self.get_bytes("/x/v2/dm/web/history/seg.so", &query).await
    }

    /// One 6-minute real-time segment (1-based index).
    pub async fn fetch_segment(&self, cid: u64, index: u32) -> Result<Vec<u8>> {
        self.get_bytes("/x/v2/dm/web/seg.so", &segment_query(cid, index))
            .await
    }

    /// The same segment from the mobile endpoint.
    pub async fn fetch_segment_mobile(&self, cid: u64, index: u32) -> Result<Vec<u8>> {
        self.get_bytes("/x/v2/dm/list/seg.so", &segment_query(cid, index))
            .await
    }

    /// Special (advanced) comment reply for the whole video.
    pub async fn fetch_special(&self, cid: u64) -> Result<Vec<u8>> {
        let query = [("type", "1".to_string()), ("oid", cid.to_string())];
        self.get_bytes("/x/v2/dm/web/view", &query).await
    }
}

fn segment_query(cid: u64, index: u32) -> [(&'static str, String); 3] {
    [
        ("type", "1".to_string()),
        ("oid", cid.to_string()),
        ("segment_index", index.to_string()),
    ]
}

#[async_trait]
impl DanmakuSource for BilibiliClient {
    async fn history_day(&self, cid: u64, date: NaiveDate) -> Result<Vec<u8>> {
        self.fetch_history_day(cid, date).await
    }

    async fn segment(&self, cid: u64, index: u32) -> Result<Vec<u8>> {
        self.fetch_segment(cid, index).await
    }

    async fn segment_mobile(&self, cid: u64, index: u32) -> Result<Vec<u8>> {
        self.fetch_segment_mobile(cid, index).await
    }

    async fn special(&self, cid: u64) -> Result<Vec<u8>> {
        self.fetch_special(cid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW_JSON: &str = r#"{
        "code": 0,
        "message": "0",
        "ttl": 1,
        "data": {
            "bvid": "BV1xx411c7mD",
            "aid": 170001,
            "cid": 279786,
            "title": "demo",
            "duration": 1200,
            "pages": [
                {"cid": 279786, "page": 1, "part": "one", "duration": 600},
                {"cid": 279787, "page": 2, "part": "two", "duration": 600}
            ]
        }
    }"#;

    #[test]
    fn test_view_picks_page() {
        let resp: ApiResponse<ViewData> = serde_json::from_str(VIEW_JSON).unwrap();
        let data = resp.into_data("view").unwrap();

        let info = data.clone().into_video_info(2);
        assert_eq!(info.cid, 279787);
        assert_eq!(info.duration_secs, Some(600));

        let info = data.clone().into_video_info(1);
        assert_eq!(info.cid, 279786);
        assert_eq!(info.duration_secs, Some(1200));

        let info = data.into_video_info(9);
        assert_eq!(info.cid, 279786);
    }

    #[test]
    fn test_api_error_code() {
        let resp: ApiResponse<ViewData> =
            serde_json::from_str(r#"{"code": -404, "message": "啥都木有", "data": null}"#).unwrap();
        let err = resp.into_data("web-interface/view").unwrap_err();
        assert!(err.to_string().contains("-404"));
    }

    #[test]
    fn test_pagelist_pick() {
        let resp: ApiResponse<Vec<PageInfo>> = serde_json::from_str(
            r#"{"code":0,"data":[{"cid":11,"page":1,"part":"a"},{"cid":12,"page":2,"part":"b"}]}"#,
        )
        .unwrap();
        let pages = resp.into_data("pagelist").unwrap();
        assert_eq!(pick_page(&pages, 2).unwrap().cid, 12);
        assert_eq!(pick_page(&pages, 5).unwrap().cid, 11);
        assert!(pick_page(&[], 1).is_none());
    }

    #[test]
    fn test_nav_logged_out() {
        let resp: ApiResponse<NavData> =
            serde_json::from_str(r#"{"code":-101,"message":"账号未登录","data":{"isLogin":false}}"#)
                .unwrap();
        assert!(!resp.data.unwrap().is_login);
    }

    #[test]
    fn test_client_builds_with_cookie() {
        let config = ClientConfig {
            sessdata: Some("abc%2C123".into()),
            base_url: "http://127.0.0.1:9/".into(),
            ..Default::default()
        };
        let client = BilibiliClient::new(&config).unwrap();
        assert_eq!(client.url("/x/v2/dm/web/seg.so"), "http://127.0.0.1:9/x/v2/dm/web/seg.so");
    }

    #[test]
    fn test_segment_query() {
        let query = segment_query(279786, 3);
        assert_eq!(query[1], ("oid", "279786".to_string()));
        assert_eq!(query[2], ("segment_index", "3".to_string()));
    }

    #[test]
    fn test_client_rejects_bad_cookie() {
        let config = ClientConfig {
            sessdata: Some("bad\nvalue".into()),
            ..Default::default()
        };
        assert!(BilibiliClient::new(&config).is_err());
    }
}

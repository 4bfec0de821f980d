//! Danmaku Crawler Library
//!
//! Decoder for the comment segment wire format, the harvest driver that
//! merges a window of history days, and the Bilibili API client feeding it.
//! Binaries and integration tests build on these modules.

pub mod config;
pub mod harvest;
pub mod models;
pub mod output;
pub mod scrapers;
pub mod wire;

pub use harvest::{DanmakuSource, Harvest, HarvestReport, Harvester};
pub use models::{DanmakuRecord, VideoInfo};

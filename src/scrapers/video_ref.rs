//! Video references accepted on the command line.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoId {
    /// `BV1xx411c7mD`
    Bvid(String),
    /// `av170001`
    Aid(u64),
}

/// A video plus the 1-based page (part) of a multi-part upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRef {
    pub id: VideoId,
    pub page: u32,
}

impl VideoRef {
    /// Parse a BV id, an av id, or a video URL such as
    /// `https://www.bilibili.com/video/BV1xx411c7mD/?p=2`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("empty video reference");
        }

        let (token, page) = match input.find("/video/") {
            Some(idx) => {
                let rest = &input[idx + "/video/".len()..];
                let end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
                (&rest[..end], page_from_query(rest)?)
            }
            None => (input, 1),
        };

        Ok(Self {
            id: parse_id(token)?,
            page,
        })
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }
}

impl FromStr for VideoRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VideoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            VideoId::Bvid(b) => write!(f, "{}", b)?,
            VideoId::Aid(a) => write!(f, "av{}", a)?,
        }
        if self.page > 1 {
            write!(f, " p{}", self.page)?;
        }
        Ok(())
    }
}

fn parse_id(token: &str) -> Result<VideoId> {
    if let Some(rest) = token.strip_prefix("BV") {
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("malformed BV id: {}", token);
        }
        return Ok(VideoId::Bvid(token.to_string()));
    }

    if let Some(digits) = token
        .strip_prefix("av")
        .or_else(|| token.strip_prefix("AV"))
    {
        let aid = digits
            .parse::<u64>()
            .with_context(|| format!("malformed av id: {}", token))?;
        return Ok(VideoId::Aid(aid));
    }

    bail!("unrecognized video reference: {}", token)
}

/// `p=<n>` from the query string; 1 when absent.
fn page_from_query(rest: &str) -> Result<u32> {
    let Some(q) = rest.find('?') else {
        return Ok(1);
    };
    let query = rest[q + 1..].split('#').next().unwrap_or("");
    for pair in query.split('&') {
        if let Some(v) = pair.strip_prefix("p=") {
            let page = v
                .parse::<u32>()
                .with_context(|| format!("malformed page number: {}", v))?;
            return Ok(page.max(1));
        }
    }
    Ok(1)
}

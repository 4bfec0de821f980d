//! JSON output of the harvested comment list.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::models::DanmakuRecord;

/// Render records as a 2-space indented JSON array. Non-ASCII text is kept
/// as-is rather than `\u` escaped.
pub fn to_pretty_json(records: &[DanmakuRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).context("Failed to serialize danmaku records")
}

/// Write records to `path`, creating parent directories as needed.
pub fn write_records(path: &Path, records: &[DanmakuRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = to_pretty_json(records)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_json_keeps_non_ascii() {
        let records = vec![
            DanmakuRecord {
                time: 0.001,
                text: "hi".into(),
            },
            DanmakuRecord {
                time: 12.5,
                text: "前方高能".into(),
            },
        ];
        let json = to_pretty_json(&records).unwrap();
        assert!(json.contains("前方高能"));
        assert!(!json.contains("\\u"));
        assert!(json.contains("\n  {\n    \"time\": 0.001,\n    \"text\": \"hi\"\n  }"));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(to_pretty_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("danmaku.json");
        write_records(
            &path,
            &[DanmakuRecord {
                time: 1.0,
                text: "x".into(),
            }],
        )
        .unwrap();

        let back: Vec<DanmakuRecord> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].text, "x");
    }
}

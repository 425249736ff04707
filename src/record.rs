use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressIterator};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::pb_style;

/// 元数据文件中的一条记录，由图片库导出
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// 相对于图片根目录的文件名
    pub filename: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub detailed_description: Option<String>,
    #[serde(default)]
    pub meta_tags: Option<Vec<String>>,
    #[serde(default)]
    pub face_count: Option<u32>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// 分析服务记录下来的人脸编码
    #[serde(default)]
    pub face_encodings: Option<Vec<Vec<f32>>>,
}

/// 已分析过的图片，训练时的基本单位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub description: String,
    pub detailed_description: String,
    /// 按首次出现顺序去重后的标签
    pub tags: Vec<String>,
    pub face_count: u32,
    pub embedding: Option<Vec<f32>>,
    pub face_encodings: Option<Vec<Vec<f32>>>,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>, description: impl Into<String>, tags: &[&str]) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            detailed_description: String::new(),
            tags: dedup_tags(tags.iter().map(|t| t.to_string())),
            face_count: 0,
            embedding: None,
            face_encodings: None,
        }
    }

    pub fn with_detailed_description(mut self, detailed: impl Into<String>) -> Self {
        self.detailed_description = detailed.into();
        self
    }

    pub fn with_face_count(mut self, face_count: u32) -> Self {
        self.face_count = face_count;
        self
    }

    pub fn with_face_encodings(mut self, encodings: Vec<Vec<f32>>) -> Self {
        self.face_count = self.face_count.max(encodings.len() as u32);
        self.face_encodings = Some(encodings);
        self
    }

    fn from_entry(entry: MetadataEntry, path: PathBuf) -> Self {
        Self {
            path,
            description: entry.description.unwrap_or_default(),
            detailed_description: entry.detailed_description.unwrap_or_default(),
            tags: dedup_tags(entry.meta_tags.unwrap_or_default()),
            face_count: entry.face_count.unwrap_or(0),
            embedding: entry.embedding,
            face_encodings: entry.face_encodings,
        }
    }

    /// 除 `tag` 以外的其他标签
    pub fn other_tags(&self, tag: &str) -> Vec<String> {
        self.tags.iter().filter(|t| *t != tag).cloned().collect()
    }
}

fn dedup_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || out.iter().any(|t| t == tag) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}

/// 读取元数据文件，返回所有可用的图片记录
///
/// 元数据文件或图片根目录不存在时返回错误；单条记录格式错误或图片文件缺失时跳过该记录。
pub fn load_records(metadata_file: impl AsRef<Path>, image_root: impl AsRef<Path>) -> Result<Vec<ImageRecord>> {
    let metadata_file = metadata_file.as_ref();
    let image_root = image_root.as_ref();
    info!("读取训练数据: {}", metadata_file.display());

    if !image_root.is_dir() {
        bail!("图片目录不存在: {}", image_root.display());
    }
    let data = fs::read(metadata_file)
        .with_context(|| format!("无法读取元数据文件: {}", metadata_file.display()))?;
    let entries: Vec<Value> = serde_json::from_slice(&data)
        .with_context(|| format!("元数据文件格式错误: {}", metadata_file.display()))?;

    let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());
    let mut records = Vec::with_capacity(entries.len());
    for (i, value) in entries.into_iter().enumerate().progress_with(pb.clone()) {
        let entry = match serde_json::from_value::<MetadataEntry>(value) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("跳过第 {} 条记录，格式错误: {}", i, e);
                continue;
            }
        };
        let path = image_root.join(&entry.filename);
        if !path.is_file() {
            warn!("跳过图片，文件不存在: {}", path.display());
            continue;
        }
        pb.set_message(entry.filename.clone());
        records.push(ImageRecord::from_entry(entry, path));
    }
    pb.finish_and_clear();

    info!("共收集 {} 张图片用于训练", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_dedup_tags_keeps_first_order() {
        let tags = dedup_tags(["b", "a", "b", " ", "c", "a"].map(String::from));
        assert_eq!(tags, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_other_tags() {
        let record = ImageRecord::new("x.jpg", "", &["beach", "sunset", "sea"]);
        assert_eq!(record.other_tags("sunset"), vec!["beach", "sea"]);
    }

    #[test]
    fn test_load_records_skips_bad_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("c.jpg"), b"jpg").unwrap();
        let metadata = json!([
            {"filename": "a.jpg", "description": "a dog", "meta_tags": ["dog"], "face_count": 0},
            {"filename": "b.jpg", "description": "missing file", "meta_tags": ["cat"]},
            {"description": "no filename"},
            {"filename": "c.jpg", "detailed_description": null, "meta_tags": null, "face_count": 2},
        ]);
        let file = dir.path().join("images_metadata.json");
        fs::write(&file, serde_json::to_vec(&metadata).unwrap()).unwrap();

        let records = load_records(&file, dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tags, vec!["dog"]);
        assert_eq!(records[0].description, "a dog");
        assert_eq!(records[1].face_count, 2);
        assert!(records[1].tags.is_empty());
        assert!(records[1].detailed_description.is_empty());
    }

    #[test]
    fn test_load_records_missing_source() {
        let dir = TempDir::new().unwrap();
        assert!(load_records(dir.path().join("nope.json"), dir.path()).is_err());
        assert!(load_records(dir.path().join("nope.json"), dir.path().join("nodir")).is_err());
    }
}

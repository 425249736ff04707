//! 人脸编码聚类
//!
//! 聚类是贪心且依赖顺序的：按编码顺序依次选出尚未归属的编码作为种子，把所有与种子距离
//! 小于阈值的未归属编码并入该聚类。只有一个成员的聚类会被丢弃，其种子不会再参与后续的
//! 聚类。这里不做传递闭包，两个都接近第三者的编码只有在第三者先被访问时才会落到同一个
//! 聚类里。

use std::path::Path;

use anyhow::{Result, bail};
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactError;
use crate::config::{FaceOptions, Metric};
use crate::record::ImageRecord;
use crate::utils::{pb_style, write_atomic};

/// 计算两个编码之间的距离，维度不同的编码距离为无穷大
pub fn distance(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    match metric {
        Metric::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt(),
        Metric::Cosine => {
            let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
            for (x, y) in a.iter().zip(b) {
                dot += x * y;
                na += x * x;
                nb += y * y;
            }
            if na == 0.0 || nb == 0.0 {
                return 1.0;
            }
            1.0 - dot / (na.sqrt() * nb.sqrt())
        }
    }
}

/// 人脸编码原语，输入一张图片，输出图中每张人脸的定长编码
pub trait FaceEncoder: Sync {
    fn encode(&self, record: &ImageRecord) -> Result<Vec<Vec<f32>>>;
}

/// 直接使用分析服务记录在元数据里的人脸编码
pub struct RecordedEncodings;

impl FaceEncoder for RecordedEncodings {
    fn encode(&self, record: &ImageRecord) -> Result<Vec<Vec<f32>>> {
        match &record.face_encodings {
            Some(encodings) => Ok(encodings.clone()),
            None => bail!("没有记录人脸编码"),
        }
    }
}

/// 人脸编码所属的图片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMetadata {
    pub image: String,
    pub tags: Vec<String>,
}

/// 单个编码在一次聚类中的归属
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Unvisited,
    /// 作为种子访问过，但没有找到同伴
    Alone,
    Cluster(usize),
}

/// 对编码做一次贪心聚类，返回每个编码的归属以及聚类成员列表
pub fn cluster_faces(
    encodings: &[Vec<f32>],
    metric: Metric,
    threshold: f32,
) -> (Vec<Assignment>, Vec<Vec<usize>>) {
    let n = encodings.len();
    let mut assignment = vec![Assignment::Unvisited; n];
    let mut clusters: Vec<Vec<usize>> = vec![];

    for i in 0..n {
        if assignment[i] != Assignment::Unvisited {
            continue;
        }
        let id = clusters.len();
        let mut cluster = vec![i];
        assignment[i] = Assignment::Cluster(id);

        for j in 0..n {
            if assignment[j] != Assignment::Unvisited {
                continue;
            }
            if distance(metric, &encodings[i], &encodings[j]) < threshold {
                cluster.push(j);
                assignment[j] = Assignment::Cluster(id);
            }
        }

        if cluster.len() >= 2 {
            clusters.push(cluster);
        } else {
            assignment[i] = Assignment::Alone;
        }
    }

    (assignment, clusters)
}

/// 人脸聚类索引，对应 `face_clusters.bin`
///
/// `metadata[i]` 与 `encodings[i]` 描述同一张人脸，`clusters` 中保存的是它们的下标。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceClusterIndex {
    pub clusters: Vec<Vec<usize>>,
    pub metadata: Vec<FaceMetadata>,
    pub encodings: Vec<Vec<f32>>,
}

impl FaceClusterIndex {
    /// 对提取到的人脸进行聚类
    pub fn build(faces: Vec<(FaceMetadata, Vec<f32>)>, opts: &FaceOptions) -> Self {
        let (metadata, encodings): (Vec<_>, Vec<_>) = faces.into_iter().unzip();
        let (_, clusters) = cluster_faces(&encodings, opts.metric, opts.cluster_threshold);
        info!("从 {} 个人脸编码中找到 {} 个聚类", encodings.len(), clusters.len());
        Self { clusters, metadata, encodings }
    }

    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }

    /// 返回每个编码所属的聚类，未聚类的编码为 None
    pub fn assignments(&self) -> Vec<Option<usize>> {
        let mut out = vec![None; self.encodings.len()];
        for (id, cluster) in self.clusters.iter().enumerate() {
            for &i in cluster {
                if let Some(slot) = out.get_mut(i) {
                    *slot = Some(id);
                }
            }
        }
        out
    }

    /// 检查下标对应关系，以及每个编码最多属于一个聚类
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let n = self.encodings.len();
        if self.metadata.len() != n {
            return Err(ArtifactError::Inconsistent(format!(
                "metadata 数量 {} 与 encodings 数量 {} 不一致",
                self.metadata.len(),
                n
            )));
        }
        let mut seen = vec![false; n];
        for cluster in &self.clusters {
            for &i in cluster {
                if i >= n {
                    return Err(ArtifactError::Inconsistent(format!("聚类下标越界: {}", i)));
                }
                if seen[i] {
                    return Err(ArtifactError::Inconsistent(format!("编码 {} 属于多个聚类", i)));
                }
                seen[i] = true;
            }
        }
        Ok(())
    }

    /// 查找编码所属的聚类
    ///
    /// 每个聚类只取前 `cluster_sample_size` 个成员作为代表，返回第一个最小距离低于阈值的聚类。
    pub fn identify(&self, encoding: &[f32], opts: &FaceOptions) -> Option<usize> {
        for (id, cluster) in self.clusters.iter().enumerate() {
            let min = cluster
                .iter()
                .take(opts.cluster_sample_size)
                .filter_map(|&i| self.encodings.get(i))
                .map(|e| distance(opts.metric, e, encoding))
                .fold(f32::INFINITY, f32::min);
            if min < opts.match_threshold {
                debug!("人脸匹配到聚类 {}，距离 {:.3}", id, min);
                return Some(id);
            }
        }
        None
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = bincode::serialize(self)?;
        write_atomic(path, &data)
    }
}

/// 从有人脸的图片中提取编码，编码失败的图片会被跳过
///
/// 并行计算，但返回结果保持图片原有顺序。
pub fn extract_faces(records: &[ImageRecord], encoder: &dyn FaceEncoder) -> Vec<(FaceMetadata, Vec<f32>)> {
    let with_faces = records.iter().filter(|r| r.face_count > 0).collect::<Vec<_>>();
    let pb = ProgressBar::new(with_faces.len() as u64).with_style(pb_style());

    let encoded = with_faces
        .par_iter()
        .progress_with(pb.clone())
        .map(|record| match encoder.encode(record) {
            Ok(encodings) => Some((record, encodings)),
            Err(e) => {
                warn!("处理人脸失败 {}: {}", record.path.display(), e);
                None
            }
        })
        .collect::<Vec<_>>();
    pb.finish_and_clear();

    let mut faces = vec![];
    for (record, encodings) in encoded.into_iter().flatten() {
        for encoding in encodings {
            let meta = FaceMetadata { image: record.path.display().to_string(), tags: record.tags.clone() };
            faces.push((meta, encoding));
        }
    }
    info!("共提取 {} 个人脸编码", faces.len());
    faces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> FaceOptions {
        FaceOptions::default()
    }

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(distance(Metric::Euclidean, &[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(distance(Metric::Euclidean, &[1.0], &[1.0, 2.0]), f32::INFINITY);
    }

    #[test]
    fn test_cosine_distance() {
        assert!(distance(Metric::Cosine, &[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
        assert!((distance(Metric::Cosine, &[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(distance(Metric::Cosine, &[0.0, 0.0], &[0.0, 1.0]), 1.0);
    }

    #[test]
    fn test_close_pair_clusters_far_face_stays_alone() {
        // a 与 b 距离 0.4，c 与两者的距离都是 0.65 以上
        let encodings = vec![vec![0.0, 0.0], vec![0.4, 0.0], vec![0.2, 0.65]];
        let (assignment, clusters) = cluster_faces(&encodings, Metric::Euclidean, 0.6);
        assert_eq!(clusters, vec![vec![0, 1]]);
        assert_eq!(
            assignment,
            vec![Assignment::Cluster(0), Assignment::Cluster(0), Assignment::Alone]
        );
    }

    #[test]
    fn test_greedy_order_dependence() {
        // b 与 a、c 都接近，但 a 与 c 相距较远
        let a = vec![0.0];
        let b = vec![0.5];
        let c = vec![1.0];

        // 先访问 b 时，三者落在同一个聚类
        let (_, clusters) = cluster_faces(&[b.clone(), a.clone(), c.clone()], Metric::Euclidean, 0.6);
        assert_eq!(clusters, vec![vec![0, 1, 2]]);

        // 先访问 a 时，a 带走 b，c 只剩自己
        let (assignment, clusters) = cluster_faces(&[a, b, c], Metric::Euclidean, 0.6);
        assert_eq!(clusters, vec![vec![0, 1]]);
        assert_eq!(assignment[2], Assignment::Alone);
    }

    #[test]
    fn test_singleton_is_not_retried() {
        // 1 与 2 很接近，但 2 已经被 0 带走，1 作为种子时找不到同伴
        let encodings = vec![vec![0.0], vec![1.0], vec![0.5]];
        let (assignment, clusters) = cluster_faces(&encodings, Metric::Euclidean, 0.6);
        assert_eq!(clusters, vec![vec![0, 2]]);
        assert_eq!(assignment[1], Assignment::Alone);
        let index = FaceClusterIndex {
            clusters,
            metadata: vec![FaceMetadata { image: "a".into(), tags: vec![] }; 3],
            encodings,
        };
        assert_eq!(index.assignments(), vec![Some(0), None, Some(0)]);
    }

    #[test]
    fn test_index_membership_is_exclusive() {
        let faces = (0..6)
            .map(|i| {
                let meta = FaceMetadata { image: format!("{}.jpg", i), tags: vec![] };
                (meta, vec![(i / 2) as f32 * 10.0, (i % 2) as f32 * 0.1])
            })
            .collect::<Vec<_>>();
        let index = FaceClusterIndex::build(faces, &opts());
        assert_eq!(index.clusters, vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
        assert_eq!(index.encodings.len(), index.metadata.len());
        assert!(index.validate().is_ok());
        assert_eq!(index.assignments(), vec![Some(0), Some(0), Some(1), Some(1), Some(2), Some(2)]);
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let index = FaceClusterIndex {
            clusters: vec![vec![0, 1], vec![1]],
            metadata: vec![FaceMetadata { image: "a".into(), tags: vec![] }; 2],
            encodings: vec![vec![0.0]; 2],
        };
        assert!(index.validate().is_err());
    }

    #[test]
    fn test_identify_uses_first_members_only() {
        let mut encodings = vec![vec![0.0]; 5];
        encodings.push(vec![5.0]);
        let index = FaceClusterIndex {
            clusters: vec![(0..6).collect()],
            metadata: vec![FaceMetadata { image: "a".into(), tags: vec![] }; 6],
            encodings,
        };
        assert_eq!(index.identify(&[0.1], &opts()), Some(0));
        // 第 6 个成员不参与比较
        assert_eq!(index.identify(&[5.0], &opts()), None);
    }

    #[test]
    fn test_identify_returns_first_matching_cluster() {
        let index = FaceClusterIndex {
            clusters: vec![vec![0, 1], vec![2, 3]],
            metadata: vec![FaceMetadata { image: "a".into(), tags: vec![] }; 4],
            encodings: vec![vec![0.0], vec![0.1], vec![0.3], vec![0.35]],
        };
        assert_eq!(index.identify(&[0.25], &opts()), Some(0));
        assert_eq!(index.identify(&[3.0], &opts()), None);
        assert_eq!(FaceClusterIndex::default().identify(&[0.0], &opts()), None);
    }

    #[test]
    fn test_extract_faces_skips_failures() {
        let records = vec![
            ImageRecord::new("a.jpg", "", &["x"]).with_face_encodings(vec![vec![0.0], vec![1.0]]),
            ImageRecord::new("b.jpg", "", &["y"]).with_face_count(1),
            ImageRecord::new("c.jpg", "", &["z"]),
            ImageRecord::new("d.jpg", "", &["w"]).with_face_encodings(vec![vec![2.0]]),
        ];
        let faces = extract_faces(&records, &RecordedEncodings);
        let images = faces.iter().map(|(m, _)| m.image.as_str()).collect::<Vec<_>>();
        assert_eq!(images, vec!["a.jpg", "a.jpg", "d.jpg"]);
        assert_eq!(faces[2].0.tags, vec!["w"]);
    }
}

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;

static DATA_DIR: LazyLock<DataDir> = LazyLock::new(|| {
    let path = ProjectDirs::from("", "imsense", "imsense")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("training_data"));
    DataDir { path }
});

fn default_data_dir() -> &'static str {
    DATA_DIR.path().to_str().unwrap_or("training_data")
}

/// 模式挖掘参数
#[derive(Parser, Debug, Clone, Copy, PartialEq)]
pub struct MiningOptions {
    /// 每个标签最多保留的样本条目数量
    #[arg(long, value_name = "N", default_value_t = 100)]
    pub max_pattern_entries: usize,
    /// 全局高频标签保留数量
    #[arg(long, value_name = "N", default_value_t = 50)]
    pub common_tag_count: usize,
    /// 生成描述模式所需的最少样本数量，低于该值的标签视为噪声
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub min_description_samples: usize,
    /// 词频统计时取前多少个词
    #[arg(long, value_name = "N", default_value_t = 20)]
    pub common_word_count: usize,
    /// 常见词的最小长度（不含），短于等于该长度的词会被过滤
    #[arg(long, value_name = "LEN", default_value_t = 3)]
    pub min_word_len: usize,
    /// 每个标签考察的共现标签数量
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub synonym_candidates: usize,
    /// 两个标签成为同义词所需的最少共现次数
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub min_cooccurrence: usize,
}

impl Default for MiningOptions {
    fn default() -> Self {
        Self {
            max_pattern_entries: 100,
            common_tag_count: 50,
            min_description_samples: 3,
            common_word_count: 20,
            min_word_len: 3,
            synonym_candidates: 5,
            min_cooccurrence: 3,
        }
    }
}

/// 人脸聚类参数
#[derive(Parser, Debug, Clone, Copy, PartialEq)]
pub struct FaceOptions {
    /// 人脸编码的距离度量方式
    #[arg(long, value_enum, default_value_t = Metric::Euclidean)]
    pub metric: Metric,
    /// 训练时两张人脸被认为是同一个人的最大距离（不含）
    #[arg(long, value_name = "DISTANCE", default_value_t = 0.6)]
    pub cluster_threshold: f32,
    /// 查询时匹配到已有聚类的最大距离（不含）
    #[arg(long, value_name = "DISTANCE", default_value_t = 0.6)]
    pub match_threshold: f32,
    /// 查询时每个聚类参与比较的成员数量
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub cluster_sample_size: usize,
}

impl Default for FaceOptions {
    fn default() -> Self {
        Self {
            metric: Metric::Euclidean,
            cluster_threshold: 0.6,
            match_threshold: 0.6,
            cluster_sample_size: 5,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imsense", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 训练数据与模式文件所在目录
    #[arg(short, long, default_value = default_data_dir())]
    pub data_dir: DataDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 从已分析过的图片中学习模式
    Train(TrainCommand),
    /// 使用已学习的模式增强一条分析结果
    Enhance(EnhanceCommand),
    /// 查看已学习模式的加载状态
    Status(StatusCommand),
    /// 启动 HTTP 增强服务
    Server(ServerCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回训练输入（图片元数据）文件的路径
    pub fn metadata(&self) -> PathBuf {
        self.path.join("images_metadata.json")
    }

    /// 返回分类模式文件的路径
    pub fn category_patterns(&self) -> PathBuf {
        self.path.join("category_patterns.json")
    }

    /// 返回描述模式文件的路径
    pub fn description_patterns(&self) -> PathBuf {
        self.path.join("description_patterns.json")
    }

    /// 返回同义词索引文件的路径
    pub fn search_index(&self) -> PathBuf {
        self.path.join("search_index.json")
    }

    /// 返回人脸聚类文件的路径
    pub fn face_clusters(&self) -> PathBuf {
        self.path.join("face_clusters.bin")
    }

    /// 返回训练报告的路径
    pub fn training_report(&self) -> PathBuf {
        self.path.join("training_report.json")
    }

    /// 返回描述改进建议的路径
    pub fn improved_descriptions(&self) -> PathBuf {
        self.path.join("improved_descriptions.json")
    }
}

impl FromStr for DataDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// 人脸编码之间的距离度量
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// 欧氏距离，dlib 人脸编码的原生度量
    #[default]
    Euclidean,
    /// 余弦距离，即 1 - 余弦相似度
    Cosine,
}

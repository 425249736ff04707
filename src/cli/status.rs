use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::FaceOptions;
use crate::enhancer::Enhancer;
use crate::Opts;

#[derive(Parser, Debug, Clone)]
pub struct StatusCommand {
    /// 以 JSON 格式输出
    #[arg(long)]
    pub json: bool,
}

impl SubCommandExtend for StatusCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let enhancer = Enhancer::load(&opts.data_dir, FaceOptions::default());
        let status = enhancer.status();
        let artifacts = enhancer.artifacts();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }

        println!("数据目录: {}", opts.data_dir.path().display());
        println!(
            "category_patterns: {:?} ({} 个标签)",
            status.category_patterns,
            artifacts.category_patterns.patterns.len()
        );
        println!(
            "description_patterns: {:?} ({} 个标签)",
            status.description_patterns,
            artifacts.description_patterns.len()
        );
        println!(
            "search_index: {:?} ({} 个标签)",
            status.search_index,
            artifacts.search_index.synonyms.len()
        );
        println!(
            "face_clusters: {:?} ({} 个聚类，{} 个编码)",
            status.face_clusters,
            artifacts.face_clusters.clusters.len(),
            artifacts.face_clusters.encodings.len()
        );
        Ok(())
    }
}

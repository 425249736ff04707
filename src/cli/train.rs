use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::warn;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{FaceOptions, MiningOptions};
use crate::face::{FaceEncoder, RecordedEncodings};
use crate::{Opts, Trainer};

#[derive(Parser, Debug, Clone)]
pub struct TrainCommand {
    #[command(flatten)]
    pub mining: MiningOptions,
    #[command(flatten)]
    pub face: FaceOptions,
    /// 图片元数据文件，默认为数据目录下的 images_metadata.json
    #[arg(long, value_name = "FILE")]
    pub metadata: Option<PathBuf>,
    /// 图片所在目录，默认为数据目录
    #[arg(long, value_name = "DIR")]
    pub image_root: Option<PathBuf>,
    /// 跳过人脸聚类
    #[arg(long)]
    pub no_faces: bool,
}

impl SubCommandExtend for TrainCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let metadata = self.metadata.clone().unwrap_or_else(|| opts.data_dir.metadata());
        let image_root = self.image_root.clone().unwrap_or_else(|| opts.data_dir.path().to_path_buf());

        let encoder = RecordedEncodings;
        let encoder: Option<&dyn FaceEncoder> = if self.no_faces { None } else { Some(&encoder) };
        let trainer = Trainer::new(opts.data_dir.clone())
            .mining(self.mining)
            .face(self.face)
            .encoder(encoder);

        let records = trainer.collect(&metadata, &image_root)?;
        if records.is_empty() {
            warn!("没有可用的训练数据");
            return Ok(());
        }

        let report = block_in_place(|| trainer.run(&records))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

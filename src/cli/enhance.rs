use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::FaceOptions;
use crate::enhancer::{AnalysisResult, Enhancer};
use crate::Opts;

#[derive(Parser, Debug, Clone)]
pub struct EnhanceCommand {
    /// 基础模型输出的分析结果（JSON），`-` 表示从标准输入读取
    pub input: PathBuf,
    #[command(flatten)]
    pub face: FaceOptions,
}

impl SubCommandExtend for EnhanceCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let data = if self.input.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            std::fs::read_to_string(&self.input).with_context(|| format!("无法读取 {}", self.input.display()))?
        };
        let result: AnalysisResult = serde_json::from_str(&data).context("分析结果格式错误")?;

        let enhancer = Enhancer::load(&opts.data_dir, self.face);
        let enhanced = enhancer.enhance_analysis(result);
        println!("{}", serde_json::to_string_pretty(&enhanced)?);
        Ok(())
    }
}

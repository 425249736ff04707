use std::sync::Arc;

use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use crate::cli::SubCommandExtend;
use crate::config::FaceOptions;
use crate::enhancer::Enhancer;
use crate::{Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub face: FaceOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let enhancer = Enhancer::load(&opts.data_dir, self.face);
        if !enhancer.status().any_loaded() {
            info!("没有找到已学习的模式，所有请求将原样返回");
        }

        // 创建应用状态
        let state = server::AppState::new(Arc::new(enhancer));

        // 创建应用
        let app = server::create_app(state);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

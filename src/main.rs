// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/main.rs - 检测服务主程序
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::Arc;
use std::{thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use xiangzong::{
  FromUrl,
  api::{AppState, build_router, start_server},
  args::Args,
  model::{SharedModel, YoloCliBuilder},
  output::{Materializer, Transcoder},
};

/// 收到 Ctrl-C 后通知服务优雅退出，30 秒内未退出则强制结束
fn install_shutdown_handler() -> Result<Arc<Notify>> {
  let notify = Arc::new(Notify::new());
  let trigger = notify.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    trigger.notify_one();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("无法设置 Ctrl-C 处理函数")?;
  Ok(notify)
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "xiangzong=info,tower_http=info".into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let args = Args::parse();
  info!("模型: {}", args.model);
  info!("数据目录: {}", args.data_root.display());

  let paths = args.storage_paths();
  paths.ensure_dirs().context("无法创建数据目录")?;

  let model: SharedModel = Arc::new(YoloCliBuilder::from_url(&args.model)?.build()?);
  let materializer = Materializer::new(&paths.processed_dir, Transcoder::new(&args.ffmpeg))
    .with_keep_runs(args.keep_runs);

  let state = AppState::new(paths, model, materializer);
  let app = build_router(state, args.max_upload_bytes());

  let shutdown = install_shutdown_handler()?;
  let listener = tokio::net::TcpListener::bind(args.bind)
    .await
    .with_context(|| format!("无法监听 {}", args.bind))?;

  start_server(listener, app, async move { shutdown.notified().await }).await?;
  info!("服务已退出");
  Ok(())
}

// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/api.rs - HTTP 服务
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

use std::future::Future;
use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  response::Html,
  routing::{get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::{
  ledger::Ledger,
  model::SharedModel,
  output::Materializer,
  storage::{StoragePaths, UPLOAD_URL_PREFIX},
};

pub mod error;
mod process;
mod stats;
mod upload;

pub use self::error::ApiError;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// 所有请求共享的状态
#[derive(Clone)]
pub struct AppState {
  pub paths: Arc<StoragePaths>,
  pub model: SharedModel,
  pub materializer: Arc<Materializer>,
  pub ledger: Arc<Ledger>,
}

impl AppState {
  pub fn new(paths: StoragePaths, model: SharedModel, materializer: Materializer) -> Self {
    let ledger = Ledger::new(&paths.history_file);
    Self {
      paths: Arc::new(paths),
      model,
      materializer: Arc::new(materializer),
      ledger: Arc::new(ledger),
    }
  }
}

async fn index() -> Html<&'static str> {
  Html(INDEX_HTML)
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
  let uploads = ServeDir::new(&state.paths.upload_dir);
  let processed = ServeDir::new(state.materializer.processed_dir());

  Router::new()
    .route("/", get(index))
    .route("/upload/", post(upload::upload_file))
    .route("/upload/preview/{filename}", get(upload::preview))
    .route("/process/", post(process::process_file))
    .route("/stats/summary", get(stats::summary))
    .route("/stats/export/excel", get(stats::export_excel))
    .route("/stats/export/pdf", get(stats::export_pdf_report))
    .nest_service(UPLOAD_URL_PREFIX, uploads)
    .nest_service("/static/processed", processed)
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

/// 启动服务，`shutdown` 完成后优雅退出
pub async fn start_server<F>(
  listener: tokio::net::TcpListener,
  app: Router,
  shutdown: F,
) -> Result<(), std::io::Error>
where
  F: Future<Output = ()> + Send + 'static,
{
  info!("服务启动，监听地址: {}", listener.local_addr()?);
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown)
    .await
}

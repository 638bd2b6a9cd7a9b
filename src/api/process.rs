// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/api/process.rs - 检测处理接口
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

use axum::{Json, body::Bytes, extract::State};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{AppState, error::ApiError};
use crate::task::{ProcessTask, Task, Upload};

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
  pub processed_file: String,
}

/// 请求体必须是带非空字符串 `filename` 的 JSON 对象
fn parse_filename(body: &[u8]) -> Result<String, ApiError> {
  let invalid = || ApiError::BadRequest("Invalid JSON payload".to_string());

  let value: Value = serde_json::from_slice(body).map_err(|_| invalid())?;
  let object = value.as_object().ok_or_else(invalid)?;
  match object.get("filename").and_then(Value::as_str) {
    Some(name) if !name.is_empty() => Ok(name.to_string()),
    _ => Err(ApiError::Unprocessable(
      "Missing 'filename' in request".to_string(),
    )),
  }
}

pub async fn process_file(
  State(state): State<AppState>,
  body: Bytes,
) -> Result<Json<ProcessResponse>, ApiError> {
  let filename = parse_filename(&body)?;
  let path = state
    .paths
    .upload_path(&filename)
    .filter(|p| p.is_file())
    .ok_or_else(|| ApiError::NotFound("Input file not found".to_string()))?;

  let upload = Upload {
    name: filename,
    path,
  };
  let run_dir = state.paths.new_run_dir();
  debug!("分配运行目录: {}", run_dir.display());

  // 检测与转码都会阻塞，放到阻塞线程池执行
  let processed = tokio::task::spawn_blocking(move || {
    ProcessTask::new(&state.ledger, run_dir).run_task(&upload, &*state.model, &*state.materializer)
  })
  .await??;

  Ok(Json(ProcessResponse {
    processed_file: processed,
  }))
}

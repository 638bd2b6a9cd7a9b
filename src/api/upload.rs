// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/api/upload.rs - 文件上传与预览
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

use std::path::Path as FsPath;

use axum::{
  Json,
  extract::{Multipart, Path, State, multipart::Field},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{AppState, error::ApiError};
use crate::storage::{generate_name, upload_url};

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
  pub filename: String,
  pub url: String,
}

/// 逐块写入磁盘，返回写入的字节数
async fn stream_to_file(field: &mut Field<'_>, path: &FsPath) -> Result<u64, ApiError> {
  let io_err = |e: std::io::Error| ApiError::Internal(format!("Failed to store upload: {e}"));

  let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
  let mut written = 0u64;
  while let Some(chunk) = field.chunk().await? {
    file.write_all(&chunk).await.map_err(io_err)?;
    written += chunk.len() as u64;
  }
  file.flush().await.map_err(io_err)?;
  Ok(written)
}

pub async fn upload_file(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
  while let Some(mut field) = multipart.next_field().await? {
    if field.name() != Some(FILE_FIELD) {
      continue;
    }

    let original = field.file_name().unwrap_or_default().to_string();
    let name = generate_name(&original);
    let path = state.paths.upload_dir.join(&name);

    match stream_to_file(&mut field, &path).await {
      Ok(size) => info!("上传完成: {} -> {} ({} 字节)", original, name, size),
      Err(e) => {
        if let Err(rm) = tokio::fs::remove_file(&path).await {
          warn!("删除不完整的上传文件失败 {}: {}", path.display(), rm);
        }
        return Err(e);
      }
    }

    return Ok((
      StatusCode::CREATED,
      Json(UploadResponse {
        url: upload_url(&name),
        filename: name,
      }),
    ));
  }

  Err(ApiError::BadRequest(format!(
    "Missing '{FILE_FIELD}' field in upload"
  )))
}

pub async fn preview(
  State(state): State<AppState>,
  Path(filename): Path<String>,
) -> Result<Response, ApiError> {
  let not_found = || ApiError::NotFound("File not found".to_string());

  let path = state
    .paths
    .upload_path(&filename)
    .filter(|p| p.is_file())
    .ok_or_else(not_found)?;
  let bytes = tokio::fs::read(&path).await.map_err(|e| {
    if e.kind() == std::io::ErrorKind::NotFound {
      not_found()
    } else {
      ApiError::Internal(format!("Failed to read upload: {e}"))
    }
  })?;
  let mime = mime_guess::from_path(&path).first_or_octet_stream();

  Ok(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
}

// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/api/error.rs - HTTP 错误映射
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

use axum::{
  Json,
  extract::multipart::MultipartError,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::task::TaskError;

/// 处理接口的错误以 `{"detail": ...}` 返回，统计接口以 `{"error": ...}` 返回
#[derive(Error, Debug)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  Unprocessable(String),
  #[error("{0}")]
  NotFound(String),
  #[error("{0}")]
  Internal(String),
  /// 沿用上游给出的状态码，例如请求体超限时的 413
  #[error("{message}")]
  Rejected { status: StatusCode, message: String },
  #[error("{message}")]
  Report { status: StatusCode, message: String },
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ApiError::Rejected { status, .. } | ApiError::Report { status, .. } => *status,
    }
  }

  pub fn report(message: impl Into<String>) -> Self {
    ApiError::Report {
      status: StatusCode::INTERNAL_SERVER_ERROR,
      message: message.into(),
    }
  }
}

impl From<TaskError> for ApiError {
  fn from(e: TaskError) -> Self {
    ApiError::Internal(e.to_string())
  }
}

impl From<MultipartError> for ApiError {
  fn from(e: MultipartError) -> Self {
    ApiError::Rejected {
      status: e.status(),
      message: format!("Invalid multipart body: {}", e.body_text()),
    }
  }
}

impl From<tokio::task::JoinError> for ApiError {
  fn from(e: tokio::task::JoinError) -> Self {
    ApiError::Internal(format!("后台任务异常: {e}"))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("请求处理失败: {}", self);
    }
    let body = match &self {
      ApiError::Report { message, .. } => json!({ "error": message }),
      other => json!({ "detail": other.to_string() }),
    };
    (status, Json(body)).into_response()
  }
}

// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/api/stats.rs - 统计与报表接口
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
  extract::State,
  http::header,
  response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::info;

use super::{AppState, error::ApiError};
use crate::{
  ledger::HistoryRecord,
  report::{export_pdf, export_spreadsheet, summarize},
};

const NO_HISTORY: &str = "No history found";
const NO_RECORDS: &str = "No records to export";

const XLSX_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const PDF_TYPE: &str = "application/pdf";

/// 读取历史记录，文件不存在时返回 None
async fn load_history(state: &AppState) -> Result<Option<Vec<HistoryRecord>>, ApiError> {
  let ledger = state.ledger.clone();
  tokio::task::spawn_blocking(move || {
    if !ledger.exists() {
      return Ok(None);
    }
    ledger.load().map(Some)
  })
  .await?
  .map_err(|e| ApiError::report(e.to_string()))
}

fn no_data(message: &str) -> Response {
  Json(json!({ "error": message })).into_response()
}

fn attachment(bytes: Vec<u8>, content_type: &str, filename: &str) -> Response {
  (
    [
      (header::CONTENT_TYPE, content_type.to_string()),
      (
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{filename}\""),
      ),
    ],
    bytes,
  )
    .into_response()
}

pub async fn summary(State(state): State<AppState>) -> Result<Response, ApiError> {
  match load_history(&state).await? {
    None => Ok(no_data(NO_HISTORY)),
    Some(history) => Ok(Json(summarize(&history)).into_response()),
  }
}

pub async fn export_excel(State(state): State<AppState>) -> Result<Response, ApiError> {
  let history = match load_history(&state).await? {
    None => return Ok(no_data(NO_HISTORY)),
    Some(history) if history.is_empty() => return Ok(no_data(NO_RECORDS)),
    Some(history) => history,
  };

  let count = history.len();
  let bytes = tokio::task::spawn_blocking(move || export_spreadsheet(&history))
    .await?
    .map_err(|e| ApiError::report(e.to_string()))?;
  info!("导出表格报表: {} 条记录, {} 字节", count, bytes.len());

  Ok(attachment(bytes, XLSX_TYPE, "elephant_report.xlsx"))
}

pub async fn export_pdf_report(State(state): State<AppState>) -> Result<Response, ApiError> {
  // 没有历史记录时照常生成全零报告
  let history = load_history(&state).await?.unwrap_or_default();

  let count = history.len();
  let bytes = tokio::task::spawn_blocking(move || export_pdf(&history))
    .await?
    .map_err(|e| ApiError::report(e.to_string()))?;
  info!("导出 PDF 报告: {} 条记录, {} 字节", count, bytes.len());

  Ok(attachment(bytes, PDF_TYPE, "elephant_report.pdf"))
}

// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/report.rs - 历史统计与报表
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

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::ledger::{Detections, HistoryRecord};

mod pdf;
mod spreadsheet;
pub use self::pdf::export_pdf;
pub use self::spreadsheet::export_spreadsheet;

#[derive(Error, Debug)]
pub enum ReportError {
  #[error("没有可导出的历史记录")]
  Empty,
  #[error("生成表格失败: {0}")]
  Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
  #[error("生成 PDF 失败: {0}")]
  Pdf(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryEntry {
  pub file: String,
  pub detections: Detections,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
  pub total_files: usize,
  pub total_elephants: usize,
  pub average_processing_time: f64,
  pub history: Vec<SummaryEntry>,
}

/// 粗粒度汇总，用于 PDF 报告
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
  pub files: usize,
  pub detections: usize,
  pub mean_confidence: f64,
}

pub fn summarize(history: &[HistoryRecord]) -> Summary {
  let total_elephants = history.iter().map(|r| r.detections.total_elephants).sum();
  // 空历史时平均值定义为 0
  let average_processing_time = if history.is_empty() {
    0.0
  } else {
    history.iter().map(|r| r.processing_time).sum::<f64>() / history.len() as f64
  };

  Summary {
    total_files: history.len(),
    total_elephants,
    average_processing_time,
    history: history
      .iter()
      .map(|r| SummaryEntry {
        file: r.input_file.clone(),
        detections: r.detections.clone(),
      })
      .collect(),
  }
}

pub fn totals(history: &[HistoryRecord]) -> Totals {
  if history.is_empty() {
    return Totals {
      files: 0,
      detections: 0,
      mean_confidence: 0.0,
    };
  }

  Totals {
    files: history.len(),
    detections: history.iter().map(|r| r.detections.total_elephants).sum(),
    mean_confidence: history
      .iter()
      .map(|r| r.detections.average_confidence)
      .sum::<f64>()
      / history.len() as f64,
  }
}

/// 每条记录的检测率：检测数除以同一输入文件的记录数
pub fn detection_rates(history: &[HistoryRecord]) -> Vec<f64> {
  let mut runs: HashMap<&str, usize> = HashMap::new();
  for record in history {
    *runs.entry(record.input_file.as_str()).or_default() += 1;
  }
  history
    .iter()
    .map(|r| {
      let n = runs.get(r.input_file.as_str()).copied().unwrap_or(1);
      r.detections.total_elephants as f64 / n as f64
    })
    .collect()
}

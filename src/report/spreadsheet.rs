// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/report/spreadsheet.rs - 导出 xlsx 报表
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

use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::debug;

use super::{ReportError, detection_rates};
use crate::ledger::{HistoryRecord, round4};

const SUMMARY_SHEET: &str = "Summary";
const DETECTIONS_SHEET: &str = "Detections";

const SUMMARY_HEADERS: [&str; 7] = [
  "Timestamp",
  "Input File",
  "Output File",
  "Processing Time (ms)",
  "Total Elephants",
  "Average Confidence",
  "Detection Rate",
];

const DETECTIONS_HEADERS: [&str; 9] = [
  "Timestamp",
  "Input File",
  "Output File",
  "Class ID",
  "Confidence",
  "X Center",
  "Y Center",
  "Width",
  "Height",
];

fn write_header(sheet: &mut Worksheet, headers: &[&str], format: &Format) -> Result<(), ReportError> {
  for (col, title) in headers.iter().enumerate() {
    sheet.write_string_with_format(0, col as u16, *title, format)?;
    sheet.set_column_width(col as u16, (title.len() + 4) as f64)?;
  }
  Ok(())
}

/// 生成两张工作表的工作簿：每条记录一行的 Summary，每个检测框一行的 Detections
pub fn export_spreadsheet(history: &[HistoryRecord]) -> Result<Vec<u8>, ReportError> {
  if history.is_empty() {
    return Err(ReportError::Empty);
  }

  let bold = Format::new().set_bold();
  let rates = detection_rates(history);

  let mut summary = Worksheet::new();
  summary.set_name(SUMMARY_SHEET)?;
  write_header(&mut summary, &SUMMARY_HEADERS, &bold)?;
  for (i, (record, rate)) in history.iter().zip(rates).enumerate() {
    let row = i as u32 + 1;
    summary.write_string(row, 0, &record.timestamp)?;
    summary.write_string(row, 1, &record.input_file)?;
    summary.write_string(row, 2, &record.output_file)?;
    summary.write_number(row, 3, record.processing_time)?;
    summary.write_number(row, 4, record.detections.total_elephants as f64)?;
    summary.write_number(row, 5, round4(record.detections.average_confidence))?;
    summary.write_number(row, 6, rate)?;
  }

  let mut detections = Worksheet::new();
  detections.set_name(DETECTIONS_SHEET)?;
  write_header(&mut detections, &DETECTIONS_HEADERS, &bold)?;
  let mut row = 1u32;
  for record in history {
    for item in &record.detections.detections_list {
      detections.write_string(row, 0, &record.timestamp)?;
      detections.write_string(row, 1, &record.input_file)?;
      detections.write_string(row, 2, &record.output_file)?;
      detections.write_number(row, 3, item.class_id as f64)?;
      detections.write_number(row, 4, round4(item.score as f64))?;
      for (offset, value) in item.bbox.iter().enumerate() {
        detections.write_number(row, 5 + offset as u16, *value as f64)?;
      }
      row += 1;
    }
  }
  debug!("导出表格: {} 条记录, {} 个检测框", history.len(), row - 1);

  let mut workbook = Workbook::new();
  workbook.push_worksheet(summary);
  workbook.push_worksheet(detections);
  Ok(workbook.save_to_buffer()?)
}

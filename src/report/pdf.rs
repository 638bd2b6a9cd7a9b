// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/report/pdf.rs - 导出 PDF 报告
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

use chrono::Utc;
use lopdf::{Document, Object, Stream, dictionary};

use super::{ReportError, Totals, totals};
use crate::ledger::HistoryRecord;

const TITLE: &str = "Elephant Detection Report";

/// 单页报告：标题、生成时间与三项汇总
pub fn export_pdf(history: &[HistoryRecord]) -> Result<Vec<u8>, ReportError> {
  let generated = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
  let content = page_content(&totals(history), &generated);

  let mut doc = Document::with_version("1.5");
  let pages_id = doc.new_object_id();
  let font_id = doc.new_object_id();
  let bold_id = doc.new_object_id();
  let resources_id = doc.new_object_id();
  let content_id = doc.new_object_id();
  let page_id = doc.new_object_id();

  doc.objects.insert(
    font_id,
    Object::Dictionary(dictionary! {
      "Type" => "Font",
      "Subtype" => "Type1",
      "BaseFont" => "Helvetica",
    }),
  );
  doc.objects.insert(
    bold_id,
    Object::Dictionary(dictionary! {
      "Type" => "Font",
      "Subtype" => "Type1",
      "BaseFont" => "Helvetica-Bold",
    }),
  );
  doc.objects.insert(
    resources_id,
    Object::Dictionary(dictionary! {
      "Font" => dictionary! {
        "F1" => font_id,
        "F2" => bold_id,
      },
    }),
  );
  doc.objects.insert(
    content_id,
    Object::Stream(Stream::new(dictionary! {}, content.into_bytes())),
  );
  // A4
  doc.objects.insert(
    page_id,
    Object::Dictionary(dictionary! {
      "Type" => "Page",
      "Parent" => pages_id,
      "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
      "Resources" => resources_id,
      "Contents" => content_id,
    }),
  );
  doc.objects.insert(
    pages_id,
    Object::Dictionary(dictionary! {
      "Type" => "Pages",
      "Kids" => vec![page_id.into()],
      "Count" => 1,
    }),
  );
  let catalog_id = doc.add_object(dictionary! {
    "Type" => "Catalog",
    "Pages" => pages_id,
  });
  doc.trailer.set("Root", catalog_id);

  let mut buffer = Vec::new();
  doc
    .save_to(&mut buffer)
    .map_err(|e| ReportError::Pdf(e.to_string()))?;
  Ok(buffer)
}

fn page_content(totals: &Totals, generated: &str) -> String {
  let lines = [
    format!("Files processed: {}", totals.files),
    format!("Total detections: {}", totals.detections),
    format!("Average confidence: {:.2}", totals.mean_confidence),
  ];

  let mut content = String::new();
  content.push_str("BT\n/F2 18 Tf\n72 770 Td\n");
  content.push_str(&format!("({}) Tj\n", escape_pdf_string(TITLE)));
  content.push_str("/F1 10 Tf\n0 -22 Td\n");
  content.push_str(&format!("(Generated: {}) Tj\n", escape_pdf_string(generated)));
  content.push_str("/F1 12 Tf\n16 TL\n0 -32 Td\n");
  for line in &lines {
    content.push_str(&format!("({}) Tj T*\n", escape_pdf_string(line)));
  }
  content.push_str("ET\n");
  content
}

fn escape_pdf_string(s: &str) -> String {
  let mut escaped = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '(' | ')' | '\\' => {
        escaped.push('\\');
        escaped.push(c);
      }
      c if c.is_ascii() && !c.is_control() => escaped.push(c),
      // 标准 Type1 字体只覆盖 ASCII
      _ => escaped.push('?'),
    }
  }
  escaped
}

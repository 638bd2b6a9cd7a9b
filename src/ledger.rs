// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/ledger.rs - 处理历史记录
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

//! 历史记录是磁盘上的一个 JSON 数组，每次处理追加一条，按完成顺序排列。
//!
//! 追加操作在进程内串行执行，并通过“写临时文件再重命名”整体替换，
//! 不会丢失并发写入，也不会留下写了一半的文件。

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::model::DetectItem;

#[derive(Error, Debug)]
pub enum LedgerError {
  #[error("读取历史记录 '{path}' 失败: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("解析历史记录 '{path}' 失败: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
  #[error("写入历史记录 '{path}' 失败: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("序列化历史记录失败: {0}")]
  Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Detections {
  pub total_elephants: usize,
  pub average_confidence: f64,
  pub detections_list: Vec<DetectItem>,
}

impl Detections {
  /// 由检测框构造统计，数量与平均置信度总是与列表一致
  pub fn from_items(items: &[DetectItem]) -> Self {
    let average_confidence = if items.is_empty() {
      0.0
    } else {
      let sum: f64 = items.iter().map(|i| i.score as f64).sum();
      round4(sum / items.len() as f64)
    };
    Self {
      total_elephants: items.len(),
      average_confidence,
      detections_list: items.to_vec(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryRecord {
  pub timestamp: String,
  pub input_file: String,
  pub output_file: String,
  /// 推理耗时（毫秒）
  pub processing_time: f64,
  pub detections: Detections,
}

impl HistoryRecord {
  pub fn new(input_file: &str, output_file: &str, processing_time: f64, items: &[DetectItem]) -> Self {
    Self {
      timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
      input_file: input_file.to_string(),
      output_file: output_file.to_string(),
      processing_time,
      detections: Detections::from_items(items),
    }
  }
}

pub fn round4(value: f64) -> f64 {
  (value * 10_000.0).round() / 10_000.0
}

pub struct Ledger {
  path: PathBuf,
  writer: Mutex<()>,
}

impl Ledger {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      writer: Mutex::new(()),
    }
  }

  pub fn exists(&self) -> bool {
    self.path.is_file()
  }

  /// 读取全部记录，文件不存在时返回空列表
  pub fn load(&self) -> Result<Vec<HistoryRecord>, LedgerError> {
    let content = match std::fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(LedgerError::Read {
          path: self.path.clone(),
          source,
        });
      }
    };
    if content.trim().is_empty() {
      return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| LedgerError::Parse {
      path: self.path.clone(),
      source,
    })
  }

  /// 追加一条记录并返回追加后的记录总数
  pub fn append(&self, record: HistoryRecord) -> Result<usize, LedgerError> {
    let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());

    let mut history = self.load()?;
    history.push(record);
    self.replace(&history)?;
    debug!("历史记录已更新: {} 条", history.len());
    Ok(history.len())
  }

  fn replace(&self, history: &[HistoryRecord]) -> Result<(), LedgerError> {
    let write_err = |source: std::io::Error| LedgerError::Write {
      path: self.path.clone(),
      source,
    };

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let file_name = self
      .path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or("history.json");
    let tmp = self
      .path
      .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = (|| -> Result<(), LedgerError> {
      let file = std::fs::File::create(&tmp).map_err(write_err)?;
      let mut writer = BufWriter::new(file);
      serde_json::to_writer_pretty(&mut writer, history)?;
      writer.flush().map_err(write_err)?;
      writer.get_ref().sync_all().map_err(write_err)?;
      std::fs::rename(&tmp, &self.path).map_err(write_err)
    })();

    if result.is_err() {
      let _ = std::fs::remove_file(&tmp);
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  fn item(score: f32) -> DetectItem {
    DetectItem {
      class_id: 0,
      score,
      bbox: [0.5, 0.5, 0.1, 0.1],
    }
  }

  #[test]
  fn test_detections_statistics() {
    let detections = Detections::from_items(&[item(0.9), item(0.8), item(0.7)]);
    assert_eq!(detections.total_elephants, 3);
    assert_eq!(detections.detections_list.len(), 3);
    assert_eq!(detections.average_confidence, 0.8);
  }

  #[test]
  fn test_detections_empty() {
    let detections = Detections::from_items(&[]);
    assert_eq!(detections.total_elephants, 0);
    assert_eq!(detections.average_confidence, 0.0);
  }

  #[test]
  fn test_average_rounded_to_four_decimals() {
    let detections = Detections::from_items(&[item(0.91234), item(0.5)]);
    assert_eq!(detections.average_confidence, 0.7062);
  }

  #[test]
  fn test_record_json_shape() {
    let record = HistoryRecord::new("in.mp4", "out.mp4", 12.5, &[item(0.9)]);
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["input_file"], "in.mp4");
    assert_eq!(value["output_file"], "out.mp4");
    assert_eq!(value["processing_time"], 12.5);
    assert_eq!(value["detections"]["total_elephants"], 1);
    let first = &value["detections"]["detections_list"][0];
    assert_eq!(first["class_id"], 0);
    assert!(first["confidence"].is_number());
    assert_eq!(first["bbox"].as_array().unwrap().len(), 4);
    assert!(record.timestamp.ends_with('Z'));
  }

  #[test]
  fn test_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::new(dir.path().join("history.json"));
    assert!(!ledger.exists());
    assert!(ledger.load().unwrap().is_empty());
  }

  #[test]
  fn test_append_then_load_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::new(dir.path().join("data").join("history.json"));

    let records: Vec<HistoryRecord> = (0..5)
      .map(|i| HistoryRecord::new(&format!("in-{i}.jpg"), &format!("out-{i}.jpg"), i as f64, &[item(0.5)]))
      .collect();
    for (i, record) in records.iter().enumerate() {
      assert_eq!(ledger.append(record.clone()).unwrap(), i + 1);
    }

    assert_eq!(ledger.load().unwrap(), records);
    // 不留下临时文件
    let entries = std::fs::read_dir(dir.path().join("data")).unwrap().count();
    assert_eq!(entries, 1);
  }

  #[test]
  fn test_partial_records_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, r#"[{"input_file": "a.jpg"}, {"detections": {"total_elephants": 2}}]"#).unwrap();

    let history = Ledger::new(&path).load().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].input_file, "a.jpg");
    assert_eq!(history[0].processing_time, 0.0);
    assert_eq!(history[1].detections.total_elephants, 2);
    assert!(history[1].detections.detections_list.is_empty());
  }

  #[test]
  fn test_odd_bbox_lengths_still_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(
      &path,
      r#"[{"input_file": "a.jpg", "detections": {"total_elephants": 2, "detections_list": [
        {"class_id": 0, "confidence": 0.9, "bbox": [0.5, 0.5]},
        {"class_id": 0, "confidence": 0.7, "bbox": [0.1, 0.1, 0.2, 0.2, 0.0, 1.0]}
      ]}}]"#,
    )
    .unwrap();

    let ledger = Ledger::new(&path);
    let history = ledger.load().unwrap();
    let list = &history[0].detections.detections_list;
    assert_eq!(list[0].bbox, [0.5, 0.5, 0.0, 0.0]);
    assert_eq!(list[1].bbox, [0.1, 0.1, 0.2, 0.2]);
    // 追加时不会因旧记录而失败
    assert_eq!(ledger.append(HistoryRecord::default()).unwrap(), 2);
  }

  #[test]
  fn test_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, "{ not json").unwrap();
    let ledger = Ledger::new(&path);
    assert!(matches!(ledger.load(), Err(LedgerError::Parse { .. })));
    assert!(ledger.append(HistoryRecord::default()).is_err());
  }

  #[test]
  fn test_concurrent_appends_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(Ledger::new(dir.path().join("history.json")));

    let handles: Vec<_> = (0..8)
      .map(|i| {
        let ledger = ledger.clone();
        std::thread::spawn(move || {
          for j in 0..5 {
            let record = HistoryRecord::new(&format!("{i}-{j}.jpg"), "out.jpg", 0.0, &[]);
            ledger.append(record).unwrap();
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(ledger.load().unwrap().len(), 40);
  }
}

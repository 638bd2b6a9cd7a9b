// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/model.rs - 检测模型
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

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectItem {
  pub class_id: u32,
  #[serde(rename = "confidence")]
  pub score: f32,
  #[serde(deserialize_with = "lenient_bbox")]
  pub bbox: [f32; 4], // [cx, cy, w, h]，均为归一化坐标
}

/// 历史记录中的检测框长度不一定为 4：不足补 0，多余截断，null 视为全 0
fn lenient_bbox<'de, D>(deserializer: D) -> Result<[f32; 4], D::Error>
where
  D: Deserializer<'de>,
{
  let values = Option::<Vec<f32>>::deserialize(deserializer)?.unwrap_or_default();
  let mut bbox = [0.0; 4];
  for (slot, value) in bbox.iter_mut().zip(values) {
    *slot = value;
  }
  Ok(bbox)
}

/// 一次推理请求：输入文件与本次运行专属的输出目录
#[derive(Debug, Clone)]
pub struct DetectRequest {
  pub source: PathBuf,
  pub run_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  /// 推理耗时（毫秒），检测器无法给出时为 None
  pub inference_ms: Option<f64>,
  /// 标注结果所在目录
  pub run_dir: PathBuf,
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型路径错误: {0}")]
  ModelPath(String),
  #[error("模型参数错误: {0}")]
  InvalidArgument(String),
  #[error("无法启动检测进程 {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("检测进程执行失败 ({status}): {stderr}")]
  Process { status: String, stderr: String },
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 服务中共享的检测器句柄，启动时构造一次后注入请求处理
pub type SharedModel =
  Arc<dyn Model<Input = DetectRequest, Output = DetectResult, Error = ModelError> + Send + Sync>;

mod yolo_cli;
pub use self::yolo_cli::{YoloCli, YoloCliBuilder};

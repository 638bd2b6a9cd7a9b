// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/model/yolo_cli.rs - 基于 Ultralytics 命令行的 YOLO 检测器
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

//! 通过 `yolo predict` 子进程运行预训练模型。
//!
//! # URL 格式
//!
//! - `yolo:///models/elephant_model.pt` - 指定模型权重
//! - `yolo:///models/elephant_model.pt?conf=0.25&device=cpu&imgsz=640&bin=/opt/venv/bin/yolo`
//!
//! 每次推理写出到调用方给定的运行目录：标注后的图像/视频，以及
//! `labels/*.txt`（每行 `cls cx cy w h conf`，归一化坐标）。

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectRequest, DetectResult, Model, ModelError},
};

const YOLO_SCHEME: &str = "yolo";
const DEFAULT_PROGRAM: &str = "yolo";
const LABELS_DIR: &str = "labels";

pub struct YoloCli {
  program: String,
  model_path: PathBuf,
  conf: Option<f32>,
  device: Option<String>,
  imgsz: Option<u32>,
}

pub struct YoloCliBuilder {
  program: String,
  model_path: PathBuf,
  conf: Option<f32>,
  device: Option<String>,
  imgsz: Option<u32>,
}

impl FromUrlWithScheme for YoloCliBuilder {
  const SCHEME: &'static str = YOLO_SCHEME;
}

impl FromUrl for YoloCliBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPath(format!(
        "模型路径必须使用 {} 方案, 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = urlencoding::decode(url.path())
      .map_err(|e| ModelError::ModelPath(format!("模型路径编码无效: {}", e)))?;
    if path.is_empty() || path == "/" {
      return Err(ModelError::ModelPath("缺少模型文件路径".to_string()));
    }

    let mut builder = YoloCliBuilder::new(&*path);
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "conf" => {
          let conf = v
            .parse::<f32>()
            .ok()
            .filter(|c| *c > 0.0 && *c <= 1.0)
            .ok_or_else(|| ModelError::InvalidArgument(format!("置信度阈值无效: {}", v)))?;
          builder = builder.conf(conf);
        }
        "imgsz" => {
          let imgsz = v
            .parse::<u32>()
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| ModelError::InvalidArgument(format!("输入尺寸无效: {}", v)))?;
          builder = builder.imgsz(imgsz);
        }
        "device" => builder = builder.device(&v),
        "bin" => builder = builder.program(&v),
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl YoloCliBuilder {
  pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
    YoloCliBuilder {
      program: DEFAULT_PROGRAM.to_string(),
      model_path: model_path.as_ref().to_path_buf(),
      conf: None,
      device: None,
      imgsz: None,
    }
  }

  pub fn program(mut self, program: &str) -> Self {
    self.program = program.to_string();
    self
  }

  pub fn conf(mut self, conf: f32) -> Self {
    self.conf = Some(conf);
    self
  }

  pub fn device(mut self, device: &str) -> Self {
    self.device = Some(device.to_string());
    self
  }

  pub fn imgsz(mut self, imgsz: u32) -> Self {
    self.imgsz = Some(imgsz);
    self
  }

  /// 一次性初始化：确认权重文件存在
  pub fn build(self) -> Result<YoloCli, ModelError> {
    info!("加载模型: {}", self.model_path.display());
    if !self.model_path.is_file() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(ModelError::ModelPath(format!(
        "模型文件不存在: {}",
        self.model_path.display()
      )));
    }

    let size = std::fs::metadata(&self.model_path)?.len();
    info!("模型文件大小: {:.2} MB", size as f64 / (1024.0 * 1024.0));
    debug!(
      "检测程序: {}, 置信度阈值: {:?}, 设备: {:?}, 输入尺寸: {:?}",
      self.program, self.conf, self.device, self.imgsz
    );

    Ok(YoloCli {
      program: self.program,
      model_path: self.model_path,
      conf: self.conf,
      device: self.device,
      imgsz: self.imgsz,
    })
  }
}

impl YoloCli {
  fn command(&self, source: &Path, project: &Path, name: &str) -> Command {
    let mut command = Command::new(&self.program);
    command
      .arg("predict")
      .arg(format!("model={}", self.model_path.display()))
      .arg(format!("source={}", source.display()))
      .arg(format!("project={}", project.display()))
      .arg(format!("name={}", name))
      .arg("save=True")
      .arg("save_txt=True")
      .arg("save_conf=True")
      .arg("exist_ok=True");
    if let Some(conf) = self.conf {
      command.arg(format!("conf={}", conf));
    }
    if let Some(device) = &self.device {
      command.arg(format!("device={}", device));
    }
    if let Some(imgsz) = self.imgsz {
      command.arg(format!("imgsz={}", imgsz));
    }
    command
  }
}

impl Model for YoloCli {
  type Input = DetectRequest;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let project = input
      .run_dir
      .parent()
      .ok_or_else(|| ModelError::InvalidArgument("运行目录没有上级目录".to_string()))?;
    let name = input
      .run_dir
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| ModelError::InvalidArgument("运行目录名称无效".to_string()))?;
    std::fs::create_dir_all(project)?;

    debug!(
      "执行检测: {} -> {}",
      input.source.display(),
      input.run_dir.display()
    );
    let now = Instant::now();
    let output = self
      .command(&input.source, project, name)
      .output()
      .map_err(|source| ModelError::Spawn {
        program: self.program.clone(),
        source,
      })?;
    let elapsed = now.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
      error!("检测进程失败: {}", stderr.trim());
      return Err(ModelError::Process {
        status: output.status.to_string(),
        stderr: stderr.trim().to_string(),
      });
    }

    // Ultralytics 的日志可能写到 stdout 也可能写到 stderr
    let inference_ms = parse_inference_ms(&stdout).or_else(|| parse_inference_ms(&stderr));
    let items = read_labels(&input.run_dir)?;
    info!(
      "检测完成，耗时: {:.2?}，推理: {:?} ms，检测到 {} 个目标",
      elapsed,
      inference_ms,
      items.len()
    );

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      inference_ms,
      run_dir: input.run_dir.clone(),
    })
  }
}

/// 解析一行标签：`cls cx cy w h [conf]`
pub(crate) fn parse_label_line(line: &str) -> Option<DetectItem> {
  let mut fields = line.split_whitespace();
  let class_id = fields.next()?.parse::<f32>().ok()?;
  if class_id < 0.0 {
    return None;
  }
  let mut bbox = [0f32; 4];
  for v in bbox.iter_mut() {
    *v = fields.next()?.parse().ok()?;
  }
  let score = match fields.next() {
    Some(v) => v.parse().ok()?,
    None => 0.0,
  };
  Some(DetectItem {
    class_id: class_id as u32,
    score,
    bbox,
  })
}

/// 视频逐帧标签文件形如 `<stem>_<frame>.txt`
fn frame_index(path: &Path) -> Option<u64> {
  let stem = path.file_stem()?.to_str()?;
  let (_, index) = stem.rsplit_once('_')?;
  index.parse().ok()
}

/// 按帧顺序读取运行目录下的全部检测框，没有标签目录时视为无检测
pub(crate) fn read_labels(run_dir: &Path) -> std::io::Result<Vec<DetectItem>> {
  let labels_dir = run_dir.join(LABELS_DIR);
  if !labels_dir.is_dir() {
    debug!("没有标签目录: {}", labels_dir.display());
    return Ok(Vec::new());
  }

  let mut files = Vec::new();
  for entry in std::fs::read_dir(&labels_dir)? {
    let path = entry?.path();
    if path.extension().is_some_and(|ext| ext == "txt") {
      files.push(path);
    }
  }
  files.sort_by(|a, b| {
    (frame_index(a).unwrap_or(0), a.file_name()).cmp(&(frame_index(b).unwrap_or(0), b.file_name()))
  });

  let mut items = Vec::new();
  for file in files {
    let content = std::fs::read_to_string(&file)?;
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
      match parse_label_line(line) {
        Some(item) => items.push(item),
        None => warn!("跳过无法解析的标签行 {}: {}", file.display(), line),
      }
    }
  }
  Ok(items)
}

/// 从 Ultralytics 日志中取第一条结果的推理耗时（毫秒）
///
/// 逐结果日志形如 `image 1/1 /x.jpg: 480x640 2 elephants, 41.3ms`，
/// 找不到时退回汇总行 `Speed: 1.5ms preprocess, 40.2ms inference, ...`。
pub(crate) fn parse_inference_ms(log: &str) -> Option<f64> {
  let per_result = log.lines().map(str::trim).find_map(|line| {
    if !(line.starts_with("image ") || line.starts_with("video ")) {
      return None;
    }
    let (_, last) = line.rsplit_once(", ")?;
    last.trim().strip_suffix("ms")?.parse::<f64>().ok()
  });
  if per_result.is_some() {
    return per_result;
  }

  log.lines().map(str::trim).find_map(|line| {
    let speed = line.strip_prefix("Speed:")?;
    speed.split(", ").find_map(|part| {
      part
        .trim()
        .strip_suffix(" inference")?
        .strip_suffix("ms")?
        .parse::<f64>()
        .ok()
    })
  })
}

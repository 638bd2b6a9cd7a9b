// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::storage::StoragePaths;

/// Xiangzong 象群检测服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, env = "XIANGZONG_BIND", default_value = "0.0.0.0:8000", value_name = "ADDR")]
  pub bind: SocketAddr,

  /// 数据根目录，其下为 static/uploads、static/processed、data/history.json 与 runs/detect
  #[arg(long, env = "XIANGZONG_DATA_ROOT", default_value = ".", value_name = "DIR")]
  pub data_root: PathBuf,

  /// 上传目录（覆盖默认布局）
  #[arg(long, env = "XIANGZONG_UPLOAD_DIR", value_name = "DIR")]
  pub upload_dir: Option<PathBuf>,

  /// 处理结果目录（覆盖默认布局）
  #[arg(long, env = "XIANGZONG_PROCESSED_DIR", value_name = "DIR")]
  pub processed_dir: Option<PathBuf>,

  /// 历史记录文件（覆盖默认布局）
  #[arg(long, env = "XIANGZONG_HISTORY_FILE", value_name = "FILE")]
  pub history_file: Option<PathBuf>,

  /// 检测运行目录（覆盖默认布局）
  #[arg(long, env = "XIANGZONG_RUNS_DIR", value_name = "DIR")]
  pub runs_dir: Option<PathBuf>,

  /// 检测模型，例如 yolo:///models/elephant_model.pt?conf=0.25
  #[arg(
    long,
    env = "XIANGZONG_MODEL",
    default_value = "yolo:///models/elephant_model.pt",
    value_name = "MODEL"
  )]
  pub model: Url,

  /// ffmpeg 可执行文件
  #[arg(long, env = "XIANGZONG_FFMPEG", default_value = "ffmpeg", value_name = "PROGRAM")]
  pub ffmpeg: String,

  /// 保留检测运行目录，便于排查
  #[arg(long, env = "XIANGZONG_KEEP_RUNS")]
  pub keep_runs: bool,

  /// 上传大小上限（MiB）
  #[arg(long, env = "XIANGZONG_MAX_UPLOAD_MB", default_value_t = 512, value_name = "MB")]
  pub max_upload_mb: usize,
}

impl Args {
  pub fn storage_paths(&self) -> StoragePaths {
    let mut paths = StoragePaths::from_root(&self.data_root);
    if let Some(dir) = &self.upload_dir {
      paths.upload_dir = dir.clone();
    }
    if let Some(dir) = &self.processed_dir {
      paths.processed_dir = dir.clone();
    }
    if let Some(file) = &self.history_file {
      paths.history_file = file.clone();
    }
    if let Some(dir) = &self.runs_dir {
      paths.runs_dir = dir.clone();
    }
    paths
  }

  pub fn max_upload_bytes(&self) -> usize {
    self.max_upload_mb.saturating_mul(1024 * 1024)
  }
}

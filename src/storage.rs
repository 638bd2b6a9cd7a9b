// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/storage.rs - 存储目录与文件命名
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

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

/// 上传文件对外访问的 URL 前缀
pub const UPLOAD_URL_PREFIX: &str = "/static/uploads";

/// 服务使用的全部存储位置
///
/// 没有数据库，文件系统即存储：上传原件、处理结果、历史记录文件，
/// 以及检测器写出的临时运行目录。
#[derive(Debug, Clone)]
pub struct StoragePaths {
  pub upload_dir: PathBuf,
  pub processed_dir: PathBuf,
  pub history_file: PathBuf,
  pub runs_dir: PathBuf,
}

impl StoragePaths {
  /// 按默认布局从数据根目录派生各路径
  pub fn from_root<P: AsRef<Path>>(root: P) -> Self {
    let root = root.as_ref();
    let static_dir = root.join("static");
    Self {
      upload_dir: static_dir.join("uploads"),
      processed_dir: static_dir.join("processed"),
      history_file: root.join("data").join("history.json"),
      runs_dir: root.join("runs").join("detect"),
    }
  }

  pub fn ensure_dirs(&self) -> std::io::Result<()> {
    for dir in [&self.upload_dir, &self.processed_dir, &self.runs_dir] {
      std::fs::create_dir_all(dir)?;
      debug!("目录就绪: {}", dir.display());
    }
    if let Some(parent) = self.history_file.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    Ok(())
  }

  /// 解析客户端给出的上传文件名，非法名称返回 None
  pub fn upload_path(&self, name: &str) -> Option<PathBuf> {
    is_plain_name(name).then(|| self.upload_dir.join(name))
  }

  /// 为一次检测分配独立的运行目录（尚未创建）
  pub fn new_run_dir(&self) -> PathBuf {
    self.runs_dir.join(format!("predict-{}", Uuid::new_v4()))
  }
}

/// 生成新的存储文件名：随机 UUID 加上原文件的扩展名（含点号）
///
/// 原文件名除扩展名外全部丢弃；没有扩展名时结果也不带扩展名。
pub fn generate_name(original: &str) -> String {
  match extension_of(original) {
    Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
    None => Uuid::new_v4().to_string(),
  }
}

/// 只接受由 ASCII 字母和数字组成的扩展名，其它一律视为没有扩展名
pub fn extension_of(name: &str) -> Option<&str> {
  Path::new(name)
    .extension()
    .and_then(|ext| ext.to_str())
    .filter(|ext| !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric()))
}

pub fn upload_url(name: &str) -> String {
  format!("{}/{}", UPLOAD_URL_PREFIX, urlencoding::encode(name))
}

fn is_plain_name(name: &str) -> bool {
  !name.is_empty()
    && name != "."
    && name != ".."
    && !name.contains(['/', '\\'])
    && !name.contains('\0')
}

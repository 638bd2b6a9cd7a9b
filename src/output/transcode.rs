// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/output/transcode.rs - ffmpeg 视频转码
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

//! 将浏览器无法直接播放的容器（AVI）重新编码为 H.264/AAC 的 MP4。
//!
//! 此模块需要系统安装 ffmpeg 命令行工具。

use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::{error, info};

const DEFAULT_FFMPEG: &str = "ffmpeg";

#[derive(Error, Debug)]
pub enum TranscodeError {
  #[error("无法执行 {program} (请确保已安装): {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("{program} 失败 ({status}): {stderr}")]
  Failed {
    program: String,
    status: String,
    stderr: String,
  },
}

#[derive(Debug, Clone)]
pub struct Transcoder {
  program: String,
}

impl Default for Transcoder {
  fn default() -> Self {
    Self::new(DEFAULT_FFMPEG)
  }
}

impl Transcoder {
  pub fn new(program: &str) -> Self {
    Self {
      program: program.to_string(),
    }
  }

  pub fn program(&self) -> &str {
    &self.program
  }

  /// 同步转码，阻塞直到 ffmpeg 退出
  pub fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
    info!("开始转码视频: {} -> {}", input.display(), output.display());

    let result = Command::new(&self.program)
      .arg("-y") // 覆盖已存在的文件
      .arg("-loglevel")
      .arg("error")
      .arg("-i")
      .arg(input)
      .arg("-c:v")
      .arg("libx264") // 使用 H.264 编码
      .arg("-preset")
      .arg("fast")
      .arg("-crf")
      .arg("23")
      .arg("-c:a")
      .arg("aac")
      .arg("-b:a")
      .arg("128k")
      .arg(output)
      .output();

    match result {
      Ok(out) if out.status.success() => {
        info!("视频转码成功: {}", output.display());
        Ok(())
      }
      Ok(out) => {
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        error!("{} 错误: {}", self.program, stderr);
        Err(TranscodeError::Failed {
          program: self.program.clone(),
          status: out.status.to_string(),
          stderr,
        })
      }
      Err(source) => {
        error!("无法执行 {}: {}", self.program, source);
        Err(TranscodeError::Spawn {
          program: self.program.clone(),
          source,
        })
      }
    }
  }
}

// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/output.rs - 检测结果落盘
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

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::storage::generate_name;

mod transcode;
pub use self::transcode::{TranscodeError, Transcoder};

/// 可作为结果的标注文件扩展名
const ARTIFACT_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "webp", "mp4", "avi"];
/// 浏览器不能直接播放、需要转码的容器
const TRANSCODE_EXTENSIONS: [&str; 1] = ["avi"];
const WEB_VIDEO_EXTENSION: &str = "mp4";

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("检测运行目录不存在: {0}")]
  RunDirMissing(PathBuf),
  #[error("运行目录中没有结果文件: {0}")]
  NoArtifact(PathBuf),
  #[error("遍历运行目录错误: {0}")]
  Walk(#[from] walkdir::Error),
  #[error("复制结果文件 '{from}' 到 '{to}' 失败: {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("视频转码错误: {0}")]
  Transcode(#[from] TranscodeError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 把检测运行目录中的标注结果搬到处理结果目录
pub struct Materializer {
  processed_dir: PathBuf,
  transcoder: Transcoder,
  keep_runs: bool,
}

impl Materializer {
  pub fn new<P: AsRef<Path>>(processed_dir: P, transcoder: Transcoder) -> Self {
    Self {
      processed_dir: processed_dir.as_ref().to_path_buf(),
      transcoder,
      keep_runs: false,
    }
  }

  pub fn with_keep_runs(mut self, keep_runs: bool) -> Self {
    self.keep_runs = keep_runs;
    self
  }

  pub fn processed_dir(&self) -> &Path {
    &self.processed_dir
  }

  /// 复制结果文件并在需要时转码，返回最终的文件名
  pub fn materialize(&self, run_dir: &Path) -> Result<String, OutputError> {
    let artifact = find_artifact(run_dir)?;
    let file_name = artifact
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or_default();
    let name = generate_name(file_name);
    let target = self.processed_dir.join(&name);

    std::fs::create_dir_all(&self.processed_dir)?;
    std::fs::copy(&artifact, &target).map_err(|source| OutputError::Copy {
      from: artifact.clone(),
      to: target.clone(),
      source,
    })?;
    info!("结果文件已复制: {} -> {}", artifact.display(), target.display());

    if !needs_transcode(&target) {
      return Ok(name);
    }

    let web_target = target.with_extension(WEB_VIDEO_EXTENSION);
    if let Err(e) = self.transcoder.transcode(&target, &web_target) {
      // 转码失败时原副本和不完整的输出都不能留在对外目录中
      for leftover in [&target, &web_target] {
        match std::fs::remove_file(leftover) {
          Ok(()) => {}
          Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
          Err(rm) => warn!("删除转码残留文件失败 {}: {}", leftover.display(), rm),
        }
      }
      return Err(e.into());
    }
    std::fs::remove_file(&target)?;
    let web_name = web_target
      .file_name()
      .and_then(|n| n.to_str())
      .map(str::to_string)
      .unwrap_or(name);
    Ok(web_name)
  }

  /// 结果取出后删除运行目录，除非配置为保留
  pub fn cleanup_run(&self, run_dir: &Path) {
    if self.keep_runs {
      debug!("保留运行目录: {}", run_dir.display());
      return;
    }
    if let Err(e) = std::fs::remove_dir_all(run_dir) {
      warn!("清理运行目录失败 {}: {}", run_dir.display(), e);
    }
  }
}

fn has_extension_in(path: &Path, allowed: &[&str]) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| ext.to_ascii_lowercase())
    .is_some_and(|ext| allowed.contains(&ext.as_str()))
}

fn needs_transcode(path: &Path) -> bool {
  has_extension_in(path, &TRANSCODE_EXTENSIONS)
}

/// 递归查找第一个结果文件，按文件名排序保证结果确定
pub fn find_artifact(run_dir: &Path) -> Result<PathBuf, OutputError> {
  if !run_dir.is_dir() {
    return Err(OutputError::RunDirMissing(run_dir.to_path_buf()));
  }

  for entry in WalkDir::new(run_dir).min_depth(1).sort_by_file_name() {
    let entry = entry?;
    if entry.file_type().is_file() && has_extension_in(entry.path(), &ARTIFACT_EXTENSIONS) {
      debug!("找到结果文件: {}", entry.path().display());
      return Ok(entry.into_path());
    }
  }

  Err(OutputError::NoArtifact(run_dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_find_artifact_skips_labels() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("predict-1");
    std::fs::create_dir_all(run.join("labels")).unwrap();
    std::fs::write(run.join("labels").join("a.txt"), "0 0.5 0.5 0.1 0.1 0.9").unwrap();
    std::fs::write(run.join("a.JPG"), b"jpeg").unwrap();

    let artifact = find_artifact(&run).unwrap();
    assert_eq!(artifact, run.join("a.JPG"));
  }

  #[test]
  fn test_find_artifact_recurses() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested").join("clip.avi"), b"riff").unwrap();
    assert_eq!(
      find_artifact(dir.path()).unwrap(),
      dir.path().join("nested").join("clip.avi")
    );
  }

  #[test]
  fn test_find_artifact_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      find_artifact(&dir.path().join("missing")),
      Err(OutputError::RunDirMissing(_))
    ));
    std::fs::write(dir.path().join("args.yaml"), "task: detect").unwrap();
    assert!(matches!(
      find_artifact(dir.path()),
      Err(OutputError::NoArtifact(_))
    ));
  }

  #[test]
  fn test_materialize_image_and_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("runs").join("predict-1");
    std::fs::create_dir_all(&run).unwrap();
    std::fs::write(run.join("herd.png"), b"png-bytes").unwrap();

    let processed = dir.path().join("processed");
    let materializer = Materializer::new(&processed, Transcoder::default());
    let name = materializer.materialize(&run).unwrap();

    assert!(name.ends_with(".png"));
    assert_ne!(name, "herd.png");
    assert_eq!(std::fs::read(processed.join(&name)).unwrap(), b"png-bytes");

    materializer.cleanup_run(&run);
    assert!(!run.exists());
  }

  #[test]
  fn test_keep_runs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
    let materializer =
      Materializer::new(dir.path().join("out"), Transcoder::default()).with_keep_runs(true);
    materializer.cleanup_run(dir.path());
    assert!(dir.path().join("a.jpg").exists());
  }

  #[test]
  fn test_transcode_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let run = dir.path().join("run");
    std::fs::create_dir_all(&run).unwrap();
    std::fs::write(run.join("clip.avi"), b"riff").unwrap();

    let materializer = Materializer::new(
      dir.path().join("processed"),
      Transcoder::new("/nonexistent/ffmpeg-binary"),
    );
    assert!(matches!(
      materializer.materialize(&run),
      Err(OutputError::Transcode(_))
    ));
  }

  #[cfg(unix)]
  fn fake_program(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  #[cfg(unix)]
  #[test]
  fn test_transcode_exit_failure_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    // 写出部分输出后失败退出
    let fake = fake_program(
      dir.path(),
      "broken-ffmpeg",
      "#!/bin/sh\nfor last in \"$@\"; do :; done\necho partial > \"$last\"\necho 'encoder died' >&2\nexit 1\n",
    );

    let run = dir.path().join("run");
    std::fs::create_dir_all(&run).unwrap();
    std::fs::write(run.join("clip.avi"), b"riff").unwrap();

    let processed = dir.path().join("processed");
    let materializer = Materializer::new(&processed, Transcoder::new(fake.to_str().unwrap()));
    let err = materializer.materialize(&run).unwrap_err();

    match err {
      OutputError::Transcode(TranscodeError::Failed { stderr, .. }) => {
        assert!(stderr.contains("encoder died"));
      }
      other => panic!("unexpected error: {other}"),
    }
    assert_eq!(std::fs::read_dir(&processed).unwrap().count(), 0);
  }

  #[cfg(unix)]
  #[test]
  fn test_transcode_replaces_avi() {
    let dir = tempfile::tempdir().unwrap();
    // 假 ffmpeg：把 -i 的输入复制到最后一个参数
    let fake = fake_program(
      dir.path(),
      "fake-ffmpeg",
      "#!/bin/sh\nwhile [ $# -gt 1 ]; do\n  if [ \"$1\" = \"-i\" ]; then src=\"$2\"; fi\n  shift\ndone\ncp \"$src\" \"$1\"\n",
    );

    let run = dir.path().join("run");
    std::fs::create_dir_all(&run).unwrap();
    std::fs::write(run.join("clip.avi"), b"riff").unwrap();

    let processed = dir.path().join("processed");
    let materializer = Materializer::new(&processed, Transcoder::new(fake.to_str().unwrap()));
    let name = materializer.materialize(&run).unwrap();

    assert!(name.ends_with(".mp4"));
    assert!(processed.join(&name).exists());
    let leftovers: Vec<_> = std::fs::read_dir(&processed).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
  }
}

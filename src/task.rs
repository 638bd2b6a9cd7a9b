// 该文件是 Xiangzong （象踪） 项目的一部分。
// src/task.rs - 检测处理任务
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

use thiserror::Error;
use tracing::{error, info};

use crate::{
  ledger::{HistoryRecord, Ledger},
  model::{DetectRequest, DetectResult, Model, ModelError},
  output::{Materializer, OutputError},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("检测失败: {0}")]
  Model(#[from] ModelError),
  #[error("结果处理失败: {0}")]
  Output(#[from] OutputError),
}

/// 已上传、待处理的文件
#[derive(Debug, Clone)]
pub struct Upload {
  pub name: String,
  pub path: PathBuf,
}

/// 一次完整处理：检测、取出结果、清理运行目录、写入历史记录
pub struct ProcessTask<'a> {
  ledger: &'a Ledger,
  run_dir: PathBuf,
}

impl<'a> ProcessTask<'a> {
  pub fn new(ledger: &'a Ledger, run_dir: PathBuf) -> Self {
    Self { ledger, run_dir }
  }
}

impl<M> Task<&Upload, &M, &Materializer> for ProcessTask<'_>
where
  M: Model<Input = DetectRequest, Output = DetectResult, Error = ModelError> + ?Sized,
{
  /// 处理结果的文件名
  type Output = String;
  type Error = TaskError;

  fn run_task(self, input: &Upload, model: &M, output: &Materializer) -> Result<String, TaskError> {
    info!("开始处理: {}", input.name);
    let request = DetectRequest {
      source: input.path.clone(),
      run_dir: self.run_dir.clone(),
    };

    let now = std::time::Instant::now();
    let result = match model.infer(&request) {
      Ok(result) => result,
      Err(e) => {
        if self.run_dir.exists() {
          output.cleanup_run(&self.run_dir);
        }
        return Err(e.into());
      }
    };
    info!(
      "检测完成: {} 个目标，耗时: {:.2?}",
      result.items.len(),
      now.elapsed()
    );

    let materialized = output.materialize(&result.run_dir);
    output.cleanup_run(&result.run_dir);
    let processed = materialized?;

    let record = HistoryRecord::new(
      &input.name,
      &processed,
      result.inference_ms.unwrap_or(0.0),
      &result.items,
    );
    // 历史记录写入失败不影响本次处理结果
    match self.ledger.append(record) {
      Ok(count) => info!("处理完成: {} -> {} (历史记录 {} 条)", input.name, processed, count),
      Err(e) => error!("写入历史记录失败: {}", e),
    }

    Ok(processed)
  }
}

// 该文件是 Xiangzong （象踪） 项目的一部分。
// tests/common/mod.rs - 集成测试公共设施
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

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
  Router,
  body::{Body, Bytes},
  http::{HeaderMap, Request, StatusCode, header},
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use xiangzong::{
  api::{AppState, build_router},
  model::{DetectItem, DetectRequest, DetectResult, Model, ModelError, SharedModel},
  output::{Materializer, Transcoder},
  storage::StoragePaths,
};

pub const BOUNDARY: &str = "xiangzong-test-boundary";

/// 把输入复制为“标注结果”，并返回固定的检测框
pub struct FakeModel {
  pub scores: Vec<f32>,
  pub fail: bool,
}

impl Default for FakeModel {
  fn default() -> Self {
    Self {
      scores: vec![0.9, 0.8, 0.7],
      fail: false,
    }
  }
}

impl Model for FakeModel {
  type Input = DetectRequest;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &DetectRequest) -> Result<DetectResult, ModelError> {
    if self.fail {
      return Err(ModelError::Process {
        status: "exit status: 2".to_string(),
        stderr: "CUDA out of memory".to_string(),
      });
    }
    std::fs::create_dir_all(&input.run_dir)?;
    let name = input.source.file_name().unwrap_or_default();
    std::fs::copy(&input.source, input.run_dir.join(name))?;

    let items: Vec<DetectItem> = self
      .scores
      .iter()
      .enumerate()
      .map(|(i, &score)| DetectItem {
        class_id: 0,
        score,
        bbox: [0.1 * (i + 1) as f32, 0.5, 0.2, 0.2],
      })
      .collect();
    Ok(DetectResult {
      items: items.into_boxed_slice(),
      inference_ms: Some(25.0),
      run_dir: input.run_dir.clone(),
    })
  }
}

pub struct TestApp {
  pub dir: TempDir,
  pub paths: StoragePaths,
  pub router: Router,
}

impl TestApp {
  pub fn new() -> Self {
    Self::with_model(Arc::new(FakeModel::default()))
  }

  pub fn with_model(model: SharedModel) -> Self {
    Self::build(model, 16 * 1024 * 1024)
  }

  pub fn with_upload_limit(max_upload_bytes: usize) -> Self {
    Self::build(Arc::new(FakeModel::default()), max_upload_bytes)
  }

  fn build(model: SharedModel, max_upload_bytes: usize) -> Self {
    let dir = tempfile::tempdir().unwrap();
    let paths = StoragePaths::from_root(dir.path());
    paths.ensure_dirs().unwrap();

    let materializer = Materializer::new(&paths.processed_dir, Transcoder::default());
    let state = AppState::new(paths.clone(), model, materializer);
    let router = build_router(state, max_upload_bytes);
    Self { dir, paths, router }
  }

  pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = self.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    (status, headers, body)
  }

  pub async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    self
      .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
      .await
  }

  pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = self.get(uri).await;
    (status, serde_json::from_slice(&body).unwrap())
  }

  pub async fn upload(&self, filename: &str, content: &[u8]) -> (StatusCode, Value) {
    let request = Request::builder()
      .method("POST")
      .uri("/upload/")
      .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
      )
      .body(Body::from(multipart_body("file", filename, content)))
      .unwrap();
    let (status, _, body) = self.send(request).await;
    (status, serde_json::from_slice(&body).unwrap())
  }

  /// 上传并返回服务端生成的文件名
  pub async fn upload_ok(&self, filename: &str, content: &[u8]) -> String {
    let (status, body) = self.upload(filename, content).await;
    assert_eq!(status, StatusCode::CREATED);
    body["filename"].as_str().unwrap().to_string()
  }

  pub async fn process(&self, payload: &str) -> (StatusCode, Value) {
    let request = Request::builder()
      .method("POST")
      .uri("/process/")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(payload.to_string()))
      .unwrap();
    let (status, _, body) = self.send(request).await;
    (status, serde_json::from_slice(&body).unwrap())
  }

  pub fn history_len(&self) -> usize {
    match std::fs::read_to_string(&self.paths.history_file) {
      Ok(content) => serde_json::from_str::<Vec<Value>>(&content).unwrap().len(),
      Err(_) => 0,
    }
  }
}

pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
  let mut body = format!(
    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
  )
  .into_bytes();
  body.extend_from_slice(content);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
  body
}

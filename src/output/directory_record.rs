// 该文件是 Shenkang （肾康） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  path::PathBuf,
  sync::{Mutex, PoisonError},
};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ScanInput,
  interpret::PredictionReport,
  output::{Render, TimestampedReport},
  url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存报告：`<dir>/YYYY/MM/DD/HH-MM-SS-XXXX.json`
///
/// 查询参数 `skip_invalid` 表示不记录未通过校验的图像。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record_counter: Mutex<u16>,
  skip_invalid: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let skip_invalid = uri.query_pairs().any(|(k, _)| k == "skip_invalid");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(url_path(uri)),
      record_counter: Mutex::new(0),
      skip_invalid,
    })
  }
}

impl DirectoryRecordOutput {
  fn record_id(&self) -> u16 {
    let mut counter = self
      .record_counter
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn record_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      self.record_id()
    )))
  }
}

impl Render<ScanInput, PredictionReport> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &ScanInput, result: &PredictionReport) -> Result<(), Self::Error> {
    if self.skip_invalid && result.is_validation_error() {
      debug!("跳过未通过校验的图像: {}", frame.name);
      return Ok(());
    }

    let path = self.record_path()?;
    let record = TimestampedReport::now(&frame.name, result);
    std::fs::write(&path, serde_json::to_vec_pretty(&record)?)?;
    debug!("报告已写入: {}", path.display());
    Ok(())
  }
}

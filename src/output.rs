// 该文件是 Shenkang （肾康） 项目的一部分。
// src/output.rs - 输出定义
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

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::ScanInput, interpret::PredictionReport};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// 输出层写出的记录：报告字段平铺，附带来源与时间戳
#[derive(Debug, Serialize)]
pub struct TimestampedReport<'a> {
  pub source: &'a str,
  /// 自 Unix 纪元起的秒数
  pub timestamp: f64,
  #[serde(flatten)]
  pub report: &'a PredictionReport,
}

impl<'a> TimestampedReport<'a> {
  pub fn now(source: &'a str, report: &'a PredictionReport) -> Self {
    Self {
      source,
      timestamp: Utc::now().timestamp_micros() as f64 / 1e6,
      report,
    }
  }
}

mod stdout_output;
pub use self::stdout_output::{StdoutOutput, StdoutOutputError};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("标准输出错误: {0}")]
  StdoutOutputError(#[from] StdoutOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  StdoutOutput(StdoutOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      StdoutOutput::SCHEME => Ok(OutputWrapper::StdoutOutput(StdoutOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<ScanInput, PredictionReport> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &ScanInput, result: &PredictionReport) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::StdoutOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{interpret, model::ClassProbabilities};

  #[test]
  fn timestamped_report_is_flat() {
    let probabilities = ClassProbabilities::try_from(&[0.1f32, 0.7, 0.1, 0.1][..]).unwrap();
    let report = interpret::interpret(&probabilities);
    let json = serde_json::to_value(TimestampedReport::now("scan.png", &report)).unwrap();
    assert_eq!(json["source"], "scan.png");
    assert_eq!(json["disease"], "Normal");
    assert!(json["timestamp"].as_f64().unwrap() > 1.0e9);
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch)
    ));
  }
}

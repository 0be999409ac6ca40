// 该文件是 Shenkang （肾康） 项目的一部分。
// src/service.rs - 预测服务
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

use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  engine::{EngineError, InferenceEngine, ModelOrigin, ModelState},
  frame::{KidneyTensor, ScanImage},
  interpret::{self, PredictionReport},
  lifecycle::{self, LifecycleError, ModelLoader},
  model::{ClassProbabilities, Model},
  preprocess::{self, PreprocessError},
  validate::ScanPlausibilityFilter,
};

#[derive(Error, Debug)]
pub enum PredictError {
  #[error("图像无效: {0}")]
  InvalidImage(#[from] PreprocessError),
  #[error("模型尚未加载")]
  ModelNotLoaded,
  #[error("推理失败")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<EngineError> for PredictError {
  fn from(err: EngineError) -> Self {
    match err {
      EngineError::ModelNotLoaded => PredictError::ModelNotLoaded,
      EngineError::Inference(source) => PredictError::Inference(source),
    }
  }
}

impl PredictError {
  /// 输入本身有问题，调用方不应重试
  pub fn is_client_error(&self) -> bool {
    matches!(self, PredictError::InvalidImage(_))
  }
}

/// 合理性检查 → 归一化 → 推理 → 解读
///
/// 显式构造并按引用（或 `Arc`）共享给各个请求处理者。
pub struct PredictionService<M> {
  filter: ScanPlausibilityFilter,
  engine: InferenceEngine<M>,
}

impl<M> PredictionService<M>
where
  M: Model<Input = KidneyTensor, Output = ClassProbabilities>,
{
  /// 尚未加载模型的服务，需要再调用 `start`
  pub fn new() -> Self {
    Self {
      filter: ScanPlausibilityFilter::new(),
      engine: InferenceEngine::new(),
    }
  }

  /// 构造服务并立即完成模型生命周期启动
  pub fn start<L: ModelLoader<Model = M>>(loader: &L) -> Result<Self, LifecycleError> {
    let service = Self::new();
    service.load(loader)?;
    Ok(service)
  }

  pub fn load<L: ModelLoader<Model = M>>(&self, loader: &L) -> Result<ModelOrigin, LifecycleError> {
    let origin = lifecycle::start(&self.engine, loader)?;
    info!("预测服务就绪, 模型来源: {:?}", origin);
    Ok(origin)
  }

  pub fn state(&self) -> ModelState {
    self.engine.state()
  }

  pub fn predict(&self, image: &ScanImage) -> Result<PredictionReport, PredictError> {
    self.predict_with_rng(image, &mut rand::thread_rng())
  }

  /// 采样使用给定的随机数发生器，便于复现
  pub fn predict_with_rng<R: Rng>(
    &self,
    image: &ScanImage,
    rng: &mut R,
  ) -> Result<PredictionReport, PredictError> {
    let verdict = self.filter.check_with_rng(image, rng);
    if !verdict.is_likely_scan {
      info!(
        "图像未通过校验: {} (置信度 {:.2})",
        verdict.reason, verdict.confidence
      );
      return Ok(interpret::reject(&verdict));
    }
    debug!("图像通过校验: {}", verdict.reason);

    let tensor = preprocess::normalize(image)?;
    let probabilities = self.engine.infer(&tensor).map_err(|e| {
      error!("预测失败: {}", e);
      PredictError::from(e)
    })?;
    debug!("类别概率: {:?}", probabilities);

    let report = interpret::interpret(&probabilities);
    info!(
      "预测结果: {} ({:.2}%), 严重程度 {:?}",
      report.disease,
      report.confidence * 100.0,
      report.severity
    );
    Ok(report)
  }
}

impl<M> Default for PredictionService<M>
where
  M: Model<Input = KidneyTensor, Output = ClassProbabilities>,
{
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use super::*;
  use crate::{interpret::Severity, model::KidneyLabel};

  struct Fixed {
    calls: Arc<AtomicUsize>,
    output: [f32; 4],
  }

  impl Model for Fixed {
    type Input = KidneyTensor;
    type Output = ClassProbabilities;
    type Error = crate::model::ProbabilityError;

    fn infer(&mut self, _: &KidneyTensor) -> Result<ClassProbabilities, Self::Error> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      ClassProbabilities::try_from(&self.output[..])
    }
  }

  struct FixedLoader {
    calls: Arc<AtomicUsize>,
    output: [f32; 4],
  }

  impl ModelLoader for FixedLoader {
    type Model = Fixed;
    type Error = std::io::Error;

    fn location(&self) -> String {
      "memory".to_string()
    }

    fn load(&self) -> Result<Fixed, std::io::Error> {
      self.untrained()
    }

    fn untrained(&self) -> Result<Fixed, std::io::Error> {
      Ok(Fixed {
        calls: self.calls.clone(),
        output: self.output,
      })
    }
  }

  fn service(output: [f32; 4]) -> (PredictionService<Fixed>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = FixedLoader {
      calls: calls.clone(),
      output,
    };
    let service = PredictionService::start(&loader).unwrap();
    // 预热调用不计入
    calls.store(0, Ordering::SeqCst);
    (service, calls)
  }

  #[test]
  fn grayscale_scan_reaches_the_model() {
    let (service, calls) = service([0.02, 0.02, 0.94, 0.02]);
    let report = service.predict(&ScanImage::filled(64, 48, &[120]).unwrap()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.disease.as_str(), "Stone");
    assert_eq!(report.severity, Severity::High);
    assert!(!report.validation_error);
  }

  #[test]
  fn rejected_image_never_reaches_the_model() {
    let (service, calls) = service([0.02, 0.02, 0.94, 0.02]);
    let data = (0..32 * 32)
      .flat_map(|i: u32| match i % 3 {
        0 => [255u8, 0, 0],
        1 => [0, 255, 0],
        _ => [0, 0, 255],
      })
      .collect();
    let report = service
      .predict(&ScanImage::new(32, 32, 3, data).unwrap())
      .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(report.validation_error);
    assert_eq!(report.disease.as_str(), "Invalid Image");
    assert_eq!(report.confidence, 0.9);
  }

  #[test]
  fn empty_grayscale_image_is_a_client_error() {
    let (service, calls) = service([0.25; 4]);
    let err = service
      .predict(&ScanImage::new(0, 0, 1, Vec::new()).unwrap())
      .unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn bad_model_output_is_an_inference_error() {
    // 预热同样失败，后备网络也输出非法概率
    let (service, _) = service([0.9, 0.9, 0.0, 0.0]);
    let err = service
      .predict(&ScanImage::filled(8, 8, &[10]).unwrap())
      .unwrap_err();
    assert!(matches!(err, PredictError::Inference(_)));
    assert!(!err.is_client_error());
  }

  #[test]
  fn unloaded_service_reports_model_not_loaded() {
    let service = PredictionService::<Fixed>::new();
    assert_eq!(service.state(), ModelState::Unloaded);
    let err = service
      .predict(&ScanImage::filled(8, 8, &[10]).unwrap())
      .unwrap_err();
    assert!(matches!(err, PredictError::ModelNotLoaded));
  }

  #[test]
  fn uniform_probabilities_pick_cyst() {
    let (service, _) = service([0.25; 4]);
    let report = service.predict(&ScanImage::filled(8, 8, &[10]).unwrap()).unwrap();
    assert_eq!(report.disease.as_str(), KidneyLabel::Cyst.as_str());
  }
}

// 该文件是 Shenkang （肾康） 项目的一部分。
// src/lifecycle.rs - 模型生命周期管理
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

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
  engine::{InferenceEngine, ModelOrigin, ModelState},
  frame::KidneyTensor,
  model::Model,
};

#[derive(Error, Debug, PartialEq)]
pub enum LifecycleError {
  #[error("模型已启动, 当前状态: {0:?}")]
  AlreadyStarted(ModelState),
  #[error("无法构造未训练的网络: {0}")]
  Fallback(String),
}

/// 模型的持久化来源，以及加载失败时的后备构造方式
pub trait ModelLoader {
  type Model: Model;
  type Error: std::error::Error;

  fn location(&self) -> String;
  fn load(&self) -> Result<Self::Model, Self::Error>;
  fn untrained(&self) -> Result<Self::Model, Self::Error>;
}

/// 启动引擎：加载模型并预热；任何失败都降级为未训练网络，保证服务可用
///
/// 没有重新加载的途径，更换模型需要重启进程。
pub fn start<L>(engine: &InferenceEngine<L::Model>, loader: &L) -> Result<ModelOrigin, LifecycleError>
where
  L: ModelLoader,
  L::Model: Model<Input = KidneyTensor>,
{
  engine.begin_loading()?;

  let location = loader.location();
  info!("加载模型: {}", location);

  let model = match loader.load() {
    Ok(mut model) => match warm_up(&mut model) {
      Ok(elapsed) => {
        info!("模型加载并预热完成，耗时: {:.2?}", elapsed);
        Some(model)
      }
      Err(e) => {
        warn!("模型预热失败: {}。改用未训练的网络", e);
        None
      }
    },
    Err(e) => {
      warn!(
        "无法加载模型 {}: {}。改用未训练的网络（需要训练）",
        location, e
      );
      None
    }
  };

  let (model, origin) = match model {
    Some(model) => (model, ModelOrigin::Persisted(location)),
    None => match loader.untrained() {
      Ok(model) => (model, ModelOrigin::Untrained),
      Err(e) => {
        engine.abort_loading();
        return Err(LifecycleError::Fallback(e.to_string()));
      }
    },
  };

  engine.install(model, origin.clone());
  Ok(origin)
}

/// 用随机输入执行一次前向传播，提前触发一次性初始化
fn warm_up<M: Model<Input = KidneyTensor>>(model: &mut M) -> Result<Duration, M::Error> {
  let input = KidneyTensor::random(&mut rand::thread_rng());
  let now = Instant::now();
  model.infer(&input)?;
  Ok(now.elapsed())
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use super::*;
  use crate::model::ClassProbabilities;

  struct Counting {
    calls: Arc<AtomicUsize>,
    broken: bool,
  }

  impl Model for Counting {
    type Input = KidneyTensor;
    type Output = ClassProbabilities;
    type Error = std::io::Error;

    fn infer(&mut self, input: &KidneyTensor) -> Result<ClassProbabilities, std::io::Error> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      assert_eq!(input.as_array().shape(), KidneyTensor::SHAPE);
      if self.broken {
        return Err(std::io::Error::other("内核编译失败"));
      }
      ClassProbabilities::try_from(&[0.25f32; 4][..]).map_err(std::io::Error::other)
    }
  }

  struct CountingLoader {
    present: bool,
    broken: bool,
    no_fallback: bool,
    persisted_calls: Arc<AtomicUsize>,
    untrained_calls: Arc<AtomicUsize>,
  }

  impl CountingLoader {
    fn new(present: bool, broken: bool) -> Self {
      Self {
        present,
        broken,
        no_fallback: false,
        persisted_calls: Arc::default(),
        untrained_calls: Arc::default(),
      }
    }
  }

  impl ModelLoader for CountingLoader {
    type Model = Counting;
    type Error = std::io::Error;

    fn location(&self) -> String {
      "kidney_model.safetensors".to_string()
    }

    fn load(&self) -> Result<Counting, std::io::Error> {
      if !self.present {
        return Err(std::io::Error::from(std::io::ErrorKind::NotFound));
      }
      Ok(Counting {
        calls: self.persisted_calls.clone(),
        broken: self.broken,
      })
    }

    fn untrained(&self) -> Result<Counting, std::io::Error> {
      if self.no_fallback {
        return Err(std::io::Error::other("内存不足"));
      }
      Ok(Counting {
        calls: self.untrained_calls.clone(),
        broken: false,
      })
    }
  }

  #[test]
  fn persisted_model_is_warmed_up_once() {
    let engine = InferenceEngine::new();
    let loader = CountingLoader::new(true, false);
    let origin = start(&engine, &loader).unwrap();
    assert_eq!(origin, ModelOrigin::Persisted("kidney_model.safetensors".to_string()));
    assert_eq!(engine.state(), ModelState::Ready(origin));
    assert_eq!(loader.persisted_calls.load(Ordering::SeqCst), 1);
    assert_eq!(loader.untrained_calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn missing_model_falls_back_to_untrained() {
    let engine = InferenceEngine::new();
    let loader = CountingLoader::new(false, false);
    assert_eq!(start(&engine, &loader).unwrap(), ModelOrigin::Untrained);
    assert!(engine.is_ready());
    // 后备网络不预热
    assert_eq!(loader.untrained_calls.load(Ordering::SeqCst), 0);
    engine.infer(&KidneyTensor::default()).unwrap();
    assert_eq!(loader.untrained_calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn failed_warm_up_falls_back_to_untrained() {
    let engine = InferenceEngine::new();
    let loader = CountingLoader::new(true, true);
    assert_eq!(start(&engine, &loader).unwrap(), ModelOrigin::Untrained);
    assert_eq!(loader.persisted_calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn failed_fallback_returns_to_unloaded() {
    let engine = InferenceEngine::new();
    let mut loader = CountingLoader::new(false, false);
    loader.no_fallback = true;
    assert!(matches!(
      start(&engine, &loader),
      Err(LifecycleError::Fallback(_))
    ));
    assert_eq!(engine.state(), ModelState::Unloaded);

    loader.no_fallback = false;
    assert_eq!(start(&engine, &loader).unwrap(), ModelOrigin::Untrained);
  }

  #[test]
  fn ready_is_terminal() {
    let engine = InferenceEngine::new();
    let loader = CountingLoader::new(false, false);
    start(&engine, &loader).unwrap();
    assert_eq!(
      start(&engine, &loader),
      Err(LifecycleError::AlreadyStarted(ModelState::Ready(
        ModelOrigin::Untrained
      )))
    );
  }
}

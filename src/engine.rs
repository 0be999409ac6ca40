// 该文件是 Shenkang （肾康） 项目的一部分。
// src/engine.rs - 推理引擎
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

use std::sync::{Mutex, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, error};

use crate::{lifecycle::LifecycleError, model::Model};

/// 模型来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOrigin {
  /// 从持久化文件加载并完成预热
  Persisted(String),
  /// 加载失败后构造的未训练网络
  Untrained,
}

/// Unloaded → Loading → Ready，Ready 为终态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelState {
  Unloaded,
  Loading,
  Ready(ModelOrigin),
}

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型尚未加载")]
  ModelNotLoaded,
  #[error("推理失败: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 持有唯一的模型实例，所有前向传播经由同一把互斥锁串行执行
pub struct InferenceEngine<M> {
  state: RwLock<ModelState>,
  model: Mutex<Option<M>>,
}

impl<M> Default for InferenceEngine<M> {
  fn default() -> Self {
    Self {
      state: RwLock::new(ModelState::Unloaded),
      model: Mutex::new(None),
    }
  }
}

impl<M: Model> InferenceEngine<M> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> ModelState {
    self
      .state
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn is_ready(&self) -> bool {
    matches!(self.state(), ModelState::Ready(_))
  }

  pub(crate) fn begin_loading(&self) -> Result<(), LifecycleError> {
    let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
    if *state != ModelState::Unloaded {
      return Err(LifecycleError::AlreadyStarted(state.clone()));
    }
    *state = ModelState::Loading;
    Ok(())
  }

  /// 后备网络也无法构造时回到 Unloaded，允许再次启动
  pub(crate) fn abort_loading(&self) {
    *self.state.write().unwrap_or_else(PoisonError::into_inner) = ModelState::Unloaded;
  }

  pub(crate) fn install(&self, model: M, origin: ModelOrigin) {
    *self.model.lock().unwrap_or_else(PoisonError::into_inner) = Some(model);
    *self.state.write().unwrap_or_else(PoisonError::into_inner) = ModelState::Ready(origin);
  }

  /// 锁只覆盖前向传播本身；模型只读，锁中毒时直接恢复
  pub fn infer(&self, input: &M::Input) -> Result<M::Output, EngineError> {
    let mut guard = self.model.lock().unwrap_or_else(PoisonError::into_inner);
    let model = guard.as_mut().ok_or(EngineError::ModelNotLoaded)?;
    debug!("执行前向传播");
    model.infer(input).map_err(|e| {
      error!("前向传播失败: {}", e);
      EngineError::Inference(Box::new(e))
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Echo;

  impl Model for Echo {
    type Input = u32;
    type Output = u32;
    type Error = std::io::Error;

    fn infer(&mut self, input: &u32) -> Result<u32, std::io::Error> {
      if *input == 0 {
        return Err(std::io::Error::other("形状不匹配"));
      }
      Ok(*input)
    }
  }

  #[test]
  fn refuses_before_ready() {
    let engine = InferenceEngine::<Echo>::new();
    assert_eq!(engine.state(), ModelState::Unloaded);
    assert!(matches!(engine.infer(&1), Err(EngineError::ModelNotLoaded)));
  }

  #[test]
  fn wraps_runtime_failures() {
    let engine = InferenceEngine::new();
    engine.begin_loading().unwrap();
    engine.install(Echo, ModelOrigin::Untrained);
    assert!(engine.is_ready());
    assert_eq!(engine.infer(&7).unwrap(), 7);

    let err = engine.infer(&0).unwrap_err();
    assert!(matches!(err, EngineError::Inference(_)));
    // 失败之后锁已释放
    assert_eq!(engine.infer(&3).unwrap(), 3);
  }

  #[test]
  fn loading_happens_once() {
    let engine = InferenceEngine::<Echo>::new();
    engine.begin_loading().unwrap();
    assert_eq!(engine.state(), ModelState::Loading);
    assert_eq!(
      engine.begin_loading(),
      Err(LifecycleError::AlreadyStarted(ModelState::Loading))
    );
  }
}

// 该文件是 Shenkang （肾康） 项目的一部分。
// src/model.rs - 模型
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

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// 推理运行时不保证可重入，因此 `infer` 需要独占访问
pub trait Model: Send {
  type Input;
  type Output;
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

pub const KIDNEY_CLASS_NUM: usize = 4;

/// 类别顺序固定，与模型输出对齐
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum KidneyLabel {
  Cyst,
  Normal,
  Stone,
  Tumor,
}

impl KidneyLabel {
  pub const ALL: [KidneyLabel; KIDNEY_CLASS_NUM] = [
    KidneyLabel::Cyst,
    KidneyLabel::Normal,
    KidneyLabel::Stone,
    KidneyLabel::Tumor,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      KidneyLabel::Cyst => "Cyst",
      KidneyLabel::Normal => "Normal",
      KidneyLabel::Stone => "Stone",
      KidneyLabel::Tumor => "Tumor",
    }
  }

  pub fn index(&self) -> usize {
    *self as usize
  }
}

impl std::fmt::Display for KidneyLabel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

const PROBABILITY_SUM_TOLERANCE: f32 = 1e-3;

#[derive(Error, Debug, PartialEq)]
pub enum ProbabilityError {
  #[error("类别数量不匹配: 期望 {expected}, 实际 {actual}")]
  WrongLength { expected: usize, actual: usize },
  #[error("类别 {index} 的概率 {value} 不在 [0, 1] 内")]
  OutOfRange { index: usize, value: f32 },
  #[error("概率和为 {0}, 偏离 1.0")]
  BadSum(f32),
}

/// 与 `KidneyLabel::ALL` 对齐的 softmax 输出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities([f32; KIDNEY_CLASS_NUM]);

impl ClassProbabilities {
  pub fn as_slice(&self) -> &[f32] {
    &self.0
  }

  pub fn get(&self, label: KidneyLabel) -> f32 {
    self.0[label.index()]
  }

  /// 完全相等时取下标最小者
  pub fn argmax(&self) -> (KidneyLabel, f32) {
    let mut best = 0;
    for (i, &p) in self.0.iter().enumerate().skip(1) {
      if p > self.0[best] {
        best = i;
      }
    }
    (KidneyLabel::ALL[best], self.0[best])
  }

  pub fn to_map(&self) -> BTreeMap<String, f32> {
    KidneyLabel::ALL
      .iter()
      .map(|label| (label.as_str().to_string(), self.get(*label)))
      .collect()
  }
}

impl TryFrom<&[f32]> for ClassProbabilities {
  type Error = ProbabilityError;

  fn try_from(values: &[f32]) -> Result<Self, Self::Error> {
    let probabilities: [f32; KIDNEY_CLASS_NUM] =
      values
        .try_into()
        .map_err(|_| ProbabilityError::WrongLength {
          expected: KIDNEY_CLASS_NUM,
          actual: values.len(),
        })?;

    for (index, &value) in probabilities.iter().enumerate() {
      if !(0.0..=1.0).contains(&value) {
        return Err(ProbabilityError::OutOfRange { index, value });
      }
    }

    let sum: f32 = probabilities.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
      return Err(ProbabilityError::BadSum(sum));
    }

    Ok(Self(probabilities))
  }
}

pub mod cnn;
pub use self::cnn::{CnnError, KidneyCnn, KidneyCnnBuilder};

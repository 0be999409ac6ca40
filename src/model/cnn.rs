// 该文件是 Shenkang （肾康） 项目的一部分。
// src/model/cnn.rs - 肾脏分类卷积网络
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
  collections::HashMap,
  path::{Path, PathBuf},
};

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, Module, VarBuilder, conv2d, linear, ops::softmax};
use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{KIDNEY_INPUT_SIZE, KidneyTensor, RGB_CHANNELS},
  lifecycle::ModelLoader,
  model::{ClassProbabilities, KIDNEY_CLASS_NUM, Model, ProbabilityError},
  url_path,
};

const KERNEL_SIZE: usize = 3;
const POOL_SIZE: usize = 2;
const CONV_FILTERS: [usize; 3] = [32, 64, 128];
const DENSE_UNITS: [usize; 4] = [256, 128, 64, KIDNEY_CLASS_NUM];

pub const DEFAULT_MODEL_PATH: &str = "kidney_model.safetensors";

/// 三次 “valid 卷积 + 池化” 之后的特征图边长
const fn feature_side(mut side: usize) -> usize {
  let mut i = 0;
  while i < CONV_FILTERS.len() {
    side = (side - (KERNEL_SIZE - 1)) / POOL_SIZE;
    i += 1;
  }
  side
}

const FEATURE_SIDE: usize = feature_side(KIDNEY_INPUT_SIZE as usize);
const FLATTEN_SIZE: usize = FEATURE_SIDE * FEATURE_SIDE * CONV_FILTERS[CONV_FILTERS.len() - 1];

#[derive(Error, Debug)]
pub enum CnnError {
  #[error("权重文件错误: {0}")]
  WeightError(#[from] candle_core::Error),
  #[error("模型无效: {0}")]
  Incompatible(String),
  #[error("输入形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  InputShape {
    expected: [usize; 4],
    actual: Vec<usize>,
  },
  #[error("模型输出无效: {0}")]
  OutputError(#[from] ProbabilityError),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

/// 权重文件中每个张量的名称与形状，卷积核为 (out, in, kh, kw)，全连接为 (out, in)
fn layer_shapes() -> Vec<(String, Vec<usize>)> {
  let mut shapes = Vec::new();

  let mut in_channels = RGB_CHANNELS;
  for (i, &filters) in CONV_FILTERS.iter().enumerate() {
    shapes.push((
      format!("conv{i}.weight"),
      vec![filters, in_channels, KERNEL_SIZE, KERNEL_SIZE],
    ));
    shapes.push((format!("conv{i}.bias"), vec![filters]));
    in_channels = filters;
  }

  let mut inputs = FLATTEN_SIZE;
  for (i, &units) in DENSE_UNITS.iter().enumerate() {
    shapes.push((format!("dense{i}.weight"), vec![units, inputs]));
    shapes.push((format!("dense{i}.bias"), vec![units]));
    inputs = units;
  }

  shapes
}

fn check_architecture(tensors: &HashMap<String, Tensor>) -> Result<(), CnnError> {
  for (name, shape) in layer_shapes() {
    let tensor = tensors
      .get(&name)
      .ok_or_else(|| CnnError::Incompatible(format!("缺少张量 {}", name)))?;
    if tensor.dims() != shape.as_slice() {
      return Err(CnnError::Incompatible(format!(
        "张量 {}: 预期形状 {:?}, 实际为 {:?}",
        name,
        shape,
        tensor.dims()
      )));
    }
  }
  Ok(())
}

fn glorot_uniform<R: Rng>(rng: &mut R, shape: &[usize]) -> candle_core::Result<Tensor> {
  let receptive: usize = shape[2..].iter().product();
  let fan_in = shape[1] * receptive;
  let fan_out = shape[0] * receptive;
  let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
  let values: Vec<f32> = (0..shape.iter().product::<usize>())
    .map(|_| rng.gen_range(-limit..limit))
    .collect();
  Tensor::from_vec(values, shape, &Device::Cpu)
}

/// Conv(32) → Conv(64) → Conv(128)（均带 2x2 池化）→ Dense 256/128/64 → softmax(4)
///
/// Dropout 只在训练时生效，推理时不存在。
#[derive(Debug, Clone)]
pub struct KidneyCnn {
  convs: Vec<Conv2d>,
  denses: Vec<Linear>,
}

impl KidneyCnn {
  /// 未训练的网络，Glorot 均匀初始化，偏置为零
  pub fn untrained<R: Rng>(rng: &mut R) -> Result<Self, CnnError> {
    let mut tensors = HashMap::new();
    for (name, shape) in layer_shapes() {
      let tensor = if name.ends_with(".bias") {
        Tensor::zeros(shape, DType::F32, &Device::Cpu)?
      } else {
        glorot_uniform(rng, &shape)?
      };
      tensors.insert(name, tensor);
    }
    Self::from_tensors(tensors)
  }

  fn from_tensors(tensors: HashMap<String, Tensor>) -> Result<Self, CnnError> {
    check_architecture(&tensors)?;
    let vb = VarBuilder::from_tensors(tensors, DType::F32, &Device::Cpu);

    let mut convs = Vec::with_capacity(CONV_FILTERS.len());
    let mut in_channels = RGB_CHANNELS;
    for (i, &filters) in CONV_FILTERS.iter().enumerate() {
      convs.push(conv2d(
        in_channels,
        filters,
        KERNEL_SIZE,
        Conv2dConfig::default(),
        vb.pp(format!("conv{i}")),
      )?);
      in_channels = filters;
    }

    let mut denses = Vec::with_capacity(DENSE_UNITS.len());
    let mut inputs = FLATTEN_SIZE;
    for (i, &units) in DENSE_UNITS.iter().enumerate() {
      denses.push(linear(inputs, units, vb.pp(format!("dense{i}")))?);
      inputs = units;
    }

    Ok(Self { convs, denses })
  }

  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CnnError> {
    let path = path.as_ref();
    info!("加载模型文件: {}", path.display());
    let tensors = candle_core::safetensors::load(path, &Device::Cpu)?;
    debug!("权重张量数量: {}", tensors.len());
    let model = Self::from_tensors(tensors)?;
    info!("模型加载完成");
    Ok(model)
  }

  pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CnnError> {
    let mut tensors = HashMap::new();
    for (i, conv) in self.convs.iter().enumerate() {
      tensors.insert(format!("conv{i}.weight"), conv.weight().clone());
      if let Some(bias) = conv.bias() {
        tensors.insert(format!("conv{i}.bias"), bias.clone());
      }
    }
    for (i, dense) in self.denses.iter().enumerate() {
      tensors.insert(format!("dense{i}.weight"), dense.weight().clone());
      if let Some(bias) = dense.bias() {
        tensors.insert(format!("dense{i}.bias"), bias.clone());
      }
    }
    candle_core::safetensors::save(&tensors, path)?;
    Ok(())
  }

  /// 对 (1, 128, 128, 3) 输入执行前向传播，返回 (1, 4) 的 softmax 概率
  pub fn forward(&self, input: &Tensor) -> Result<Tensor, CnnError> {
    if input.dims() != KidneyTensor::SHAPE {
      return Err(CnnError::InputShape {
        expected: KidneyTensor::SHAPE,
        actual: input.dims().to_vec(),
      });
    }

    let mut xs = input.permute((0, 3, 1, 2))?.contiguous()?;
    for conv in &self.convs {
      xs = conv.forward(&xs)?.relu()?.max_pool2d(POOL_SIZE)?;
    }

    // 按 NHWC 顺序展平，与导出权重时的 Flatten 一致
    let mut xs = xs.permute((0, 2, 3, 1))?.contiguous()?.flatten_from(1)?;
    let last = self.denses.len().saturating_sub(1);
    for (i, dense) in self.denses.iter().enumerate() {
      xs = dense.forward(&xs)?;
      if i != last {
        xs = xs.relu()?;
      }
    }

    Ok(softmax(&xs, D::Minus1)?)
  }
}

impl Model for KidneyCnn {
  type Input = KidneyTensor;
  type Output = ClassProbabilities;
  type Error = CnnError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("执行模型推理");
    let array = input.as_array();
    let data: Vec<f32> = array.iter().copied().collect();
    let tensor = Tensor::from_vec(data, array.shape(), &Device::Cpu)?;
    let output = self.forward(&tensor)?.squeeze(0)?.to_vec1::<f32>()?;
    debug!("模型推理结果：{:?}", output);
    Ok(ClassProbabilities::try_from(&output[..])?)
  }
}

pub struct KidneyCnnBuilder {
  model_path: PathBuf,
  seed: Option<u64>,
}

impl Default for KidneyCnnBuilder {
  fn default() -> Self {
    Self {
      model_path: PathBuf::from(DEFAULT_MODEL_PATH),
      seed: None,
    }
  }
}

impl FromUrlWithScheme for KidneyCnnBuilder {
  const SCHEME: &'static str = "cnn";
}

impl FromUrl for KidneyCnnBuilder {
  type Error = CnnError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CnnError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(KidneyCnnBuilder {
      model_path: PathBuf::from(url_path(url)),
      seed: None,
    })
  }
}

impl KidneyCnnBuilder {
  pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
    Self {
      model_path: path.into(),
      seed: None,
    }
  }

  /// 固定未训练网络的初始化种子
  pub fn seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn build(&self) -> Result<KidneyCnn, CnnError> {
    KidneyCnn::load(&self.model_path)
  }
}

impl ModelLoader for KidneyCnnBuilder {
  type Model = KidneyCnn;
  type Error = CnnError;

  fn location(&self) -> String {
    self.model_path.display().to_string()
  }

  fn load(&self) -> Result<Self::Model, Self::Error> {
    self.build()
  }

  fn untrained(&self) -> Result<Self::Model, Self::Error> {
    match self.seed {
      Some(seed) => KidneyCnn::untrained(&mut StdRng::seed_from_u64(seed)),
      None => KidneyCnn::untrained(&mut rand::thread_rng()),
    }
  }
}

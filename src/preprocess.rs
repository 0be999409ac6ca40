// 该文件是 Shenkang （肾康） 项目的一部分。
// src/preprocess.rs - 图像归一化
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

use ndarray::{Array3, ArrayView3, Axis};
use thiserror::Error;
use tracing::debug;

use crate::frame::{FrameError, KidneyTensor, NhwcTensor, RGB_CHANNELS, ScanImage};

const PIXEL_SCALE: f32 = 255.0;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("图像尺寸无效: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("像素数据形状错误: {0}")]
  Shape(#[from] ndarray::ShapeError),
  #[error("帧错误: {0}")]
  Frame(#[from] FrameError),
}

/// 将任意扫描图像转换为模型输入张量
pub fn normalize(image: &ScanImage) -> Result<KidneyTensor, PreprocessError> {
  normalize_to(image)
}

/// 按原通道数面积插值缩放、三通道化、除以 255、增加批次维度
pub fn normalize_to<const W: u32, const H: u32>(
  image: &ScanImage,
) -> Result<NhwcTensor<W, H>, PreprocessError> {
  if image.width() == 0 || image.height() == 0 {
    return Err(PreprocessError::EmptyImage {
      width: image.width(),
      height: image.height(),
    });
  }

  debug!(
    "归一化图像: {}x{}x{} -> {}x{}x{}",
    image.width(),
    image.height(),
    image.channels(),
    W,
    H,
    RGB_CHANNELS
  );

  let channels = image.channels();
  let source = ArrayView3::from_shape(
    (image.height() as usize, image.width() as usize, channels),
    image.as_hwc(),
  )?;
  let resized = area_resize(source, W as usize, H as usize);

  // 缩放后再统一为三通道：灰度复制，透明度丢弃
  let rgb = Array3::from_shape_fn((H as usize, W as usize, RGB_CHANNELS), |(y, x, c)| {
    let channel = if channels == 1 { 0 } else { c };
    (resized[[y, x, channel]] / PIXEL_SCALE).clamp(0.0, 1.0)
  });

  Ok(NhwcTensor::try_from(rgb.insert_axis(Axis(0)))?)
}

/// 每个目标位置覆盖的源下标及其面积权重，权重和为 1
fn area_weights(src: usize, dst: usize) -> Vec<Vec<(usize, f32)>> {
  let scale = src as f64 / dst as f64;
  (0..dst)
    .map(|i| {
      let start = i as f64 * scale;
      let end = ((i + 1) as f64 * scale).min(src as f64);
      let first = start.floor() as usize;
      let last = (end.ceil() as usize).min(src);
      (first..last)
        .filter_map(|s| {
          let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
          (overlap > 1e-9).then_some((s, (overlap / scale) as f32))
        })
        .collect()
    })
    .collect()
}

/// 可分离的面积平均插值，先水平后垂直，保持原始通道数
fn area_resize(src: ArrayView3<u8>, dst_w: usize, dst_h: usize) -> Array3<f32> {
  let (src_h, src_w, channels) = src.dim();

  let mut horizontal = Array3::<f32>::zeros((src_h, dst_w, channels));
  for (dx, weights) in area_weights(src_w, dst_w).iter().enumerate() {
    let mut column = horizontal.index_axis_mut(Axis(1), dx);
    for &(sx, weight) in weights {
      column.zip_mut_with(&src.index_axis(Axis(1), sx), |acc, &v| {
        *acc += weight * v as f32
      });
    }
  }

  let mut resized = Array3::<f32>::zeros((dst_h, dst_w, channels));
  for (dy, weights) in area_weights(src_h, dst_h).iter().enumerate() {
    let mut row = resized.index_axis_mut(Axis(0), dy);
    for &(sy, weight) in weights {
      row.scaled_add(weight, &horizontal.index_axis(Axis(0), sy));
    }
  }

  resized
}

// 该文件是 Shenkang （肾康） 项目的一部分。
// src/frame.rs - 扫描图像与 NHWC 张量定义
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

use ndarray::Array4;
use rand::Rng;
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

/// 模型输入边长
pub const KIDNEY_INPUT_SIZE: u32 = 128;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("不支持的通道数: {0}")]
  UnsupportedChannels(usize),
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("张量形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    expected: [usize; 4],
    actual: Vec<usize>,
  },
}

/// 解码后的扫描图像，按行存储的 HWC 交错像素
#[derive(Debug, Clone)]
pub struct ScanImage {
  width: u32,
  height: u32,
  channels: usize,
  data: Box<[u8]>,
}

impl ScanImage {
  /// 通道数只允许 1、3、4
  pub fn new(width: u32, height: u32, channels: usize, data: Vec<u8>) -> Result<Self, FrameError> {
    if !matches!(channels, 1 | 3 | 4) {
      return Err(FrameError::UnsupportedChannels(channels));
    }

    let expected = width as usize * height as usize * channels;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      channels,
      data: data.into_boxed_slice(),
    })
  }

  /// 以单一像素值填充的图像
  pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Result<Self, FrameError> {
    let count = width as usize * height as usize;
    let data = pixel.iter().copied().cycle().take(count * pixel.len()).collect();
    Self::new(width, height, pixel.len(), data)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn is_grayscale(&self) -> bool {
    self.channels == 1
  }

  pub fn pixel_count(&self) -> usize {
    self.width as usize * self.height as usize
  }

  /// 第 `index` 个像素（行优先）的全部通道
  pub fn pixel(&self, index: usize) -> Option<&[u8]> {
    let start = index.checked_mul(self.channels)?;
    let end = start.checked_add(self.channels)?;
    self.data.get(start..end)
  }

  pub fn as_hwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(feature = "read_image_file")]
impl From<image::DynamicImage> for ScanImage {
  fn from(image: image::DynamicImage) -> Self {
    use image::DynamicImage;

    let (width, height) = (image.width(), image.height());
    let (channels, data) = match image {
      DynamicImage::ImageLuma8(buffer) => (1, buffer.into_raw()),
      DynamicImage::ImageRgb8(buffer) => (3, buffer.into_raw()),
      DynamicImage::ImageRgba8(buffer) => (4, buffer.into_raw()),
      // 16 位灰度与带透明度的灰度仍按单通道处理
      other if !other.color().has_color() => (1, other.to_luma8().into_raw()),
      other => (RGB_CHANNELS, other.to_rgb8().into_raw()),
    };

    Self {
      width,
      height,
      channels,
      data: data.into_boxed_slice(),
    }
  }
}

/// 形状固定为 (1, H, W, 3) 的浮点张量
#[derive(Debug, Clone)]
pub struct NhwcTensor<const W: u32, const H: u32> {
  data: Array4<f32>,
}

pub type KidneyTensor = NhwcTensor<KIDNEY_INPUT_SIZE, KIDNEY_INPUT_SIZE>;

impl<const W: u32, const H: u32> NhwcTensor<W, H> {
  pub const SHAPE: [usize; 4] = [1, H as usize, W as usize, RGB_CHANNELS];

  /// 取值在 [0, 1) 的随机张量，用于预热
  pub fn random<R: Rng>(rng: &mut R) -> Self {
    let [n, h, w, c] = Self::SHAPE;
    let data = Array4::from_shape_simple_fn((n, h, w, c), || rng.gen_range(0.0..1.0));
    Self { data }
  }

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_array(&self) -> &Array4<f32> {
    &self.data
  }
}

impl<const W: u32, const H: u32> Default for NhwcTensor<W, H> {
  fn default() -> Self {
    let [n, h, w, c] = Self::SHAPE;
    Self {
      data: Array4::zeros((n, h, w, c)),
    }
  }
}

impl<const W: u32, const H: u32> TryFrom<Array4<f32>> for NhwcTensor<W, H> {
  type Error = FrameError;

  fn try_from(data: Array4<f32>) -> Result<Self, Self::Error> {
    if data.shape() != Self::SHAPE {
      return Err(FrameError::ShapeMismatch {
        expected: Self::SHAPE,
        actual: data.shape().to_vec(),
      });
    }
    Ok(Self { data })
  }
}

// 该文件是 Shenkang （肾康） 项目的一部分。
// src/validate.rs - 扫描图像合理性检查
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

//! 廉价的启发式检查，在调用模型之前拒绝明显不是医学扫描的图像。
//!
//! 所有阈值均为经验值，没有推导依据，必须保持不变。

use rand::{Rng, seq::index};
use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::ScanImage;

const SAMPLE_SIZE: usize = 1000;
const COLOR_VARIATION_THRESHOLD: f32 = 20.0;
const BRIGHTNESS_RANGE: (f32, f32) = (50.0, 200.0);
const CONTRAST_RANGE: (f32, f32) = (20.0, 100.0);

const GRAYSCALE_CONFIDENCE: f32 = 0.8;
const LOW_VARIATION_CONFIDENCE: f32 = 0.8;
const CHARACTERISTICS_CONFIDENCE: f32 = 0.7;
const REJECT_CONFIDENCE: f32 = 0.9;
const FAILURE_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
enum SampleError {
  #[error("像素网格为空")]
  EmptyGrid,
  #[error("像素 {0} 越界")]
  PixelOutOfRange(usize),
  #[error("像素 {index} 只有 {channels} 个通道")]
  MissingChannels { index: usize, channels: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanVerdict {
  pub is_likely_scan: bool,
  pub confidence: f32,
  pub reason: String,
}

impl ScanVerdict {
  fn accept(confidence: f32, reason: &str) -> Self {
    Self {
      is_likely_scan: true,
      confidence,
      reason: reason.to_string(),
    }
  }

  fn reject(confidence: f32, reason: String) -> Self {
    Self {
      is_likely_scan: false,
      confidence,
      reason,
    }
  }
}

/// 样本上的统计量
#[derive(Debug, Clone, Copy)]
struct SampleStats {
  samples: usize,
  color_variation: f32,
  brightness: f32,
  contrast: f32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanPlausibilityFilter;

impl ScanPlausibilityFilter {
  pub fn new() -> Self {
    Self
  }

  pub fn check(&self, image: &ScanImage) -> ScanVerdict {
    self.check_with_rng(image, &mut rand::thread_rng())
  }

  /// 内部失败不会向外传播，而是降级为“不是扫描图像”
  pub fn check_with_rng<R: Rng>(&self, image: &ScanImage, rng: &mut R) -> ScanVerdict {
    if image.is_grayscale() {
      return ScanVerdict::accept(GRAYSCALE_CONFIDENCE, "Grayscale medical image detected");
    }

    let stats = match sample_stats(image, rng) {
      Ok(stats) => stats,
      Err(e) => {
        warn!("图像校验失败: {}", e);
        return ScanVerdict::reject(FAILURE_CONFIDENCE, format!("Error validating image: {}", e));
      }
    };
    debug!("图像采样统计 ({} 个像素): {:?}", stats.samples, stats);

    if stats.color_variation < COLOR_VARIATION_THRESHOLD {
      return ScanVerdict::accept(
        LOW_VARIATION_CONFIDENCE,
        "Medical scan-like image detected (low color variation)",
      );
    }

    let (min_brightness, max_brightness) = BRIGHTNESS_RANGE;
    let (min_contrast, max_contrast) = CONTRAST_RANGE;
    if min_brightness < stats.brightness
      && stats.brightness < max_brightness
      && min_contrast < stats.contrast
      && stats.contrast < max_contrast
    {
      return ScanVerdict::accept(
        CHARACTERISTICS_CONFIDENCE,
        "Medical image characteristics detected",
      );
    }

    ScanVerdict::reject(
      REJECT_CONFIDENCE,
      "Image does not appear to be a medical scan".to_string(),
    )
  }
}

fn sample_stats<R: Rng>(image: &ScanImage, rng: &mut R) -> Result<SampleStats, SampleError> {
  let total = image.pixel_count();
  if total == 0 {
    return Err(SampleError::EmptyGrid);
  }

  let amount = SAMPLE_SIZE.min(total);
  let mut rg = Vec::with_capacity(amount);
  let mut gb = Vec::with_capacity(amount);
  let mut rb = Vec::with_capacity(amount);
  let mut values = Vec::with_capacity(amount * 3);

  for i in index::sample(rng, total, amount) {
    let pixel = image.pixel(i).ok_or(SampleError::PixelOutOfRange(i))?;
    let [r, g, b] = match pixel {
      [r, g, b, ..] => [*r as f32, *g as f32, *b as f32],
      _ => {
        return Err(SampleError::MissingChannels {
          index: i,
          channels: pixel.len(),
        });
      }
    };
    rg.push(r - g);
    gb.push(g - b);
    rb.push(r - b);
    values.extend([r, g, b]);
  }

  Ok(SampleStats {
    samples: amount,
    color_variation: std_dev(&rg) + std_dev(&gb) + std_dev(&rb),
    brightness: mean(&values),
    contrast: std_dev(&values),
  })
}

fn mean(values: &[f32]) -> f32 {
  values.iter().map(|&v| v as f64).sum::<f64>() as f32 / values.len() as f32
}

/// 总体标准差
fn std_dev(values: &[f32]) -> f32 {
  let mean = mean(values) as f64;
  let variance = values
    .iter()
    .map(|&v| (v as f64 - mean).powi(2))
    .sum::<f64>()
    / values.len() as f64;
  variance.sqrt() as f32
}

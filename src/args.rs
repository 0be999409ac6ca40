// 该文件是 Shenkang （肾康） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Args;
use tracing::info;
use url::Url;

use crate::{
  FromUrl,
  model::{KidneyCnn, KidneyCnnBuilder},
  service::PredictionService,
};

/// 各个可执行程序共用的参数
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
  /// 模型权重位置，例如 cnn:kidney_model.safetensors
  #[arg(long, value_name = "MODEL", default_value = "cnn:kidney_model.safetensors")]
  pub model: Url,
  /// 输入来源
  /// 支持格式:
  /// - 单张图像: image:<path>
  /// - 目录: dir:<path>
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出位置
  /// 支持格式:
  /// - 标准输出: stdout:
  /// - 目录记录: folder:<path>
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,
  /// 未训练网络的随机种子
  #[arg(long, value_name = "SEED")]
  pub seed: Option<u64>,
}

impl ServiceArgs {
  pub fn log(&self) {
    info!("模型文件路径: {}", self.model);
    info!("输入来源: {}", self.input);
    info!("输出路径: {}", self.output);
  }

  /// 按参数构造并启动预测服务
  pub fn start_service(&self) -> anyhow::Result<PredictionService<KidneyCnn>> {
    let mut builder = KidneyCnnBuilder::from_url(&self.model)?;
    if let Some(seed) = self.seed {
      builder = builder.seed(seed);
    }
    Ok(PredictionService::start(&builder)?)
  }
}

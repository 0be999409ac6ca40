// 该文件是 Shenkang （肾康） 项目的一部分。
// src/task.rs - 批量预测任务
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

use std::{thread, time::Duration};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  PredictionService,
  frame::KidneyTensor,
  input::ScanInput,
  interpret::PredictionReport,
  model::{ClassProbabilities, Model},
  output::Render,
};

pub trait Task<I, S, O>: Sized {
  type Error;
  fn run_task(self, input: I, service: S, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<'a, N, RE, I, O> Task<I, &'a PredictionService<N>, O> for OneShotTask
where
  N: Model<Input = KidneyTensor, Output = ClassProbabilities>,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = ScanInput>,
  O: Render<ScanInput, PredictionReport, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    service: &'a PredictionService<N>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像 {} 获取成功，开始预测...", frame.name);
    let now = std::time::Instant::now();
    let report = service.predict(&frame.image)?;
    let elapsed = now.elapsed();
    info!("预测完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &report)?;
    info!("输出完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一张图像重复预测，统计平均耗时
pub struct RepeatShotTask {
  repeat_times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat_times: 1000 }
  }
}

impl RepeatShotTask {
  /// 前两次不计入平均耗时
  const SKIPPED_ROUNDS: usize = 2;

  pub fn with_repeat_times(mut self, repeat_times: usize) -> Self {
    self.repeat_times = repeat_times;
    self
  }
}

impl<'a, N, RE, I, O> Task<I, &'a PredictionService<N>, O> for RepeatShotTask
where
  N: Model<Input = KidneyTensor, Output = ClassProbabilities>,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = ScanInput>,
  O: Render<ScanInput, PredictionReport, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    service: &'a PredictionService<N>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像 {} 获取成功，开始预测...", frame.name);
    let mut times = Vec::with_capacity(self.repeat_times);
    for i in 0..self.repeat_times {
      let now = std::time::Instant::now();
      let report = service.predict(&frame.image)?;
      let elapsed = now.elapsed();
      info!("({})预测完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &report)?;
      times.push(elapsed);
    }

    if times.len() > Self::SKIPPED_ROUNDS {
      let counted = &times[Self::SKIPPED_ROUNDS..];
      warn!(
        "平均预测时间: {:.2?}",
        counted.iter().sum::<Duration>() / counted.len() as u32
      );
    } else {
      warn!("重复次数过少，不统计平均预测时间");
    }

    Ok(())
  }
}

/// 逐个处理输入直到耗尽、达到指定数量或收到中断信号
///
/// 单张图像无效时记录后继续；服务端错误终止任务。
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<'a, N, RE, I, O> Task<I, &'a PredictionService<N>, O> for ContinuousTask
where
  N: Model<Input = KidneyTensor, Output = ClassProbabilities>,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = ScanInput>,
  O: Render<ScanInput, PredictionReport, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    service: &'a PredictionService<N>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法设置 Ctrl-C 处理函数")?;

    let mut frame_index = 0usize;
    let mut rejected = 0usize;
    for frame in input {
      frame_index = frame_index.saturating_add(1);
      info!("处理第 {} 张图像: {}", frame_index, frame.name);
      let now = std::time::Instant::now();
      match service.predict(&frame.image) {
        Ok(report) => {
          let elapsed_a = now.elapsed();
          output.render_result(&frame, &report)?;
          info!("预测完成，耗时: {:.2?} / {:.2?}", elapsed_a, now.elapsed());
        }
        Err(e) if e.is_client_error() => {
          rejected += 1;
          warn!("跳过无效图像 {}: {}", frame.name, e);
        }
        Err(e) => return Err(e.into()),
      }
      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定图像数量 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 张图像，其中 {} 张无效", frame_index, rejected);
    Ok(())
  }
}

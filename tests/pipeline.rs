// 该文件是 Shenkang （肾康） 项目的一部分。
// tests/pipeline.rs - 目录输入到目录记录的完整流程
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

#![cfg(all(feature = "read_image_file", feature = "directory_record"))]

use shenkang::{
  FromUrl, PredictionService,
  input::InputWrapper,
  model::KidneyCnnBuilder,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use url::Url;

fn json_files(root: &std::path::Path) -> Vec<std::path::PathBuf> {
  let mut found = Vec::new();
  let mut pending = vec![root.to_path_buf()];
  while let Some(dir) = pending.pop() {
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        pending.push(path);
      } else if path.extension().is_some_and(|ext| ext == "json") {
        found.push(path);
      }
    }
  }
  found
}

#[test]
fn directory_of_scans_is_recorded_as_json_reports() {
  let scans = tempfile::tempdir().unwrap();
  let records = tempfile::tempdir().unwrap();
  let weights = tempfile::tempdir().unwrap();

  image::GrayImage::from_fn(64, 64, |x, y| image::Luma([((x * 3 + y) % 256) as u8]))
    .save(scans.path().join("01-ultrasound.png"))
    .unwrap();
  image::RgbImage::from_fn(32, 32, |x, _| match x % 3 {
    0 => image::Rgb([255, 0, 0]),
    1 => image::Rgb([0, 255, 0]),
    _ => image::Rgb([0, 0, 255]),
  })
  .save(scans.path().join("02-holiday.png"))
  .unwrap();
  std::fs::write(scans.path().join("03-broken.jpg"), b"truncated").unwrap();

  let input = InputWrapper::from_url(&Url::parse(&format!("dir:{}", scans.path().display())).unwrap()).unwrap();
  let output =
    OutputWrapper::from_url(&Url::parse(&format!("folder:{}", records.path().display())).unwrap()).unwrap();
  let builder = KidneyCnnBuilder::with_path(weights.path().join("missing.safetensors")).seed(5);
  let service = PredictionService::start(&builder).unwrap();

  ContinuousTask::default()
    .run_task(input, &service, output)
    .unwrap();

  let mut reports: Vec<serde_json::Value> = json_files(records.path())
    .iter()
    .map(|path| serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap())
    .collect();
  reports.sort_by_key(|r| r["source"].as_str().unwrap().to_string());
  assert_eq!(reports.len(), 2);

  assert!(reports[0]["source"].as_str().unwrap().ends_with("01-ultrasound.png"));
  assert_eq!(reports[0]["validation_error"], false);
  assert!(reports[0]["timestamp"].as_f64().unwrap() > 0.0);

  assert!(reports[1]["source"].as_str().unwrap().ends_with("02-holiday.png"));
  assert_eq!(reports[1]["disease"], "Invalid Image");
  assert_eq!(reports[1]["validation_error"], true);
}

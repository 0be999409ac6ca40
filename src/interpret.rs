// 该文件是 Shenkang （肾康） 项目的一部分。
// src/interpret.rs - 推理结果解读
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

use serde::{Serialize, Serializer};

use crate::{
  model::{ClassProbabilities, KidneyLabel},
  validate::ScanVerdict,
};

const HIGH_SEVERITY_THRESHOLD: f32 = 0.9;
const MEDIUM_SEVERITY_THRESHOLD: f32 = 0.7;

const INVALID_IMAGE: &str = "Invalid Image";

const HEALTHY_MESSAGE: &str = "No kidney disease detected. Your kidneys appear healthy.";

const HEALTHY_RECOMMENDATIONS: [&str; 4] = [
  "Continue maintaining a healthy lifestyle",
  "Stay hydrated with adequate water intake",
  "Regular exercise and balanced diet",
  "Annual check-ups recommended",
];

const DISEASE_RECOMMENDATIONS: [&str; 4] = [
  "Consult a nephrologist immediately",
  "Follow up with additional tests",
  "Monitor symptoms closely",
  "Maintain prescribed medications if any",
];

const INVALID_IMAGE_RECOMMENDATIONS: [&str; 5] = [
  "Upload a clear kidney ultrasound image",
  "Use CT scan or MRI images of the kidney area",
  "Ensure the image shows kidney structures clearly",
  "Avoid photos of people, objects, or non-medical images",
  "Make sure the image is well-lit and in focus",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
  None,
  Low,
  Medium,
  High,
}

impl Severity {
  /// 正常类别恒为 None；其余按置信度分级，阈值均为严格大于
  pub fn classify(label: KidneyLabel, confidence: f32) -> Self {
    if label == KidneyLabel::Normal {
      Severity::None
    } else if confidence > HIGH_SEVERITY_THRESHOLD {
      Severity::High
    } else if confidence > MEDIUM_SEVERITY_THRESHOLD {
      Severity::Medium
    } else {
      Severity::Low
    }
  }
}

/// 报告中的诊断字段，序列化为纯字符串
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
  Label(KidneyLabel),
  InvalidImage,
}

impl Diagnosis {
  pub fn as_str(&self) -> &'static str {
    match self {
      Diagnosis::Label(label) => label.as_str(),
      Diagnosis::InvalidImage => INVALID_IMAGE,
    }
  }
}

impl std::fmt::Display for Diagnosis {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Serialize for Diagnosis {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionReport {
  pub disease: Diagnosis,
  pub confidence: f32,
  pub severity: Severity,
  pub message: String,
  pub recommendations: Vec<String>,
  pub validation_error: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub class_probabilities: Option<BTreeMap<String, f32>>,
}

impl PredictionReport {
  pub fn is_validation_error(&self) -> bool {
    self.validation_error
  }
}

/// 将模型输出解读为报告
pub fn interpret(probabilities: &ClassProbabilities) -> PredictionReport {
  let (label, confidence) = probabilities.argmax();
  let severity = Severity::classify(label, confidence);

  PredictionReport {
    disease: Diagnosis::Label(label),
    confidence,
    severity,
    message: message(label, severity),
    recommendations: recommendations(label),
    validation_error: false,
    class_probabilities: Some(probabilities.to_map()),
  }
}

/// 未通过合理性检查的图像，不经过模型直接生成报告
pub fn reject(verdict: &ScanVerdict) -> PredictionReport {
  PredictionReport {
    disease: Diagnosis::InvalidImage,
    confidence: verdict.confidence,
    severity: Severity::None,
    message: format!(
      "This image does not appear to be a kidney scan. {}. Please upload a clear kidney ultrasound, CT scan, or MRI image for analysis.",
      verdict.reason
    ),
    recommendations: to_strings(&INVALID_IMAGE_RECOMMENDATIONS),
    validation_error: true,
    class_probabilities: None,
  }
}

pub fn message(label: KidneyLabel, severity: Severity) -> String {
  let disease = label.as_str().to_lowercase();
  match (label, severity) {
    (KidneyLabel::Normal, _) | (_, Severity::None) => HEALTHY_MESSAGE.to_string(),
    (_, Severity::High) => format!(
      "Strong indication of {} detected. Please consult a healthcare professional immediately.",
      disease
    ),
    (_, Severity::Medium) => format!(
      "Moderate indication of {} detected. Please consult a healthcare professional for proper diagnosis.",
      disease
    ),
    (_, Severity::Low) => format!(
      "Possible indication of {} detected. Consider consulting a healthcare professional for further evaluation.",
      disease
    ),
  }
}

/// 每种疾病附加的两条建议
fn specific_recommendations(label: KidneyLabel) -> Option<[&'static str; 2]> {
  match label {
    KidneyLabel::Normal => None,
    KidneyLabel::Cyst => Some([
      "Monitor cyst size regularly",
      "Avoid activities that may cause trauma to the kidney area",
    ]),
    KidneyLabel::Stone => Some([
      "Increase water intake to help pass stones",
      "Follow dietary recommendations to prevent future stones",
    ]),
    KidneyLabel::Tumor => Some([
      "Seek immediate medical attention",
      "Prepare for potential imaging and biopsy procedures",
    ]),
  }
}

pub fn recommendations(label: KidneyLabel) -> Vec<String> {
  match specific_recommendations(label) {
    None => to_strings(&HEALTHY_RECOMMENDATIONS),
    Some(extra) => DISEASE_RECOMMENDATIONS
      .iter()
      .chain(extra.iter())
      .map(|s| s.to_string())
      .collect(),
  }
}

fn to_strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn probabilities(values: [f32; 4]) -> ClassProbabilities {
    ClassProbabilities::try_from(&values[..]).unwrap()
  }

  /// 目标类别取 `confidence`，其余平均分配
  fn peaked(label: KidneyLabel, confidence: f32) -> ClassProbabilities {
    let rest = (1.0 - confidence) / 3.0;
    let mut values = [rest; 4];
    values[label.index()] = confidence;
    probabilities(values)
  }

  #[test]
  fn uniform_output_reports_cyst() {
    let report = interpret(&probabilities([0.25, 0.25, 0.25, 0.25]));
    assert_eq!(report.disease, Diagnosis::Label(KidneyLabel::Cyst));
    assert_eq!(report.confidence, 0.25);
    assert_eq!(report.severity, Severity::Low);
  }

  #[test]
  fn normal_is_never_severe() {
    for confidence in [0.3, 0.6, 0.95] {
      let report = interpret(&peaked(KidneyLabel::Normal, confidence));
      assert_eq!(report.disease, Diagnosis::Label(KidneyLabel::Normal));
      assert_eq!(report.severity, Severity::None);
      assert_eq!(report.message, HEALTHY_MESSAGE);
      assert_eq!(report.recommendations, HEALTHY_RECOMMENDATIONS);
    }
  }

  #[test]
  fn severity_tiers_use_strict_thresholds() {
    for label in [KidneyLabel::Cyst, KidneyLabel::Stone, KidneyLabel::Tumor] {
      assert_eq!(Severity::classify(label, 0.95), Severity::High);
      assert_eq!(Severity::classify(label, 0.9), Severity::Medium);
      assert_eq!(Severity::classify(label, 0.8), Severity::Medium);
      assert_eq!(Severity::classify(label, 0.7), Severity::Low);
      assert_eq!(Severity::classify(label, 0.5), Severity::Low);
    }
  }

  #[test]
  fn messages_name_the_disease() {
    let report = interpret(&peaked(KidneyLabel::Stone, 0.95));
    assert_eq!(
      report.message,
      "Strong indication of stone detected. Please consult a healthcare professional immediately."
    );
    let report = interpret(&peaked(KidneyLabel::Tumor, 0.8));
    assert!(report.message.starts_with("Moderate indication of tumor detected."));
    let report = interpret(&peaked(KidneyLabel::Cyst, 0.5));
    assert!(report.message.starts_with("Possible indication of cyst detected."));
  }

  #[test]
  fn disease_recommendations_are_ordered() {
    assert_eq!(
      recommendations(KidneyLabel::Cyst),
      vec![
        "Consult a nephrologist immediately",
        "Follow up with additional tests",
        "Monitor symptoms closely",
        "Maintain prescribed medications if any",
        "Monitor cyst size regularly",
        "Avoid activities that may cause trauma to the kidney area",
      ]
    );
    assert_eq!(
      recommendations(KidneyLabel::Stone)[4..],
      [
        "Increase water intake to help pass stones",
        "Follow dietary recommendations to prevent future stones",
      ]
    );
    assert_eq!(
      recommendations(KidneyLabel::Tumor)[4..],
      [
        "Seek immediate medical attention",
        "Prepare for potential imaging and biopsy procedures",
      ]
    );
  }

  #[test]
  fn rejected_image_report() {
    let verdict = ScanVerdict {
      is_likely_scan: false,
      confidence: 0.9,
      reason: "Image does not appear to be a medical scan".to_string(),
    };
    let report = reject(&verdict);
    assert_eq!(report.disease.as_str(), "Invalid Image");
    assert_eq!(report.severity, Severity::None);
    assert_eq!(report.confidence, 0.9);
    assert!(report.validation_error);
    assert_eq!(report.recommendations.len(), 5);
    assert!(report.message.contains("Image does not appear to be a medical scan."));
    assert!(report.class_probabilities.is_none());
  }

  #[test]
  fn serializes_with_wire_field_names() {
    let report = interpret(&peaked(KidneyLabel::Tumor, 0.97));
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["disease"], "Tumor");
    assert_eq!(json["severity"], "High");
    assert_eq!(json["validation_error"], false);
    assert_eq!(json["recommendations"].as_array().unwrap().len(), 6);
    assert!(json["class_probabilities"]["Tumor"].as_f64().unwrap() > 0.96);

    let rejected = serde_json::to_value(reject(&ScanVerdict {
      is_likely_scan: false,
      confidence: 0.5,
      reason: "Error validating image: 像素网格为空".to_string(),
    }))
    .unwrap();
    assert_eq!(rejected["disease"], "Invalid Image");
    assert_eq!(rejected["severity"], "None");
    assert!(rejected.get("class_probabilities").is_none());
  }
}

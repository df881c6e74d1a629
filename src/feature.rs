// 该文件是 Tianyan （天眼） 项目的一部分。
// src/feature.rs - 人脸特征向量比对
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 引擎输出的人脸特征长度
pub const FEATURE_LEN: usize = 512;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("特征长度不匹配: 期望 512, 实际 {0}")]
pub struct FeatureLengthError(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Box<[f32]>);

impl FeatureVector {
  pub fn as_slice(&self) -> &[f32] {
    &self.0
  }
}

impl TryFrom<Vec<f32>> for FeatureVector {
  type Error = FeatureLengthError;

  fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
    if values.len() != FEATURE_LEN {
      return Err(FeatureLengthError(values.len()));
    }
    Ok(Self(values.into_boxed_slice()))
  }
}

impl From<FeatureVector> for Vec<f32> {
  fn from(feature: FeatureVector) -> Self {
    feature.0.into_vec()
  }
}

/// 余弦相似度，取值 [-1, 1]，越大越相似
///
/// 两个向量长度必须相同且不为零。全零向量的相似度定义为 0。
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  assert_eq!(a.len(), b.len(), "特征长度不一致");
  assert!(!a.is_empty(), "特征向量为空");

  // f64 累加，避免小幅值特征的平方下溢
  let dot: f64 = a
    .iter()
    .zip(b)
    .map(|(&x, &y)| f64::from(x) * f64::from(y))
    .sum();
  let norm = |v: &[f32]| v.iter().map(|&x| f64::from(x).powi(2)).sum::<f64>().sqrt();

  let denom = norm(a) * norm(b);
  if denom == 0.0 {
    return 0.0;
  }
  (dot / denom).clamp(-1.0, 1.0) as f32
}

pub fn compare(a: &FeatureVector, b: &FeatureVector) -> f32 {
  cosine_similarity(a.as_slice(), b.as_slice())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn feature(f: impl Fn(usize) -> f32) -> FeatureVector {
    FeatureVector::try_from((0..FEATURE_LEN).map(f).collect::<Vec<_>>()).unwrap()
  }

  #[test]
  fn identical_features_are_maximally_similar() {
    let a = feature(|i| (i as f32 * 0.37).sin());
    assert!((compare(&a, &a) - 1.0).abs() < 1e-5);
  }

  #[test]
  fn small_magnitude_features_keep_self_similarity() {
    let a = feature(|i| if i == 0 { 1e-4 } else { 0.0 });
    assert!((compare(&a, &a) - 1.0).abs() < 1e-6);

    let b = feature(|i| (i as f32 * 0.11).cos() * 1e-25);
    assert!((compare(&b, &b) - 1.0).abs() < 1e-5);
  }

  #[test]
  fn zero_vector_scores_zero() {
    let zero = feature(|_| 0.0);
    let a = feature(|i| i as f32);
    assert_eq!(compare(&zero, &a), 0.0);
    assert_eq!(compare(&zero, &zero), 0.0);
  }

  #[test]
  fn orthogonal_unit_vectors_score_zero() {
    let a = feature(|i| if i == 0 { 1.0 } else { 0.0 });
    let b = feature(|i| if i == 1 { 1.0 } else { 0.0 });
    assert!(compare(&a, &b).abs() < 1e-6);
  }

  #[test]
  fn comparison_is_symmetric() {
    let a = feature(|i| i as f32 - 200.0);
    let b = feature(|i| ((i * 7) % 13) as f32);
    assert_eq!(compare(&a, &b), compare(&b, &a));
  }

  #[test]
  fn opposite_vectors_score_minus_one() {
    let a = feature(|i| i as f32 + 1.0);
    let b = feature(|i| -(i as f32 + 1.0));
    assert!((compare(&a, &b) + 1.0).abs() < 1e-5);
  }

  #[test]
  fn scale_does_not_matter() {
    assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn rejects_wrong_length() {
    assert_eq!(
      FeatureVector::try_from(vec![0.0; 128]),
      Err(FeatureLengthError(128))
    );
  }

  #[test]
  #[should_panic(expected = "特征长度不一致")]
  fn mismatched_lengths_panic() {
    cosine_similarity(&[1.0, 0.0], &[1.0]);
  }

  #[test]
  fn safe_to_share_between_threads() {
    let a = std::sync::Arc::new(feature(|i| i as f32));
    let handles: Vec<_> = (0..4)
      .map(|_| {
        let a = a.clone();
        std::thread::spawn(move || compare(&a, &a))
      })
      .collect();
    for handle in handles {
      assert!((handle.join().unwrap() - 1.0).abs() < 1e-5);
    }
  }
}

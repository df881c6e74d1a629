// 该文件是 Tianyan （天眼） 项目的一部分。
// src/model.rs - 检测结果模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attribute::BodyAttributes;

/// 每张人脸的关键点数量
pub const FACE_POINT_LEN: usize = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
  #[error("未知的模型类型: {0}")]
  UnknownKind(String),
  #[error("第 {index} 个结果类型为 {actual}, 与批次类型 {expected} 不一致")]
  KindMismatch {
    index: usize,
    expected: ModelKind,
    actual: ModelKind,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
  Person,
  LicensePlate,
  FaceRecognition,
  FireSmoke,
  BodyAttribute,
}

impl ModelKind {
  /// 命令行中的数字选择子: 0:person 1:lpr 2:face 3:fire smoke 4:body attr
  pub fn from_selector(selector: u32) -> Option<Self> {
    match selector {
      0 => Some(ModelKind::Person),
      1 => Some(ModelKind::LicensePlate),
      2 => Some(ModelKind::FaceRecognition),
      3 => Some(ModelKind::FireSmoke),
      4 => Some(ModelKind::BodyAttribute),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      ModelKind::Person => "person",
      ModelKind::LicensePlate => "license-plate",
      ModelKind::FaceRecognition => "face-recognition",
      ModelKind::FireSmoke => "fire-smoke",
      ModelKind::BodyAttribute => "body-attribute",
    }
  }
}

impl fmt::Display for ModelKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for ModelKind {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "person" => Ok(ModelKind::Person),
      "lpr" | "license-plate" => Ok(ModelKind::LicensePlate),
      "face" | "face-recognition" => Ok(ModelKind::FaceRecognition),
      "fire-smoke" => Ok(ModelKind::FireSmoke),
      "body-attr" | "body-attribute" => Ok(ModelKind::BodyAttribute),
      other => other
        .parse::<u32>()
        .ok()
        .and_then(ModelKind::from_selector)
        .ok_or_else(|| ModelError::UnknownKind(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

/// 像素坐标下的目标框，渲染时才裁剪到图像范围
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
}

impl BoundingBox {
  pub fn center(&self) -> Point {
    Point {
      x: self.x + self.w / 2.0,
      y: self.y + self.h / 2.0,
    }
  }
}

/// 各模型类型特有的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Detection {
  Person {
    status: i32,
  },
  Face {
    landmarks: [Point; FACE_POINT_LEN],
    quality: f32,
  },
  Plate {
    plate_ids: Vec<i32>,
    vehicle_type: i32,
  },
  FireSmoke {
    label: i32,
    score: f32,
  },
  BodyAttribute(BodyAttributes),
}

impl Detection {
  pub fn kind(&self) -> ModelKind {
    match self {
      Detection::Person { .. } => ModelKind::Person,
      Detection::Face { .. } => ModelKind::FaceRecognition,
      Detection::Plate { .. } => ModelKind::LicensePlate,
      Detection::FireSmoke { .. } => ModelKind::FireSmoke,
      Detection::BodyAttribute(_) => ModelKind::BodyAttribute,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  pub bbox: BoundingBox,
  pub score: f32,
  #[serde(default)]
  pub track_id: Option<i32>,
  pub detail: Detection,
}

impl DetectionRecord {
  /// 引擎以负数表示未跟踪
  pub fn track_id_from_raw(raw: i32) -> Option<i32> {
    (raw >= 0).then_some(raw)
  }

  /// 日志与标注中未跟踪的目标显示为 -1
  pub fn raw_track_id(&self) -> i32 {
    self.track_id.unwrap_or(-1)
  }
}

/// 一次推理得到的结果批次，顺序即引擎输出顺序
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBatch {
  kind: ModelKind,
  records: Box<[DetectionRecord]>,
}

impl ResultBatch {
  pub fn new(kind: ModelKind, records: Vec<DetectionRecord>) -> Result<Self, ModelError> {
    if let Some((index, record)) = records
      .iter()
      .enumerate()
      .find(|(_, r)| r.detail.kind() != kind)
    {
      return Err(ModelError::KindMismatch {
        index,
        expected: kind,
        actual: record.detail.kind(),
      });
    }

    Ok(Self {
      kind,
      records: records.into_boxed_slice(),
    })
  }

  pub fn empty(kind: ModelKind) -> Self {
    Self {
      kind,
      records: Box::new([]),
    }
  }

  pub fn kind(&self) -> ModelKind {
    self.kind
  }

  pub fn records(&self) -> &[DetectionRecord] {
    &self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

// 该文件是 Tianyan （天眼） 项目的一部分。
// src/decode.rs - 推理结果的按类型解释与分发
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::borrow::Cow;
use std::fmt;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
  attribute::AttributeCategory,
  engine::{Engine, PlateDecoder},
  model::{BoundingBox, Detection, DetectionRecord, ModelKind, Point, ResultBatch},
};

/// 行人状态为该值时既不绘制也不输出日志
pub const PERSON_STATUS_SUPPRESSED: i32 = 3;

/// 标注中的文本
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
  /// 通用字体可以绘制的文本
  Text(String),
  /// 车牌字符编码，需要专用的车牌字形绘制
  Plate(Vec<i32>),
}

/// 单个目标的绘制指令
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub bbox: BoundingBox,
  pub label: Option<Label>,
  pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
  Person {
    status: i32,
    track_id: i32,
  },
  Face {
    track_id: i32,
    quality: f32,
  },
  Plate {
    license: String,
    vehicle_type: i32,
  },
  FireSmoke {
    label: i32,
    track_id: i32,
    score: f32,
  },
  BodyAttribute {
    track_id: i32,
    attributes: Vec<(AttributeCategory, Cow<'static, str>)>,
  },
}

/// 以 f32 的最短十进制表示写入 JSON，避免放宽到 f64 后出现多余的尾数
fn json_f32(value: f32) -> Value {
  let value = value
    .to_string()
    .parse::<f64>()
    .unwrap_or_else(|_| f64::from(value));
  Value::from(value)
}

impl LogRecord {
  pub fn to_json(&self) -> Value {
    match self {
      LogRecord::Person { status, track_id } => json!({
        "kind": ModelKind::Person,
        "status": status,
        "track_id": track_id,
      }),
      LogRecord::Face { track_id, quality } => json!({
        "kind": ModelKind::FaceRecognition,
        "track_id": track_id,
        "quality": json_f32(*quality),
      }),
      LogRecord::Plate {
        license,
        vehicle_type,
      } => json!({
        "kind": ModelKind::LicensePlate,
        "license": license,
        "vehicle_type": vehicle_type,
      }),
      LogRecord::FireSmoke {
        label,
        track_id,
        score,
      } => json!({
        "kind": ModelKind::FireSmoke,
        "label": label,
        "track_id": track_id,
        "score": json_f32(*score),
      }),
      LogRecord::BodyAttribute {
        track_id,
        attributes,
      } => {
        let attributes: serde_json::Map<String, Value> = attributes
          .iter()
          .map(|(category, label)| (category.name().to_string(), Value::from(label.to_string())))
          .collect();
        json!({
          "kind": ModelKind::BodyAttribute,
          "track_id": track_id,
          "attributes": attributes,
        })
      }
    }
  }
}

impl fmt::Display for LogRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LogRecord::Person { status, track_id } => {
        write!(f, "status: {}, track_id: {}", status, track_id)
      }
      LogRecord::Face { track_id, quality } => {
        write!(f, "track_id: {} quality: {:.2}", track_id, quality)
      }
      LogRecord::Plate {
        license,
        vehicle_type,
      } => write!(f, "license: {} cartype: {}", license, vehicle_type),
      LogRecord::FireSmoke {
        label,
        track_id,
        score,
      } => write!(
        f,
        "status: {}, track_id: {} label: {} score: {:.2}",
        label, track_id, label, score
      ),
      LogRecord::BodyAttribute {
        track_id,
        attributes,
      } => {
        write!(f, "track_id:{}", track_id)?;
        for (category, label) in attributes {
          write!(f, " {}: {}", category, label)?;
        }
        Ok(())
      }
    }
  }
}

/// 单个目标的解码结果：一条绘制指令和若干条日志
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
  /// 目标在来源批次中的下标
  pub source: usize,
  pub track_id: Option<i32>,
  pub annotation: Annotation,
  pub logs: Vec<LogRecord>,
}

pub struct Dispatcher<'d, D: PlateDecoder + ?Sized> {
  plates: &'d D,
}

impl<'d, D: PlateDecoder + ?Sized> Dispatcher<'d, D> {
  pub fn new(plates: &'d D) -> Self {
    Self { plates }
  }

  /// 按类型解释批次中下标为 `source` 的目标，被抑制的目标返回 None
  pub fn decode_record(&self, source: usize, record: &DetectionRecord) -> Option<Decoded> {
    let track_id = record.raw_track_id();
    let text = |s: String| Some(Label::Text(s));

    let (label, points, log) = match &record.detail {
      Detection::Person { status } => {
        if *status == PERSON_STATUS_SUPPRESSED {
          debug!("跳过状态为 {} 的行人, track_id: {}", status, track_id);
          return None;
        }
        (
          text(format!("{} {}", status, track_id)),
          Vec::new(),
          LogRecord::Person {
            status: *status,
            track_id,
          },
        )
      }
      Detection::Face { landmarks, quality } => (
        text(track_id.to_string()),
        landmarks.to_vec(),
        LogRecord::Face {
          track_id,
          quality: *quality,
        },
      ),
      Detection::Plate {
        plate_ids,
        vehicle_type,
      } => (
        Some(Label::Plate(plate_ids.clone())),
        Vec::new(),
        LogRecord::Plate {
          license: self.plates.plate_str(plate_ids),
          vehicle_type: *vehicle_type,
        },
      ),
      Detection::FireSmoke { label, score } => (
        text(format!("{} {}", label, track_id)),
        Vec::new(),
        LogRecord::FireSmoke {
          label: *label,
          track_id,
          score: *score,
        },
      ),
      Detection::BodyAttribute(attributes) => (
        text(track_id.to_string()),
        Vec::new(),
        LogRecord::BodyAttribute {
          track_id,
          attributes: attributes.labels(),
        },
      ),
    };

    Some(Decoded {
      source,
      track_id: record.track_id,
      annotation: Annotation {
        bbox: record.bbox,
        label,
        points,
      },
      logs: vec![log],
    })
  }

  /// 逐个解释批次中的目标并输出日志，顺序与批次一致
  pub fn decode_batch(&self, batch: &ResultBatch) -> Vec<Decoded> {
    let decoded: Vec<Decoded> = batch
      .records()
      .iter()
      .enumerate()
      .filter_map(|(source, record)| self.decode_record(source, record))
      .collect();

    log_decoded(&decoded);
    debug!(
      "{} 批次: {} 个目标, 输出 {} 个",
      batch.kind(),
      batch.len(),
      decoded.len()
    );

    decoded
  }

  /// 解释人体属性，每条结果保留其检测目标在原批次中的下标
  pub fn decode_attributes(&self, attributes: &AttributeBatch) -> Vec<Decoded> {
    let decoded: Vec<Decoded> = attributes
      .batch
      .records()
      .iter()
      .zip(&attributes.sources)
      .filter_map(|(record, &source)| self.decode_record(source, record))
      .collect();

    log_decoded(&decoded);
    decoded
  }
}

fn log_decoded(decoded: &[Decoded]) {
  for item in decoded {
    for log in &item.logs {
      info!("{}", log);
    }
  }
}

/// 人体属性结果及其检测目标在检测批次中的下标
#[derive(Debug, Clone)]
pub struct AttributeBatch {
  batch: ResultBatch,
  sources: Vec<usize>,
}

impl AttributeBatch {
  pub fn batch(&self) -> &ResultBatch {
    &self.batch
  }

  pub fn sources(&self) -> &[usize] {
    &self.sources
  }
}

fn is_suppressed(record: &DetectionRecord) -> bool {
  matches!(
    record.detail,
    Detection::Person {
      status: PERSON_STATUS_SUPPRESSED
    }
  )
}

/// 以检测框为感兴趣区域逐个提取人体属性
///
/// 单个目标提取失败时记录警告并丢弃该目标，不影响其余目标。
/// 被抑制的行人不提取属性。
pub fn attach_body_attributes<E: Engine>(
  engine: &E,
  image: &E::Image,
  detections: &ResultBatch,
) -> AttributeBatch {
  let (sources, records): (Vec<usize>, Vec<DetectionRecord>) = detections
    .records()
    .iter()
    .enumerate()
    .filter(|(_, record)| {
      let suppressed = is_suppressed(record);
      if suppressed {
        debug!("跳过被抑制行人的属性, track_id: {}", record.raw_track_id());
      }
      !suppressed
    })
    .filter_map(|(source, record)| {
      match engine.body_attribute(image, &record.bbox, record.track_id) {
        Ok(attributes) => Some((
          source,
          DetectionRecord {
            detail: Detection::BodyAttribute(attributes),
            ..record.clone()
          },
        )),
        Err(e) => {
          warn!(
            "track_id:{} 获取人体属性失败: {}",
            record.raw_track_id(),
            e
          );
          None
        }
      }
    })
    .unzip();

  // 所有记录都由本函数构造为人体属性类型
  let batch = ResultBatch::new(ModelKind::BodyAttribute, records)
    .unwrap_or_else(|_| ResultBatch::empty(ModelKind::BodyAttribute));
  AttributeBatch { batch, sources }
}

/// 将属性解码结果按来源下标并入对应的检测结果，只追加日志，不重复绘制
///
/// 没有对应检测的属性结果被丢弃。
pub fn merge_attributes(detections: &mut [Decoded], attributes: Vec<Decoded>) {
  for attribute in attributes {
    match detections.iter_mut().find(|d| d.source == attribute.source) {
      Some(detection) => detection.logs.extend(attribute.logs),
      None => debug!(
        "属性结果没有对应的检测目标, 下标: {}, track_id: {:?}",
        attribute.source, attribute.track_id
      ),
    }
  }
}

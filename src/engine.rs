// 该文件是 Tianyan （天眼） 项目的一部分。
// src/engine.rs - 推理引擎边界与原生图像的作用域管理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use tracing::debug;

use crate::{
  attribute::BodyAttributes,
  feature::{FeatureLengthError, FeatureVector},
  frame::{ALIGNMENT, ColorLayout, Frame},
  model::{BoundingBox, ModelError, ModelKind, ResultBatch},
};

/// 人脸特征提取时选择画面中最大的人脸
pub const SELECT_LARGEST_FACE: i32 = -1;

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("引擎调用 {call} 失败, 返回码: {code}")]
  Status { call: &'static str, code: i32 },
  #[error("原生图像大小不匹配: 期望 {expected}, 实际 {actual}")]
  ImageSizeMismatch { expected: usize, actual: usize },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("推理结果无效: {0}")]
  InvalidResult(#[from] ModelError),
  #[error("特征无效: {0}")]
  InvalidFeature(#[from] FeatureLengthError),
  #[error("结果记录解析错误: {0}")]
  RecordError(#[from] serde_json::Error),
  #[error("没有可回放的推理结果: {0}")]
  MissingRecord(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 外部推理引擎
///
/// 引擎句柄的初始化由具体实现的构造函数完成，释放由其 `Drop` 完成。
/// 原生图像必须经由 [`EngineImage`] 申请，以保证每次申请都恰好释放一次。
pub trait Engine {
  type Image;

  fn kind(&self) -> ModelKind;

  /// 通知引擎接下来处理的输入名称，按名称查找结果的引擎以此定位记录
  fn select_input(&self, _name: &str) {}

  fn create_image(
    &self,
    width: u32,
    height: u32,
    stride: usize,
    layout: ColorLayout,
  ) -> Result<Self::Image, EngineError>;

  fn image_data_mut<'i>(&self, image: &'i mut Self::Image) -> &'i mut [u8];

  fn release_image(&self, image: &mut Self::Image);

  fn inference(&self, image: &Self::Image) -> Result<ResultBatch, EngineError>;

  fn face_feature(
    &self,
    image: &Self::Image,
    selector: i32,
  ) -> Result<(ResultBatch, FeatureVector), EngineError>;

  /// 以目标框为感兴趣区域提取人体属性，`track_id` 供引擎做历史状态跟踪
  fn body_attribute(
    &self,
    image: &Self::Image,
    bbox: &BoundingBox,
    track_id: Option<i32>,
  ) -> Result<BodyAttributes, EngineError>;
}

/// 车牌字符编码到显示文本的解码器
pub trait PlateDecoder {
  fn plate_str(&self, plate_ids: &[i32]) -> String;
}

/// 引擎原生图像的作用域守卫，离开作用域时释放
pub struct EngineImage<'e, E: Engine> {
  engine: &'e E,
  image: E::Image,
}

impl<'e, E: Engine> EngineImage<'e, E> {
  /// 申请原生图像并拷贝像素数据
  ///
  /// # Panics
  ///
  /// 帧的宽、高或行跨度未按 [`ALIGNMENT`] 对齐时直接 panic，此时不会调用引擎。
  pub fn acquire(engine: &'e E, frame: &Frame) -> Result<Self, EngineError> {
    frame.assert_aligned(ALIGNMENT);

    let image = engine.create_image(
      frame.width(),
      frame.height(),
      frame.stride(),
      frame.layout(),
    )?;
    debug!(
      "申请原生图像: {}x{} 行跨度 {} ({})",
      frame.width(),
      frame.height(),
      frame.stride(),
      frame.layout()
    );
    let mut guard = EngineImage { engine, image };

    let src = frame.as_bytes();
    let dst = engine.image_data_mut(&mut guard.image);
    if dst.len() != src.len() {
      return Err(EngineError::ImageSizeMismatch {
        expected: src.len(),
        actual: dst.len(),
      });
    }
    dst.copy_from_slice(src);

    Ok(guard)
  }

  pub fn image(&self) -> &E::Image {
    &self.image
  }

  pub fn inference(&self) -> Result<ResultBatch, EngineError> {
    self.engine.inference(&self.image)
  }

  pub fn face_feature(&self, selector: i32) -> Result<(ResultBatch, FeatureVector), EngineError> {
    self.engine.face_feature(&self.image, selector)
  }
}

impl<E: Engine> Drop for EngineImage<'_, E> {
  fn drop(&mut self) {
    self.engine.release_image(&mut self.image);
    debug!("释放原生图像");
  }
}

/// 对一帧图像执行推理
pub fn infer_frame<E: Engine>(engine: &E, frame: &Frame) -> Result<ResultBatch, EngineError> {
  let image = EngineImage::acquire(engine, frame)?;
  image.inference()
}

/// 对一帧图像提取人脸特征
pub fn face_feature_frame<E: Engine>(
  engine: &E,
  frame: &Frame,
  selector: i32,
) -> Result<(ResultBatch, FeatureVector), EngineError> {
  let image = EngineImage::acquire(engine, frame)?;
  image.face_feature(selector)
}

mod replay;
pub use self::replay::{ReplayEngine, ReplayImage};

#[cfg(test)]
pub(crate) mod testing {
  use std::cell::{Cell, RefCell};

  use super::*;

  /// 记录原生图像申请与释放次数的测试引擎
  pub struct CountingEngine {
    pub kind: ModelKind,
    pub batch: RefCell<Option<Result<ResultBatch, i32>>>,
    pub created: Cell<usize>,
    pub released: Cell<usize>,
    pub last_pixels: RefCell<Vec<u8>>,
  }

  impl CountingEngine {
    pub fn new(batch: Result<ResultBatch, i32>) -> Self {
      let kind = match &batch {
        Ok(batch) => batch.kind(),
        Err(_) => ModelKind::Person,
      };
      Self {
        kind,
        batch: RefCell::new(Some(batch)),
        created: Cell::new(0),
        released: Cell::new(0),
        last_pixels: RefCell::new(Vec::new()),
      }
    }
  }

  impl Engine for CountingEngine {
    type Image = Vec<u8>;

    fn kind(&self) -> ModelKind {
      self.kind
    }

    fn create_image(
      &self,
      _width: u32,
      height: u32,
      stride: usize,
      layout: ColorLayout,
    ) -> Result<Self::Image, EngineError> {
      self.created.set(self.created.get() + 1);
      Ok(vec![0; layout.buffer_size(stride, height)])
    }

    fn image_data_mut<'i>(&self, image: &'i mut Self::Image) -> &'i mut [u8] {
      image
    }

    fn release_image(&self, image: &mut Self::Image) {
      *self.last_pixels.borrow_mut() = std::mem::take(image);
      self.released.set(self.released.get() + 1);
    }

    fn inference(&self, _image: &Self::Image) -> Result<ResultBatch, EngineError> {
      match self.batch.borrow().clone() {
        Some(Ok(batch)) => Ok(batch),
        Some(Err(code)) => Err(EngineError::Status {
          call: "inference",
          code,
        }),
        None => Ok(ResultBatch::empty(self.kind)),
      }
    }

    fn face_feature(
      &self,
      image: &Self::Image,
      _selector: i32,
    ) -> Result<(ResultBatch, FeatureVector), EngineError> {
      let batch = self.inference(image)?;
      let feature = FeatureVector::try_from(vec![1.0; crate::feature::FEATURE_LEN])?;
      Ok((batch, feature))
    }

    fn body_attribute(
      &self,
      _image: &Self::Image,
      _bbox: &BoundingBox,
      track_id: Option<i32>,
    ) -> Result<BodyAttributes, EngineError> {
      match track_id {
        Some(id) if id % 2 != 0 => Err(EngineError::Status {
          call: "body_attribute",
          code: -2,
        }),
        _ => Ok(BodyAttributes {
          gender: 1,
          ..Default::default()
        }),
      }
    }
  }
}

// 该文件是 Tianyan （天眼） 项目的一部分。
// src/output/draw.rs - 解码结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  decode::{Annotation, Label},
  engine::PlateDecoder,
  plate::PlateCharset,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const BOX_THICKNESS: i32 = 2;
const POINT_RADIUS: i32 = 2;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const POINT_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const PLATE_COLOR: [u8; 3] = [0, 0, 255];
const PLATE_SCALE: f32 = 1.0;

// 未指定字体时依次尝试的系统字体
const SYSTEM_FONTS: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
  #[error("字体中缺少字符 '{0}'")]
  MissingGlyph(char),
}

/// 通用文本绘制
pub trait TextPainter {
  fn draw_text(
    &self,
    image: &mut RgbImage,
    text: &str,
    origin: (i32, i32),
    color: [u8; 3],
  ) -> Result<(), DrawError>;
}

/// 车牌字形绘制，`scale` 为相对默认字号的缩放
pub trait PlatePainter {
  fn draw_plate_ids(
    &self,
    image: &mut RgbImage,
    plate_ids: &[i32],
    origin: (i32, i32),
    color: [u8; 3],
    scale: f32,
  ) -> Result<(), DrawError>;
}

fn load_font(path: &Path) -> Result<FontArc, DrawError> {
  let data = std::fs::read(path)?;
  let font = FontArc::try_from_vec(data)?;
  info!("加载字体: {}", path.display());
  Ok(font)
}

pub struct GlyphTextPainter {
  font: FontArc,
  font_size: f32,
}

impl GlyphTextPainter {
  pub fn from_file(path: &Path) -> Result<Self, DrawError> {
    Ok(Self {
      font: load_font(path)?,
      font_size: LABEL_FONT_SIZE,
    })
  }

  /// 加载第一个可用的系统字体，都不可用时返回 None
  pub fn from_system() -> Option<Self> {
    SYSTEM_FONTS
      .iter()
      .map(Path::new)
      .filter(|path| path.is_file())
      .find_map(|path| {
        Self::from_file(path)
          .map_err(|e| warn!("系统字体 {} 加载失败: {}", path.display(), e))
          .ok()
      })
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }
}

impl TextPainter for GlyphTextPainter {
  fn draw_text(
    &self,
    image: &mut RgbImage,
    text: &str,
    origin: (i32, i32),
    color: [u8; 3],
  ) -> Result<(), DrawError> {
    draw_text_mut(
      image,
      Rgb(color),
      origin.0,
      origin.1,
      PxScale::from(self.font_size),
      &self.font,
      text,
    );
    Ok(())
  }
}

/// 基于字符表的车牌绘制，字体必须包含车牌中的汉字
pub struct GlyphPlatePainter {
  font: FontArc,
  charset: PlateCharset,
}

impl GlyphPlatePainter {
  pub fn new(font: &Path, charset: PlateCharset) -> Result<Self, DrawError> {
    Ok(Self {
      font: load_font(font)?,
      charset,
    })
  }
}

impl PlatePainter for GlyphPlatePainter {
  fn draw_plate_ids(
    &self,
    image: &mut RgbImage,
    plate_ids: &[i32],
    origin: (i32, i32),
    color: [u8; 3],
    scale: f32,
  ) -> Result<(), DrawError> {
    let text = self.charset.plate_str(plate_ids);
    if let Some(missing) = text.chars().find(|c| self.font.glyph_id(*c).0 == 0) {
      return Err(DrawError::MissingGlyph(missing));
    }

    draw_text_mut(
      image,
      Rgb(color),
      origin.0,
      origin.1,
      PxScale::from(LABEL_FONT_SIZE * scale),
      &self.font,
      &text,
    );
    Ok(())
  }
}

/// 标注绘制器
///
/// 未配置文本或车牌绘制器时仅绘制目标框与关键点。
pub struct Draw {
  text: Option<Box<dyn TextPainter>>,
  plate: Option<Box<dyn PlatePainter>>,
  box_color: [u8; 3],
  point_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      text: None,
      plate: None,
      box_color: BOX_COLOR,
      point_color: POINT_COLOR,
    }
  }
}

impl Draw {
  pub fn with_text_painter(mut self, painter: Box<dyn TextPainter>) -> Self {
    self.text = Some(painter);
    self
  }

  pub fn with_plate_painter(mut self, painter: Box<dyn PlatePainter>) -> Self {
    self.plate = Some(painter);
    self
  }

  // 目标框裁剪到图像范围内后返回左上与右下像素坐标（闭区间）
  fn clip_bbox(image: &RgbImage, annotation: &Annotation) -> Option<(i32, i32, i32, i32)> {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return None;
    }
    let bbox = &annotation.bbox;

    let x_min = (bbox.x.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y.floor() as i32).clamp(0, h - 1);
    let x_max = ((bbox.x + bbox.w).ceil() as i32 - 1).clamp(0, w - 1);
    let y_max = ((bbox.y + bbox.h).ceil() as i32 - 1).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return None;
    }
    Some((x_min, y_min, x_max, y_max))
  }

  fn draw_bbox(&self, image: &mut RgbImage, (x_min, y_min, x_max, y_max): (i32, i32, i32, i32)) {
    // 向内逐层绘制，加粗为 2 像素
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }
  }

  pub fn draw_annotation(
    &self,
    image: &mut RgbImage,
    annotation: &Annotation,
  ) -> Result<(), DrawError> {
    if let Some(corners) = Self::clip_bbox(image, annotation) {
      self.draw_bbox(image, corners);
    } else {
      debug!("目标框不在图像内: {:?}", annotation.bbox);
    }

    for point in &annotation.points {
      draw_hollow_circle_mut(
        image,
        (point.x.round() as i32, point.y.round() as i32),
        POINT_RADIUS,
        Rgb(self.point_color),
      );
    }

    match &annotation.label {
      Some(Label::Text(text)) => match &self.text {
        Some(painter) => {
          // 文本位于目标框上方
          let x = annotation.bbox.x.max(0.0) as i32;
          let y = (annotation.bbox.y as i32 - LABEL_TEXT_HEIGHT).max(0);
          painter.draw_text(image, text, (x, y), self.box_color)?;
        }
        None => debug!("未配置字体, 跳过文本: {}", text),
      },
      Some(Label::Plate(plate_ids)) => match &self.plate {
        Some(painter) => {
          let center = annotation.bbox.center();
          painter.draw_plate_ids(
            image,
            plate_ids,
            (center.x as i32, center.y as i32),
            PLATE_COLOR,
            PLATE_SCALE,
          )?;
        }
        None => debug!("未配置车牌字体, 跳过车牌: {:?}", plate_ids),
      },
      None => {}
    }

    Ok(())
  }

  pub fn draw_annotations<'a>(
    &self,
    image: &mut RgbImage,
    annotations: impl IntoIterator<Item = &'a Annotation>,
  ) -> Result<(), DrawError> {
    for annotation in annotations {
      self.draw_annotation(image, annotation)?;
    }
    Ok(())
  }
}

// 该文件是 Tianyan （天眼） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  decode::Decoded,
  frame::ToRgbImage,
  input::{InputFrame, decoded_path},
  output::{
    Render,
    draw::{Draw, DrawError, GlyphPlatePainter, GlyphTextPainter},
  },
  plate::PlateCharset,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("绘制错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 将标注后的图像写入目录
///
/// URL 参数：
/// - `record`：同时写入 `<文件名>.jsonl`，每行一条解码记录
/// - `font`：文本字体路径，省略时使用系统 DejaVu Sans
/// - `plate_font`、`plate_charset`：车牌字体与字符表路径
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  record: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch(
        uri.scheme().to_string(),
      ));
    }

    let query = |name: &str| {
      uri
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| PathBuf::from(v.into_owned()))
    };

    let mut draw = Draw::default();
    let text_painter = match query("font") {
      Some(font) => Some(GlyphTextPainter::from_file(&font)?),
      None => GlyphTextPainter::from_system(),
    };
    match text_painter {
      Some(painter) => draw = draw.with_text_painter(Box::new(painter)),
      None => warn!("未指定字体且没有可用的系统字体, 文本标注将被跳过"),
    }
    if let Some(font) = query("plate_font") {
      let charset = match query("plate_charset") {
        Some(path) => PlateCharset::from_file(&path)?,
        None => {
          warn!("未指定车牌字符表, 车牌将以编码显示");
          PlateCharset::default()
        }
      };
      draw = draw.with_plate_painter(Box::new(GlyphPlatePainter::new(&font, charset)?));
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");

    Self::new(&decoded_path(uri), draw, record)
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: &Path, draw: Draw, record: bool) -> Result<Self, DirectoryRecordOutputError> {
    if !directory.exists() {
      std::fs::create_dir_all(directory)?;
      info!("创建输出目录: {}", directory.display());
    }

    Ok(DirectoryRecordOutput {
      directory: directory.to_path_buf(),
      draw,
      record,
    })
  }

  fn write_records(&self, path: &Path, result: &[Decoded]) -> Result<(), DirectoryRecordOutputError> {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let image = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();

    let mut file = std::fs::File::create(path.with_extension("jsonl"))?;
    for log in result.iter().flat_map(|decoded| decoded.logs.iter()) {
      let mut line = log.to_json();
      if let Value::Object(fields) = &mut line {
        fields.insert("timestamp".to_string(), Value::from(timestamp.as_str()));
        fields.insert("image".to_string(), Value::from(image.as_str()));
      }
      serde_json::to_writer(&mut file, &line)?;
      file.write_all(b"\n")?;
    }
    Ok(())
  }
}

impl Render<InputFrame, [Decoded]> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &InputFrame, result: &[Decoded]) -> Result<(), Self::Error> {
    let mut image = frame.frame.to_rgb_image();
    self
      .draw
      .draw_annotations(&mut image, result.iter().map(|decoded| &decoded.annotation))?;

    let path = self.directory.join(&frame.name);
    image.save(&path)?;
    info!("out_path: {}", path.display());

    if self.record {
      self.write_records(&path, result)?;
    }
    Ok(())
  }
}

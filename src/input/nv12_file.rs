// 该文件是 Tianyan （天眼） 项目的一部分。
// src/input/nv12_file.rs - NV12 原始数据文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use url::Url;

use super::{InputFrame, decoded_path};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{ALIGNMENT, ColorLayout, Frame, FrameError},
};

#[derive(Error, Debug)]
pub enum Nv12FileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("缺少参数: {0}")]
  MissingParameter(&'static str),
  #[error("参数 {name} 无效: {value}")]
  InvalidParameter { name: &'static str, value: String },
  #[error("NV12 尺寸未按 {alignment} 对齐: {width}x{height} 行跨度 {stride}")]
  Unaligned {
    alignment: u32,
    width: u32,
    height: u32,
    stride: usize,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("NV12 数据错误: {0}")]
  FrameError(#[from] FrameError),
}

/// 单个 NV12 原始文件，宽、高、行跨度由 URL 参数给出
///
/// 例如 `nv12:///data/1920x1152.nv12?width=1920&height=1152&stride=1920`，
/// 省略 `stride` 时等于宽度。NV12 不做缩放，三者都必须按 [`ALIGNMENT`] 对齐。
pub struct Nv12FileInput {
  path: Option<PathBuf>,
  width: u32,
  height: u32,
  stride: usize,
}

impl FromUrlWithScheme for Nv12FileInput {
  const SCHEME: &'static str = "nv12";
}

fn query_number<T: std::str::FromStr>(
  url: &Url,
  name: &'static str,
) -> Result<Option<T>, Nv12FileInputError> {
  match url.query_pairs().find(|(k, _)| k == name) {
    Some((_, value)) => value
      .parse()
      .map(Some)
      .map_err(|_| Nv12FileInputError::InvalidParameter {
        name,
        value: value.into_owned(),
      }),
    None => Ok(None),
  }
}

impl FromUrl for Nv12FileInput {
  type Error = Nv12FileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Nv12FileInputError::SchemeMismatch(
        url.scheme().to_string(),
      ));
    }

    let width: u32 =
      query_number(url, "width")?.ok_or(Nv12FileInputError::MissingParameter("width"))?;
    let height: u32 =
      query_number(url, "height")?.ok_or(Nv12FileInputError::MissingParameter("height"))?;
    let stride: usize = query_number(url, "stride")?.unwrap_or(width as usize);

    if width % ALIGNMENT != 0 || height % ALIGNMENT != 0 || stride % ALIGNMENT as usize != 0 {
      return Err(Nv12FileInputError::Unaligned {
        alignment: ALIGNMENT,
        width,
        height,
        stride,
      });
    }

    Ok(Nv12FileInput {
      path: Some(decoded_path(url)),
      width,
      height,
      stride,
    })
  }
}

impl Nv12FileInput {
  fn read(&self, path: PathBuf) -> Result<InputFrame, Nv12FileInputError> {
    let data = std::fs::read(&path)?;
    info!(
      "读取 NV12 文件 {}: {} 字节, {}x{} 行跨度 {}",
      path.display(),
      data.len(),
      self.width,
      self.height,
      self.stride
    );
    let frame = Frame::new(self.width, self.height, self.stride, ColorLayout::Nv12, data)?;

    let base = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| "frame".to_string());

    Ok(InputFrame {
      name: format!("{}.jpg", base),
      frame,
    })
  }
}

impl Iterator for Nv12FileInput {
  type Item = Result<InputFrame, Nv12FileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.path.take()?;
    Some(self.read(path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_single_frame_named_as_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cap.nv12");
    std::fs::write(&path, vec![128u8; 256 * 128 * 3 / 2]).unwrap();

    let url = Url::parse(&format!(
      "nv12://{}?width=256&height=128&stride=256",
      path.display()
    ))
    .unwrap();
    let mut input = Nv12FileInput::from_url(&url).unwrap();

    let frame = input.next().unwrap().unwrap();
    assert_eq!(frame.name, "cap.nv12.jpg");
    assert_eq!(frame.frame.layout(), ColorLayout::Nv12);
    assert_eq!(frame.frame.stride(), 256);
    assert!(input.next().is_none());
  }

  #[test]
  fn truncated_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.nv12");
    std::fs::write(&path, vec![0u8; 100]).unwrap();

    let url = Url::parse(&format!("nv12://{}?width=128&height=128", path.display())).unwrap();
    let result = Nv12FileInput::from_url(&url).unwrap().next().unwrap();
    assert!(matches!(
      result,
      Err(Nv12FileInputError::FrameError(FrameError::SizeMismatch { .. }))
    ));
  }

  #[test]
  fn dimensions_are_required() {
    let url = Url::parse("nv12:///tmp/a.nv12?height=128").unwrap();
    assert!(matches!(
      Nv12FileInput::from_url(&url),
      Err(Nv12FileInputError::MissingParameter("width"))
    ));

    let url = Url::parse("nv12:///tmp/a.nv12?width=abc&height=128").unwrap();
    assert!(matches!(
      Nv12FileInput::from_url(&url),
      Err(Nv12FileInputError::InvalidParameter { name: "width", .. })
    ));
  }

  #[test]
  fn unaligned_geometry_is_rejected_up_front() {
    let url = Url::parse("nv12:///tmp/a.nv12?width=1920&height=1080").unwrap();
    assert!(matches!(
      Nv12FileInput::from_url(&url),
      Err(Nv12FileInputError::Unaligned {
        width: 1920,
        height: 1080,
        stride: 1920,
        ..
      })
    ));

    let url = Url::parse("nv12:///tmp/a.nv12?width=128&height=128&stride=200").unwrap();
    assert!(matches!(
      Nv12FileInput::from_url(&url),
      Err(Nv12FileInputError::Unaligned { stride: 200, .. })
    ));

    let url = Url::parse("nv12:///tmp/a.nv12?width=1920&height=1152").unwrap();
    assert!(Nv12FileInput::from_url(&url).is_ok());
  }
}

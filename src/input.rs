// 该文件是 Tianyan （天眼） 项目的一部分。
// src/input.rs - 图像输入
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

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

mod nv12_file;
mod read_image_file;

pub use self::nv12_file::{Nv12FileInput, Nv12FileInputError};
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 一帧输入图像，`name` 为输出文件名
#[derive(Debug, Clone)]
pub struct InputFrame {
  pub name: String,
  pub frame: Frame,
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("NV12 文件输入错误: {0}")]
  Nv12FileInputError(#[from] Nv12FileInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 取 URL 中经过百分号解码的路径
pub(crate) fn decoded_path(url: &Url) -> PathBuf {
  let path = url.path();
  match urlencoding::decode(path) {
    Ok(decoded) => PathBuf::from(decoded.into_owned()),
    Err(_) => PathBuf::from(path),
  }
}

pub enum InputWrapper {
  ImageFile(ImageFileInput),
  Nv12File(Nv12FileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      Nv12FileInput::SCHEME => Ok(InputWrapper::Nv12File(Nv12FileInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<InputFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageFile(input) => input.next().map(|r| r.map_err(InputError::from)),
      InputWrapper::Nv12File(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn path_is_percent_decoded() {
    let url = Url::parse("image:///data/%E5%9B%BE%E7%89%87/a%20b.jpg").unwrap();
    assert_eq!(decoded_path(&url), PathBuf::from("/data/图片/a b.jpg"));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}

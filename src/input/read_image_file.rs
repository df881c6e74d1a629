// 该文件是 Tianyan （天眼） 项目的一部分。
// src/input/read_image_file.rs - 图像文件与目录输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use super::{InputFrame, decoded_path};
use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{ALIGNMENT, prepare_rgb_frame},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像 {path} 加载错误: {source}")]
  ImageLoadError {
    path: PathBuf,
    source: image::ImageError,
  },
}

/// 单个图像文件或目录下的全部图像，按文件名排序依次读取
///
/// 读取后的图像缩放到按 128 对齐的尺寸。
pub struct ImageFileInput {
  paths: std::vec::IntoIter<PathBuf>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    Self::open(&decoded_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: &Path) -> Result<Self, ImageFileInputError> {
    let paths = if path.is_dir() {
      let mut paths = Vec::new();
      for entry in std::fs::read_dir(path)? {
        let entry = entry?.path();
        // 只取带扩展名的文件，能否解码留到读取时判断
        if entry.is_file() && entry.extension().is_some() {
          paths.push(entry);
        }
      }
      paths.sort();
      info!("目录 {} 下共 {} 个文件", path.display(), paths.len());
      paths
    } else {
      vec![path.to_path_buf()]
    };

    Ok(ImageFileInput {
      paths: paths.into_iter(),
    })
  }

  fn read(path: &Path) -> Result<InputFrame, ImageFileInputError> {
    let image = ImageReader::open(path)?
      .with_guessed_format()?
      .decode()
      .map_err(|source| ImageFileInputError::ImageLoadError {
        path: path.to_path_buf(),
        source,
      })?
      .to_rgb8();
    let frame = prepare_rgb_frame(&image, ALIGNMENT);
    debug!(
      "读取图像 {}: {}x{} -> {}x{}",
      path.display(),
      image.width(),
      image.height(),
      frame.width(),
      frame.height()
    );

    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| "image.png".to_string());

    Ok(InputFrame { name, frame })
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<InputFrame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.paths.next().map(|path| Self::read(&path))
  }
}

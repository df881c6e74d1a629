// 该文件是 Tianyan （天眼） 项目的一部分。
// src/plate.rs - 车牌字符表
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

use std::path::Path;

use tracing::{debug, info};

use crate::engine::PlateDecoder;

/// 车牌字符编码表，第 N 行即编码 N 对应的字符
///
/// 字符表随模型发布，未加载字符表时编码以 `#N` 形式显示。
#[derive(Debug, Clone, Default)]
pub struct PlateCharset {
  glyphs: Box<[String]>,
}

impl PlateCharset {
  pub fn from_file(path: &Path) -> std::io::Result<Self> {
    let text = std::fs::read_to_string(path)?;
    let charset: Self = text.parse().unwrap_or_default();
    info!(
      "加载车牌字符表: {} ({} 个字符)",
      path.display(),
      charset.len()
    );
    Ok(charset)
  }

  pub fn len(&self) -> usize {
    self.glyphs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.glyphs.is_empty()
  }

  pub fn glyph(&self, id: i32) -> Option<&str> {
    usize::try_from(id)
      .ok()
      .and_then(|id| self.glyphs.get(id))
      .map(String::as_str)
  }
}

impl std::str::FromStr for PlateCharset {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let glyphs = s
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect();
    Ok(Self { glyphs })
  }
}

impl PlateDecoder for PlateCharset {
  fn plate_str(&self, plate_ids: &[i32]) -> String {
    plate_ids
      .iter()
      .map(|&id| match self.glyph(id) {
        Some(glyph) => glyph.to_string(),
        None => {
          debug!("车牌字符编码 {} 不在字符表中", id);
          format!("#{}", id)
        }
      })
      .collect()
  }
}

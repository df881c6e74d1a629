// 该文件是 Tianyan （天眼） 项目的一部分。
// src/frame.rs - 像素缓冲区与颜色布局转换
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

use std::borrow::Cow;
use std::fmt;

use image::{ImageBuffer, Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

/// 推理引擎要求的尺寸对齐倍数
pub const ALIGNMENT: u32 = 128;

const PACKED_CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorLayout {
  Rgb,
  Bgr,
  Nv12,
}

impl ColorLayout {
  /// 每像素字节数，NV12 为平面格式，返回 None
  pub fn bytes_per_pixel(self) -> Option<usize> {
    match self {
      ColorLayout::Rgb | ColorLayout::Bgr => Some(PACKED_CHANNELS),
      ColorLayout::Nv12 => None,
    }
  }

  /// 给定宽度下允许的最小行跨度
  pub fn min_stride(self, width: u32) -> usize {
    width as usize * self.bytes_per_pixel().unwrap_or(1)
  }

  /// 给定行跨度与高度下缓冲区的字节数
  pub fn buffer_size(self, stride: usize, height: u32) -> usize {
    match self {
      ColorLayout::Rgb | ColorLayout::Bgr => stride * height as usize,
      ColorLayout::Nv12 => stride * height as usize * 3 / 2,
    }
  }
}

impl fmt::Display for ColorLayout {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ColorLayout::Rgb => "RGB",
      ColorLayout::Bgr => "BGR",
      ColorLayout::Nv12 => "NV12",
    };
    f.write_str(name)
  }
}

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("不支持的颜色布局转换: {from} -> {to}")]
  UnsupportedConversion { from: ColorLayout, to: ColorLayout },
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  SizeMismatch { expected: usize, actual: usize },
  #[error("行跨度过小: {layout} 宽度 {width} 至少需要 {min} 字节, 实际 {stride}")]
  StrideTooSmall {
    layout: ColorLayout,
    width: u32,
    min: usize,
    stride: usize,
  },
  #[error("NV12 图像宽高必须为偶数: {width}x{height}")]
  OddNv12Dimensions { width: u32, height: u32 },
}

/// 将数值向上取整到 `alignment` 的倍数
pub fn align_up(value: u32, alignment: u32) -> u32 {
  value.div_ceil(alignment) * alignment
}

/// 将宽高分别向上取整到 `alignment` 的倍数
pub fn align_dimensions(width: u32, height: u32, alignment: u32) -> (u32, u32) {
  (align_up(width, alignment), align_up(height, alignment))
}

/// 带行跨度与颜色布局标记的像素缓冲区
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  width: u32,
  height: u32,
  stride: usize,
  layout: ColorLayout,
  data: Box<[u8]>,
}

impl Frame {
  pub fn new(
    width: u32,
    height: u32,
    stride: usize,
    layout: ColorLayout,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    let min = layout.min_stride(width);
    if stride < min {
      return Err(FrameError::StrideTooSmall {
        layout,
        width,
        min,
        stride,
      });
    }

    if layout == ColorLayout::Nv12 && (width % 2 != 0 || height % 2 != 0) {
      return Err(FrameError::OddNv12Dimensions { width, height });
    }

    let expected = layout.buffer_size(stride, height);
    if data.len() != expected {
      return Err(FrameError::SizeMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      stride,
      layout,
      data: data.into_boxed_slice(),
    })
  }

  /// 无行填充的紧凑 RGB/BGR 缓冲区
  pub fn packed(
    width: u32,
    height: u32,
    layout: ColorLayout,
    data: Vec<u8>,
  ) -> Result<Self, FrameError> {
    Self::new(width, height, layout.min_stride(width), layout, data)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn layout(&self) -> ColorLayout {
    self.layout
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  /// 获取 (x, y) 处的三通道像素，仅适用于 RGB/BGR 布局
  pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
    self.layout.bytes_per_pixel()?;
    if x >= self.width || y >= self.height {
      return None;
    }
    let idx = y as usize * self.stride + x as usize * PACKED_CHANNELS;
    Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
  }

  pub fn is_aligned(&self, alignment: u32) -> bool {
    self.width % alignment == 0
      && self.height % alignment == 0
      && self.stride % alignment as usize == 0
  }

  /// 交给推理引擎前的对齐检查，违反即为调用方的编程错误
  pub fn assert_aligned(&self, alignment: u32) {
    assert!(
      self.is_aligned(alignment),
      "图像尺寸未按 {} 对齐: {}x{} 行跨度 {} ({})",
      alignment,
      self.width,
      self.height,
      self.stride,
      self.layout
    );
  }

  /// 转换到目标颜色布局，总是返回新的缓冲区
  pub fn convert(&self, target: ColorLayout) -> Result<Frame, FrameError> {
    debug!("颜色布局转换: {} -> {}", self.layout, target);
    match (self.layout, target) {
      (from, to) if from == to => Ok(self.clone()),
      (ColorLayout::Rgb, ColorLayout::Bgr) | (ColorLayout::Bgr, ColorLayout::Rgb) => {
        Ok(self.swap_channels(target))
      }
      (ColorLayout::Nv12, ColorLayout::Rgb) | (ColorLayout::Nv12, ColorLayout::Bgr) => {
        Ok(self.nv12_to_packed(target))
      }
      (from, to) => Err(FrameError::UnsupportedConversion { from, to }),
    }
  }

  // 行尾的填充字节原样保留
  fn swap_channels(&self, target: ColorLayout) -> Frame {
    let mut data = self.data.to_vec();
    let row_bytes = self.width as usize * PACKED_CHANNELS;

    if row_bytes > 0 {
      for row in data.chunks_exact_mut(self.stride) {
        for pixel in row[..row_bytes].chunks_exact_mut(PACKED_CHANNELS) {
          pixel.swap(0, 2);
        }
      }
    }

    Frame {
      width: self.width,
      height: self.height,
      stride: self.stride,
      layout: target,
      data: data.into_boxed_slice(),
    }
  }

  fn nv12_to_packed(&self, target: ColorLayout) -> Frame {
    let width = self.width as usize;
    let height = self.height as usize;
    let out_stride = width * PACKED_CHANNELS;
    let mut data = vec![0u8; out_stride * height];

    let (luma, chroma) = self.data.split_at(self.stride * height);

    for y in 0..height {
      let y_row = &luma[y * self.stride..y * self.stride + width];
      let uv_row = &chroma[(y / 2) * self.stride..(y / 2) * self.stride + width];
      let out_row = &mut data[y * out_stride..(y + 1) * out_stride];

      for x in 0..width {
        let luma = y_row[x] as f32;
        let u = uv_row[x & !1] as f32 - 128.0;
        let v = uv_row[(x & !1) + 1] as f32 - 128.0;

        let r = to_u8(luma + 1.402 * v);
        let g = to_u8(luma - 0.344 * u - 0.714 * v);
        let b = to_u8(luma + 1.772 * u);

        let pixel = &mut out_row[x * PACKED_CHANNELS..(x + 1) * PACKED_CHANNELS];
        match target {
          ColorLayout::Bgr => pixel.copy_from_slice(&[b, g, r]),
          _ => pixel.copy_from_slice(&[r, g, b]),
        }
      }
    }

    Frame {
      width: self.width,
      height: self.height,
      stride: out_stride,
      layout: target,
      data: data.into_boxed_slice(),
    }
  }
}

fn to_u8(value: f32) -> u8 {
  value.round().clamp(0.0, 255.0) as u8
}

impl AsMut<[u8]> for Frame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

pub trait FromRgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self;
}

impl ToRgbImage for Frame {
  fn to_rgb_image(&self) -> RgbImage {
    let packed = match self.layout {
      ColorLayout::Rgb => Cow::Borrowed(self),
      ColorLayout::Bgr => Cow::Owned(self.swap_channels(ColorLayout::Rgb)),
      ColorLayout::Nv12 => Cow::Owned(self.nv12_to_packed(ColorLayout::Rgb)),
    };

    let stride = packed.stride;
    let data = &packed.data;
    ImageBuffer::from_fn(self.width, self.height, |x, y| {
      let idx = y as usize * stride + x as usize * PACKED_CHANNELS;
      Rgb([data[idx], data[idx + 1], data[idx + 2]])
    })
  }
}

impl FromRgbImage for Frame {
  fn from_rgb_image(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Frame {
      width,
      height,
      stride: width as usize * PACKED_CHANNELS,
      layout: ColorLayout::Rgb,
      data: image.as_raw().clone().into_boxed_slice(),
    }
  }
}

impl FromRgbImage for RgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self {
    image.clone()
  }
}

/// 将解码后的图像缩放到对齐尺寸，并包装为 RGB 缓冲区
pub fn prepare_rgb_frame(image: &RgbImage, alignment: u32) -> Frame {
  let (width, height) = image.dimensions();
  let (aligned_w, aligned_h) = align_dimensions(width, height, alignment);

  if (aligned_w, aligned_h) == (width, height) {
    return Frame::from_rgb_image(image);
  }

  debug!(
    "缩放图像: {}x{} -> {}x{}",
    width, height, aligned_w, aligned_h
  );
  let resized = image::imageops::resize(image, aligned_w, aligned_h, FilterType::Triangle);
  Frame::from_rgb_image(&resized)
}

// 该文件是 Tianyan （天眼） 项目的一部分。
// src/bin/simple_face_compare.rs - 两张图像的人脸比对
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use tianyan::{
  FromUrl,
  engine::ReplayEngine,
  input::{InputFrame, InputWrapper},
  output::OutputWrapper,
  task::{FaceCompareTask, Task},
};
use tracing::info;

/// Tianyan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 人脸识别引擎，例如 replay:///data/faces?kind=face
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 第一张图像
  #[arg(long, value_name = "SOURCE")]
  pub image_a: Url,
  /// 第二张图像
  #[arg(long, value_name = "SOURCE")]
  pub image_b: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "folder:plate_result")]
  pub output: Url,
}

fn first_frame(url: &Url) -> Result<InputFrame> {
  InputWrapper::from_url(url)?
    .next()
    .with_context(|| format!("没有输入帧: {}", url))?
    .map_err(anyhow::Error::from)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {} / {}", args.image_a, args.image_b);
  info!("输出路径: {}", args.output);

  let frames = (first_frame(&args.image_a)?, first_frame(&args.image_b)?);
  let engine = ReplayEngine::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let score = FaceCompareTask.run_task(frames, &engine, output)?;
  println!("score: {}", score);

  Ok(())
}

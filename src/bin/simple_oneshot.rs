// 该文件是 Tianyan （天眼） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像、图像目录或 NV12 文件的推理与标注
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use tianyan::{
  FromUrl,
  engine::{Engine, ReplayEngine},
  input::InputWrapper,
  output::OutputWrapper,
  plate::PlateCharset,
  task::{DetectTask, Pipeline, Task},
};
use tracing::info;

/// Tianyan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理引擎，例如 replay:///data/records?kind=person
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，image:///path 或 nv12:///path?width=W&height=H&stride=S
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "folder:plate_result")]
  pub output: Url,
  /// 车牌字符表，每行一个字符
  #[arg(long, value_name = "FILE")]
  pub plate_charset: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let charset = match &args.plate_charset {
    Some(path) => PlateCharset::from_file(path)?,
    None => PlateCharset::default(),
  };

  let input = InputWrapper::from_url(&args.input)?;
  let engine = ReplayEngine::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;
  info!("模型类型: {}", engine.kind());

  DetectTask::new(Pipeline::new(&charset)).run_task(input, &engine, output)?;

  Ok(())
}

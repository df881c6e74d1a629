// 该文件是 Tianyan （天眼） 项目的一部分。
// src/bin/simple_stresstest.rs - 循环推理压力测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use url::Url;

use tianyan::{
  FromUrl,
  engine::ReplayEngine,
  input::{InputFrame, InputWrapper},
  output::NullOutput,
  plate::PlateCharset,
  task::{Pipeline, StressTask, Task},
};
use tracing::{error, info};

/// Tianyan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理引擎
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);

  let frames: Vec<InputFrame> = InputWrapper::from_url(&args.input)?
    .filter_map(|frame| frame.map_err(|e| error!("读取输入失败: {}", e)).ok())
    .collect();
  let engine = ReplayEngine::from_url(&args.model)?;

  let charset = PlateCharset::default();
  StressTask::new(Pipeline::new(&charset))
    .with_frame_number(args.frame_number)
    .with_ctrlc()?
    .run_task(&frames[..], &engine, NullOutput)?;

  Ok(())
}

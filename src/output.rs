// 该文件是 Tianyan （天眼） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decode::Decoded, input::InputFrame};

pub trait Render<Frame, Output: ?Sized>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

pub mod draw;

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 只输出日志、不落盘
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl FromUrlWithScheme for NullOutput {
  const SCHEME: &'static str = "null";
}

impl FromUrl for NullOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(NullOutput)
  }
}

impl Render<InputFrame, [Decoded]> for NullOutput {
  type Error = OutputError;

  fn render_result(&self, _frame: &InputFrame, _result: &[Decoded]) -> Result<(), Self::Error> {
    Ok(())
  }
}

pub enum OutputWrapper {
  DirectoryRecordOutput(DirectoryRecordOutput),
  NullOutput(NullOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      NullOutput::SCHEME => Ok(OutputWrapper::NullOutput(NullOutput)),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<InputFrame, [Decoded]> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &InputFrame, result: &[Decoded]) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::NullOutput(output) => output.render_result(frame, result),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn selects_output_by_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}/out", dir.path().display())).unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::DirectoryRecordOutput(_))
    ));
    assert!(matches!(
      OutputWrapper::from_url(&Url::parse("null:").unwrap()),
      Ok(OutputWrapper::NullOutput(_))
    ));
    assert!(matches!(
      OutputWrapper::from_url(&Url::parse("rtsp://host/live").unwrap()),
      Err(OutputError::SchemeMismatch(_))
    ));
  }
}

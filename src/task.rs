// 该文件是 Tianyan （天眼） 项目的一部分。
// src/task.rs - 任务驱动
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};
use std::{thread, time::Duration};

use tracing::{error, info, warn};

use crate::{
  decode::{Decoded, Dispatcher, attach_body_attributes, merge_attributes},
  engine::{Engine, EngineError, EngineImage, PlateDecoder, SELECT_LARGEST_FACE},
  feature::compare,
  input::{InputError, InputFrame},
  output::Render,
  plate::PlateCharset,
};

pub trait Task<I, E, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, engine: &E, output: O) -> Result<Self::Output, Self::Error>;
}

/// 单帧处理流程：推理、按需提取人体属性、解码
pub struct Pipeline<'d, D: PlateDecoder + ?Sized> {
  dispatcher: Dispatcher<'d, D>,
  body_attributes: bool,
}

impl<'d, D: PlateDecoder + ?Sized> Pipeline<'d, D> {
  pub fn new(plates: &'d D) -> Self {
    Self {
      dispatcher: Dispatcher::new(plates),
      body_attributes: false,
    }
  }

  pub fn with_body_attributes(mut self, enabled: bool) -> Self {
    self.body_attributes = enabled;
    self
  }

  pub fn process<E: Engine>(&self, engine: &E, frame: &InputFrame) -> Result<Vec<Decoded>, EngineError> {
    engine.select_input(&frame.name);
    let image = EngineImage::acquire(engine, &frame.frame)?;
    let batch = image.inference()?;
    let mut decoded = self.dispatcher.decode_batch(&batch);

    if self.body_attributes {
      let attributes = attach_body_attributes(engine, image.image(), &batch);
      merge_attributes(&mut decoded, self.dispatcher.decode_attributes(&attributes));
    }

    Ok(decoded)
  }
}

/// 逐帧处理全部输入
///
/// 单帧的读取或推理失败只记录错误并跳过该帧，输出失败则终止任务。
pub struct DetectTask<'d, D: PlateDecoder + ?Sized> {
  pipeline: Pipeline<'d, D>,
}

impl<'d, D: PlateDecoder + ?Sized> DetectTask<'d, D> {
  pub fn new(pipeline: Pipeline<'d, D>) -> Self {
    Self { pipeline }
  }
}

/// 任务处理的帧数统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  pub processed: usize,
  pub failed: usize,
}

impl<
  'd,
  D: PlateDecoder + ?Sized,
  E: Engine,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<InputFrame, InputError>>,
  O: Render<InputFrame, [Decoded], Error = RE>,
> Task<I, E, O> for DetectTask<'d, D>
{
  type Output = TaskSummary;
  type Error = anyhow::Error;

  fn run_task(self, input: I, engine: &E, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务, 模型类型: {}", engine.kind());
    let mut summary = TaskSummary::default();

    for frame in input {
      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          error!("读取输入失败: {}", e);
          summary.failed += 1;
          continue;
        }
      };

      let now = std::time::Instant::now();
      let decoded = match self.pipeline.process(engine, &frame) {
        Ok(decoded) => decoded,
        Err(e) => {
          error!("{} 推理失败: {}", frame.name, e);
          summary.failed += 1;
          continue;
        }
      };
      let elapsed = now.elapsed();
      output.render_result(&frame, decoded.as_slice())?;
      info!(
        "{} 完成, {} 个目标, 推理耗时: {:.2?}",
        frame.name,
        decoded.len(),
        elapsed
      );
      summary.processed += 1;
    }

    info!(
      "任务完成, 成功 {} 帧, 失败 {} 帧",
      summary.processed, summary.failed
    );
    Ok(summary)
  }
}

/// 循环处理同一组输入直到收到中断信号或达到指定帧数
pub struct StressTask<'d, D: PlateDecoder + ?Sized> {
  pipeline: Pipeline<'d, D>,
  frame_number: Option<usize>,
  stop: Arc<AtomicBool>,
}

impl<'d, D: PlateDecoder + ?Sized> StressTask<'d, D> {
  pub fn new(pipeline: Pipeline<'d, D>) -> Self {
    Self {
      pipeline,
      frame_number: None,
      stop: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 中断标志，置位后在当前帧结束时退出
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  /// 注册 Ctrl-C 处理，一个进程只能注册一次
  pub fn with_ctrlc(self) -> Result<Self, ctrlc::Error> {
    let stop = self.stop.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(self)
  }
}

impl<
  'd,
  D: PlateDecoder + ?Sized,
  E: Engine,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<InputFrame, [Decoded], Error = RE>,
> Task<&[InputFrame], E, O> for StressTask<'d, D>
{
  type Output = TaskSummary;
  type Error = anyhow::Error;

  fn run_task(self, input: &[InputFrame], engine: &E, output: O) -> Result<Self::Output, Self::Error> {
    if input.is_empty() {
      return Err(anyhow::anyhow!("没有输入帧"));
    }
    info!("开始压力测试, {} 帧循环处理", input.len());

    let mut summary = TaskSummary::default();
    let mut durations = Duration::ZERO;
    for (index, frame) in input.iter().cycle().enumerate() {
      if self.stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if self.frame_number.is_some_and(|n| index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", index);
        break;
      }

      info!("({}) image path: {}", index, frame.name);
      let now = std::time::Instant::now();
      match self.pipeline.process(engine, frame) {
        Ok(decoded) => {
          durations += now.elapsed();
          output.render_result(frame, decoded.as_slice())?;
          summary.processed += 1;
        }
        Err(e) => {
          error!("{} 推理失败: {}", frame.name, e);
          summary.failed += 1;
        }
      }
    }

    if summary.processed > 0 {
      warn!(
        "平均处理时间: {:.2?}",
        durations / summary.processed as u32
      );
    }
    Ok(summary)
  }
}

/// 提取两张图像中最大人脸的特征并比对
#[derive(Debug, Default)]
pub struct FaceCompareTask;

impl<
  E: Engine,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<InputFrame, [Decoded], Error = RE>,
> Task<(InputFrame, InputFrame), E, O> for FaceCompareTask
{
  type Output = f32;
  type Error = anyhow::Error;

  fn run_task(
    self,
    (a, b): (InputFrame, InputFrame),
    engine: &E,
    output: O,
  ) -> Result<Self::Output, Self::Error> {
    // 人脸特征不涉及车牌，空字符表即可
    let plates = PlateCharset::default();
    let dispatcher = Dispatcher::new(&plates);

    let mut features = Vec::with_capacity(2);
    for frame in [&a, &b] {
      engine.select_input(&frame.name);
      let image = EngineImage::acquire(engine, &frame.frame)?;
      let (batch, feature) = image.face_feature(SELECT_LARGEST_FACE)?;
      drop(image);

      let decoded = dispatcher.decode_batch(&batch);
      output.render_result(frame, decoded.as_slice())?;
      features.push(feature);
    }

    let score = compare(&features[0], &features[1]);
    info!("score: {}", score);
    Ok(score)
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use super::*;
  use crate::engine::testing::CountingEngine;
  use crate::frame::{ColorLayout, Frame};
  use crate::input::ImageFileInputError;
  use crate::model::{BoundingBox, Detection, DetectionRecord, ModelKind, ResultBatch};

  #[derive(Default)]
  struct Collect(RefCell<Vec<(String, usize)>>);

  impl Render<InputFrame, [Decoded]> for &Collect {
    type Error = std::io::Error;

    fn render_result(&self, frame: &InputFrame, result: &[Decoded]) -> Result<(), Self::Error> {
      self.0.borrow_mut().push((frame.name.clone(), result.len()));
      Ok(())
    }
  }

  fn frame(name: &str, width: u32) -> InputFrame {
    InputFrame {
      name: name.to_string(),
      frame: Frame::packed(width, 128, ColorLayout::Rgb, vec![0; width as usize * 128 * 3])
        .unwrap(),
    }
  }

  fn people() -> ResultBatch {
    let record = |track_id, status| DetectionRecord {
      bbox: BoundingBox {
        x: 1.0,
        y: 1.0,
        w: 10.0,
        h: 10.0,
      },
      score: 0.9,
      track_id: Some(track_id),
      detail: Detection::Person { status },
    };
    ResultBatch::new(ModelKind::Person, vec![record(2, 1), record(3, 3)]).unwrap()
  }

  #[test]
  fn detect_task_skips_bad_frames() {
    let engine = CountingEngine::new(Ok(people()));
    let charset = PlateCharset::default();
    let collect = Collect::default();

    let input = vec![
      Ok(frame("a.png", 128)),
      Err(InputError::from(ImageFileInputError::SchemeMismatch(
        "x".to_string(),
      ))),
      Ok(frame("b.png", 256)),
    ];
    let summary = DetectTask::new(Pipeline::new(&charset))
      .run_task(input.into_iter(), &engine, &collect)
      .unwrap();

    assert_eq!(
      summary,
      TaskSummary {
        processed: 2,
        failed: 1
      }
    );
    assert_eq!(
      *collect.0.borrow(),
      vec![("a.png".to_string(), 1), ("b.png".to_string(), 1)]
    );
    assert_eq!(engine.created.get(), engine.released.get());
  }

  #[test]
  fn engine_failure_does_not_stop_task() {
    let engine = CountingEngine::new(Err(-1));
    let charset = PlateCharset::default();
    let collect = Collect::default();

    let summary = DetectTask::new(Pipeline::new(&charset))
      .run_task(vec![Ok(frame("a.png", 128))].into_iter(), &engine, &collect)
      .unwrap();
    assert_eq!(summary.failed, 1);
    assert!(collect.0.borrow().is_empty());
    assert_eq!(engine.released.get(), 1);
  }

  #[test]
  fn body_attributes_are_merged_into_their_detection() {
    let engine = CountingEngine::new(Ok(people()));
    let charset = PlateCharset::default();
    let pipeline = Pipeline::new(&charset).with_body_attributes(true);

    let decoded = pipeline.process(&engine, &frame("a.png", 128)).unwrap();
    // 被抑制的 track 3 不提取属性，track 2 的属性并入检测结果
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].logs.len(), 2);
  }

  #[test]
  fn stress_task_cycles_until_frame_limit() {
    let engine = CountingEngine::new(Ok(people()));
    let charset = PlateCharset::default();
    let collect = Collect::default();
    let frames = [frame("a.png", 128), frame("b.png", 128)];

    let summary = StressTask::new(Pipeline::new(&charset))
      .with_frame_number(Some(5))
      .run_task(&frames[..], &engine, &collect)
      .unwrap();
    assert_eq!(summary.processed, 5);
    assert_eq!(collect.0.borrow()[4].0, "a.png");
    assert_eq!(engine.created.get(), 5);
    assert_eq!(engine.released.get(), 5);
  }

  #[test]
  fn stress_task_stops_on_flag() {
    let engine = CountingEngine::new(Ok(people()));
    let charset = PlateCharset::default();
    let task = StressTask::new(Pipeline::new(&charset));
    task.stop_flag().store(true, Ordering::SeqCst);

    let summary = task
      .run_task(&[frame("a.png", 128)][..], &engine, &Collect::default())
      .unwrap();
    assert_eq!(summary.processed, 0);
  }

  #[test]
  fn face_compare_scores_identical_features() {
    let engine = CountingEngine::new(Ok(ResultBatch::empty(ModelKind::FaceRecognition)));
    let collect = Collect::default();
    let score = FaceCompareTask
      .run_task((frame("a.png", 128), frame("b.png", 128)), &engine, &collect)
      .unwrap();
    assert!((score - 1.0).abs() < 1e-5);
    assert_eq!(collect.0.borrow().len(), 2);
    assert_eq!(engine.released.get(), 2);
  }
}

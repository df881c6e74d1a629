// 该文件是 Tianyan （天眼） 项目的一部分。
// tests/pipeline.rs - 输入、回放引擎、解码与目录输出的端到端测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{Rgb, RgbImage};
use serde_json::Value;
use url::Url;

use tianyan::{
  FromUrl,
  engine::ReplayEngine,
  input::{InputFrame, InputWrapper},
  output::{NullOutput, OutputWrapper},
  plate::PlateCharset,
  task::{DetectTask, FaceCompareTask, Pipeline, StressTask, Task, TaskSummary},
};

fn write(dir: &Path, name: &str, body: &str) {
  std::fs::write(dir.join(name), body).unwrap();
}

fn json_lines(path: &Path) -> Vec<Value> {
  std::fs::read_to_string(path)
    .unwrap()
    .lines()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect()
}

fn url(scheme: &str, path: &Path, query: &str) -> Url {
  Url::parse(&format!("{}://{}{}", scheme, path.display(), query)).unwrap()
}

fn person_records(dir: &Path) {
  write(
    dir,
    "a.json",
    r#"{"kind": "person", "objects": [
      {"bbox": {"x": 10, "y": 10, "w": 40, "h": 60}, "score": 0.9, "track_id": 7,
       "detail": {"person": {"status": 1}}},
      {"bbox": {"x": 60, "y": 10, "w": 40, "h": 60}, "score": 0.8, "track_id": 8,
       "detail": {"person": {"status": 3}}}
    ], "body_attributes": [
      {"track_id": 7, "gender": 2, "upperColor": 1, "orientation": 99},
      {"track_id": 8, "status": -1}
    ]}"#,
  );
  write(dir, "b.json", r#"{"kind": "person"}"#);
}

fn images(dir: &Path) {
  RgbImage::from_pixel(200, 100, Rgb([90, 90, 90]))
    .save(dir.join("a.png"))
    .unwrap();
  RgbImage::from_pixel(128, 128, Rgb([20, 20, 20]))
    .save(dir.join("b.png"))
    .unwrap();
}

#[test]
fn image_directory_through_replay_engine() {
  let root = tempfile::tempdir().unwrap();
  let (records, inputs, outputs) = (
    root.path().join("records"),
    root.path().join("images"),
    root.path().join("out"),
  );
  std::fs::create_dir_all(&records).unwrap();
  std::fs::create_dir_all(&inputs).unwrap();
  person_records(&records);
  images(&inputs);

  let engine = ReplayEngine::from_url(&url("replay", &records, "?kind=person")).unwrap();
  let input = InputWrapper::from_url(&url("image", &inputs, "")).unwrap();
  let output = OutputWrapper::from_url(&url("folder", &outputs, "?record")).unwrap();

  let charset = PlateCharset::default();
  let summary = DetectTask::new(Pipeline::new(&charset))
    .run_task(input, &engine, output)
    .unwrap();
  assert_eq!(
    summary,
    TaskSummary {
      processed: 2,
      failed: 0
    }
  );
  assert_eq!(engine.live_images(), 0);

  // 输出按 128 对齐缩放后的图像，只绘制未被抑制的行人
  let annotated = image::open(outputs.join("a.png")).unwrap().to_rgb8();
  assert_eq!(annotated.dimensions(), (256, 128));
  assert_eq!(annotated.get_pixel(10, 40).0, [255, 0, 0]);
  assert_ne!(annotated.get_pixel(60, 40).0, [255, 0, 0]);

  let lines = json_lines(&outputs.join("a.jsonl"));
  assert_eq!(lines.len(), 1);
  assert_eq!(lines[0]["kind"], "person");
  assert_eq!(lines[0]["status"], 1);
  assert_eq!(lines[0]["track_id"], 7);

  assert!(outputs.join("b.png").exists());
  assert!(json_lines(&outputs.join("b.jsonl")).is_empty());
}

#[test]
fn undecodable_input_does_not_shift_records() {
  let root = tempfile::tempdir().unwrap();
  let (records, inputs, outputs) = (
    root.path().join("records"),
    root.path().join("images"),
    root.path().join("out"),
  );
  std::fs::create_dir_all(&records).unwrap();
  std::fs::create_dir_all(&inputs).unwrap();
  write(
    &records,
    "a.json",
    r#"{"kind": "person", "objects": [
      {"bbox": {"x": 10, "y": 10, "w": 40, "h": 60}, "score": 0.9, "track_id": 5,
       "detail": {"person": {"status": 1}}}]}"#,
  );
  write(&records, "b.json", r#"{"kind": "person"}"#);
  write(&inputs, "a.txt", "not an image");
  RgbImage::from_pixel(128, 128, Rgb([20, 20, 20]))
    .save(inputs.join("b.png"))
    .unwrap();

  let engine = ReplayEngine::from_url(&url("replay", &records, "")).unwrap();
  let input = InputWrapper::from_url(&url("image", &inputs, "")).unwrap();
  let output = OutputWrapper::from_url(&url("folder", &outputs, "?record")).unwrap();

  let charset = PlateCharset::default();
  let summary = DetectTask::new(Pipeline::new(&charset))
    .run_task(input, &engine, output)
    .unwrap();
  assert_eq!(
    summary,
    TaskSummary {
      processed: 1,
      failed: 1
    }
  );
  assert!(json_lines(&outputs.join("b.jsonl")).is_empty());
}

#[test]
fn body_attributes_join_their_detection() {
  let root = tempfile::tempdir().unwrap();
  let (records, inputs, outputs) = (
    root.path().join("records"),
    root.path().join("images"),
    root.path().join("out"),
  );
  std::fs::create_dir_all(&records).unwrap();
  std::fs::create_dir_all(&inputs).unwrap();
  person_records(&records);
  images(&inputs);

  let engine = ReplayEngine::from_url(&url("replay", &records, "")).unwrap();
  let input = InputWrapper::from_url(&url("image", &inputs.join("a.png"), "")).unwrap();
  let output = OutputWrapper::from_url(&url("folder", &outputs, "?record")).unwrap();

  let charset = PlateCharset::default();
  DetectTask::new(Pipeline::new(&charset).with_body_attributes(true))
    .run_task(input, &engine, output)
    .unwrap();

  let lines = json_lines(&outputs.join("a.jsonl"));
  // track 8 的属性提取失败被丢弃
  assert_eq!(lines.len(), 2);
  assert_eq!(lines[1]["kind"], "body-attribute");
  assert_eq!(lines[1]["track_id"], 7);
  assert_eq!(lines[1]["attributes"]["gender"], "Female");
  assert_eq!(lines[1]["attributes"]["upperColor"], "Red");
  assert_eq!(lines[1]["attributes"]["orientation"], "<invalid:99>");
  assert_eq!(engine.live_images(), 0);
}

#[test]
fn nv12_file_is_written_as_jpeg() {
  let root = tempfile::tempdir().unwrap();
  let (records, outputs) = (root.path().join("records"), root.path().join("out"));
  std::fs::create_dir_all(&records).unwrap();
  write(
    &records,
    "frame.nv12.json",
    r#"{"kind": "license-plate", "objects": [
      {"bbox": {"x": 20, "y": 20, "w": 60, "h": 20}, "score": 0.9,
       "detail": {"plate": {"plate_ids": [0, 1, 2], "vehicle_type": 1}}}]}"#,
  );

  let raw = root.path().join("frame.nv12");
  let mut data = vec![235u8; 128 * 128];
  data.extend(vec![128u8; 128 * 64]);
  std::fs::write(&raw, data).unwrap();

  let engine = ReplayEngine::from_url(&url("replay", &records, "")).unwrap();
  let input = InputWrapper::from_url(&url("nv12", &raw, "?width=128&height=128&stride=128"))
    .unwrap();
  let output = OutputWrapper::from_url(&url("folder", &outputs, "?record")).unwrap();

  let charset: PlateCharset = "京\nA\n8\n".parse().unwrap();
  DetectTask::new(Pipeline::new(&charset))
    .run_task(input, &engine, output)
    .unwrap();

  let saved = image::open(outputs.join("frame.nv12.jpg")).unwrap().to_rgb8();
  assert_eq!(saved.dimensions(), (128, 128));
  let [r, g, b] = saved.get_pixel(100, 100).0;
  assert!(r > 200 && g > 200 && b > 200);

  let lines = json_lines(&outputs.join("frame.nv12.jsonl"));
  assert_eq!(lines[0]["license"], "京A8");
  assert_eq!(lines[0]["vehicle_type"], 1);
}

#[test]
fn face_comparison_and_stress_loop() {
  let root = tempfile::tempdir().unwrap();
  let records = root.path().join("records");
  std::fs::create_dir_all(&records).unwrap();
  let feature: Vec<String> = (0..512).map(|i| format!("{}", (i % 5) as f32 - 2.0)).collect();
  let body = format!(
    r#"{{"kind": "face-recognition", "feature": [{}], "objects": [
      {{"bbox": {{"x": 4, "y": 4, "w": 40, "h": 40}}, "score": 0.9, "track_id": 1,
        "detail": {{"face": {{"landmarks": [
          {{"x": 10, "y": 10}}, {{"x": 30, "y": 10}}, {{"x": 20, "y": 20}},
          {{"x": 12, "y": 30}}, {{"x": 28, "y": 30}}], "quality": 0.7}}}}}}]}}"#,
    feature.join(",")
  );
  write(&records, "a.json", &body);
  write(&records, "b.json", &body);

  let engine = ReplayEngine::from_url(&url("replay", &records, "?kind=face")).unwrap();
  let frame = |name: &str| InputFrame {
    name: name.to_string(),
    frame: tianyan::frame::prepare_rgb_frame(
      &RgbImage::from_pixel(64, 64, Rgb([0, 0, 0])),
      tianyan::frame::ALIGNMENT,
    ),
  };

  let score = FaceCompareTask
    .run_task((frame("a.png"), frame("b.png")), &engine, NullOutput)
    .unwrap();
  assert!((score - 1.0).abs() < 1e-5);

  let charset = PlateCharset::default();
  let frames = [frame("a.png")];
  let summary = StressTask::new(Pipeline::new(&charset))
    .with_frame_number(Some(3))
    .run_task(&frames[..], &engine, NullOutput)
    .unwrap();
  assert_eq!(summary.processed, 3);
  assert_eq!(engine.live_images(), 0);
}

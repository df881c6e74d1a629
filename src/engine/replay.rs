// 该文件是 Tianyan （天眼） 项目的一部分。
// src/engine/replay.rs - 回放离线记录的推理结果
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  attribute::BodyAttributes,
  engine::{Engine, EngineError},
  feature::FeatureVector,
  frame::ColorLayout,
  model::{BoundingBox, DetectionRecord, ModelError, ModelKind, ResultBatch},
};

/// 单帧的推理记录，每个文件一帧
#[derive(Debug, Deserialize)]
struct ReplayRecord {
  kind: ModelKind,
  #[serde(default)]
  objects: Vec<DetectionRecord>,
  #[serde(default)]
  feature: Option<FeatureVector>,
  #[serde(default)]
  body_attributes: Vec<TrackedAttributes>,
}

#[derive(Debug, Deserialize)]
struct TrackedAttributes {
  track_id: i32,
  /// 非零表示引擎对该目标提取失败
  #[serde(default)]
  status: i32,
  #[serde(flatten)]
  attributes: BodyAttributes,
}

pub struct ReplayImage {
  width: u32,
  height: u32,
  layout: ColorLayout,
  data: Vec<u8>,
}

impl ReplayImage {
  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn layout(&self) -> ColorLayout {
    self.layout
  }
}

/// 回放目录中的 `*.json` 推理记录
///
/// URL 形如 `replay:///path/to/records?kind=person`，`kind` 省略时取第一条记录的类型。
/// 经 [`Engine::select_input`] 指定输入名称后回放同名的 `<stem>.json`；
/// 未指定时按文件名顺序回放，记录用尽后从头循环。
pub struct ReplayEngine {
  directory: PathBuf,
  kind: ModelKind,
  batches: Vec<(String, ResultBatch)>,
  features: Vec<Option<FeatureVector>>,
  attributes: Vec<Vec<TrackedAttributes>>,
  cursor: Mutex<usize>,
  selected: Mutex<Option<String>>,
  current: Mutex<Option<usize>>,
  live_images: AtomicUsize,
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngine {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let kind = url
      .query_pairs()
      .find(|(k, _)| k == "kind")
      .map(|(_, v)| v.parse::<ModelKind>())
      .transpose()?;

    let path = urlencoding::decode(url.path())
      .map_err(|e| EngineError::MissingRecord(format!("路径解码失败: {}", e)))?;
    Self::open(Path::new(&*path), kind)
  }
}

impl ReplayEngine {
  pub fn open(directory: &Path, kind: Option<ModelKind>) -> Result<Self, EngineError> {
    info!("加载推理记录目录: {}", directory.display());

    let mut files: Vec<PathBuf> = std::fs::read_dir(directory)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
      .collect();
    files.sort();

    let mut records = Vec::with_capacity(files.len());
    for path in files {
      let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
      let text = std::fs::read_to_string(&path)?;
      let record: ReplayRecord = serde_json::from_str(&text)?;
      debug!("记录 {}: {} 个目标", name, record.objects.len());
      records.push((name, record));
    }

    Self::from_records(directory, kind, records)
  }

  fn from_records(
    directory: &Path,
    kind: Option<ModelKind>,
    records: Vec<(String, ReplayRecord)>,
  ) -> Result<Self, EngineError> {
    let kind = match kind.or_else(|| records.first().map(|(_, r)| r.kind)) {
      Some(kind) => kind,
      None => {
        return Err(EngineError::MissingRecord(
          directory.display().to_string(),
        ));
      }
    };

    let mut batches = Vec::with_capacity(records.len());
    let mut features = Vec::with_capacity(records.len());
    let mut attributes = Vec::with_capacity(records.len());

    for (index, (name, record)) in records.into_iter().enumerate() {
      if record.kind != kind {
        return Err(EngineError::InvalidResult(ModelError::KindMismatch {
          index,
          expected: kind,
          actual: record.kind,
        }));
      }

      let objects = record
        .objects
        .into_iter()
        .map(|mut object| {
          object.track_id = object
            .track_id
            .and_then(DetectionRecord::track_id_from_raw);
          object
        })
        .collect();

      batches.push((name, ResultBatch::new(kind, objects)?));
      features.push(record.feature);
      attributes.push(record.body_attributes);
    }

    info!("回放引擎就绪: 类型 {}, 共 {} 帧记录", kind, batches.len());

    Ok(Self {
      directory: directory.to_path_buf(),
      kind,
      batches,
      features,
      attributes,
      cursor: Mutex::new(0),
      selected: Mutex::new(None),
      current: Mutex::new(None),
      live_images: AtomicUsize::new(0),
    })
  }

  /// 尚未释放的原生图像数量
  pub fn live_images(&self) -> usize {
    self.live_images.load(Ordering::SeqCst)
  }

  fn next_index(&self, call: &'static str) -> Result<usize, EngineError> {
    if self.batches.is_empty() {
      return Err(EngineError::MissingRecord(
        self.directory.display().to_string(),
      ));
    }

    let mut cursor = self
      .cursor
      .lock()
      .map_err(|_| EngineError::Status { call, code: -1 })?;
    let index = *cursor % self.batches.len();
    *cursor = index + 1;
    Ok(index)
  }

  fn named_index(&self, stem: &str) -> Result<usize, EngineError> {
    self
      .batches
      .iter()
      .position(|(name, _)| name == stem)
      .ok_or_else(|| {
        EngineError::MissingRecord(format!("{}/{}.json", self.directory.display(), stem))
      })
  }

  fn serve(&self, call: &'static str) -> Result<usize, EngineError> {
    let selected = self.selected.lock().ok().and_then(|mut s| s.take());
    let index = match selected {
      Some(stem) => self.named_index(&stem)?,
      None => self.next_index(call)?,
    };

    if let Ok(mut current) = self.current.lock() {
      *current = Some(index);
    }
    debug!("{}: 回放记录 {}", call, self.batches[index].0);
    Ok(index)
  }
}

impl Engine for ReplayEngine {
  type Image = ReplayImage;

  fn kind(&self) -> ModelKind {
    self.kind
  }

  fn select_input(&self, name: &str) {
    let stem = Path::new(name)
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| name.to_string());
    if let Ok(mut selected) = self.selected.lock() {
      *selected = Some(stem);
    }
  }

  fn create_image(
    &self,
    width: u32,
    height: u32,
    stride: usize,
    layout: ColorLayout,
  ) -> Result<Self::Image, EngineError> {
    self.live_images.fetch_add(1, Ordering::SeqCst);
    Ok(ReplayImage {
      width,
      height,
      layout,
      data: vec![0; layout.buffer_size(stride, height)],
    })
  }

  fn image_data_mut<'i>(&self, image: &'i mut Self::Image) -> &'i mut [u8] {
    &mut image.data
  }

  fn release_image(&self, image: &mut Self::Image) {
    image.data = Vec::new();
    self.live_images.fetch_sub(1, Ordering::SeqCst);
  }

  fn inference(&self, _image: &Self::Image) -> Result<ResultBatch, EngineError> {
    let index = self.serve("inference")?;
    Ok(self.batches[index].1.clone())
  }

  fn face_feature(
    &self,
    _image: &Self::Image,
    selector: i32,
  ) -> Result<(ResultBatch, FeatureVector), EngineError> {
    let index = self.serve("face_feature")?;
    debug!("人脸选择子: {}", selector);
    let feature = self.features[index]
      .clone()
      .ok_or(EngineError::Status {
        call: "face_feature",
        code: -1,
      })?;
    Ok((self.batches[index].1.clone(), feature))
  }

  fn body_attribute(
    &self,
    _image: &Self::Image,
    _bbox: &BoundingBox,
    track_id: Option<i32>,
  ) -> Result<BodyAttributes, EngineError> {
    let current = self.current.lock().ok().and_then(|c| *c);
    let failed = |code| EngineError::Status {
      call: "body_attribute",
      code,
    };

    let index = current.ok_or_else(|| failed(-1))?;
    let track_id = track_id.ok_or_else(|| failed(-1))?;
    let tracked = self.attributes[index]
      .iter()
      .find(|a| a.track_id == track_id)
      .ok_or_else(|| failed(-1))?;

    if tracked.status != 0 {
      return Err(failed(tracked.status));
    }
    Ok(tracked.attributes)
  }
}

impl Drop for ReplayEngine {
  fn drop(&mut self) {
    let live = self.live_images();
    if live != 0 {
      warn!("回放引擎释放时仍有 {} 个原生图像未释放", live);
    }
    debug!("回放引擎已释放: {}", self.directory.display());
  }
}

// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/grid.rs - 网格式 YOLO 输出解码
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Anchor, BoxDimensions, DetectItem, DetectResult, Decoder},
  select::{PolicyWrapper, SelectionPolicy},
  tensor::{GridGeometry, GridTensor},
  utils::{argmax, sigmoid, softmax},
};

/// 每个锚框的几何与目标性通道数: x, y, w, h, objectness
pub const FEATURES_PER_BOX: usize = 5;

pub const TINY_YOLO_V2_ANCHORS: [Anchor; 5] = [
  Anchor::new(0.573, 0.677),
  Anchor::new(1.87, 2.06),
  Anchor::new(3.34, 5.47),
  Anchor::new(7.88, 3.53),
  Anchor::new(9.77, 9.17),
];

const DEFAULT_INPUT_W: f32 = 416.0;
const DEFAULT_INPUT_H: f32 = 416.0;
const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("输入张量长度不匹配: 期望 {expected}, 实际 {actual}")]
  InvalidInput { expected: usize, actual: usize },
  #[error("解码配置无效: {0}")]
  InvalidConfiguration(String),
  #[error("标签文件读取错误: {0}")]
  LabelLoad(#[from] std::io::Error),
  #[error("配置 URL 错误: {0}")]
  UrlError(String),
}

impl DecodeError {
  fn config(msg: impl Into<String>) -> Self {
    DecodeError::InvalidConfiguration(msg.into())
  }
}

/// 张量的通道布局：网格、锚框、标签与模型输入尺寸共同决定
#[derive(Debug, Clone)]
pub struct GridLayout {
  pub labels: Vec<String>,
  pub geometry: GridGeometry,
  pub anchors: Vec<Anchor>,
  /// 模型输入图像的宽高（像素）
  pub input_size: (f32, f32),
}

impl GridLayout {
  fn validate(&self) -> Result<(), DecodeError> {
    if self.labels.is_empty() {
      return Err(DecodeError::config("标签列表为空"));
    }
    if self.geometry.rows == 0 || self.geometry.cols == 0 {
      return Err(DecodeError::config(format!(
        "网格尺寸必须为正: {}x{}",
        self.geometry.rows, self.geometry.cols
      )));
    }
    if self.anchors.is_empty() {
      return Err(DecodeError::config("锚框列表为空"));
    }
    if let Some(anchor) = self
      .anchors
      .iter()
      .find(|a| !(a.width_scale > 0.0 && a.height_scale > 0.0))
    {
      return Err(DecodeError::config(format!("锚框尺寸必须为正: {:?}", anchor)));
    }
    let (w, h) = self.input_size;
    if !(w > 0.0 && h > 0.0) {
      return Err(DecodeError::config(format!("模型输入尺寸必须为正: {}x{}", w, h)));
    }
    self.checked_len()?;
    Ok(())
  }

  fn checked_len(&self) -> Result<usize, DecodeError> {
    self.expected_len().ok_or_else(|| {
      DecodeError::config(format!(
        "张量长度溢出: 网格 {}x{}, 锚框 {}, 类别 {}",
        self.geometry.rows,
        self.geometry.cols,
        self.anchors.len(),
        self.labels.len()
      ))
    })
  }

  fn channels_per_anchor(&self) -> usize {
    self.labels.len() + FEATURES_PER_BOX
  }

  /// rows * cols * anchors * (labels + 5)，溢出时返回 None
  pub fn expected_len(&self) -> Option<usize> {
    self
      .geometry
      .checked_cells()?
      .checked_mul(self.anchors.len())?
      .checked_mul(self.labels.len().checked_add(FEATURES_PER_BOX)?)
  }

  pub fn cell_size(&self) -> (f32, f32) {
    (
      self.input_size.0 / self.geometry.cols as f32,
      self.input_size.1 / self.geometry.rows as f32,
    )
  }

  // 行索引对应 X 轴、列索引对应 Y 轴，与训练时的通道顺序保持一致
  fn decode_box(&self, tensor: &GridTensor, row: usize, col: usize, anchor: usize) -> BoxDimensions {
    let offset = anchor * self.channels_per_anchor();
    let (cell_w, cell_h) = self.cell_size();
    let prior = self.anchors[anchor];

    let center_x = (row as f32 + sigmoid(tensor.at(row, col, offset))) * cell_w;
    let center_y = (col as f32 + sigmoid(tensor.at(row, col, offset + 1))) * cell_h;
    let width = tensor.at(row, col, offset + 2).exp() * cell_w * prior.width_scale;
    let height = tensor.at(row, col, offset + 3).exp() * cell_h * prior.height_scale;

    BoxDimensions {
      x: center_x - width / 2.0,
      y: center_y - height / 2.0,
      width,
      height,
    }
  }

  fn decode_cell(
    &self,
    tensor: &GridTensor,
    row: usize,
    col: usize,
    threshold: f32,
  ) -> Vec<DetectItem> {
    let mut items = Vec::new();
    for anchor in 0..self.anchors.len() {
      let offset = anchor * self.channels_per_anchor();

      let confidence = sigmoid(tensor.at(row, col, offset + 4));
      // NaN 与阈值比较恒为 false，取反后一并跳过
      if !(confidence >= threshold) {
        continue;
      }

      let logits = tensor.channel_run(row, col, offset + FEATURES_PER_BOX, self.labels.len());
      let scores: Vec<f32> = softmax(&logits)
        .into_iter()
        .map(|p| p * confidence)
        .collect();

      let Some((class_id, score)) = argmax(&scores) else {
        continue;
      };
      if !(score >= threshold) {
        continue;
      }

      items.push(DetectItem {
        class_id,
        label: self.labels[class_id].clone(),
        score,
        bbox: self.decode_box(tensor, row, col, anchor),
      });
    }
    items
  }

  #[cfg(not(feature = "parallel"))]
  fn decode_cells(&self, tensor: &GridTensor, threshold: f32) -> Vec<DetectItem> {
    let mut items = Vec::new();
    for row in 0..self.geometry.rows {
      for col in 0..self.geometry.cols {
        items.extend(self.decode_cell(tensor, row, col, threshold));
      }
    }
    items
  }

  #[cfg(feature = "parallel")]
  fn decode_cells(&self, tensor: &GridTensor, threshold: f32) -> Vec<DetectItem> {
    use rayon::prelude::*;

    let cols = self.geometry.cols;
    // 按索引收集，拼接后与串行遍历顺序一致
    let per_cell: Vec<Vec<DetectItem>> = (0..self.geometry.cells())
      .into_par_iter()
      .map(|idx| self.decode_cell(tensor, idx / cols, idx % cols, threshold))
      .collect();
    per_cell.into_iter().flatten().collect()
  }

  /// 解码全部网格单元与锚框，返回所有超过阈值的候选
  pub fn decode(&self, output: &[f32], threshold: f32) -> Result<Vec<DetectItem>, DecodeError> {
    if !(threshold > 0.0 && threshold <= 1.0) {
      return Err(DecodeError::config(format!(
        "置信度阈值必须在 (0, 1] 内: {}",
        threshold
      )));
    }

    let expected = self.checked_len()?;
    if output.len() != expected {
      error!("输出张量长度错误: 期望 {}, 实际 {}", expected, output.len());
      return Err(DecodeError::InvalidInput {
        expected,
        actual: output.len(),
      });
    }

    let tensor = GridTensor::new(output, self.geometry).ok_or(DecodeError::InvalidInput {
      expected,
      actual: output.len(),
    })?;

    let items = self.decode_cells(&tensor, threshold);
    debug!("阈值 {} 下解码得到 {} 个候选", threshold, items.len());
    Ok(items)
  }
}

/// 网格解码器：布局、阈值与筛选策略
#[derive(Debug, Clone)]
pub struct GridDecoder<P = PolicyWrapper> {
  layout: GridLayout,
  expected_len: usize,
  threshold: f32,
  policy: P,
}

impl<P> GridDecoder<P> {
  pub fn layout(&self) -> &GridLayout {
    &self.layout
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn policy(&self) -> &P {
    &self.policy
  }

  /// 构建时已校验不溢出
  pub fn expected_len(&self) -> usize {
    self.expected_len
  }

  /// 使用构建时的阈值解码，不做筛选
  pub fn decode(&self, output: &[f32]) -> Result<Vec<DetectItem>, DecodeError> {
    self.layout.decode(output, self.threshold)
  }

  pub fn decode_with_threshold(
    &self,
    output: &[f32],
    threshold: f32,
  ) -> Result<Vec<DetectItem>, DecodeError> {
    self.layout.decode(output, threshold)
  }
}

impl<P: SelectionPolicy> Decoder for GridDecoder<P> {
  type Input = [f32];
  type Output = DetectResult;
  type Error = DecodeError;

  fn detect(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let candidates = self.decode(input)?;
    let selected = self.policy.select(candidates);
    if selected.is_empty() {
      debug!("没有超过阈值的检测结果");
    }
    Ok(DetectResult::from(selected))
  }
}

#[derive(Debug, Clone)]
enum LabelSource {
  Inline(Vec<String>),
  File(PathBuf),
}

/// 从文本读取标签，每行一个，行号即类别编号
///
/// 中间的空行保留为空标签，避免后续类别编号整体错位；文件末尾的空行会被丢弃。
pub fn parse_labels(text: &str) -> Vec<String> {
  let mut labels: Vec<String> = text.lines().map(|line| line.trim().to_string()).collect();

  let total = labels.len();
  while labels.last().is_some_and(String::is_empty) {
    labels.pop();
  }
  if labels.len() < total {
    warn!("忽略标签文件末尾的 {} 个空行", total - labels.len());
  }
  for (class_id, label) in labels.iter().enumerate() {
    if label.is_empty() {
      warn!("标签文件第 {} 行为空，类别 {} 的名称为空", class_id + 1, class_id);
    }
  }
  labels
}

#[derive(Debug, Clone)]
pub struct GridDecoderBuilder<P = PolicyWrapper> {
  labels: LabelSource,
  geometry: GridGeometry,
  anchors: Vec<Anchor>,
  input_size: (f32, f32),
  threshold: f32,
  policy: P,
}

impl Default for GridDecoderBuilder {
  fn default() -> Self {
    GridDecoderBuilder {
      labels: LabelSource::Inline(Vec::new()),
      geometry: GridGeometry::default(),
      anchors: TINY_YOLO_V2_ANCHORS.to_vec(),
      input_size: (DEFAULT_INPUT_W, DEFAULT_INPUT_H),
      threshold: DEFAULT_THRESHOLD,
      policy: PolicyWrapper::default(),
    }
  }
}

impl GridDecoderBuilder {
  pub fn new() -> Self {
    Self::default()
  }
}

impl FromUrlWithScheme for GridDecoderBuilder {
  const SCHEME: &'static str = "grid";
}

fn parse_query<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DecodeError> {
  value
    .parse()
    .map_err(|_| DecodeError::UrlError(format!("参数 {} 的值无效: {}", key, value)))
}

fn parse_anchors(value: &str) -> Result<Vec<Anchor>, DecodeError> {
  value
    .split(';')
    .filter(|pair| !pair.trim().is_empty())
    .map(|pair| {
      let (w, h) = pair
        .split_once(',')
        .ok_or_else(|| DecodeError::UrlError(format!("锚框格式应为 w,h: {}", pair)))?;
      Ok(Anchor::new(
        parse_query("anchors", w.trim())?,
        parse_query("anchors", h.trim())?,
      ))
    })
    .collect()
}

impl FromUrl for GridDecoderBuilder {
  type Error = DecodeError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DecodeError::UrlError(format!(
        "解码配置必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = GridDecoderBuilder::default().labels_from_file(url.path());
    for (key, value) in url.query_pairs() {
      match &*key {
        "rows" => builder.geometry.rows = parse_query(&key, &value)?,
        "cols" => builder.geometry.cols = parse_query(&key, &value)?,
        "width" => builder.input_size.0 = parse_query(&key, &value)?,
        "height" => builder.input_size.1 = parse_query(&key, &value)?,
        "threshold" => builder.threshold = parse_query(&key, &value)?,
        "anchors" => builder.anchors = parse_anchors(&value)?,
        "policy" => builder.policy = PolicyWrapper::with(&value),
        other => debug!("忽略未知参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl<P> GridDecoderBuilder<P> {
  pub fn labels<I, S>(mut self, labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.labels = LabelSource::Inline(labels.into_iter().map(Into::into).collect());
    self
  }

  pub fn labels_from_file(mut self, path: impl AsRef<Path>) -> Self {
    self.labels = LabelSource::File(path.as_ref().to_path_buf());
    self
  }

  pub fn geometry(mut self, geometry: GridGeometry) -> Self {
    self.geometry = geometry;
    self
  }

  pub fn anchors(mut self, anchors: impl Into<Vec<Anchor>>) -> Self {
    self.anchors = anchors.into();
    self
  }

  pub fn input_size(mut self, width: f32, height: f32) -> Self {
    self.input_size = (width, height);
    self
  }

  pub fn threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn policy<Q: SelectionPolicy>(self, policy: Q) -> GridDecoderBuilder<Q> {
    GridDecoderBuilder {
      labels: self.labels,
      geometry: self.geometry,
      anchors: self.anchors,
      input_size: self.input_size,
      threshold: self.threshold,
      policy,
    }
  }

  pub fn build(self) -> Result<GridDecoder<P>, DecodeError> {
    let labels = match self.labels {
      LabelSource::Inline(labels) => labels,
      LabelSource::File(path) => {
        info!("加载标签文件: {}", path.display());
        parse_labels(&std::fs::read_to_string(&path)?)
      }
    };

    let layout = GridLayout {
      labels,
      geometry: self.geometry,
      anchors: self.anchors,
      input_size: self.input_size,
    };
    layout.validate()?;
    let expected_len = layout.checked_len()?;

    if !(self.threshold > 0.0 && self.threshold <= 1.0) {
      return Err(DecodeError::config(format!(
        "置信度阈值必须在 (0, 1] 内: {}",
        self.threshold
      )));
    }

    debug!(
      "解码器配置: 网格 {}x{}, 锚框 {}, 类别 {}, 输入 {}x{}, 阈值 {}",
      layout.geometry.rows,
      layout.geometry.cols,
      layout.anchors.len(),
      layout.labels.len(),
      layout.input_size.0,
      layout.input_size.1,
      self.threshold
    );

    Ok(GridDecoder {
      layout,
      expected_len,
      threshold: self.threshold,
      policy: self.policy,
    })
  }
}

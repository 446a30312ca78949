// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测结果与解码器定义
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

pub trait Decoder {
  type Input: ?Sized;
  type Output;
  type Error;

  fn detect(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 锚框先验尺寸，以网格单元为单位
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
  pub width_scale: f32,
  pub height_scale: f32,
}

impl Anchor {
  pub const fn new(width_scale: f32, height_scale: f32) -> Self {
    Self {
      width_scale,
      height_scale,
    }
  }
}

/// 像素坐标下的边界框，(x, y) 为左上角
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoxDimensions {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BoxDimensions {
  pub fn center(&self) -> (f32, f32) {
    (self.x + self.width / 2.0, self.y + self.height / 2.0)
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  /// 计算两个边界框的 IoU
  pub fn iou(&self, other: &BoxDimensions) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = (self.x + self.width).min(other.x + other.width);
    let y2 = (self.y + self.height).min(other.y + other.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: usize,
  pub label: String,
  pub score: f32,
  pub bbox: BoxDimensions,
}

impl DetectItem {
  /// 形如 `bug (87%)` 的标注文本
  pub fn description(&self) -> String {
    format!("{} ({:.0}%)", self.label, self.score * 100.0)
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

mod grid;
pub use self::grid::{
  DecodeError, FEATURES_PER_BOX, GridDecoder, GridDecoderBuilder, GridLayout, TINY_YOLO_V2_ANCHORS,
  parse_labels,
};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_iou_identical_and_disjoint() {
    let a = BoxDimensions {
      x: 0.0,
      y: 0.0,
      width: 10.0,
      height: 10.0,
    };
    let b = BoxDimensions { x: 20.0, ..a };
    assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn test_iou_half_overlap() {
    let a = BoxDimensions {
      x: 0.0,
      y: 0.0,
      width: 10.0,
      height: 10.0,
    };
    let b = BoxDimensions { x: 5.0, ..a };
    // 交集 50，并集 150
    assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn test_description() {
    let item = DetectItem {
      class_id: 0,
      label: "ladybug".to_string(),
      score: 0.876,
      bbox: BoxDimensions::default(),
    };
    assert_eq!(item.description(), "ladybug (88%)");
  }
}

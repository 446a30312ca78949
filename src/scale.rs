// 该文件是 Shanan （山南西风） 项目的一部分。
// src/scale.rs - 检测框到显示尺寸的缩放
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

use crate::model::{BoxDimensions, DetectItem, DetectResult};

/// 边界裁剪相对缩放的先后顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClampOrder {
  /// 先以显示尺寸裁剪模型坐标，再按比例缩放
  #[default]
  BeforeScale,
  /// 先缩放，再以显示尺寸裁剪
  AfterScale,
}

/// 把模型输入坐标系下的框映射到显示图像上，两个尺寸都必须为正
#[derive(Debug, Clone, Copy)]
pub struct DisplayScaler {
  model: (f32, f32),
  display: (f32, f32),
  order: ClampOrder,
}

fn clamp_to(bbox: BoxDimensions, (bound_w, bound_h): (f32, f32)) -> BoxDimensions {
  let x = bbox.x.max(0.0);
  let y = bbox.y.max(0.0);
  BoxDimensions {
    x,
    y,
    width: (bound_w - x).min(bbox.width),
    height: (bound_h - y).min(bbox.height),
  }
}

impl DisplayScaler {
  pub fn new(model: (f32, f32), display: (f32, f32)) -> Self {
    DisplayScaler {
      model,
      display,
      order: ClampOrder::default(),
    }
  }

  pub fn with_order(mut self, order: ClampOrder) -> Self {
    self.order = order;
    self
  }

  /// 替换模型输入尺寸，显示尺寸与裁剪顺序不变
  pub fn with_model(mut self, model: (f32, f32)) -> Self {
    self.model = model;
    self
  }

  pub fn model(&self) -> (f32, f32) {
    self.model
  }

  pub fn display(&self) -> (f32, f32) {
    self.display
  }

  pub fn order(&self) -> ClampOrder {
    self.order
  }

  fn scale(&self, bbox: BoxDimensions) -> BoxDimensions {
    let ratio_w = self.display.0 / self.model.0;
    let ratio_h = self.display.1 / self.model.1;
    BoxDimensions {
      x: bbox.x * ratio_w,
      y: bbox.y * ratio_h,
      width: bbox.width * ratio_w,
      height: bbox.height * ratio_h,
    }
  }

  // 缩放后的最终保护，保证框落在 [0, display] 内
  fn bound(&self, bbox: BoxDimensions) -> BoxDimensions {
    let (display_w, display_h) = self.display;
    let x = bbox.x.clamp(0.0, display_w);
    let y = bbox.y.clamp(0.0, display_h);
    BoxDimensions {
      x,
      y,
      width: bbox.width.min(display_w - x).max(0.0),
      height: bbox.height.min(display_h - y).max(0.0),
    }
  }

  pub fn rescale(&self, bbox: &BoxDimensions) -> BoxDimensions {
    match self.order {
      ClampOrder::BeforeScale => self.bound(self.scale(clamp_to(*bbox, self.display))),
      ClampOrder::AfterScale => self.bound(clamp_to(self.scale(*bbox), self.display)),
    }
  }

  pub fn rescale_item(&self, item: &DetectItem) -> DetectItem {
    DetectItem {
      bbox: self.rescale(&item.bbox),
      ..item.clone()
    }
  }

  pub fn rescale_result(&self, result: &DetectResult) -> DetectResult {
    result
      .iter()
      .map(|item| self.rescale_item(item))
      .collect::<Vec<_>>()
      .into()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bbox(x: f32, y: f32, width: f32, height: f32) -> BoxDimensions {
    BoxDimensions {
      x,
      y,
      width,
      height,
    }
  }

  fn inside(b: &BoxDimensions, (w, h): (f32, f32)) -> bool {
    b.x >= 0.0 && b.y >= 0.0 && b.x + b.width <= w + 1e-3 && b.y + b.height <= h + 1e-3
  }

  #[test]
  fn test_plain_scale() {
    let scaler = DisplayScaler::new((416.0, 416.0), (832.0, 208.0));
    let scaled = scaler.rescale(&bbox(100.0, 100.0, 50.0, 40.0));
    assert_eq!(scaled, bbox(200.0, 50.0, 100.0, 20.0));
  }

  #[test]
  fn test_same_size_matches_reference_clamp() {
    let scaler = DisplayScaler::new((416.0, 416.0), (416.0, 416.0));
    let scaled = scaler.rescale(&bbox(-20.0, 400.0, 100.0, 100.0));
    assert_eq!(scaled, bbox(0.0, 400.0, 100.0, 16.0));
  }

  #[test]
  fn test_clamp_order_is_observable() {
    let raw = bbox(-10.0, -10.0, 300.0, 300.0);
    let before = DisplayScaler::new((416.0, 416.0), (208.0, 208.0));
    let after = before.with_order(ClampOrder::AfterScale);

    let a = before.rescale(&raw);
    let b = after.rescale(&raw);
    assert_eq!(a, bbox(0.0, 0.0, 104.0, 104.0));
    assert_eq!(b, bbox(0.0, 0.0, 150.0, 150.0));
    assert!(inside(&a, (208.0, 208.0)));
    assert!(inside(&b, (208.0, 208.0)));
  }

  #[test]
  fn test_never_exceeds_display() {
    let raws = [
      bbox(-50.0, -80.0, 900.0, 700.0),
      bbox(400.0, 410.0, 300.0, 300.0),
      bbox(0.0, 0.0, 1000.0, 1000.0),
      bbox(500.0, -5.0, 10.0, 10.0),
    ];
    let displays = [(208.0, 156.0), (416.0, 416.0), (1920.0, 1080.0)];
    for display in displays {
      for order in [ClampOrder::BeforeScale, ClampOrder::AfterScale] {
        let scaler = DisplayScaler::new((416.0, 416.0), display).with_order(order);
        for raw in &raws {
          let scaled = scaler.rescale(raw);
          assert!(inside(&scaled, display), "{:?} -> {:?}", raw, scaled);
          assert!(scaled.width >= 0.0 && scaled.height >= 0.0);
        }
      }
    }
  }

  #[test]
  fn test_rescale_result_keeps_labels() {
    let result = DetectResult::from(vec![DetectItem {
      class_id: 3,
      label: "aphid".to_string(),
      score: 0.7,
      bbox: bbox(10.0, 10.0, 20.0, 20.0),
    }]);
    let scaled = DisplayScaler::new((416.0, 416.0), (832.0, 832.0)).rescale_result(&result);
    assert_eq!(scaled.items[0].label, "aphid");
    assert_eq!(scaled.items[0].class_id, 3);
    assert_eq!(scaled.items[0].bbox, bbox(20.0, 20.0, 40.0, 40.0));
  }
}

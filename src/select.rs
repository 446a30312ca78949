// 该文件是 Shanan （山南西风） 项目的一部分。
// src/select.rs - 检测结果筛选策略
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

use tracing::{debug, warn};

use crate::model::DetectItem;

const DEFAULT_NMS_IOU_THRESHOLD: f32 = 0.45;

/// 解码完成后对候选框做最终取舍
pub trait SelectionPolicy {
  fn select(&self, items: Vec<DetectItem>) -> Vec<DetectItem>;
}

/// 只保留置信度最高的一个，分数相同时保留先出现的；NaN 分数不参与比较
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepBest;

impl SelectionPolicy for KeepBest {
  fn select(&self, items: Vec<DetectItem>) -> Vec<DetectItem> {
    let total = items.len();
    let best = items
      .into_iter()
      .filter(|item| !item.score.is_nan())
      .reduce(|best, item| if item.score > best.score { item } else { best });
    debug!("保留最佳结果: {} 个候选 -> {}", total, best.is_some() as usize);
    best.into_iter().collect()
  }
}

/// 原样返回全部候选
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl SelectionPolicy for KeepAll {
  fn select(&self, items: Vec<DetectItem>) -> Vec<DetectItem> {
    items
  }
}

/// 按类别的非极大值抑制
#[derive(Debug, Clone, Copy)]
pub struct Nms {
  pub iou_threshold: f32,
}

impl Default for Nms {
  fn default() -> Self {
    Nms {
      iou_threshold: DEFAULT_NMS_IOU_THRESHOLD,
    }
  }
}

impl SelectionPolicy for Nms {
  fn select(&self, mut items: Vec<DetectItem>) -> Vec<DetectItem> {
    // 稳定排序，同分时保持解码顺序
    items.sort_by(|a, b| b.score.total_cmp(&a.score));

    let total = items.len();
    let mut result: Vec<DetectItem> = Vec::new();
    for item in items {
      let suppressed = result
        .iter()
        .any(|kept| kept.class_id == item.class_id && kept.bbox.iou(&item.bbox) >= self.iou_threshold);
      if !suppressed {
        result.push(item);
      }
    }

    debug!("NMS: {} 个候选 -> {} 个", total, result.len());
    result
  }
}

#[derive(Debug, Clone, Copy)]
pub enum PolicyWrapper {
  KeepBest(KeepBest),
  KeepAll(KeepAll),
  Nms(Nms),
}

impl Default for PolicyWrapper {
  fn default() -> Self {
    PolicyWrapper::KeepBest(KeepBest)
  }
}

impl PolicyWrapper {
  /// 按名称选择策略，未知名称回退到 `best`
  pub fn with(kind: &str) -> Self {
    match kind {
      "best" => PolicyWrapper::KeepBest(KeepBest),
      "all" => PolicyWrapper::KeepAll(KeepAll),
      "nms" => PolicyWrapper::Nms(Nms::default()),
      other => {
        warn!("未知的筛选策略 '{}'，使用 best", other);
        PolicyWrapper::KeepBest(KeepBest)
      }
    }
  }
}

impl SelectionPolicy for PolicyWrapper {
  fn select(&self, items: Vec<DetectItem>) -> Vec<DetectItem> {
    match self {
      PolicyWrapper::KeepBest(policy) => policy.select(items),
      PolicyWrapper::KeepAll(policy) => policy.select(items),
      PolicyWrapper::Nms(policy) => policy.select(items),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoxDimensions;

  fn item(class_id: usize, score: f32, x: f32) -> DetectItem {
    DetectItem {
      class_id,
      label: format!("class-{}", class_id),
      score,
      bbox: BoxDimensions {
        x,
        y: 0.0,
        width: 10.0,
        height: 10.0,
      },
    }
  }

  #[test]
  fn test_keep_best_picks_highest() {
    let selected = KeepBest.select(vec![item(0, 0.6, 0.0), item(0, 0.9, 50.0)]);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].score, 0.9);
  }

  #[test]
  fn test_keep_best_tie_first_wins() {
    let selected = KeepBest.select(vec![item(0, 0.8, 0.0), item(1, 0.8, 50.0)]);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].class_id, 0);
  }

  #[test]
  fn test_keep_best_ignores_nan() {
    let selected = KeepBest.select(vec![item(0, f32::NAN, 0.0), item(1, 0.99, 50.0)]);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].class_id, 1);

    let selected = KeepBest.select(vec![item(0, 0.7, 0.0), item(1, f32::NAN, 50.0)]);
    assert_eq!(selected[0].score, 0.7);

    assert!(KeepBest.select(vec![item(0, f32::NAN, 0.0)]).is_empty());
  }

  #[test]
  fn test_keep_best_empty() {
    assert!(KeepBest.select(Vec::new()).is_empty());
  }

  #[test]
  fn test_nms_suppresses_same_class_only() {
    let items = vec![
      item(0, 0.7, 1.0),
      item(0, 0.9, 0.0),
      item(1, 0.8, 0.0),
      item(0, 0.6, 100.0),
    ];
    let selected = Nms::default().select(items);
    let scores: Vec<f32> = selected.iter().map(|i| i.score).collect();
    assert_eq!(scores, vec![0.9, 0.8, 0.6]);
  }

  #[test]
  fn test_policy_with_name() {
    assert!(matches!(PolicyWrapper::with("all"), PolicyWrapper::KeepAll(_)));
    assert!(matches!(PolicyWrapper::with("nms"), PolicyWrapper::Nms(_)));
    assert!(matches!(PolicyWrapper::with("best"), PolicyWrapper::KeepBest(_)));
    // 拼写错误回退到默认策略
    assert!(matches!(PolicyWrapper::with("nsm"), PolicyWrapper::KeepBest(_)));
  }

  #[test]
  fn test_keep_all_identity() {
    let items = vec![item(0, 0.6, 0.0), item(1, 0.9, 50.0)];
    assert_eq!(KeepAll.select(items.clone()), items);
  }
}

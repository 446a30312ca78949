// 该文件是 Shanan （山南西风） 项目的一部分。
// src/utils.rs - 激活函数与数值工具
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

/// Logistic 函数，极大/极小输入分别平滑饱和到 1 和 0
pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 数值稳定的 softmax：先减去最大值再取指数
pub fn softmax(logits: &[f32]) -> Vec<f32> {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exp: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
  let sum: f32 = exp.iter().sum();
  exp.into_iter().map(|v| v / sum).collect()
}

/// 返回最大值的索引与数值，相等时取第一个
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
  let mut best: Option<(usize, f32)> = None;
  for (idx, &value) in values.iter().enumerate() {
    match best {
      Some((_, score)) if value <= score => {}
      _ => best = Some((idx, value)),
    }
  }
  best
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sigmoid_midpoint() {
    assert_eq!(sigmoid(0.0), 0.5);
  }

  #[test]
  fn test_sigmoid_saturates_without_nan() {
    let high = sigmoid(1.0e4);
    let low = sigmoid(-1.0e4);
    assert!(high.is_finite() && low.is_finite());
    assert!((high - 1.0).abs() < 1e-6);
    assert!(low.abs() < 1e-6);
    assert!(low >= 0.0 && high <= 1.0);
  }

  #[test]
  fn test_sigmoid_monotonic() {
    let samples: Vec<f32> = (-40..=40).map(|i| i as f32 * 0.25).collect();
    for pair in samples.windows(2) {
      assert!(sigmoid(pair[0]) < sigmoid(pair[1]));
    }
  }

  #[test]
  fn test_softmax_large_logits() {
    let probs = softmax(&[1000.0, 1000.0, 990.0]);
    assert!(probs.iter().all(|p| p.is_finite()));
    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert!((probs[0] - probs[1]).abs() < 1e-6);
    assert!(probs[2] < probs[0]);
  }

  #[test]
  fn test_softmax_single_class() {
    assert_eq!(softmax(&[-3.5]), vec![1.0]);
  }

  #[test]
  fn test_argmax_first_wins() {
    assert_eq!(argmax(&[0.2, 0.7, 0.7, 0.1]), Some((1, 0.7)));
    assert_eq!(argmax(&[]), None);
  }
}

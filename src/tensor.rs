// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 网格输出张量
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

/// 网格尺寸（每个图像方向上的单元数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
  pub rows: usize,
  pub cols: usize,
}

impl GridGeometry {
  pub const fn new(rows: usize, cols: usize) -> Self {
    Self { rows, cols }
  }

  /// 单个通道平面的大小，调用方需保证不溢出
  pub fn cells(&self) -> usize {
    self.rows * self.cols
  }

  /// 溢出时返回 None
  pub fn checked_cells(&self) -> Option<usize> {
    self.rows.checked_mul(self.cols)
  }
}

impl Default for GridGeometry {
  fn default() -> Self {
    Self::new(13, 13)
  }
}

/// 推理引擎给出的平铺输出张量，按 (通道, 列, 行) 排布，行索引变化最快
#[derive(Debug, Clone, Copy)]
pub struct GridTensor<'a> {
  data: &'a [f32],
  geometry: GridGeometry,
}

impl<'a> GridTensor<'a> {
  /// 长度不足一个完整通道平面的整数倍或平面大小溢出时返回 None
  pub fn new(data: &'a [f32], geometry: GridGeometry) -> Option<Self> {
    let plane = geometry.checked_cells()?;
    if plane == 0 || data.len() % plane != 0 {
      return None;
    }
    Some(Self { data, geometry })
  }

  pub fn geometry(&self) -> GridGeometry {
    self.geometry
  }

  pub fn channels(&self) -> usize {
    self.data.len() / self.geometry.cells()
  }

  // 列步长为 rows；非方阵网格也按 rows 计算，仅在方阵时与 cols 相同
  fn offset(&self, row: usize, col: usize, channel: usize) -> usize {
    channel * self.geometry.cells() + col * self.geometry.rows + row
  }

  /// 读取 (row, col, channel) 处的原始激活值
  ///
  /// 越界访问会 panic，调用方需先保证通道数匹配。
  pub fn at(&self, row: usize, col: usize, channel: usize) -> f32 {
    debug_assert!(row < self.geometry.rows && col < self.geometry.cols);
    self.data[self.offset(row, col, channel)]
  }

  /// 连续读取从 `start` 开始的 `len` 个通道
  pub fn channel_run(&self, row: usize, col: usize, start: usize, len: usize) -> Vec<f32> {
    (start..start + len)
      .map(|channel| self.at(row, col, channel))
      .collect()
  }
}

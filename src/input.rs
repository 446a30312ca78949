// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 输出张量文件输入
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

use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum TensorFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("原始张量文件长度 {0} 不是 4 字节的整数倍")]
  TruncatedFile(usize),
}

/// 从文件读取一次推理的输出张量
///
/// `.json` 文件为数字数组，其余按小端 f32 原始数据读取。
pub struct TensorFileInput {
  tensor: Option<Vec<f32>>,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileInputError::SchemeMismatch);
    }

    let path = Path::new(url.path());
    info!("读取输出张量: {}", path.display());
    let tensor = match path.extension().and_then(|ext| ext.to_str()) {
      Some("json") => serde_json::from_slice(&std::fs::read(path)?)?,
      _ => decode_raw_f32(&std::fs::read(path)?)?,
    };
    debug!("张量长度: {}", tensor.len());

    Ok(TensorFileInput {
      tensor: Some(tensor),
    })
  }
}

impl From<Vec<f32>> for TensorFileInput {
  fn from(tensor: Vec<f32>) -> Self {
    TensorFileInput {
      tensor: Some(tensor),
    }
  }
}

impl Iterator for TensorFileInput {
  type Item = Vec<f32>;

  fn next(&mut self) -> Option<Self::Item> {
    self.tensor.take()
  }
}

/// 小端 f32 原始字节转为浮点数组
pub fn decode_raw_f32(bytes: &[u8]) -> Result<Vec<f32>, TensorFileInputError> {
  if bytes.len() % 4 != 0 {
    return Err(TensorFileInputError::TruncatedFile(bytes.len()));
  }
  Ok(
    bytes
      .chunks_exact(4)
      .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect(),
  )
}

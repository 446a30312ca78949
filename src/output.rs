// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 检测结果输出
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

use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  scale::{ClampOrder, DisplayScaler},
};

pub trait Render<Output>: Sized {
  type Error;
  fn render_result(&self, result: &Output) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum ConsoleOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的输出格式: {0}")]
  UnknownFormat(String),
  #[error("尺寸参数 {0} 无效: {1}")]
  InvalidSize(String, String),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
  Json,
  Text,
}

const DEFAULT_MODEL_SIZE: (f32, f32) = (416.0, 416.0);

/// 打印到标准输出，可选地缩放到显示尺寸
#[derive(Debug, Clone)]
pub struct ConsoleOutput {
  format: ConsoleFormat,
  scaler: Option<DisplayScaler>,
  // URL 中显式给出 model= 时不再跟随解码器
  model_pinned: bool,
}

impl ConsoleOutput {
  pub fn new(format: ConsoleFormat) -> Self {
    ConsoleOutput {
      format,
      scaler: None,
      model_pinned: false,
    }
  }

  pub fn with_scaler(mut self, scaler: DisplayScaler) -> Self {
    self.scaler = Some(scaler);
    self.model_pinned = true;
    self
  }

  /// 使用解码器的模型输入尺寸作为缩放源，URL 中显式的 `model=` 优先
  pub fn with_model_size(mut self, model: (f32, f32)) -> Self {
    if let Some(scaler) = self.scaler {
      if self.model_pinned {
        if scaler.model() != model {
          warn!(
            "输出配置的模型尺寸 {}x{} 与解码器输入 {}x{} 不一致",
            scaler.model().0,
            scaler.model().1,
            model.0,
            model.1
          );
        }
      } else {
        self.scaler = Some(scaler.with_model(model));
      }
    }
    self
  }

  pub fn scaler(&self) -> Option<&DisplayScaler> {
    self.scaler.as_ref()
  }

  pub fn format_result(&self, result: &DetectResult) -> Result<String, ConsoleOutputError> {
    let scaled;
    let result = match &self.scaler {
      Some(scaler) => {
        scaled = scaler.rescale_result(result);
        &scaled
      }
      None => result,
    };

    match self.format {
      ConsoleFormat::Json => {
        let detections: Vec<_> = result
          .iter()
          .map(|item| {
            json!({
              "label": item.label,
              "class_id": item.class_id,
              "confidence": item.score,
              "x": item.bbox.x,
              "y": item.bbox.y,
              "width": item.bbox.width,
              "height": item.bbox.height,
            })
          })
          .collect();
        Ok(serde_json::to_string_pretty(&json!({ "detections": detections }))?)
      }
      ConsoleFormat::Text => {
        let records: Vec<String> = result
          .iter()
          .map(|item| {
            format!(
              "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}",
              item.label, item.score, item.bbox.x, item.bbox.y, item.bbox.width, item.bbox.height
            )
          })
          .collect();
        Ok(records.join("\n"))
      }
    }
  }
}

fn parse_size(key: &str, value: &str) -> Result<(f32, f32), ConsoleOutputError> {
  let invalid = || ConsoleOutputError::InvalidSize(key.to_string(), value.to_string());
  let (w, h) = value.split_once('x').ok_or_else(invalid)?;
  let w: f32 = w.trim().parse().map_err(|_| invalid())?;
  let h: f32 = h.trim().parse().map_err(|_| invalid())?;
  if !(w > 0.0 && h > 0.0) {
    return Err(invalid());
  }
  Ok((w, h))
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ConsoleOutputError::SchemeMismatch);
    }

    let format = match url.path().trim_matches('/') {
      "" | "text" => ConsoleFormat::Text,
      "json" => ConsoleFormat::Json,
      other => return Err(ConsoleOutputError::UnknownFormat(other.to_string())),
    };

    let mut model = None;
    let mut display = None;
    let mut order = ClampOrder::BeforeScale;
    for (key, value) in url.query_pairs() {
      match &*key {
        "model" => model = Some(parse_size(&key, &value)?),
        "display" => display = Some(parse_size(&key, &value)?),
        "clamp" => match &*value {
          "before" => order = ClampOrder::BeforeScale,
          "after" => order = ClampOrder::AfterScale,
          other => warn!("未知的裁剪顺序 '{}'，使用 before", other),
        },
        _ => {}
      }
    }

    let mut output = ConsoleOutput::new(format);
    if let Some(display) = display {
      // 未给出 model= 时先用参考尺寸，之后由 with_model_size 跟随解码器
      let scaler = DisplayScaler::new(model.unwrap_or(DEFAULT_MODEL_SIZE), display).with_order(order);
      output.scaler = Some(scaler);
      output.model_pinned = model.is_some();
    }
    Ok(output)
  }
}

impl Render<DetectResult> for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn render_result(&self, result: &DetectResult) -> Result<(), Self::Error> {
    if result.is_empty() {
      info!("没有可用的检测结果");
    }
    let text = self.format_result(result)?;
    if !text.is_empty() {
      println!("{}", text);
    }
    Ok(())
  }
}

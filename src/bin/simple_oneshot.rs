// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单次解码
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_grid::{
  FromUrl,
  input::TensorFileInput,
  model::GridDecoderBuilder,
  output::ConsoleOutput,
  task::{OneShotTask, Task},
};

/// Shanan 网格解码参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 解码配置，例如 grid:///path/labels.txt?rows=13&cols=13
  #[arg(long, value_name = "DECODER")]
  pub decoder: Url,
  /// 输出张量文件，例如 tensor:///path/output.bin
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 结果输出，例如 console:json?display=1920x1080
  #[arg(long, value_name = "OUTPUT", default_value = "console:text")]
  pub output: Url,
  /// 覆盖解码配置中的置信度阈值 (0.0 - 1.0]
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("解码配置: {}", args.decoder);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut builder = GridDecoderBuilder::from_url(&args.decoder)?;
  if let Some(confidence) = args.confidence {
    builder = builder.threshold(confidence);
  }
  let decoder = builder.build()?;
  let input = TensorFileInput::from_url(&args.input)?;
  let output =
    ConsoleOutput::from_url(&args.output)?.with_model_size(decoder.layout().input_size);

  OneShotTask.run_task(input, decoder, output)
}

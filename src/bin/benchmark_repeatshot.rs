// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复解码性能测试
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
  task::{RepeatShotTask, Task},
};

/// Shanan 网格解码性能测试参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 解码配置
  #[arg(long, value_name = "DECODER")]
  pub decoder: Url,
  /// 输出张量文件
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 结果输出
  #[arg(long, value_name = "OUTPUT", default_value = "console:text")]
  pub output: Url,
  /// 重复次数
  #[arg(long, default_value = "1000", value_name = "COUNT")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("解码配置: {}", args.decoder);
  info!("输入来源: {}", args.input);
  info!("重复次数: {}", args.repeat);

  let decoder = GridDecoderBuilder::from_url(&args.decoder)?.build()?;
  let input = TensorFileInput::from_url(&args.input)?;
  let output =
    ConsoleOutput::from_url(&args.output)?.with_model_size(decoder.layout().input_size);

  RepeatShotTask::default()
    .with_repeat(args.repeat)
    .run_task(input, decoder, output)
}

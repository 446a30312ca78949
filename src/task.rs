// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 解码任务
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

use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::{model::Decoder, output::Render};

const WARMUP_ROUNDS: usize = 2;

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F: AsRef<[f32]>,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Decoder<Input = [f32], Output = D, Error = ME>,
  O: Render<D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let tensor = input.next().ok_or_else(|| anyhow::anyhow!("没有输入张量"))?;
    info!("输入张量获取成功，开始解码...");
    let now = Instant::now();
    let result = model.detect(tensor.as_ref())?;
    let elapsed = now.elapsed();
    info!("解码完成，耗时: {:.2?}", elapsed);
    output.render_result(&result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一个张量反复解码，统计平均耗时
#[derive(Debug)]
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    RepeatShotTask { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

impl<
  F: AsRef<[f32]>,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Decoder<Input = [f32], Output = D, Error = ME>,
  O: Render<D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let tensor = input.next().ok_or_else(|| anyhow::anyhow!("没有输入张量"))?;
    info!("输入张量获取成功，开始解码...");
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.detect(tensor.as_ref())?;
      let elapsed = now.elapsed();
      info!("({})解码完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&result)?;
      times.push(elapsed);
    }

    // 前几轮视为预热
    let skip = if times.len() > WARMUP_ROUNDS {
      WARMUP_ROUNDS
    } else {
      0
    };
    let counted = (times.len() - skip) as u32;
    warn!(
      "平均解码时间: {:.2?}",
      times.iter().skip(skip).sum::<Duration>() / counted
    );

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use super::*;
  use crate::model::{DecodeError, DetectResult};

  struct CountingDecoder {
    calls: RefCell<usize>,
  }

  impl Decoder for &CountingDecoder {
    type Input = [f32];
    type Output = DetectResult;
    type Error = DecodeError;

    fn detect(&self, input: &[f32]) -> Result<DetectResult, DecodeError> {
      *self.calls.borrow_mut() += 1;
      if input.is_empty() {
        return Err(DecodeError::InvalidInput {
          expected: 1,
          actual: 0,
        });
      }
      Ok(DetectResult::default())
    }
  }

  struct CountingOutput {
    renders: RefCell<usize>,
  }

  impl Render<DetectResult> for &CountingOutput {
    type Error = std::io::Error;

    fn render_result(&self, _result: &DetectResult) -> Result<(), Self::Error> {
      *self.renders.borrow_mut() += 1;
      Ok(())
    }
  }

  fn fixtures() -> (CountingDecoder, CountingOutput) {
    (
      CountingDecoder {
        calls: RefCell::new(0),
      },
      CountingOutput {
        renders: RefCell::new(0),
      },
    )
  }

  #[test]
  fn test_one_shot() {
    let (decoder, output) = fixtures();
    OneShotTask
      .run_task(vec![vec![1.0f32]].into_iter(), &decoder, &output)
      .unwrap();
    assert_eq!(*decoder.calls.borrow(), 1);
    assert_eq!(*output.renders.borrow(), 1);
  }

  #[test]
  fn test_one_shot_without_input() {
    let (decoder, output) = fixtures();
    let input = std::iter::empty::<Vec<f32>>();
    assert!(OneShotTask.run_task(input, &decoder, &output).is_err());
    assert_eq!(*decoder.calls.borrow(), 0);
  }

  #[test]
  fn test_one_shot_propagates_decode_error() {
    let (decoder, output) = fixtures();
    let result = OneShotTask.run_task(vec![Vec::<f32>::new()].into_iter(), &decoder, &output);
    assert!(result.is_err());
    assert_eq!(*output.renders.borrow(), 0);
  }

  #[test]
  fn test_repeat_shot() {
    let (decoder, output) = fixtures();
    RepeatShotTask::default()
      .with_repeat(5)
      .run_task(vec![vec![1.0f32]].into_iter(), &decoder, &output)
      .unwrap();
    assert_eq!(*decoder.calls.borrow(), 5);
    assert_eq!(*output.renders.borrow(), 5);
  }

  #[test]
  fn test_repeat_shot_single_round() {
    let (decoder, output) = fixtures();
    RepeatShotTask::default()
      .with_repeat(1)
      .run_task(vec![vec![1.0f32]].into_iter(), &decoder, &output)
      .unwrap();
    assert_eq!(*decoder.calls.borrow(), 1);
  }
}

/// 渲染线程模块
/// Render stage worker
use super::geometry::{CropBox, Size};
use super::slot::SharedState;
use super::{FpsCounter, StageReport, StageState};
use crate::detection::types::InferenceResult;
use crate::display::DisplaySink;
use crate::error::{PipelineError, Result, Stage};
use crate::input::frame::Frame;
use std::time::Instant;
use tracing::{info, trace};

// ========== 渲染接口 ==========

/// 传给渲染回调的几何信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    pub source_size: Size,
    pub inference_size: Size,
    pub crop_box: CropBox,
    pub now: Instant,
}

/// 渲染输出: 叠加层和/或替换帧,以及显示端指令
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    /// SVG 叠加层; None 表示保留上一次的叠加层
    pub overlay: Option<String>,
    /// 替换显示的帧
    pub frame: Option<Frame>,
    /// 冻结背景
    pub freeze: bool,
}

impl RenderOutput {
    pub fn overlay(svg: String) -> Self {
        Self {
            overlay: Some(svg),
            ..Self::default()
        }
    }
}

/// 渲染策略,状态由实现者自己持有
pub trait RenderStrategy: Send {
    fn render(&mut self, result: &InferenceResult, ctx: &RenderContext) -> anyhow::Result<RenderOutput>;
}

impl<T: RenderStrategy + ?Sized> RenderStrategy for Box<T> {
    fn render(&mut self, result: &InferenceResult, ctx: &RenderContext) -> anyhow::Result<RenderOutput> {
        (**self).render(result, ctx)
    }
}

/// 闭包渲染: 状态按值传入、按值返回
///
/// `f(state, result, ctx) -> (output, next_state)`
pub struct StatefulRender<S, F> {
    state: Option<S>,
    f: F,
}

impl<S, F> StatefulRender<S, F>
where
    S: Send,
    F: FnMut(S, &InferenceResult, &RenderContext) -> anyhow::Result<(RenderOutput, S)> + Send,
{
    pub fn new(initial: S, f: F) -> Self {
        Self {
            state: Some(initial),
            f,
        }
    }

    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }
}

impl<S, F> RenderStrategy for StatefulRender<S, F>
where
    S: Send,
    F: FnMut(S, &InferenceResult, &RenderContext) -> anyhow::Result<(RenderOutput, S)> + Send,
{
    fn render(&mut self, result: &InferenceResult, ctx: &RenderContext) -> anyhow::Result<RenderOutput> {
        // 回调出错时状态随之丢失,渲染线程也会随之退出
        let state = self
            .state
            .take()
            .ok_or_else(|| anyhow::anyhow!("render state lost after an earlier failure"))?;
        let (output, next) = (self.f)(state, result, ctx)?;
        self.state = Some(next);
        Ok(output)
    }
}

// ========== 渲染阶段 ==========

/// 渲染阶段: 取最新结果 → 渲染策略 → 显示端
pub struct RenderStage<R, K> {
    strategy: R,
    sink: K,
    state: StageState,
    processed: u64,
}

impl<R: RenderStrategy, K: DisplaySink> RenderStage<R, K> {
    pub fn new(strategy: R, sink: K) -> Self {
        Self {
            strategy,
            sink,
            state: StageState::Idle,
            processed: 0,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn into_parts(self) -> (R, K) {
        (self.strategy, self.sink)
    }

    pub fn run(&mut self, shared: &SharedState) -> Result<StageReport> {
        info!("✅ 渲染线程已启动");
        let outcome = self.run_loop(shared);
        self.set_state(StageState::Stopped);
        match outcome {
            Ok(()) => {
                info!("🛑 渲染线程退出, 共渲染 {} 次", self.processed);
                Ok(StageReport {
                    stage: Stage::Render,
                    processed: self.processed,
                })
            }
            Err(e) => Err(e.in_stage(Stage::Render)),
        }
    }

    fn run_loop(&mut self, shared: &SharedState) -> Result<()> {
        let letterbox = shared.geometry().letterbox();
        let mut fps = FpsCounter::new();
        loop {
            self.set_state(StageState::WaitingForResult);
            let Some(result) = shared.wait_result() else {
                return Ok(());
            };

            self.set_state(StageState::Rendering);
            let ctx = RenderContext {
                source_size: letterbox.source,
                inference_size: letterbox.inference,
                crop_box: shared.geometry().crop_box()?,
                now: Instant::now(),
            };
            let output = self
                .strategy
                .render(&result, &ctx)
                .map_err(|e| PipelineError::Render(e.into()))?;

            self.set_state(StageState::Publishing);
            self.sink
                .present(output)
                .map_err(|e| PipelineError::Render(e.into()))?;
            shared.stats().record_render();
            self.processed += 1;

            if let Some((count, rate)) = fps.tick() {
                info!(
                    "🎨 渲染统计: 渲染{}次 | {:.1}fps | 推理{:.1}ms | {}人",
                    count,
                    rate,
                    result.latency_ms,
                    result.poses.len()
                );
            }
        }
    }

    fn set_state(&mut self, state: StageState) {
        trace!("渲染线程 {:?} → {:?}", self.state, state);
        self.state = state;
    }
}

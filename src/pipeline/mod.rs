/// 帧处理流水线 (Frame Pipeline)
///
/// 三段式架构,通过最新值槽位交接:
/// - Capture:   媒体图的采集线程,发布帧
/// - Inference: 推理线程,取最新帧 → 推理 → 发布结果
/// - Render:    渲染线程,取最新结果 → 渲染回调 → 显示端
///
/// Supervisor 负责启动、停止与错误上报。
pub mod geometry;
pub mod inference;
pub mod render;
pub mod slot;
pub mod supervisor;

pub use geometry::{CropBox, GeometryCache, Letterbox, Size};
pub use inference::InferenceStage;
pub use render::{RenderContext, RenderOutput, RenderStage, RenderStrategy, StatefulRender};
pub use slot::{FramePublisher, PipelineStats, SharedState, StatsSnapshot};
pub use supervisor::{
    BusMessage, MediaGraph, PipelineReport, PipelineSupervisor, RunningPipeline, StopHandle,
    StopReason,
};

use crate::error::Stage;
use std::time::Instant;

// ========== 阶段状态 ==========

/// 工作线程状态
///
/// 推理线程: Idle → WaitingForFrame → RunningInference → Publishing → WaitingForFrame …
/// 渲染线程: Idle → WaitingForResult → Rendering → Publishing → WaitingForResult …
/// 两者的终态都是 Stopped。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Idle,
    WaitingForFrame,
    RunningInference,
    WaitingForResult,
    Rendering,
    Publishing,
    Stopped,
}

/// 工作线程正常退出时的汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub processed: u64,
}

// ========== 吞吐统计 ==========

/// 每秒打印一次的吞吐统计
#[derive(Debug)]
pub(crate) struct FpsCounter {
    count: u64,
    last: Instant,
}

impl FpsCounter {
    pub(crate) fn new() -> Self {
        Self {
            count: 0,
            last: Instant::now(),
        }
    }

    /// 记一帧; 满一秒时返回该秒内的 (帧数, fps) 并清零
    pub(crate) fn tick(&mut self) -> Option<(u64, f64)> {
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return None;
        }
        let out = (self.count, self.count as f64 / elapsed);
        self.count = 0;
        self.last = Instant::now();
        Some(out)
    }
}

/// 最新值槽位: 采集 → 推理 → 渲染之间的交接
/// Latest-wins handoff slots
///
/// 帧槽、结果槽和运行标志由同一把互斥锁保护,配一个条件变量。
/// 发布方只做一次替换,永不阻塞;旧值被覆盖即丢弃,不排队。
use super::geometry::{GeometryCache, Letterbox};
use crate::detection::types::InferenceResult;
use crate::input::frame::Frame;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
struct Slots {
    frame: Option<Frame>,
    result: Option<InferenceResult>,
    running: bool,
}

// ========== 统计 ==========

/// 管线计数器
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    inferences: AtomicU64,
    results_dropped: AtomicU64,
    renders: AtomicU64,
    live_workers: AtomicUsize,
}

/// 计数器快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub inferences: u64,
    pub results_dropped: u64,
    pub renders: u64,
    pub live_workers: usize,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            inferences: self.inferences.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
            renders: self.renders.load(Ordering::Relaxed),
            live_workers: self.live_workers.load(Ordering::Acquire),
        }
    }

    pub(crate) fn record_render(&self) {
        self.renders.fetch_add(1, Ordering::Relaxed);
    }

    /// 登记一个存活的工作线程,guard 析构 (包括 panic 展开) 时注销
    pub(crate) fn worker_guard(self: &Arc<Self>) -> LiveWorker {
        self.live_workers.fetch_add(1, Ordering::AcqRel);
        LiveWorker {
            stats: Arc::clone(self),
        }
    }
}

pub(crate) struct LiveWorker {
    stats: Arc<PipelineStats>,
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.stats.live_workers.fetch_sub(1, Ordering::AcqRel);
    }
}

// ========== 共享状态 ==========

/// 三个阶段共享的状态
#[derive(Debug)]
pub struct SharedState {
    slots: Mutex<Slots>,
    cond: Condvar,
    stats: Arc<PipelineStats>,
    geometry: GeometryCache,
}

impl SharedState {
    pub fn new(letterbox: Letterbox) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            cond: Condvar::new(),
            stats: Arc::new(PipelineStats::default()),
            geometry: GeometryCache::new(letterbox),
        }
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn geometry(&self) -> &GeometryCache {
        &self.geometry
    }

    /// 置运行标志
    pub fn start(&self) {
        self.slots.lock().running = true;
    }

    pub fn is_running(&self) -> bool {
        self.slots.lock().running
    }

    /// 请求停止: 清除运行标志并唤醒所有等待者
    pub fn shutdown(&self) {
        self.slots.lock().running = false;
        self.cond.notify_all();
    }

    /// 发布新帧,覆盖未被取走的旧帧; 返回是否丢弃了旧帧
    pub fn publish_frame(&self, frame: Frame) -> bool {
        let dropped = {
            let mut slots = self.slots.lock();
            slots.frame.replace(frame).is_some()
        };
        self.stats.frames_captured.fetch_add(1, Ordering::Relaxed);
        if dropped {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.cond.notify_all();
        dropped
    }

    /// 阻塞直到有帧或停止
    ///
    /// 停止优先: 即使槽中还有帧,停止后也返回 None。
    pub fn wait_frame(&self) -> Option<Frame> {
        let mut slots = self.slots.lock();
        while slots.frame.is_none() && slots.running {
            self.cond.wait(&mut slots);
        }
        if !slots.running {
            return None;
        }
        slots.frame.take()
    }

    /// 发布推理结果,覆盖未被渲染的旧结果; 返回是否丢弃了旧结果
    pub fn publish_result(&self, result: InferenceResult) -> bool {
        let dropped = {
            let mut slots = self.slots.lock();
            slots.result.replace(result).is_some()
        };
        self.stats.inferences.fetch_add(1, Ordering::Relaxed);
        if dropped {
            self.stats.results_dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.cond.notify_all();
        dropped
    }

    /// 阻塞直到有结果或停止 (停止优先)
    pub fn wait_result(&self) -> Option<InferenceResult> {
        let mut slots = self.slots.lock();
        while slots.result.is_none() && slots.running {
            self.cond.wait(&mut slots);
        }
        if !slots.running {
            return None;
        }
        slots.result.take()
    }
}

// ========== 采集端句柄 ==========

/// 交给媒体图的采集回调句柄
///
/// 第一帧的尺寸即为接收端尺寸,用于一次性求得裁剪框。
#[derive(Debug, Clone)]
pub struct FramePublisher {
    shared: Arc<SharedState>,
}

impl FramePublisher {
    pub fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// 发布一帧; 返回是否覆盖了尚未推理的旧帧
    pub fn publish(&self, frame: Frame) -> bool {
        let geometry = self.shared.geometry();
        if geometry.observe_sink(frame.size()) {
            if let Ok(crop) = geometry.crop_box() {
                info!(
                    "📐 接收端尺寸 {}, 裁剪框 ({}, {}, {}, {})",
                    frame.size(),
                    crop.x,
                    crop.y,
                    crop.width,
                    crop.height
                );
            }
        }
        self.shared.publish_frame(frame)
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }
}

/// 管线监督者: 启动、停止与错误上报
/// Pipeline supervisor
///
/// 启动时先拉起推理与渲染两个工作线程,再启动媒体图。
/// 以下任一情况都走同一套停止流程:
/// 流结束 / 媒体图错误 / 工作线程失败 / 显式停止请求。
/// 停止流程: 停媒体图 → 清运行标志并广播 → 等待两个工作线程退出。
use super::geometry::{CropBox, Letterbox};
use super::inference::InferenceStage;
use super::render::{RenderStage, RenderStrategy};
use super::slot::{FramePublisher, PipelineStats, SharedState, StatsSnapshot};
use super::StageReport;
use crate::config::PipelineConfig;
use crate::detection::engine::PoseEngine;
use crate::display::DisplaySink;
use crate::error::{PipelineError, Result, Stage};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

// ========== 媒体图接口 ==========

/// 媒体图总线消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    EndOfStream,
    Warning { message: String, debug: String },
    Error { message: String, debug: String },
}

/// 外部媒体图 (采集、解码、显示)
///
/// `start` 之后,采集线程通过 `publisher` 发布每一帧,通过 `bus` 上报状态。
pub trait MediaGraph: Send {
    fn start(&mut self, publisher: FramePublisher, bus: Sender<BusMessage>) -> anyhow::Result<()>;

    /// 停止采集; 返回前不得再发布帧
    fn stop(&mut self);
}

impl<T: MediaGraph + ?Sized> MediaGraph for Box<T> {
    fn start(&mut self, publisher: FramePublisher, bus: Sender<BusMessage>) -> anyhow::Result<()> {
        (**self).start(publisher, bus)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

// ========== 停止原因与汇总 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Requested,
}

/// 正常停止后的汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub stop_reason: StopReason,
    pub stats: StatsSnapshot,
    pub stages: Vec<StageReport>,
}

enum Outcome {
    Stopped(StopReason),
    MediaGraph { message: String, debug: String },
    WorkerFailed(Stage),
}

/// 可跨线程使用的停止句柄
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        // 已有未处理的停止请求时忽略
        let _ = self.tx.try_send(());
    }
}

/// 工作线程出错或 panic 时通知监督者; 正常退出前解除
struct FailureNotice {
    stage: Stage,
    tx: Sender<Stage>,
    armed: bool,
}

impl Drop for FailureNotice {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.tx.send(self.stage);
        }
    }
}

/// 继承当前 tracing dispatcher 的具名线程
fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

type Worker = JoinHandle<Result<StageReport>>;

fn join_worker(handle: Option<Worker>, stage: Stage) -> Option<Result<StageReport>> {
    let handle = handle?;
    Some(match handle.join() {
        Ok(result) => result,
        Err(_) => {
            error!("❌ {} 线程 panic", stage);
            Err(PipelineError::WorkerPanicked(stage))
        }
    })
}

// ========== 监督者 ==========

pub struct PipelineSupervisor {
    config: PipelineConfig,
}

impl PipelineSupervisor {
    /// 配置非法时直接报错
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 拉起两个工作线程并启动媒体图
    pub fn start<G, E, R, K>(self, graph: G, engine: E, strategy: R, sink: K) -> Result<RunningPipeline>
    where
        G: MediaGraph + 'static,
        E: PoseEngine + 'static,
        R: RenderStrategy + 'static,
        K: DisplaySink + 'static,
    {
        let inference_size = self.config.inference_size;
        if engine.input_size() != inference_size {
            return Err(PipelineError::Config(format!(
                "engine expects {} input, pipeline is configured for {}",
                engine.input_size(),
                inference_size
            )));
        }

        let letterbox = Letterbox::new(self.config.source_size, inference_size);
        let shared = Arc::new(SharedState::new(letterbox));
        shared.start();

        let (bus_tx, bus_rx) = unbounded();
        let (fail_tx, fail_rx) = bounded(2);
        let (stop_tx, stop_rx) = bounded(1);

        let mut running = RunningPipeline {
            shared: Arc::clone(&shared),
            graph: Box::new(graph),
            inference: None,
            render: None,
            bus_rx,
            fail_rx,
            stop_rx,
            stop_tx,
            finished: false,
        };

        let inference = Self::spawn_worker(&shared, &fail_tx, Stage::Inference, "pose-inference", move |s| {
            InferenceStage::new(engine).run(s)
        });
        match inference {
            Ok(handle) => running.inference = Some(handle),
            Err(e) => return Err(running.abort(e.into())),
        }
        let render = Self::spawn_worker(&shared, &fail_tx, Stage::Render, "pose-render", move |s| {
            RenderStage::new(strategy, sink).run(s)
        });
        match render {
            Ok(handle) => running.render = Some(handle),
            Err(e) => return Err(running.abort(e.into())),
        }

        let publisher = FramePublisher::new(Arc::clone(&shared));
        if let Err(e) = running.graph.start(publisher, bus_tx) {
            error!("❌ 媒体图启动失败: {:#}", e);
            return Err(running.abort(PipelineError::MediaGraph {
                message: "failed to start media graph".into(),
                debug: format!("{:#}", e),
            }));
        }

        info!(
            "🚀 管线已启动: 采集 {} → 推理 {} (内容 {})",
            self.config.source_size,
            inference_size,
            letterbox.scaled_size()
        );
        Ok(running)
    }

    fn spawn_worker<F>(
        shared: &Arc<SharedState>,
        fail_tx: &Sender<Stage>,
        stage: Stage,
        name: &str,
        body: F,
    ) -> io::Result<Worker>
    where
        F: FnOnce(&SharedState) -> Result<StageReport> + Send + 'static,
    {
        let shared = Arc::clone(shared);
        let mut notice = FailureNotice {
            stage,
            tx: fail_tx.clone(),
            armed: true,
        };
        spawn_thread(name, move || {
            let _live = shared.stats().worker_guard();
            let result = body(&shared);
            if let Err(e) = &result {
                error!("❌ {} 线程失败: {}", stage, e);
            } else {
                notice.armed = false;
            }
            drop(notice);
            result
        })
    }
}

// ========== 运行中的管线 ==========

pub struct RunningPipeline {
    shared: Arc<SharedState>,
    graph: Box<dyn MediaGraph>,
    inference: Option<Worker>,
    render: Option<Worker>,
    bus_rx: Receiver<BusMessage>,
    fail_rx: Receiver<Stage>,
    stop_rx: Receiver<()>,
    stop_tx: Sender<()>,
    finished: bool,
}

impl RunningPipeline {
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// 推理画面在采集画面中的裁剪框 (首帧到达前不可用)
    pub fn crop_box(&self) -> Result<CropBox> {
        self.shared.geometry().crop_box()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats().snapshot()
    }

    /// 计数器句柄,管线停止后仍可读取
    pub fn stats_handle(&self) -> Arc<PipelineStats> {
        Arc::clone(self.shared.stats())
    }

    /// 处理总线消息,直到流结束、出错或收到停止请求
    pub fn wait(mut self) -> Result<PipelineReport> {
        let mut bus_rx = self.bus_rx.clone();
        let mut fail_rx = self.fail_rx.clone();
        let outcome = loop {
            select! {
                recv(bus_rx) -> msg => match msg {
                    Ok(BusMessage::EndOfStream) => {
                        info!("🏁 视频流结束");
                        break Outcome::Stopped(StopReason::EndOfStream);
                    }
                    Ok(BusMessage::Warning { message, debug: details }) => {
                        warn!("⚠️  媒体图警告: {} ({})", message, details);
                    }
                    Ok(BusMessage::Error { message, debug: details }) => {
                        error!("❌ 媒体图错误: {} ({})", message, details);
                        break Outcome::MediaGraph { message, debug: details };
                    }
                    Err(_) => {
                        debug!("媒体图总线已关闭");
                        bus_rx = never();
                    }
                },
                recv(fail_rx) -> stage => match stage {
                    Ok(stage) => break Outcome::WorkerFailed(stage),
                    Err(_) => fail_rx = never(),
                },
                recv(self.stop_rx) -> _ => {
                    info!("🛑 收到停止请求");
                    break Outcome::Stopped(StopReason::Requested);
                },
            }
        };
        self.finish(outcome)
    }

    /// 立即停止
    pub fn stop(mut self) -> Result<PipelineReport> {
        self.finish(Outcome::Stopped(StopReason::Requested))
    }

    /// 启动中途失败: 回收已拉起的线程后返回原错误
    fn abort(&mut self, err: PipelineError) -> PipelineError {
        let _ = self.finish(Outcome::Stopped(StopReason::Requested));
        err
    }

    fn finish(&mut self, outcome: Outcome) -> Result<PipelineReport> {
        if self.finished {
            return Err(PipelineError::Config("pipeline already stopped".into()));
        }
        self.finished = true;

        self.graph.stop();
        self.shared.shutdown();
        let inference = join_worker(self.inference.take(), Stage::Inference);
        let render = join_worker(self.render.take(), Stage::Render);

        let stats = self.shared.stats().snapshot();
        info!(
            "📊 管线已停止: 采集{}帧 (丢弃{}) | 推理{}次 (丢弃{}) | 渲染{}次",
            stats.frames_captured,
            stats.frames_dropped,
            stats.inferences,
            stats.results_dropped,
            stats.renders
        );

        let mut stages = Vec::new();
        let mut failures = Vec::new();
        for result in [inference, render].into_iter().flatten() {
            match result {
                Ok(report) => stages.push(report),
                Err(e) => failures.push(e),
            }
        }

        // 先报告触发停止的那个阶段
        if let Outcome::WorkerFailed(stage) = &outcome {
            if let Some(i) = failures.iter().position(|e| e.stage() == Some(*stage)) {
                return Err(failures.swap_remove(i));
            }
        }
        if let Some(e) = failures.into_iter().next() {
            return Err(e);
        }

        match outcome {
            Outcome::MediaGraph { message, debug } => Err(PipelineError::MediaGraph { message, debug }),
            Outcome::Stopped(stop_reason) => Ok(PipelineReport {
                stop_reason,
                stats,
                stages,
            }),
            Outcome::WorkerFailed(stage) => Err(PipelineError::WorkerPanicked(stage)),
        }
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.finish(Outcome::Stopped(StopReason::Requested));
        }
    }
}

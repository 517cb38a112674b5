use crossbeam_channel::Sender;
use parking_lot::Mutex;
use pose_camera_rs::detection::{FnEngine, ReplayEngine, TwoPhase};
use pose_camera_rs::display::{DisplaySink, DisplaySurface};
use pose_camera_rs::input::{Frame, SyntheticConfig, SyntheticGraph};
use pose_camera_rs::pipeline::{
    BusMessage, FramePublisher, MediaGraph, PipelineSupervisor, RenderContext, RenderOutput,
    RenderStrategy, RunningPipeline, Size, StatefulRender, StopReason,
};
use pose_camera_rs::renderer::PoseOverlay;
use pose_camera_rs::{InferenceResult, PipelineConfig, PipelineError, Pose, Stage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SOURCE: Size = Size::new(8, 8);
const INFERENCE: Size = Size::new(4, 4);

fn config() -> PipelineConfig {
    PipelineConfig {
        source_size: SOURCE,
        inference_size: INFERENCE,
        ..PipelineConfig::default()
    }
}

/// 由测试手动驱动的媒体图
#[derive(Clone, Default)]
struct ManualGraph {
    handles: Arc<Mutex<Option<(FramePublisher, Sender<BusMessage>)>>>,
    stopped: Arc<AtomicBool>,
    fail_start: bool,
}

impl ManualGraph {
    fn publish(&self, tag: u8) -> bool {
        let handles = self.handles.lock();
        let (publisher, _) = handles.as_ref().unwrap();
        publisher.publish(Frame::packed(vec![tag; 48], 4, 4).unwrap())
    }

    fn send(&self, msg: BusMessage) {
        let handles = self.handles.lock();
        handles.as_ref().unwrap().1.send(msg).unwrap();
    }
}

impl MediaGraph for ManualGraph {
    fn start(&mut self, publisher: FramePublisher, bus: Sender<BusMessage>) -> anyhow::Result<()> {
        anyhow::ensure!(!self.fail_start, "no camera attached");
        *self.handles.lock() = Some((publisher, bus));
        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct CollectSink(Arc<Mutex<Vec<RenderOutput>>>);

impl DisplaySink for CollectSink {
    fn present(&mut self, output: RenderOutput) -> anyhow::Result<()> {
        self.0.lock().push(output);
        Ok(())
    }
}

fn echo_engine() -> FnEngine<impl FnMut(&[u8]) -> anyhow::Result<Vec<Pose>> + Send> {
    FnEngine::new(INFERENCE, |t: &[u8]| Ok(vec![Pose::new(t[0] as f32 / 255.0)]))
}

fn echo_strategy() -> impl RenderStrategy {
    StatefulRender::new((), |s, r: &InferenceResult, _: &RenderContext| {
        let score = r.poses.first().map(|p| p.score).unwrap_or(0.0);
        Ok((RenderOutput::overlay(format!("{:.3}", score)), s))
    })
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

fn start_manual(graph: &ManualGraph, sink: &CollectSink) -> RunningPipeline {
    PipelineSupervisor::new(config())
        .unwrap()
        .start(graph.clone(), echo_engine(), echo_strategy(), sink.clone())
        .unwrap()
}

#[test]
fn frames_flow_to_the_sink() {
    let graph = ManualGraph::default();
    let sink = CollectSink::default();
    let running = start_manual(&graph, &sink);

    graph.publish(255);
    wait_until(|| running.stats().renders >= 1);

    let report = running.stop().unwrap();
    assert_eq!(report.stop_reason, StopReason::Requested);
    assert_eq!(report.stats.live_workers, 0);
    assert_eq!(report.stages.len(), 2);
    assert_eq!(sink.0.lock()[0].overlay.as_deref(), Some("1.000"));
    assert!(graph.stopped.load(Ordering::SeqCst));
}

#[test]
fn crop_box_available_after_first_frame() {
    let graph = ManualGraph::default();
    let running = start_manual(&graph, &CollectSink::default());
    assert!(matches!(running.crop_box(), Err(PipelineError::GeometryUnavailable)));

    graph.publish(1);
    // 8x8 → 4x4, 无需补边
    assert_eq!(running.crop_box().unwrap().as_tuple(), (0, 0, 4, 4));
    running.stop().unwrap();
}

#[test]
fn end_of_stream_stops_cleanly() {
    let graph = ManualGraph::default();
    let running = start_manual(&graph, &CollectSink::default());
    let stats = running.stats_handle();

    graph.send(BusMessage::Warning {
        message: "late frame".into(),
        debug: "test".into(),
    });
    graph.send(BusMessage::EndOfStream);

    let report = running.wait().unwrap();
    assert_eq!(report.stop_reason, StopReason::EndOfStream);
    assert_eq!(stats.snapshot().live_workers, 0);
}

#[test]
fn media_graph_error_stops_pipeline() {
    let graph = ManualGraph::default();
    let running = start_manual(&graph, &CollectSink::default());
    let stats = running.stats_handle();

    graph.send(BusMessage::Error {
        message: "camera unplugged".into(),
        debug: "v4l2src0".into(),
    });

    let err = running.wait().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MediaGraph { ref message, ref debug }
            if message == "camera unplugged" && debug == "v4l2src0"
    ));
    assert_eq!(err.stage(), Some(Stage::MediaGraph));
    assert_eq!(stats.snapshot().live_workers, 0);
    assert!(graph.stopped.load(Ordering::SeqCst));
}

#[test]
fn stop_handle_from_another_thread() {
    let graph = ManualGraph::default();
    let running = start_manual(&graph, &CollectSink::default());
    let stop = running.stop_handle();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        stop.stop();
        stop.stop();
    });
    let report = running.wait().unwrap();
    assert_eq!(report.stop_reason, StopReason::Requested);
    assert_eq!(report.stats.live_workers, 0);
}

#[test]
fn inference_failure_is_reported_with_stage() {
    let graph = ManualGraph::default();
    let engine = FnEngine::new(INFERENCE, |_: &[u8]| -> anyhow::Result<Vec<Pose>> {
        anyhow::bail!("accelerator disconnected")
    });
    let running = PipelineSupervisor::new(config())
        .unwrap()
        .start(graph.clone(), engine, echo_strategy(), CollectSink::default())
        .unwrap();
    let stats = running.stats_handle();

    graph.publish(1);
    let err = running.wait().unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Inference));
    assert!(err.to_string().contains("accelerator disconnected"));
    assert_eq!(stats.snapshot().live_workers, 0);
}

#[test]
fn render_panic_is_reported() {
    struct Explode;
    impl RenderStrategy for Explode {
        fn render(&mut self, _: &InferenceResult, _: &RenderContext) -> anyhow::Result<RenderOutput> {
            panic!("render callback exploded");
        }
    }

    let graph = ManualGraph::default();
    let running = PipelineSupervisor::new(config())
        .unwrap()
        .start(graph.clone(), echo_engine(), Explode, CollectSink::default())
        .unwrap();
    let stats = running.stats_handle();

    graph.publish(1);
    let err = running.wait().unwrap_err();
    assert!(matches!(err, PipelineError::WorkerPanicked(Stage::Render)));
    assert_eq!(stats.snapshot().live_workers, 0);
}

#[test]
fn engine_size_mismatch_is_config_error() {
    let engine = FnEngine::new(Size::new(3, 3), |_: &[u8]| Ok(Vec::new()));
    let result = PipelineSupervisor::new(config()).unwrap().start(
        ManualGraph::default(),
        engine,
        echo_strategy(),
        CollectSink::default(),
    );
    assert!(matches!(result, Err(PipelineError::Config(_))));
}

#[test]
fn invalid_config_is_rejected() {
    let bad = PipelineConfig {
        frame_rate: 0,
        ..config()
    };
    assert!(matches!(PipelineSupervisor::new(bad), Err(PipelineError::Config(_))));
}

#[test]
fn graph_start_failure_joins_workers() {
    let graph = ManualGraph {
        fail_start: true,
        ..ManualGraph::default()
    };
    let result = PipelineSupervisor::new(config()).unwrap().start(
        graph.clone(),
        echo_engine(),
        echo_strategy(),
        CollectSink::default(),
    );
    match result {
        Err(PipelineError::MediaGraph { debug, .. }) => assert!(debug.contains("no camera attached")),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("start should fail"),
    }
    assert!(graph.stopped.load(Ordering::SeqCst));
}

#[test]
fn dropping_running_pipeline_joins_workers() {
    let graph = ManualGraph::default();
    let running = start_manual(&graph, &CollectSink::default());
    let stats = running.stats_handle();
    wait_until(|| stats.snapshot().live_workers == 2);
    drop(running);
    assert_eq!(stats.snapshot().live_workers, 0);
}

#[test]
fn synthetic_source_end_to_end() {
    let config = PipelineConfig {
        source_size: Size::new(64, 48),
        inference_size: Size::new(32, 32),
        frame_rate: 200,
        ..PipelineConfig::default()
    };
    let display = DisplaySurface::new();
    let graph = SyntheticGraph::new(SyntheticConfig {
        source_size: config.source_size,
        inference_size: config.inference_size,
        frame_rate: config.frame_rate,
        row_padding: 4,
        frame_limit: Some(40),
        seed: Some(3),
    })
    .with_display(display.clone());
    let engine = TwoPhase::new(ReplayEngine::builtin(config.inference_size).with_seed(3));
    let overlay = PoseOverlay::new(config.keypoint_threshold, config.pose_score_threshold);

    let running = PipelineSupervisor::new(config)
        .unwrap()
        .start(graph, engine, overlay, display.clone())
        .unwrap();
    let report = running.wait().unwrap();

    assert_eq!(report.stop_reason, StopReason::EndOfStream);
    assert_eq!(report.stats.frames_captured, 40);
    assert_eq!(report.stats.live_workers, 0);
    assert!(report.stats.inferences >= 1);
    assert!(report.stats.inferences <= 40);
    // 停止时槽中最多还剩一帧未推理
    let s = report.stats;
    assert!(s.inferences + s.frames_dropped <= s.frames_captured);
    assert!(s.frames_captured - s.frames_dropped - s.inferences <= 1);
    assert!(display.last_frame().is_some());
}

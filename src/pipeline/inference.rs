/// 推理线程模块
/// Inference stage worker
use super::slot::SharedState;
use super::{FpsCounter, StageReport, StageState};
use crate::detection::engine::PoseEngine;
use crate::detection::types::InferenceResult;
use crate::error::{PipelineError, Result, Stage};
use crate::input::frame::Frame;
use crate::input::normalize::normalize;
use std::time::Instant;
use tracing::{debug, info, trace};

/// 推理阶段: 取最新帧 → 步长归一化 → 推理 → 发布结果
pub struct InferenceStage<E> {
    engine: E,
    state: StageState,
    processed: u64,
}

impl<E: PoseEngine> InferenceStage<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: StageState::Idle,
            processed: 0,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// 工作循环,直到停止或出错
    ///
    /// 推理错误是致命的,不重试,带上阶段信息返回给 supervisor。
    pub fn run(&mut self, shared: &SharedState) -> Result<StageReport> {
        info!("✅ 推理线程已启动 (模型输入 {})", self.engine.input_size());
        let outcome = self.run_loop(shared);
        self.set_state(StageState::Stopped);
        match outcome {
            Ok(()) => {
                info!("🛑 推理线程退出, 共推理 {} 帧", self.processed);
                Ok(StageReport {
                    stage: Stage::Inference,
                    processed: self.processed,
                })
            }
            Err(e) => Err(e.in_stage(Stage::Inference)),
        }
    }

    fn run_loop(&mut self, shared: &SharedState) -> Result<()> {
        let mut fps = FpsCounter::new();
        loop {
            self.set_state(StageState::WaitingForFrame);
            let Some(frame) = shared.wait_frame() else {
                return Ok(());
            };

            self.set_state(StageState::RunningInference);
            let result = self.process(&frame)?;
            let latency_ms = result.latency_ms;

            self.set_state(StageState::Publishing);
            if shared.publish_result(result) {
                trace!("渲染未跟上,丢弃旧结果");
            }
            self.processed += 1;

            if let Some((count, rate)) = fps.tick() {
                info!(
                    "📊 推理统计: 处理{}帧 | 实际{:.1}fps | 每帧{:.1}ms",
                    count, rate, latency_ms
                );
            }
        }
    }

    /// 处理单帧,延迟以本线程测得的墙钟时间为准
    fn process(&mut self, frame: &Frame) -> Result<InferenceResult> {
        let expected = self.engine.input_size();
        if frame.size() != expected {
            return Err(PipelineError::InvalidFrame(format!(
                "frame is {}, model expects {}",
                frame.size(),
                expected
            )));
        }

        let tensor = normalize(frame)?;
        if self.processed == 0 {
            info!(
                "✅ 推理线程收到第一帧: {} 步长 {} 字节 ({})",
                frame.size(),
                frame.meta().stride,
                if tensor.is_borrowed() { "零拷贝" } else { "逐行复制" }
            );
        }

        let start = Instant::now();
        let poses = self
            .engine
            .infer(tensor.as_bytes())
            .map_err(|e| PipelineError::Inference(e.into()))?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Some(reported) = self.engine.last_latency_ms() {
            debug!("引擎自报耗时 {:.2}ms, 实测 {:.2}ms", reported, latency_ms);
        }

        Ok(InferenceResult { poses, latency_ms })
    }

    fn set_state(&mut self, state: StageState) {
        trace!("推理线程 {:?} → {:?}", self.state, state);
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::engine::FnEngine;
    use crate::detection::types::Pose;
    use crate::input::frame::FrameMeta;
    use crate::pipeline::geometry::{Letterbox, Size};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn shared() -> Arc<SharedState> {
        let state = Arc::new(SharedState::new(Letterbox::new(Size::new(4, 4), Size::new(2, 2))));
        state.start();
        state
    }

    #[test]
    fn test_only_latest_frame_is_inferred() {
        let state = shared();
        for tag in 1..=3u8 {
            state.publish_frame(Frame::packed(vec![tag; 12], 2, 2).unwrap());
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let engine = FnEngine::new(Size::new(2, 2), move |t: &[u8]| {
            log.lock().push(t[0]);
            Ok(vec![Pose::new(0.5)])
        });

        let worker = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                let mut stage = InferenceStage::new(engine);
                let report = stage.run(&state);
                (report, stage.state())
            })
        };

        let mut waited = 0;
        while state.stats().snapshot().inferences == 0 && waited < 200 {
            thread::sleep(Duration::from_millis(5));
            waited += 1;
        }
        state.shutdown();
        let (report, final_state) = worker.join().unwrap();

        assert_eq!(*seen.lock(), vec![3]);
        assert_eq!(report.unwrap().processed, 1);
        assert_eq!(final_state, StageState::Stopped);
        assert_eq!(state.wait_result(), None);
    }

    #[test]
    fn test_padded_frame_reaches_engine_packed() {
        let state = shared();
        let meta = FrameMeta { width: 2, height: 2, stride: 8, plane_count: 1 };
        let data = vec![1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0];
        state.publish_frame(Frame::new(data, meta).unwrap());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let engine = FnEngine::new(Size::new(2, 2), move |t: &[u8]| {
            log.lock().extend_from_slice(t);
            Ok(Vec::new())
        });
        let worker = {
            let state = Arc::clone(&state);
            thread::spawn(move || InferenceStage::new(engine).run(&state))
        };
        while state.stats().snapshot().inferences == 0 {
            thread::sleep(Duration::from_millis(2));
        }
        state.shutdown();
        worker.join().unwrap().unwrap();
        assert_eq!(*seen.lock(), (1..=12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_engine_error_is_fatal() {
        let state = shared();
        state.publish_frame(Frame::packed(vec![0u8; 12], 2, 2).unwrap());
        let engine = FnEngine::new(Size::new(2, 2), |_: &[u8]| -> anyhow::Result<Vec<Pose>> {
            anyhow::bail!("device lost")
        });
        let err = InferenceStage::new(engine).run(&state).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Inference));
        assert!(err.to_string().contains("device lost"));
    }

    #[test]
    fn test_wrong_frame_size_is_fatal() {
        let state = shared();
        state.publish_frame(Frame::packed(vec![0u8; 27], 3, 3).unwrap());
        let engine = FnEngine::new(Size::new(2, 2), |_: &[u8]| Ok(Vec::new()));
        let err = InferenceStage::new(engine).run(&state).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Inference));
    }

    #[test]
    fn test_multi_plane_frame_is_fatal() {
        let state = shared();
        let meta = FrameMeta { width: 2, height: 2, stride: 6, plane_count: 3 };
        state.publish_frame(Frame::new(vec![0u8; 12], meta).unwrap());
        let engine = FnEngine::new(Size::new(2, 2), |_: &[u8]| Ok(Vec::new()));
        let err = InferenceStage::new(engine).run(&state).unwrap_err();
        assert!(err.to_string().contains("unsupported frame layout"));
    }
}

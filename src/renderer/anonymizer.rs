//! 匿名化: 画面无人一段时间后锁定背景,之后只显示骨架

use super::{draw_pose, SvgCanvas};
use crate::detection::types::InferenceResult;
use crate::pipeline::render::{RenderContext, RenderOutput, RenderStrategy};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const WAITING_MESSAGE: &str = "Waiting for everyone to leave the frame...";

pub struct Anonymizer {
    background_delay: Duration,
    keypoint_threshold: f32,
    pose_score_threshold: f32,
    background_locked: bool,
    /// 最近一次画面里有人的时刻 (首次渲染时初始化)
    timer: Option<Instant>,
}

impl Anonymizer {
    pub fn new(background_delay: Duration, keypoint_threshold: f32, pose_score_threshold: f32) -> Self {
        Self {
            background_delay,
            keypoint_threshold,
            pose_score_threshold,
            background_locked: false,
            timer: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.background_locked
    }
}

impl RenderStrategy for Anonymizer {
    fn render(&mut self, result: &InferenceResult, ctx: &RenderContext) -> anyhow::Result<RenderOutput> {
        let mut canvas = SvgCanvas::new(ctx.source_size);
        let people: Vec<_> = result
            .poses
            .iter()
            .filter(|pose| pose.score >= self.pose_score_threshold)
            .collect();

        if !self.background_locked {
            canvas.shadow_text(10.0, 20.0, WAITING_MESSAGE, 20);
            let timer = *self.timer.get_or_insert(ctx.now);
            if !people.is_empty() {
                // 画面里还有人,重新计时
                debug!("画面中仍有 {} 人,重新计时", people.len());
                self.timer = Some(ctx.now);
            } else if ctx.now.saturating_duration_since(timer) > self.background_delay {
                self.background_locked = true;
                info!("🔒 背景已锁定");
            }
        }

        for pose in people {
            draw_pose(&mut canvas, pose, ctx, self.keypoint_threshold, "yellow");
        }

        Ok(RenderOutput {
            overlay: Some(canvas.finish()),
            frame: None,
            freeze: self.background_locked,
        })
    }
}

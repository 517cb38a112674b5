//! 骨架叠加层: 每个身份一种颜色

use super::{draw_pose, SvgCanvas};
use crate::detection::tracker::{color_hex, id_to_color, IdentityTracker};
use crate::detection::types::InferenceResult;
use crate::pipeline::render::{RenderContext, RenderOutput, RenderStrategy};

pub struct PoseOverlay {
    tracker: IdentityTracker,
    keypoint_threshold: f32,
    pose_score_threshold: f32,
}

impl PoseOverlay {
    pub fn new(keypoint_threshold: f32, pose_score_threshold: f32) -> Self {
        Self {
            tracker: IdentityTracker::new(keypoint_threshold),
            keypoint_threshold,
            pose_score_threshold,
        }
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }
}

impl RenderStrategy for PoseOverlay {
    fn render(&mut self, result: &InferenceResult, ctx: &RenderContext) -> anyhow::Result<RenderOutput> {
        let min_score = self.pose_score_threshold;
        let tracked = self.tracker.assign(
            result
                .poses
                .iter()
                .filter(|pose| pose.score >= min_score)
                .cloned(),
        );

        let mut canvas = SvgCanvas::new(ctx.source_size);
        for t in tracked {
            let color = color_hex(id_to_color(t.id));
            draw_pose(&mut canvas, &t.pose, ctx, self.keypoint_threshold, &color);
            let label = ctx.crop_box.to_source(t.centroid, ctx.source_size);
            canvas.shadow_text(label.x + 8.0, label.y, &format!("#{}", t.id), 16);
        }

        let fps = if result.latency_ms > 0.0 {
            1000.0 / result.latency_ms
        } else {
            0.0
        };
        canvas.shadow_text(
            10.0,
            20.0,
            &format!(
                "推理 {:.2}ms ({:.1} fps) | {} 人",
                result.latency_ms,
                fps,
                tracked.len()
            ),
            20,
        );

        Ok(RenderOutput::overlay(canvas.finish()))
    }
}

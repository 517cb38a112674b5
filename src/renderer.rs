/// 渲染策略 (Render Strategies)
///
/// 运行在渲染线程里,把推理结果画成 SVG 叠加层:
/// - PoseOverlay: 骨架叠加,每个身份一种颜色
/// - Anonymizer:  无人时锁定背景,只显示骨架
/// - Synthesizer: 手腕高度演奏音符
mod anonymizer;
mod overlay;
pub mod svg;
mod synthesizer;

pub use anonymizer::Anonymizer;
pub use overlay::PoseOverlay;
pub use svg::SvgCanvas;
pub use synthesizer::{LoggingNoteSink, Note, NoteEvent, NoteSink, Synthesizer, Voice, IDENTITIES};

use crate::detection::types::{KeypointType, Point, Pose};
use crate::pipeline::render::RenderContext;
use crate::SKELETON;
use std::collections::BTreeMap;

/// 关键点圆点半径
const KEYPOINT_RADIUS: f32 = 5.0;
/// 骨架线宽
const BONE_WIDTH: f32 = 2.0;

/// 在画布上绘制一个姿态 (推理坐标经裁剪框映射回采集坐标)
pub fn draw_pose(canvas: &mut SvgCanvas, pose: &Pose, ctx: &RenderContext, threshold: f32, color: &str) {
    let mut xys: BTreeMap<KeypointType, Point> = BTreeMap::new();
    for (label, kp) in pose.confident(threshold) {
        let p = ctx.crop_box.to_source(kp.point, ctx.source_size);
        canvas.circle(p.x, p.y, KEYPOINT_RADIUS, color, "white");
        xys.insert(*label, p);
    }

    // 绘制骨架连接 (两端都可信才画)
    for (a, b) in &SKELETON {
        if let (Some(pa), Some(pb)) = (xys.get(a), xys.get(b)) {
            canvas.line(pa.x, pa.y, pb.x, pb.y, color, BONE_WIDTH);
        }
    }
}

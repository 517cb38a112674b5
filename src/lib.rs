// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 管线配置参数
pub mod detection; // 姿态推理与身份跟踪
pub mod display; // 显示端
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod pipeline; // 帧处理流水线
pub mod renderer; // 渲染策略

pub use crate::config::PipelineConfig;
pub use crate::detection::{
    IdentityTracker, InferenceResult, KeypointType, Pose, PoseEngine, ReplayEngine, TrackedPose,
    TwoPhase, TwoPhaseEngine,
};
pub use crate::display::{DisplaySink, DisplaySurface};
pub use crate::error::{PipelineError, Result, Stage};
pub use crate::input::{Frame, FrameMeta, SyntheticConfig, SyntheticGraph};
pub use crate::pipeline::{
    BusMessage, CropBox, MediaGraph, PipelineReport, PipelineSupervisor, RenderContext,
    RenderOutput, RenderStrategy, RunningPipeline, Size, StatefulRender, StopReason,
};

use crate::detection::types::KeypointType as K;

/// 时间字符串 (用于快照文件名)
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

/// 骨架连接 (19 条边)
pub const SKELETON: [(KeypointType, KeypointType); 19] = [
    (K::Nose, K::LeftEye),
    (K::Nose, K::RightEye),
    (K::Nose, K::LeftEar),
    (K::Nose, K::RightEar),
    (K::LeftEar, K::LeftEye),
    (K::RightEar, K::RightEye),
    (K::LeftEye, K::RightEye),
    (K::LeftShoulder, K::RightShoulder),
    (K::LeftShoulder, K::LeftElbow),
    (K::LeftShoulder, K::LeftHip),
    (K::RightShoulder, K::RightElbow),
    (K::RightShoulder, K::RightHip),
    (K::LeftElbow, K::LeftWrist),
    (K::RightElbow, K::RightWrist),
    (K::LeftHip, K::RightHip),
    (K::LeftHip, K::LeftKnee),
    (K::RightHip, K::RightKnee),
    (K::LeftKnee, K::LeftAnkle),
    (K::RightKnee, K::RightAnkle),
];

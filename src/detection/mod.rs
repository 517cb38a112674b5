/// 姿态系统 (Pose System)
///
/// - types:   姿态数据结构
/// - engine:  推理引擎接口与模型张量约定
/// - replay:  回放引擎
/// - tracker: 跨帧身份跟踪
pub mod engine;
pub mod replay;
pub mod tracker;
pub mod types;

pub use engine::{validate_input_shape, FnEngine, OutputTensors, PoseEngine, TwoPhase, TwoPhaseEngine};
pub use replay::ReplayEngine;
pub use tracker::{id_to_color, IdentityTracker, TrackedPose};
pub use types::{InferenceResult, Keypoint, KeypointType, Point, Pose};

/// 视频输入系统 (Video Input System)
///
/// - Frame:          原始帧与布局信息
/// - normalize:      步长归一化 (去行尾填充)
/// - SyntheticGraph: 合成视频源,实现 MediaGraph
pub mod frame;
pub mod normalize;
pub mod synthetic;

pub use frame::{Frame, FrameMeta, BYTES_PER_PIXEL};
pub use normalize::{normalize, NormalizedTensor};
pub use synthetic::{SyntheticConfig, SyntheticGraph};

/// 姿态推理引擎接口
/// Pose inference engine interface
///
/// 推理本身对管线是不透明的: 输入紧密排列的RGB字节,输出姿态列表。
/// 支持两种形态:
/// - 一次调用 `infer`,延迟由推理线程计时
/// - 两阶段 `run_inference` + `parse_output`,引擎自己报告延迟
use super::types::{Keypoint, KeypointType, Point, Pose};
use crate::error::{PipelineError, Result};
use crate::pipeline::geometry::Size;
use ndarray::{s, Array1, Array2, Array3};

// ========== 引擎接口 ==========

/// 一次调用的推理引擎
pub trait PoseEngine: Send {
    /// 模型输入尺寸
    fn input_size(&self) -> Size;

    /// 对 `width * height * 3` 字节的张量做推理
    fn infer(&mut self, tensor: &[u8]) -> anyhow::Result<Vec<Pose>>;

    /// 引擎自报的上一次推理耗时 (毫秒)
    fn last_latency_ms(&self) -> Option<f64> {
        None
    }
}

/// 两阶段推理引擎 (先运行,再解析输出)
pub trait TwoPhaseEngine: Send {
    fn input_size(&self) -> Size;

    /// 运行推理,返回耗时 (毫秒)
    fn run_inference(&mut self, tensor: &[u8]) -> anyhow::Result<f64>;

    /// 解析上一次推理的输出
    fn parse_output(&mut self) -> anyhow::Result<(Vec<Pose>, f64)>;
}

/// 把两阶段引擎适配成 `PoseEngine`
pub struct TwoPhase<E> {
    engine: E,
    last_latency_ms: Option<f64>,
}

impl<E: TwoPhaseEngine> TwoPhase<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            last_latency_ms: None,
        }
    }
}

impl<E: TwoPhaseEngine> PoseEngine for TwoPhase<E> {
    fn input_size(&self) -> Size {
        self.engine.input_size()
    }

    fn infer(&mut self, tensor: &[u8]) -> anyhow::Result<Vec<Pose>> {
        self.engine.run_inference(tensor)?;
        let (poses, latency_ms) = self.engine.parse_output()?;
        self.last_latency_ms = Some(latency_ms);
        Ok(poses)
    }

    fn last_latency_ms(&self) -> Option<f64> {
        self.last_latency_ms
    }
}

/// 闭包引擎 (测试与简单集成用)
pub struct FnEngine<F> {
    size: Size,
    f: F,
}

impl<F> FnEngine<F>
where
    F: FnMut(&[u8]) -> anyhow::Result<Vec<Pose>> + Send,
{
    pub fn new(size: Size, f: F) -> Self {
        Self { size, f }
    }
}

impl<F> PoseEngine for FnEngine<F>
where
    F: FnMut(&[u8]) -> anyhow::Result<Vec<Pose>> + Send,
{
    fn input_size(&self) -> Size {
        self.size
    }

    fn infer(&mut self, tensor: &[u8]) -> anyhow::Result<Vec<Pose>> {
        (self.f)(tensor)
    }
}

impl<T: PoseEngine + ?Sized> PoseEngine for Box<T> {
    fn input_size(&self) -> Size {
        (**self).input_size()
    }

    fn infer(&mut self, tensor: &[u8]) -> anyhow::Result<Vec<Pose>> {
        (**self).infer(tensor)
    }

    fn last_latency_ms(&self) -> Option<f64> {
        (**self).last_latency_ms()
    }
}

// ========== 模型张量约定 ==========

/// 检查模型输入形状 `[1, height, width, 3]`,返回输入尺寸
pub fn validate_input_shape(shape: &[usize]) -> Result<Size> {
    match *shape {
        [1, h, w, 3] if h > 0 && w > 0 => Ok(Size::new(w as u32, h as u32)),
        _ => Err(PipelineError::ModelInputShape(shape.to_vec())),
    }
}

/// 模型的四个输出张量
///
/// - `keypoints`: `[N, 17, 2]`,每个点按 (y, x) 存放
/// - `keypoint_scores`: `[N, 17]`
/// - `pose_scores`: `[N]`
/// - `num_poses`: 有效姿态数 (≤ N)
#[derive(Debug, Clone)]
pub struct OutputTensors {
    pub keypoints: Array3<f32>,
    pub keypoint_scores: Array2<f32>,
    pub pose_scores: Array1<f32>,
    pub num_poses: usize,
}

impl OutputTensors {
    /// 由姿态列表构造输出张量 (用于回放与测试)
    pub fn from_poses(poses: &[Pose]) -> Self {
        let n = poses.len();
        let mut keypoints = Array3::<f32>::zeros((n, KeypointType::COUNT, 2));
        let mut keypoint_scores = Array2::<f32>::zeros((n, KeypointType::COUNT));
        let mut pose_scores = Array1::<f32>::zeros(n);
        for (i, pose) in poses.iter().enumerate() {
            pose_scores[i] = pose.score;
            for (label, kp) in &pose.keypoints {
                let k = label.index();
                keypoints[[i, k, 0]] = kp.point.y;
                keypoints[[i, k, 1]] = kp.point.x;
                keypoint_scores[[i, k]] = kp.score;
            }
        }
        Self {
            keypoints,
            keypoint_scores,
            pose_scores,
            num_poses: n,
        }
    }

    /// 解码为姿态列表
    ///
    /// `mirror_width` 为 Some(w) 时水平镜像: `x = w - x`
    pub fn decode(&self, mirror_width: Option<f32>) -> Result<Vec<Pose>> {
        let (n, k, c) = self.keypoints.dim();
        if k != KeypointType::COUNT || c != 2 {
            return Err(PipelineError::ModelOutputShape(format!(
                "keypoints tensor is [{}, {}, {}], expected [N, 17, 2]",
                n, k, c
            )));
        }
        if self.keypoint_scores.dim() != (n, KeypointType::COUNT) {
            return Err(PipelineError::ModelOutputShape(format!(
                "keypoint scores tensor is {:?}, expected [{}, 17]",
                self.keypoint_scores.shape(),
                n
            )));
        }
        if self.pose_scores.len() != n {
            return Err(PipelineError::ModelOutputShape(format!(
                "pose scores tensor has {} entries, expected {}",
                self.pose_scores.len(),
                n
            )));
        }
        if self.num_poses > n {
            return Err(PipelineError::ModelOutputShape(format!(
                "num_poses {} exceeds tensor capacity {}",
                self.num_poses, n
            )));
        }

        let keypoints = self.keypoints.slice(s![..self.num_poses, .., ..]);
        let poses = keypoints
            .outer_iter()
            .enumerate()
            .map(|(i, points)| {
                let mut pose = Pose::new(self.pose_scores[i]);
                for (label, yx) in KeypointType::ALL.iter().zip(points.outer_iter()) {
                    let (y, mut x) = (yx[0], yx[1]);
                    if let Some(width) = mirror_width {
                        x = width - x;
                    }
                    pose.keypoints.insert(
                        *label,
                        Keypoint {
                            point: Point::new(x, y),
                            score: self.keypoint_scores[[i, label.index()]],
                        },
                    );
                }
                pose
            })
            .collect();
        Ok(poses)
    }
}

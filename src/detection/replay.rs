/// 回放推理引擎
/// Replay inference engine
///
/// 不加载真实模型: 按 tick 回放录制的姿态 (JSON) 或内置的合成人物,
/// 可叠加随机抖动并模拟设备耗时。输出经过与真实模型相同的张量解码路径。
use super::engine::{OutputTensors, TwoPhaseEngine};
use super::types::{KeypointType, Pose};
use crate::error::Result;
use crate::pipeline::geometry::Size;
use anyhow::{anyhow, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ========== 回放文件格式 ==========

/// 单个关键点记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayKeypoint {
    pub label: KeypointType,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// 单个姿态记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayPose {
    pub score: f32,
    pub keypoints: Vec<ReplayKeypoint>,
}

impl From<&ReplayPose> for Pose {
    fn from(r: &ReplayPose) -> Self {
        r.keypoints.iter().fold(Pose::new(r.score), |pose, kp| {
            pose.with_keypoint(kp.label, kp.x, kp.y, kp.score)
        })
    }
}

/// 文件内容: 多帧 (每帧一个姿态列表) 或单帧
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayScript {
    Frames(Vec<Vec<ReplayPose>>),
    Single(Vec<ReplayPose>),
}

enum ReplaySource {
    Builtin,
    Script(Vec<Vec<Pose>>),
}

// ========== 内置场景 ==========

/// 内置场景周期 (tick)
const SCENE_PERIOD: u64 = 240;
/// 每个周期开头的空场时长 (tick)
const SCENE_EMPTY_TICKS: u64 = 90;
/// 第二个人出现的区间
const VISITOR_TICKS: (u64, u64) = (150, 210);
/// tick 与场景时间的换算 (按 30fps)
const TICKS_PER_SECOND: f32 = 30.0;

/// 人体模板: (关键点, 相对躯干中线的水平偏移, 垂直位置),均以画面高度为单位
const FIGURE: [(KeypointType, f32, f32); 17] = [
    (KeypointType::Nose, 0.0, 0.15),
    (KeypointType::LeftEye, 0.02, 0.13),
    (KeypointType::RightEye, -0.02, 0.13),
    (KeypointType::LeftEar, 0.04, 0.14),
    (KeypointType::RightEar, -0.04, 0.14),
    (KeypointType::LeftShoulder, 0.09, 0.28),
    (KeypointType::RightShoulder, -0.09, 0.28),
    (KeypointType::LeftElbow, 0.12, 0.42),
    (KeypointType::RightElbow, -0.12, 0.42),
    (KeypointType::LeftWrist, 0.13, 0.55),
    (KeypointType::RightWrist, -0.13, 0.55),
    (KeypointType::LeftHip, 0.06, 0.55),
    (KeypointType::RightHip, -0.06, 0.55),
    (KeypointType::LeftKnee, 0.06, 0.72),
    (KeypointType::RightKnee, -0.06, 0.72),
    (KeypointType::LeftAnkle, 0.06, 0.9),
    (KeypointType::RightAnkle, -0.06, 0.9),
];

/// 在画面中生成一个站立的人,`t` 为秒,`center` 为躯干中线 (占画面宽度比例)
pub fn standing_figure(size: Size, t: f32, center: f32) -> Pose {
    let (w, h) = (size.width as f32, size.height as f32);
    let cx = w * center;
    // 两只手腕上下摆动
    let left_lift = 0.3 * (0.5 + 0.5 * (t * 1.3).sin());
    let right_lift = 0.35 * (0.5 + 0.5 * (t * 0.7 + 1.0).sin());

    FIGURE.iter().fold(Pose::new(0.85), |pose, &(label, dx, y)| {
        let y = match label {
            KeypointType::LeftWrist => y - left_lift,
            KeypointType::RightWrist => y - right_lift,
            _ => y,
        };
        pose.with_keypoint(label, cx + dx * h, y * h, 0.9)
    })
}

/// 内置场景第 `tick` 帧中的人
fn builtin_scene(size: Size, tick: u64) -> Vec<Pose> {
    let phase = tick % SCENE_PERIOD;
    if phase < SCENE_EMPTY_TICKS {
        return Vec::new();
    }
    let t = tick as f32 / TICKS_PER_SECOND;
    let mut poses = vec![standing_figure(size, t, 0.5 + 0.25 * (t * 0.5).sin())];
    if (VISITOR_TICKS.0..VISITOR_TICKS.1).contains(&phase) {
        poses.push(standing_figure(size, t + 2.0, 0.15));
    }
    poses
}

// ========== 回放引擎 ==========

pub struct ReplayEngine {
    input_size: Size,
    source: ReplaySource,
    tick: u64,
    jitter: f32,
    latency: Duration,
    mirror: bool,
    rng: StdRng,
    pending: Option<OutputTensors>,
    last_latency_ms: f64,
}

impl ReplayEngine {
    /// 内置合成场景
    pub fn builtin(input_size: Size) -> Self {
        Self {
            input_size,
            source: ReplaySource::Builtin,
            tick: 0,
            jitter: 0.0,
            latency: Duration::ZERO,
            mirror: false,
            rng: StdRng::from_entropy(),
            pending: None,
            last_latency_ms: 0.0,
        }
    }

    /// 回放录制的姿态
    pub fn from_poses(input_size: Size, frames: Vec<Vec<Pose>>) -> Self {
        Self {
            source: ReplaySource::Script(frames),
            ..Self::builtin(input_size)
        }
    }

    /// 从JSON文件加载录制的姿态
    pub fn from_file<P: AsRef<Path>>(input_size: Size, path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let frames: Vec<Vec<Pose>> = match serde_json::from_str::<ReplayScript>(&json)? {
            ReplayScript::Frames(frames) => frames
                .iter()
                .map(|poses| poses.iter().map(Pose::from).collect())
                .collect(),
            ReplayScript::Single(poses) => vec![poses.iter().map(Pose::from).collect()],
        };
        info!(
            "📼 回放文件已加载: {} ({} 帧)",
            path.as_ref().display(),
            frames.len()
        );
        Ok(Self::from_poses(input_size, frames))
    }

    /// 关键点随机抖动幅度 (像素),限制在 [0, 画面长边] 内; 非有限值视为 0
    pub fn with_jitter(mut self, jitter: f32) -> Self {
        let limit = self.input_size.width.max(self.input_size.height) as f32;
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, limit)
        } else {
            warn!("⚠️  抖动幅度 {} 无效,已关闭抖动", jitter);
            0.0
        };
        self
    }

    /// 模拟推理耗时
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    fn next_poses(&mut self) -> Vec<Pose> {
        let tick = self.tick;
        self.tick += 1;
        let mut poses = match &self.source {
            ReplaySource::Builtin => builtin_scene(self.input_size, tick),
            ReplaySource::Script(frames) if frames.is_empty() => Vec::new(),
            ReplaySource::Script(frames) => frames[(tick % frames.len() as u64) as usize].clone(),
        };
        if self.jitter > 0.0 {
            for pose in &mut poses {
                for kp in pose.keypoints.values_mut() {
                    kp.point.x += self.rng.gen_range(-self.jitter..=self.jitter);
                    kp.point.y += self.rng.gen_range(-self.jitter..=self.jitter);
                }
            }
        }
        poses
    }
}

impl TwoPhaseEngine for ReplayEngine {
    fn input_size(&self) -> Size {
        self.input_size
    }

    fn run_inference(&mut self, tensor: &[u8]) -> anyhow::Result<f64> {
        let expected = self.input_size.width as usize * self.input_size.height as usize * 3;
        if tensor.len() != expected {
            bail!(
                "input tensor has {} bytes, model {} expects {}",
                tensor.len(),
                self.input_size,
                expected
            );
        }

        let start = Instant::now();
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let poses = self.next_poses();
        self.pending = Some(OutputTensors::from_poses(&poses));
        self.last_latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!("回放推理 tick={} 姿态数={}", self.tick, poses.len());
        Ok(self.last_latency_ms)
    }

    fn parse_output(&mut self) -> anyhow::Result<(Vec<Pose>, f64)> {
        let output = self
            .pending
            .take()
            .ok_or_else(|| anyhow!("parse_output called before run_inference"))?;
        let mirror_width = self.mirror.then_some(self.input_size.width as f32);
        let poses = output.decode(mirror_width)?;
        Ok((poses, self.last_latency_ms))
    }
}

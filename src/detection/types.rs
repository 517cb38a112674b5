//! 姿态数据结构
//! Pose data types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 人体关键点类型 (固定17类)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypointType {
    Nose = 0,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl KeypointType {
    pub const COUNT: usize = 17;

    /// 按模型输出顺序排列
    pub const ALL: [KeypointType; 17] = [
        KeypointType::Nose,
        KeypointType::LeftEye,
        KeypointType::RightEye,
        KeypointType::LeftEar,
        KeypointType::RightEar,
        KeypointType::LeftShoulder,
        KeypointType::RightShoulder,
        KeypointType::LeftElbow,
        KeypointType::RightElbow,
        KeypointType::LeftWrist,
        KeypointType::RightWrist,
        KeypointType::LeftHip,
        KeypointType::RightHip,
        KeypointType::LeftKnee,
        KeypointType::RightKnee,
        KeypointType::LeftAnkle,
        KeypointType::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            KeypointType::Nose => "nose",
            KeypointType::LeftEye => "left_eye",
            KeypointType::RightEye => "right_eye",
            KeypointType::LeftEar => "left_ear",
            KeypointType::RightEar => "right_ear",
            KeypointType::LeftShoulder => "left_shoulder",
            KeypointType::RightShoulder => "right_shoulder",
            KeypointType::LeftElbow => "left_elbow",
            KeypointType::RightElbow => "right_elbow",
            KeypointType::LeftWrist => "left_wrist",
            KeypointType::RightWrist => "right_wrist",
            KeypointType::LeftHip => "left_hip",
            KeypointType::RightHip => "right_hip",
            KeypointType::LeftKnee => "left_knee",
            KeypointType::RightKnee => "right_knee",
            KeypointType::LeftAnkle => "left_ankle",
            KeypointType::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for KeypointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 二维点 (模型输入像素坐标)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 平方距离 (只用于比较,不开方)
    pub fn distance_sq(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub point: Point,
    pub score: f32, // 置信度 [0, 1]
}

/// 单人姿态
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: BTreeMap<KeypointType, Keypoint>,
    pub score: f32,
}

impl Pose {
    pub fn new(score: f32) -> Self {
        Self {
            keypoints: BTreeMap::new(),
            score,
        }
    }

    pub fn with_keypoint(mut self, label: KeypointType, x: f32, y: f32, score: f32) -> Self {
        self.keypoints.insert(
            label,
            Keypoint {
                point: Point::new(x, y),
                score,
            },
        );
        self
    }

    /// 置信度严格大于阈值的关键点
    pub fn confident(&self, threshold: f32) -> impl Iterator<Item = (&KeypointType, &Keypoint)> {
        self.keypoints.iter().filter(move |(_, kp)| kp.score > threshold)
    }

    /// 可信关键点的平均位置; 没有可信关键点时为 None
    pub fn centroid(&self, threshold: f32) -> Option<Point> {
        let mut sum = Point::default();
        let mut n = 0usize;
        for (_, kp) in self.confident(threshold) {
            sum.x += kp.point.x;
            sum.y += kp.point.y;
            n += 1;
        }
        if n == 0 {
            return None;
        }
        Some(Point::new(sum.x / n as f32, sum.y / n as f32))
    }

    /// 只保留可信关键点的副本
    pub fn retain_confident(&self, threshold: f32) -> Pose {
        Pose {
            keypoints: self
                .confident(threshold)
                .map(|(label, kp)| (*label, *kp))
                .collect(),
            score: self.score,
        }
    }
}

/// 一次推理的输出
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InferenceResult {
    pub poses: Vec<Pose>,
    pub latency_ms: f64,
}

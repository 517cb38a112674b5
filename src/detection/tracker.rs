//! 跨帧身份跟踪
//! Cross-frame identity tracking
//!
//! 每个 tick 把当前姿态与上一 tick 的姿态按质心距离做贪心匹配:
//! 距离最近的一对优先继承身份,匹配不上的分配新ID。
//! 身份只在相邻两个 tick 之间延续,消失一帧即视为离开。

use super::types::{Point, Pose};

// ========== 数据结构 ==========

/// 带身份的姿态
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPose {
    /// 身份ID (单调递增,永不复用)
    pub id: u64,

    /// 仅包含可信关键点的姿态
    pub pose: Pose,

    /// 可信关键点的质心
    pub centroid: Point,
}

/// 贪心最近质心跟踪器
///
/// 状态只属于调用它的渲染线程,无需加锁。
#[derive(Debug)]
pub struct IdentityTracker {
    threshold: f32,
    prev_poses: Vec<TrackedPose>,
    next_id: u64,
}

impl IdentityTracker {
    /// `threshold`: 关键点置信度阈值 (严格大于才计入质心)
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            prev_poses: Vec::new(),
            next_id: 0,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 为当前 tick 的姿态分配身份
    ///
    /// 返回的列表保持检测顺序 (已过滤掉没有可信关键点的姿态),
    /// 同时成为下一 tick 的匹配基准。
    pub fn assign<I>(&mut self, poses: I) -> &[TrackedPose]
    where
        I: IntoIterator<Item = Pose>,
    {
        // 1. 过滤: 没有可信关键点的姿态不参与跟踪
        let current: Vec<(Pose, Point)> = poses
            .into_iter()
            .filter_map(|pose| {
                let centroid = pose.centroid(self.threshold)?;
                Some((pose.retain_confident(self.threshold), centroid))
            })
            .collect();

        // 2. 所有 (当前, 上一帧) 组合的平方距离,按当前姿态顺序枚举
        let mut pairs: Vec<(f32, usize, usize)> =
            Vec::with_capacity(current.len() * self.prev_poses.len());
        for (ci, (_, centroid)) in current.iter().enumerate() {
            for (pi, prev) in self.prev_poses.iter().enumerate() {
                pairs.push((centroid.distance_sq(&prev.centroid), ci, pi));
            }
        }

        // 3. 稳定排序: 距离相同时保持枚举顺序
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // 4. 贪心匹配
        let mut assigned: Vec<Option<u64>> = vec![None; current.len()];
        let mut used_prev = vec![false; self.prev_poses.len()];
        for &(_, ci, pi) in &pairs {
            if assigned[ci].is_none() && !used_prev[pi] {
                assigned[ci] = Some(self.prev_poses[pi].id);
                used_prev[pi] = true;
            }
        }

        // 5. 未匹配的分配新ID; 6. 当前列表成为下一帧的基准
        let mut tracked = Vec::with_capacity(current.len());
        for ((pose, centroid), id) in current.into_iter().zip(assigned) {
            let id = match id {
                Some(id) => id,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    id
                }
            };
            tracked.push(TrackedPose { id, pose, centroid });
        }
        self.prev_poses = tracked;
        &self.prev_poses
    }

    /// 上一 tick 的跟踪结果
    pub fn tracked(&self) -> &[TrackedPose] {
        &self.prev_poses
    }

    /// 重置跟踪器 (清除所有跟踪,ID计数器保持递增)
    pub fn reset(&mut self) {
        self.prev_poses.clear();
    }

    /// 获取当前跟踪数量
    pub fn track_count(&self) -> usize {
        self.prev_poses.len()
    }
}

// ========== 工具函数 ==========

/// 根据ID生成颜色 (不同ID不同颜色)
pub fn id_to_color(id: u64) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

/// `#rrggbb` 形式的颜色字符串
pub fn color_hex((r, g, b): (u8, u8, u8)) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::KeypointType;

    fn pose_at(x: f32, y: f32) -> Pose {
        Pose::new(0.9).with_keypoint(KeypointType::Nose, x, y, 0.9)
    }

    fn ids(tracked: &[TrackedPose]) -> Vec<u64> {
        tracked.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_first_tick_gets_fresh_ids() {
        let mut tracker = IdentityTracker::new(0.2);
        let tracked = tracker.assign(vec![pose_at(0.0, 0.0), pose_at(100.0, 0.0)]);
        assert_eq!(ids(tracked), vec![0, 1]);
    }

    #[test]
    fn test_identity_stable_under_small_move() {
        let mut tracker = IdentityTracker::new(0.2);
        tracker.assign(vec![pose_at(10.0, 10.0), pose_at(200.0, 10.0)]);
        // 检测顺序颠倒,各自移动 1px
        let tracked = tracker.assign(vec![pose_at(201.0, 10.0), pose_at(11.0, 10.0)]);
        assert_eq!(ids(tracked), vec![1, 0]);
    }

    #[test]
    fn test_reappearance_gets_fresh_id() {
        let mut tracker = IdentityTracker::new(0.2);
        assert_eq!(ids(tracker.assign(vec![pose_at(5.0, 5.0)])), vec![0]);
        assert!(tracker.assign(Vec::new()).is_empty());
        assert_eq!(tracker.track_count(), 0);
        assert_eq!(ids(tracker.assign(vec![pose_at(5.0, 5.0)])), vec![1]);
    }

    #[test]
    fn test_tie_break_follows_detection_order() {
        let mut tracker = IdentityTracker::new(0.2);
        tracker.assign(vec![pose_at(0.0, 0.0)]);
        let tracked = tracker.assign(vec![pose_at(10.0, 0.0), pose_at(-10.0, 0.0)]);
        assert_eq!(ids(tracked), vec![0, 1]);
    }

    #[test]
    fn test_greedy_prefers_closest_pair() {
        let mut tracker = IdentityTracker::new(0.2);
        tracker.assign(vec![pose_at(0.0, 0.0), pose_at(50.0, 0.0)]);
        // 第一个当前姿态离 id1 (50,0) 最近
        let tracked = tracker.assign(vec![pose_at(48.0, 0.0), pose_at(30.0, 0.0)]);
        assert_eq!(ids(tracked), vec![1, 0]);
    }

    #[test]
    fn test_zero_confidence_pose_never_tracked() {
        let mut tracker = IdentityTracker::new(0.5);
        let blind = Pose::new(0.9)
            .with_keypoint(KeypointType::Nose, 1.0, 1.0, 0.0)
            .with_keypoint(KeypointType::LeftEye, 2.0, 2.0, 0.0);
        let tracked = tracker.assign(vec![blind, pose_at(3.0, 3.0)]);
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].id, 0);
    }

    #[test]
    fn test_tracked_pose_keeps_only_confident_keypoints() {
        let mut tracker = IdentityTracker::new(0.2);
        let pose = pose_at(4.0, 4.0).with_keypoint(KeypointType::LeftWrist, 9.0, 9.0, 0.1);
        let tracked = tracker.assign(vec![pose]);
        assert_eq!(tracked[0].pose.keypoints.len(), 1);
        assert_eq!(tracked[0].centroid, Point::new(4.0, 4.0));
    }

    #[test]
    fn test_ids_never_reused_after_reset() {
        let mut tracker = IdentityTracker::new(0.2);
        tracker.assign(vec![pose_at(0.0, 0.0), pose_at(1.0, 0.0)]);
        tracker.reset();
        assert_eq!(ids(tracker.assign(vec![pose_at(0.0, 0.0)])), vec![2]);
    }

    #[test]
    fn test_id_to_color() {
        assert_eq!(id_to_color(0), (229, 45, 45));
        assert_ne!(id_to_color(1), id_to_color(2));
        assert_eq!(color_hex((255, 0, 16)), "#ff0010");
    }
}

//! 管线配置 - 通过JSON文件调整参数

use crate::error::{PipelineError, Result};
use crate::pipeline::geometry::Size;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// 管线参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 视频参数 ===
    pub source_size: Size,    // 采集分辨率
    pub inference_size: Size, // 模型输入分辨率
    pub frame_rate: u32,      // 采集帧率

    // === 姿态参数 ===
    pub keypoint_threshold: f32,   // 关键点置信度阈值 (质心/绘制)
    pub pose_score_threshold: f32, // 姿态整体得分阈值
    pub mirror: bool,              // 水平镜像

    // === 渲染参数 ===
    pub background_delay_secs: f32, // 无人多久后锁定背景
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_size: Size::new(640, 480),
            inference_size: Size::new(641, 481),
            frame_rate: 30,

            keypoint_threshold: 0.2,
            pose_score_threshold: 0.4,
            mirror: false,

            background_delay_secs: 2.0,
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    error!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 检查参数合法性 (非法配置为致命错误)
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [("source_size", self.source_size), ("inference_size", self.inference_size)] {
            if size.width == 0 || size.height == 0 {
                return Err(PipelineError::Config(format!("{} must be non-zero, got {}", name, size)));
            }
        }
        if self.frame_rate == 0 {
            return Err(PipelineError::Config("frame_rate must be positive".into()));
        }
        for (name, value) in [
            ("keypoint_threshold", self.keypoint_threshold),
            ("pose_score_threshold", self.pose_score_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Config(format!("{} must lie in [0, 1], got {}", name, value)));
            }
        }
        self.background_delay()?;
        Ok(())
    }

    /// 负数、NaN 或超出 Duration 范围时报配置错误
    pub fn background_delay(&self) -> Result<Duration> {
        Duration::try_from_secs_f32(self.background_delay_secs).map_err(|e| {
            PipelineError::Config(format!(
                "background_delay_secs must be a non-negative number of seconds, got {} ({})",
                self.background_delay_secs, e
            ))
        })
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前管线配置:");
        info!("  采集分辨率: {}", self.source_size);
        info!("  推理分辨率: {}", self.inference_size);
        info!("  帧率: {} fps", self.frame_rate);
        info!("  关键点阈值: {:.2}", self.keypoint_threshold);
        info!("  姿态阈值: {:.2}", self.pose_score_threshold);
        info!("  背景锁定延迟: {:.1}s", self.background_delay_secs);
        info!("  镜像: {}", if self.mirror { "开" } else { "关" });
    }
}

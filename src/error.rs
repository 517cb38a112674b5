//! 管线错误类型
//! Pipeline error types

use std::fmt;
use thiserror::Error;

/// 可跨线程传递的装箱错误 (anyhow::Error 可直接转换)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 管线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Inference,
    Render,
    MediaGraph,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Capture => "capture",
            Stage::Inference => "inference",
            Stage::Render => "render",
            Stage::MediaGraph => "media-graph",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported frame layout: expected 1 plane, got {plane_count}")]
    UnsupportedLayout { plane_count: u32 },

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("invalid model input shape {0:?}, expected [1, height, width, 3]")]
    ModelInputShape(Vec<usize>),

    #[error("malformed model output: {0}")]
    ModelOutputShape(String),

    #[error("inference failed: {0}")]
    Inference(#[source] BoxError),

    #[error("render failed: {0}")]
    Render(#[source] BoxError),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("{0} worker panicked")]
    WorkerPanicked(Stage),

    #[error("media graph error: {message} ({debug})")]
    MediaGraph { message: String, debug: String },

    #[error("crop box unavailable: no frame has reached the sink yet")]
    GeometryUnavailable,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PipelineError {
    /// 把工作线程返回的错误包装成带阶段信息的错误
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            // 已带阶段信息的错误不再重复包装
            e @ (PipelineError::Stage { .. } | PipelineError::WorkerPanicked(_)) => e,
            other => PipelineError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// 出错的阶段 (若已知)
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } | PipelineError::WorkerPanicked(stage) => {
                Some(*stage)
            }
            PipelineError::MediaGraph { .. } => Some(Stage::MediaGraph),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

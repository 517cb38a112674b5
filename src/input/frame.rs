/// 原始视频帧
/// Raw video frame
use crate::error::{PipelineError, Result};
use crate::pipeline::geometry::Size;
use std::sync::Arc;

/// 每像素字节数 (RGB)
pub const BYTES_PER_PIXEL: usize = 3;

/// 帧的布局信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
    pub stride: usize, // 每行实际存储字节数 (可能带填充)
    pub plane_count: u32,
}

impl FrameMeta {
    /// 紧密排列时每行字节数
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn is_packed(&self) -> bool {
        self.stride == self.row_bytes()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// 容纳该布局所需的最少字节 (最后一行可以不带填充)
    pub fn min_len(&self) -> usize {
        match self.height {
            0 => 0,
            h => self.stride * (h as usize - 1) + self.row_bytes(),
        }
    }
}

/// 不可变视频帧
///
/// 使用Arc共享数据,在采集回调、显示分支和推理线程之间传递时避免复制。
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<Vec<u8>>,
    meta: FrameMeta,
}

impl Frame {
    /// 创建帧,检查 `stride >= width * 3` 与数据长度
    pub fn new(data: impl Into<Arc<Vec<u8>>>, meta: FrameMeta) -> Result<Self> {
        let data = data.into();
        if meta.stride < meta.row_bytes() {
            return Err(PipelineError::InvalidFrame(format!(
                "stride {} shorter than row of {} bytes",
                meta.stride,
                meta.row_bytes()
            )));
        }
        if data.len() < meta.min_len() {
            return Err(PipelineError::InvalidFrame(format!(
                "{} bytes cannot hold {}x{} with stride {}",
                data.len(),
                meta.width,
                meta.height,
                meta.stride
            )));
        }
        Ok(Self { data, meta })
    }

    /// 紧密排列的单平面RGB帧
    pub fn packed(data: impl Into<Arc<Vec<u8>>>, width: u32, height: u32) -> Result<Self> {
        Self::new(
            data,
            FrameMeta {
                width,
                height,
                stride: width as usize * BYTES_PER_PIXEL,
                plane_count: 1,
            },
        )
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn shared_data(&self) -> &Arc<Vec<u8>> {
        &self.data
    }

    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn size(&self) -> Size {
        self.meta.size()
    }
}

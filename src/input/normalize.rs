/// 步长归一化: 去掉行尾填充,得到紧密排列的模型输入
/// Stride normalization
use super::frame::{Frame, FrameMeta};
use crate::error::{PipelineError, Result};
use std::borrow::Cow;

/// 紧密排列的 `width * height * 3` 字节张量
///
/// 帧本身已紧密排列时直接借用帧数据 (零拷贝)。
#[derive(Debug)]
pub struct NormalizedTensor<'a> {
    bytes: Cow<'a, [u8]>,
    width: u32,
    height: u32,
}

impl NormalizedTensor<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self.bytes, Cow::Borrowed(_))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_owned(self) -> Vec<u8> {
        self.bytes.into_owned()
    }
}

/// 归一化一帧
///
/// - 多平面帧: `UnsupportedLayout` (致命)
/// - `stride == width * 3`: 借用
/// - 否则逐行复制
pub fn normalize(frame: &Frame) -> Result<NormalizedTensor<'_>> {
    let meta = frame.meta();
    if meta.plane_count != 1 {
        return Err(PipelineError::UnsupportedLayout {
            plane_count: meta.plane_count,
        });
    }

    let data = frame.data();
    let packed_len = meta.row_bytes() * meta.height as usize;
    let bytes = if meta.is_packed() {
        let view = data.get(..packed_len).ok_or_else(|| short_buffer(meta, data.len()))?;
        Cow::Borrowed(view)
    } else {
        Cow::Owned(strip_padding(data, meta)?)
    };

    Ok(NormalizedTensor {
        bytes,
        width: meta.width,
        height: meta.height,
    })
}

fn strip_padding(data: &[u8], meta: &FrameMeta) -> Result<Vec<u8>> {
    let row = meta.row_bytes();
    let mut out = Vec::with_capacity(row * meta.height as usize);
    for y in 0..meta.height as usize {
        let start = y * meta.stride;
        let src = data
            .get(start..start + row)
            .ok_or_else(|| short_buffer(meta, data.len()))?;
        out.extend_from_slice(src);
    }
    Ok(out)
}

fn short_buffer(meta: &FrameMeta, len: usize) -> PipelineError {
    PipelineError::InvalidFrame(format!(
        "{} bytes cannot hold {}x{} with stride {}",
        len, meta.width, meta.height, meta.stride
    ))
}

/// 画面几何: 缩放、裁剪框与坐标映射
/// Letterbox and crop-box geometry
use crate::detection::types::Point;
use crate::error::{PipelineError, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 像素尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 等比缩放: 采集画面 → 模型输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub source: Size,
    pub inference: Size,
}

impl Letterbox {
    pub fn new(source: Size, inference: Size) -> Self {
        Self { source, inference }
    }

    /// 取两个方向中较小的缩放比
    pub fn scale(&self) -> f64 {
        let sx = self.inference.width as f64 / self.source.width as f64;
        let sy = self.inference.height as f64 / self.source.height as f64;
        sx.min(sy)
    }

    /// 缩放后的内容尺寸 (向下取整)
    pub fn scaled_size(&self) -> Size {
        let (src, inf) = (self.source, self.inference);
        let (sw, sh) = (src.width as u64, src.height as u64);
        let (iw, ih) = (inf.width as u64, inf.height as u64);
        // 整数运算避免浮点误差: iw/sw <= ih/sh 时宽度为限制边
        if iw * sh <= ih * sw {
            Size::new(inf.width, (sh * iw / sw) as u32)
        } else {
            Size::new((sw * ih / sh) as u32, inf.height)
        }
    }
}

/// 裁剪框: 推理画面在采集画面坐标系中的位置
///
/// `x`/`y` 为负表示四周补了黑边。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl CropBox {
    /// 内容居中放入接收端画面后得到的裁剪框
    pub fn fit(sink: Size, content: Size) -> Self {
        // 整数除法向零取整
        let left = (content.width as i64 - sink.width as i64) / 2;
        let top = (content.height as i64 - sink.height as i64) / 2;
        Self {
            x: -left as i32,
            y: -top as i32,
            width: content.width,
            height: content.height,
        }
    }

    /// 推理坐标 → 采集坐标
    pub fn to_source(&self, point: Point, source: Size) -> Point {
        let sx = source.width as f32 / self.width as f32;
        let sy = source.height as f32 / self.height as f32;
        Point {
            x: (point.x - self.x as f32) * sx,
            y: (point.y - self.y as f32) * sy,
        }
    }

    pub fn as_tuple(&self) -> (i32, i32, u32, u32) {
        (self.x, self.y, self.width, self.height)
    }
}

/// 只计算一次的几何缓存
///
/// 第一帧到达接收端时记录其尺寸,之后由此惰性求得裁剪框。
#[derive(Debug)]
pub struct GeometryCache {
    letterbox: Letterbox,
    sink_size: OnceCell<Size>,
    crop_box: OnceCell<CropBox>,
}

impl GeometryCache {
    pub fn new(letterbox: Letterbox) -> Self {
        Self {
            letterbox,
            sink_size: OnceCell::new(),
            crop_box: OnceCell::new(),
        }
    }

    pub fn letterbox(&self) -> Letterbox {
        self.letterbox
    }

    /// 记录接收端尺寸,仅首次生效; 返回是否为首次
    pub fn observe_sink(&self, size: Size) -> bool {
        self.sink_size.set(size).is_ok()
    }

    pub fn sink_size(&self) -> Option<Size> {
        self.sink_size.get().copied()
    }

    pub fn crop_box(&self) -> Result<CropBox> {
        let sink = self.sink_size().ok_or(PipelineError::GeometryUnavailable)?;
        Ok(*self
            .crop_box
            .get_or_init(|| CropBox::fit(sink, self.letterbox.scaled_size())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_size_truncates() {
        let lb = Letterbox::new(Size::new(640, 480), Size::new(641, 481));
        // 480 * 641 / 640 = 480.75
        assert_eq!(lb.scaled_size(), Size::new(641, 480));
        assert!((lb.scale() - 641.0 / 640.0).abs() < 1e-9);
    }

    #[test]
    fn test_scaled_size_pillarbox() {
        let lb = Letterbox::new(Size::new(1280, 720), Size::new(481, 353));
        // min(481/1280, 353/720), 720 * 481 / 1280 = 270.56
        assert_eq!(lb.scaled_size(), Size::new(481, 270));
    }

    #[test]
    fn test_crop_box_padding() {
        let crop = CropBox::fit(Size::new(481, 353), Size::new(481, 270));
        // top = (270 - 353) / 2 = -41 (向零取整)
        assert_eq!(crop.as_tuple(), (0, 41, 481, 270));
    }

    #[test]
    fn test_crop_box_odd_difference() {
        let crop = CropBox::fit(Size::new(100, 100), Size::new(103, 100));
        assert_eq!(crop.as_tuple(), (-1, 0, 103, 100));
    }

    #[test]
    fn test_to_source_maps_back() {
        let crop = CropBox { x: 0, y: 41, width: 481, height: 270 };
        let p = crop.to_source(Point { x: 240.5, y: 41.0 + 135.0 }, Size::new(1280, 720));
        assert!((p.x - 640.0).abs() < 1e-3);
        assert!((p.y - 360.0).abs() < 1e-3);
    }

    #[test]
    fn test_cache_needs_first_frame() {
        let cache = GeometryCache::new(Letterbox::new(Size::new(1280, 720), Size::new(481, 353)));
        assert!(matches!(cache.crop_box(), Err(PipelineError::GeometryUnavailable)));

        assert!(cache.observe_sink(Size::new(481, 353)));
        assert!(!cache.observe_sink(Size::new(10, 10)));
        assert_eq!(cache.sink_size(), Some(Size::new(481, 353)));
        assert_eq!(cache.crop_box().unwrap().as_tuple(), (0, 41, 481, 270));
    }
}

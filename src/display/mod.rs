/// 显示端 (Display Side)
///
/// - DisplaySink:    渲染线程输出的接收端
/// - DisplaySurface: 共享显示面,保存最新叠加层并合成显示帧
/// - Freezer:        背景冻结,冻结时一直输出冻结那一刻的帧
use crate::error::{PipelineError, Result};
use crate::input::frame::Frame;
use crate::input::normalize::normalize;
use crate::pipeline::render::RenderOutput;
use image::RgbImage;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// 渲染输出的接收端
pub trait DisplaySink: Send {
    fn present(&mut self, output: RenderOutput) -> anyhow::Result<()>;
}

impl<T: DisplaySink + ?Sized> DisplaySink for Box<T> {
    fn present(&mut self, output: RenderOutput) -> anyhow::Result<()> {
        (**self).present(output)
    }
}

// ========== 冻结器 ==========

/// 冻结时保留第一帧并持续输出它; 解冻时释放
#[derive(Debug, Default)]
pub struct Freezer {
    frozen: bool,
    held: Option<Frame>,
}

impl Freezer {
    pub fn set_frozen(&mut self, frozen: bool) {
        if !frozen {
            self.held = None;
        }
        self.frozen = frozen;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn process(&mut self, frame: Frame) -> Frame {
        if !self.frozen {
            return frame;
        }
        self.held.get_or_insert(frame).clone()
    }
}

// ========== 显示面 ==========

/// 一帧合成结果: 背景帧 + 叠加层
#[derive(Debug, Clone)]
pub struct ComposedFrame {
    pub frame: Frame,
    pub overlay: Option<String>,
}

#[derive(Debug, Default)]
struct Surface {
    overlay: Option<String>,
    replacement: Option<Frame>,
    freezer: Freezer,
    last_displayed: Option<Frame>,
    presented: u64,
}

/// 共享显示面 (克隆即共享)
///
/// 渲染线程通过 `DisplaySink` 写入,媒体图的显示分支调用 `compose`。
/// 停止时不清除叠加层,最后一帧的叠加层保留在显示面上。
#[derive(Debug, Clone, Default)]
pub struct DisplaySurface {
    inner: Arc<Mutex<Surface>>,
}

impl DisplaySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// 显示分支: 用替换帧或原帧,经冻结器后叠加最新叠加层
    pub fn compose(&self, frame: Frame) -> ComposedFrame {
        let mut surface = self.inner.lock();
        let base = surface.replacement.clone().unwrap_or(frame);
        let shown = surface.freezer.process(base);
        surface.last_displayed = Some(shown.clone());
        ComposedFrame {
            frame: shown,
            overlay: surface.overlay.clone(),
        }
    }

    pub fn overlay(&self) -> Option<String> {
        self.inner.lock().overlay.clone()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.inner.lock().last_displayed.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.lock().freezer.is_frozen()
    }

    pub fn presented(&self) -> u64 {
        self.inner.lock().presented
    }

    /// 保存快照: 叠加层 (.svg) 与最后显示的帧 (.png)
    pub fn save_snapshot(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        let (overlay, frame) = {
            let surface = self.inner.lock();
            (surface.overlay.clone(), surface.last_displayed.clone())
        };
        fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        if let Some(svg) = overlay {
            let path = dir.join(format!("{}.svg", stem));
            fs::write(&path, svg)?;
            written.push(path);
        }
        if let Some(frame) = frame {
            let bytes = normalize(&frame)?.into_owned();
            let image = RgbImage::from_raw(frame.width(), frame.height(), bytes).ok_or_else(
                || PipelineError::InvalidFrame("frame does not fit an RGB image".into()),
            )?;
            let path = dir.join(format!("{}.png", stem));
            image.save(&path)?;
            written.push(path);
        }
        for path in &written {
            info!("💾 快照已保存到 {}", path.display());
        }
        Ok(written)
    }
}

impl DisplaySink for DisplaySurface {
    fn present(&mut self, output: RenderOutput) -> anyhow::Result<()> {
        let mut surface = self.inner.lock();
        if let Some(svg) = output.overlay {
            surface.overlay = Some(svg);
        }
        surface.replacement = output.frame;
        surface.freezer.set_frozen(output.freeze);
        surface.presented += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> Frame {
        Frame::packed(vec![tag; 12], 2, 2).unwrap()
    }

    #[test]
    fn test_freezer_holds_first_frame() {
        let mut freezer = Freezer::default();
        assert_eq!(freezer.process(frame(1)).data()[0], 1);
        freezer.set_frozen(true);
        assert_eq!(freezer.process(frame(2)).data()[0], 2);
        assert_eq!(freezer.process(frame(3)).data()[0], 2);
        freezer.set_frozen(false);
        assert_eq!(freezer.process(frame(4)).data()[0], 4);
        // 重新冻结时换成新的一帧
        freezer.set_frozen(true);
        assert_eq!(freezer.process(frame(5)).data()[0], 5);
    }

    #[test]
    fn test_surface_keeps_last_overlay() {
        let mut surface = DisplaySurface::new();
        surface
            .present(RenderOutput::overlay("<svg/>".to_string()))
            .unwrap();
        surface.present(RenderOutput::default()).unwrap();
        assert_eq!(surface.overlay().as_deref(), Some("<svg/>"));
        assert_eq!(surface.presented(), 2);

        let composed = surface.compose(frame(9));
        assert_eq!(composed.overlay.as_deref(), Some("<svg/>"));
        assert_eq!(composed.frame.data()[0], 9);
    }

    #[test]
    fn test_surface_replacement_and_freeze() {
        let mut surface = DisplaySurface::new();
        let handle = surface.clone();
        surface
            .present(RenderOutput {
                overlay: None,
                frame: Some(frame(7)),
                freeze: false,
            })
            .unwrap();
        assert_eq!(handle.compose(frame(1)).frame.data()[0], 7);

        surface
            .present(RenderOutput {
                freeze: true,
                ..RenderOutput::default()
            })
            .unwrap();
        assert!(handle.is_frozen());
        assert_eq!(handle.compose(frame(2)).frame.data()[0], 2);
        assert_eq!(handle.compose(frame(3)).frame.data()[0], 2);
        assert_eq!(handle.last_frame().unwrap().data()[0], 2);
    }

    #[test]
    fn test_save_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = DisplaySurface::new();
        surface
            .present(RenderOutput::overlay("<svg></svg>".to_string()))
            .unwrap();
        surface.compose(frame(128));
        let written = surface.save_snapshot(dir.path(), "snap").unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("snap.svg").exists());
        assert!(dir.path().join("snap.png").exists());
    }
}

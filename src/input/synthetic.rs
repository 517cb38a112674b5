/// 合成视频源 (Synthetic Media Graph)
///
/// 没有摄像头时使用: 采集线程按帧率生成画面,
/// 一路原尺寸送显示端,一路缩放+补边到模型输入尺寸后交给推理。
use super::frame::{Frame, FrameMeta, BYTES_PER_PIXEL};
use crate::display::DisplaySurface;
use crate::pipeline::geometry::{CropBox, Letterbox, Size};
use crate::pipeline::slot::FramePublisher;
use crate::pipeline::supervisor::{BusMessage, MediaGraph};
use crossbeam_channel::Sender;
use image::{imageops, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 合成视频源参数
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub source_size: Size,
    pub inference_size: Size,
    pub frame_rate: u32,
    /// 每行额外填充字节 (模拟带步长的缓冲区)
    pub row_padding: usize,
    /// 生成多少帧后发送流结束; None 为无限
    pub frame_limit: Option<u64>,
    pub seed: Option<u64>,
}

pub struct SyntheticGraph {
    config: SyntheticConfig,
    display: Option<DisplaySurface>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SyntheticGraph {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            display: None,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// 接入显示分支
    pub fn with_display(mut self, display: DisplaySurface) -> Self {
        self.display = Some(display);
        self
    }
}

impl MediaGraph for SyntheticGraph {
    fn start(&mut self, publisher: FramePublisher, bus: Sender<BusMessage>) -> anyhow::Result<()> {
        anyhow::ensure!(self.handle.is_none(), "synthetic graph already started");
        anyhow::ensure!(self.config.frame_rate > 0, "frame rate must be positive");

        let mut capture = Capture::new(self.config.clone(), self.display.clone());
        let stop = Arc::clone(&self.stop);
        let handle = thread::Builder::new()
            .name("synthetic-capture".into())
            .spawn(move || capture.run(&publisher, &bus, &stop))?;
        self.handle = Some(handle);
        info!(
            "📹 合成视频源已启动: {} @ {}fps",
            self.config.source_size, self.config.frame_rate
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("⚠️  采集线程 panic");
            }
            info!("🛑 合成视频源已停止");
        }
    }
}

impl Drop for SyntheticGraph {
    fn drop(&mut self) {
        self.stop();
    }
}

// ========== 采集线程 ==========

struct Capture {
    config: SyntheticConfig,
    display: Option<DisplaySurface>,
    letterbox: Letterbox,
    crop: CropBox,
    rng: StdRng,
}

impl Capture {
    fn new(config: SyntheticConfig, display: Option<DisplaySurface>) -> Self {
        let letterbox = Letterbox::new(config.source_size, config.inference_size);
        let crop = CropBox::fit(config.inference_size, letterbox.scaled_size());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            display,
            letterbox,
            crop,
            rng,
        }
    }

    fn run(&mut self, publisher: &FramePublisher, bus: &Sender<BusMessage>, stop: &AtomicBool) {
        let interval = Duration::from_secs(1) / self.config.frame_rate;
        let start = Instant::now();
        let mut last_warning: Option<Instant> = None;
        let mut index: u64 = 0;

        while !stop.load(Ordering::SeqCst) {
            if self.config.frame_limit.is_some_and(|limit| index >= limit) {
                info!("🏁 合成视频源已生成 {} 帧", index);
                let _ = bus.send(BusMessage::EndOfStream);
                return;
            }

            let (source, sink) = match self.next_frames(index) {
                Ok(frames) => frames,
                Err(e) => {
                    let _ = bus.send(BusMessage::Error {
                        message: "failed to build frame".into(),
                        debug: format!("{:#}", e),
                    });
                    return;
                }
            };
            if let Some(display) = &self.display {
                display.compose(source);
            }
            if publisher.publish(sink) {
                debug!("推理未跟上,覆盖第 {} 帧之前的旧帧", index);
            }
            index += 1;

            // 按帧率节拍; 落后超过一帧时报警告 (每秒至多一次)
            let due = start + interval * index as u32;
            let now = Instant::now();
            if now > due + interval {
                if last_warning.map_or(true, |t| now.duration_since(t) >= Duration::from_secs(1)) {
                    let _ = bus.send(BusMessage::Warning {
                        message: "capture is running late".into(),
                        debug: format!("frame {} behind schedule by {:?}", index, now - due),
                    });
                    last_warning = Some(now);
                }
            } else if due > now {
                thread::sleep(due - now);
            }
        }
    }

    /// 生成第 `index` 帧: (原尺寸显示帧, 模型输入帧)
    fn next_frames(&mut self, index: u64) -> anyhow::Result<(Frame, Frame)> {
        let source = self.draw_scene(index);
        let scaled = self.letterbox.scaled_size();
        let resized = imageops::resize(&source, scaled.width, scaled.height, imageops::FilterType::Triangle);

        let inf = self.config.inference_size;
        let mut boxed = RgbImage::new(inf.width, inf.height);
        imageops::replace(&mut boxed, &resized, self.crop.x as i64, self.crop.y as i64);

        let source_frame = Frame::packed(source.into_raw(), self.config.source_size.width, self.config.source_size.height)?;
        let sink_frame = self.with_padding(boxed)?;
        Ok((source_frame, sink_frame))
    }

    /// 背景渐变 + 左右移动的圆 + 少量噪点
    fn draw_scene(&mut self, index: u64) -> RgbImage {
        let Size { width, height } = self.config.source_size;
        let t = index as f32 / self.config.frame_rate as f32;
        let cx = width as f32 * (0.5 + 0.3 * (t * 0.8).sin());
        let cy = height as f32 * 0.5;
        let r = height as f32 / 8.0;
        let rng = &mut self.rng;

        RgbImage::from_fn(width, height, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let noise: u8 = rng.gen_range(0..8);
            if dx * dx + dy * dy <= r * r {
                Rgb([220u8.saturating_add(noise), 120, 40])
            } else {
                let shade = (y * 96 / height.max(1)) as u8;
                Rgb([30 + shade / 2, 40 + shade, 60u8.saturating_add(noise)])
            }
        })
    }

    /// 按配置给每行加填充
    fn with_padding(&self, image: RgbImage) -> anyhow::Result<Frame> {
        let (width, height) = image.dimensions();
        if self.config.row_padding == 0 {
            return Ok(Frame::packed(image.into_raw(), width, height)?);
        }
        let row = width as usize * BYTES_PER_PIXEL;
        let stride = row + self.config.row_padding;
        let mut data = vec![0u8; stride * height as usize];
        for (dst, src) in data.chunks_mut(stride).zip(image.as_raw().chunks(row)) {
            dst[..row].copy_from_slice(src);
        }
        let meta = FrameMeta {
            width,
            height,
            stride,
            plane_count: 1,
        };
        Ok(Frame::new(data, meta)?)
    }
}

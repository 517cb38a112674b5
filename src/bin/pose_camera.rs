/// 姿态相机 (Pose Camera)
///
/// 系统架构:
/// 1. 采集线程: 合成视频源,按帧率发布帧 (媒体图)
/// 2. 推理线程: 取最新帧 → 回放引擎推理 → 发布结果
/// 3. 渲染线程: 取最新结果 → 渲染策略 → 显示面
/// 4. 主线程:   监督者事件循环,处理流结束/警告/错误
use clap::{Parser, ValueEnum};
use pose_camera_rs::detection::{ReplayEngine, TwoPhase};
use pose_camera_rs::display::DisplaySurface;
use pose_camera_rs::input::{SyntheticConfig, SyntheticGraph};
use pose_camera_rs::pipeline::{PipelineSupervisor, RenderStrategy};
use pose_camera_rs::renderer::{Anonymizer, LoggingNoteSink, PoseOverlay, Synthesizer};
use pose_camera_rs::{gen_time_string, PipelineConfig};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 渲染模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// 骨架叠加,每人一种颜色
    Overlay,
    /// 无人时锁定背景,只显示骨架
    Anonymizer,
    /// 手腕高度演奏音符
    Synthesizer,
}

/// 姿态相机参数
#[derive(Parser, Debug)]
#[command(author, version, about = "姿态相机 - 实时姿态叠加", long_about = None)]
struct Args {
    /// 配置文件 (不存在时自动创建)
    #[arg(short, long, default_value = "pose_camera.json")]
    config: PathBuf,

    /// 渲染模式
    #[arg(short, long, value_enum, default_value_t = Mode::Overlay)]
    mode: Mode,

    /// 回放的姿态文件 (JSON); 不指定时使用内置场景
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// 生成多少帧后结束
    #[arg(short, long)]
    frames: Option<u64>,

    /// 运行多少秒后停止
    #[arg(long)]
    duration_secs: Option<u64>,

    /// 每行额外填充字节 (模拟带步长的采集缓冲)
    #[arg(long, default_value_t = 0)]
    row_padding: usize,

    /// 模拟推理耗时 (毫秒)
    #[arg(long, default_value_t = 20)]
    latency_ms: u64,

    /// 关键点随机抖动 (像素)
    #[arg(long, default_value_t = 1.0)]
    jitter: f32,

    /// 水平镜像
    #[arg(long, default_value_t = false)]
    mirror: bool,

    /// 退出时保存快照的目录
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = PipelineConfig::load(&args.config);
    config.mirror |= args.mirror;
    config.validate()?;
    config.print_summary();

    info!("🚀 姿态相机启动");
    info!("🎨 渲染模式: {:?}", args.mode);

    // ========== 推理引擎 ==========
    let engine = match &args.replay {
        Some(path) => ReplayEngine::from_file(config.inference_size, path)?,
        None => ReplayEngine::builtin(config.inference_size),
    }
    .with_jitter(args.jitter)
    .with_latency(Duration::from_millis(args.latency_ms))
    .with_mirror(config.mirror);

    // ========== 渲染策略 ==========
    let strategy: Box<dyn RenderStrategy> = match args.mode {
        Mode::Overlay => Box::new(PoseOverlay::new(config.keypoint_threshold, config.pose_score_threshold)),
        Mode::Anonymizer => Box::new(Anonymizer::new(
            config.background_delay()?,
            config.keypoint_threshold,
            config.pose_score_threshold,
        )),
        Mode::Synthesizer => Box::new(Synthesizer::new(config.keypoint_threshold, LoggingNoteSink::default())),
    };

    // ========== 媒体图与显示面 ==========
    let display = DisplaySurface::new();
    let graph = SyntheticGraph::new(SyntheticConfig {
        source_size: config.source_size,
        inference_size: config.inference_size,
        frame_rate: config.frame_rate,
        row_padding: args.row_padding,
        frame_limit: args.frames,
        seed: None,
    })
    .with_display(display.clone());

    let running = PipelineSupervisor::new(config)?.start(graph, TwoPhase::new(engine), strategy, display.clone())?;

    if let Some(secs) = args.duration_secs {
        let stop = running.stop_handle();
        thread::Builder::new().name("pose-timer".into()).spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            stop.stop();
        })?;
    }

    let report = running.wait();

    // 停止后叠加层保留在显示面上,可以保存快照
    if let Some(dir) = &args.snapshot_dir {
        let stem = format!("pose_camera_{}", gen_time_string("_"));
        display.save_snapshot(dir, &stem)?;
    }

    let report = report?;
    let presented = display.presented();
    info!("✅ 已退出 ({:?}): 显示面共更新 {} 次", report.stop_reason, presented);
    Ok(())
}

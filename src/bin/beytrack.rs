/// 陀螺追踪 (Beyblade Tracker)
///
/// 红外相机多陀螺追踪命令行
///
/// 系统架构:
/// 1. 跟踪线程: 背景标定 → 逐帧检测/关联/碰撞判定
/// 2. 主线程:   接收事件, 按行输出 JSON 或文本消息
use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use beytrack_rs::input::PreprocessedSource;
use beytrack_rs::{
    CalibrationProfile, FrameSource, ImageDirSource, SyntheticArena, TrackerConfig,
    TrackingWorker, WorkerEvent,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// 每帧一行 JSON
    Json,
    /// `帧号, beys:(id, x, y)..., hits:(x, y)...`
    Message,
}

/// 陀螺追踪参数
#[derive(Parser, Debug)]
#[command(author, version, about = "陀螺追踪 - 红外多目标跟踪", long_about = None)]
struct Args {
    /// 帧来源: synthetic (模拟硬件) 或图片目录
    #[arg(short, long, default_value = "synthetic")]
    source: String,

    /// 输出帧数 (不指定则直到来源结束)
    #[arg(short, long)]
    frames: Option<u64>,

    /// 输出格式
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// 配置文件路径 (不存在时写入默认配置)
    #[arg(short, long, default_value = "beytrack.json")]
    config: String,

    /// 应用 ~/.beytracker/calibration_profiles.json 中的最近标定参数
    #[arg(long, default_value_t = false)]
    profile: bool,

    /// 模拟硬件随机种子
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// 图片目录读完后循环
    #[arg(long, default_value_t = false)]
    looping: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("beytrack_rs=info,beytrack=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = TrackerConfig::load(&args.config);
    if args.profile {
        match CalibrationProfile::load_default() {
            Some(profile) => config.apply_profile(&profile),
            None => info!("未找到标定档案, 使用配置文件参数"),
        }
    }
    config.print_summary();

    info!("🚀 陀螺追踪启动");
    info!("📹 帧来源: {}", args.source);

    let preprocess = config.preprocess();
    let source: Box<dyn FrameSource + Send> = if args.source == "synthetic" {
        let arena = SyntheticArena::two_spinners(args.seed, config.calibration_frames as u64);
        Box::new(PreprocessedSource::new(arena, preprocess))
    } else {
        let frames = ImageDirSource::open(&args.source)
            .with_context(|| format!("无法打开帧目录 {}", args.source))?
            .looping(args.looping);
        Box::new(PreprocessedSource::new(frames, preprocess))
    };

    let mut worker = TrackingWorker::spawn(source, config);
    let mut printed = 0u64;
    let mut failed = None;

    for event in worker.events().iter() {
        match event {
            WorkerEvent::Calibrated { frames } => info!("✅ 背景标定完成 ({} 帧)", frames),
            WorkerEvent::Frame(output) => {
                match args.format {
                    OutputFormat::Json => println!("{}", serde_json::to_string(&output)?),
                    OutputFormat::Message => println!("{}", output.to_message()),
                }
                printed += 1;
                if args.frames.is_some_and(|n| printed >= n) {
                    break;
                }
            }
            WorkerEvent::Threshold(threshold) => info!("阈值: {}", threshold),
            WorkerEvent::Error { module, error } => {
                error!("❌ {} 错误: {}", module, error);
                failed = Some(format!("{}: {}", module, error));
            }
            WorkerEvent::Stopped => break,
        }
    }

    worker.stop();
    info!("🛑 已输出 {} 帧", printed);

    match failed {
        Some(e) => Err(anyhow::anyhow!(e)),
        None => Ok(()),
    }
}

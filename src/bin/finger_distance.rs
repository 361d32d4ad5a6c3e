use std::io::BufRead;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
/// 指间距离计测 - 采集目录回放
///
/// 主程序入口 - 直接运行: cargo run --bin finger-distance --release -- --input data/images
use crossbeam_channel::{bounded, Sender};
use finger_tracker::config::RecordConfig;
use finger_tracker::{
    gen_time_string, logging, AppConfig, MeasurementRecorder, Pipeline, RecordedDetector,
    ReplaySource,
};
use tracing::{error, info};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 指间距离计测参数
#[derive(Parser, Debug)]
#[command(author, version, about = "指间距离计测 (RGB-D + 卡尔曼滤波)", long_about = None)]
struct Args {
    /// 配置文件 (不存在时写出默认配置)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// 采集目录 (默认取配置 capture.output_dir)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 记录输出目录 (默认取配置 record.output_dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 日志级别: error/warn/info/debug/trace
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// 日志文件目录 (`app_{会话}.log`)
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// 不写 CSV 记录
    #[arg(long)]
    no_record: bool,
}

/// 标准输入 `q` + 回车 → 停止信号
fn spawn_quit_watcher(tx: Sender<()>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line.trim().eq_ignore_ascii_case("q") {
                let _ = tx.send(());
                break;
            }
        }
    });
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 会话名同时用于日志文件与 CSV
    let session = gen_time_string("", RecordConfig::default().utc_offset_hours);
    let _log_guard = logging::init(args.log_level, &args.log_dir, &session)
        .with_context(|| format!("日志初始化失败: {}", args.log_dir.display()))?;
    info!(
        "🗒️ 日志文件: {}",
        logging::log_file_path(&args.log_dir, &session).display()
    );

    let config = AppConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    config.print_summary();

    let input = args
        .input
        .unwrap_or_else(|| config.capture.output_dir.clone());
    let mut source = ReplaySource::open(&input, &config.capture.prefix, config.depth.scale)
        .with_context(|| format!("打开采集目录失败: {}", input.display()))?;
    let mut detector = RecordedDetector::new(&input);

    let recorder = if args.no_record || !config.record.enabled {
        None
    } else {
        let output = args
            .output
            .unwrap_or_else(|| config.record.output_dir.clone());
        let labels: Vec<String> = config.targets.iter().map(|t| t.label.clone()).collect();
        Some(
            MeasurementRecorder::create(&output, &session, &labels, config.record.utc_offset_hours)
                .with_context(|| format!("创建记录文件失败: {}", output.display()))?,
        )
    };

    let (stop_tx, stop_rx) = bounded::<()>(1);
    spawn_quit_watcher(stop_tx);

    info!("🚀 指间距离计测启动 (输入 q + 回车 结束)");
    info!("📂 输入: {} ({} 帧)", input.display(), source.len());

    let mut pipeline = Pipeline::new(config.fusion_step()?, recorder);
    match pipeline.run(&mut source, &mut detector, &stop_rx) {
        Ok(summary) => {
            info!(
                "✅ 完成: {}帧, 其中{}帧有距离, 平均{:.1}fps",
                summary.frames, summary.frames_with_distance, summary.mean_fps
            );
            Ok(())
        }
        Err(e) => {
            error!("❌ 计测中断: {}", e);
            Err(e.into())
        }
    }
}

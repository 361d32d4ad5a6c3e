/// 计测流水线 (Measurement Pipeline)
///
/// 单线程逐帧同步执行:
/// - 取帧:   FrameSource (失败重试)
/// - 检测:   ObjectDetector
/// - 估计:   FusionStep
/// - 记录:   MeasurementRecorder (可选)
///
/// 停止信号在两帧之间检查, 不会中断半帧。
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::detection::{FrameReport, FusionStep};
use crate::error::Result;
use crate::input::{Frame, FrameSource, ObjectDetector};
use crate::record::MeasurementRecorder;

/// 连续取帧失败的最大重试次数
pub const MAX_RETRIES: u32 = 3;
/// 每隔多少帧打印一次统计
pub const STATS_INTERVAL: u64 = 30;

/// 运行结果
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    /// 产生了距离的帧数
    pub frames_with_distance: u64,
    pub mean_fps: f64,
}

/// 吞吐统计
#[derive(Debug)]
pub struct FrameStats {
    started: Instant,
    window_start: Instant,
    window_count: u64,
    frames: u64,
    frames_with_distance: u64,
    current_fps: f64,
}

impl FrameStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            window_start: now,
            window_count: 0,
            frames: 0,
            frames_with_distance: 0,
            current_fps: 0.0,
        }
    }

    pub fn observe(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.window_count += 1;
        if report.distance_mm.is_some() {
            self.frames_with_distance += 1;
        }

        if self.window_count >= STATS_INTERVAL {
            let elapsed = self.window_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                self.current_fps = self.window_count as f64 / elapsed;
            }
            info!(
                "📊 计测统计: 已处理{}帧 | 实际{:.1}fps | 有效距离{}帧 | 当前距离 {}",
                self.frames,
                self.current_fps,
                self.frames_with_distance,
                report
                    .distance_mm
                    .map_or_else(|| "---".to_string(), |d| format!("{:.1}mm", d))
            );
            self.window_start = Instant::now();
            self.window_count = 0;
        }
    }

    pub fn summary(&self) -> RunSummary {
        let elapsed = self.started.elapsed().as_secs_f64();
        RunSummary {
            frames: self.frames,
            frames_with_distance: self.frames_with_distance,
            mean_fps: if elapsed > 0.0 {
                self.frames as f64 / elapsed
            } else {
                0.0
            },
        }
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Pipeline {
    fusion: FusionStep,
    recorder: Option<MeasurementRecorder>,
    max_retries: u32,
    retry_delay: Duration,
}

impl Pipeline {
    pub fn new(fusion: FusionStep, recorder: Option<MeasurementRecorder>) -> Self {
        Self {
            fusion,
            recorder,
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// 调整取帧重试策略
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// 主循环: 输入结束、收到停止信号或重试耗尽时返回
    pub fn run(
        &mut self,
        source: &mut impl FrameSource,
        detector: &mut impl ObjectDetector,
        stop: &Receiver<()>,
    ) -> Result<RunSummary> {
        let mut stats = FrameStats::new();
        info!("▶️ 计测开始");

        loop {
            if stop.try_recv().is_ok() {
                info!("⏹️ 收到停止信号");
                break;
            }

            let Some(frame) = self.acquire(source) else {
                break;
            };

            let report = self.process(&frame, detector);
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.record(&report)?;
            }
            stats.observe(&report);
        }

        if let Some(recorder) = self.recorder.take() {
            recorder.finish()?;
        }

        let summary = stats.summary();
        info!(
            "🏁 计测结束: {}帧 | 有效距离{}帧 | 平均{:.1}fps",
            summary.frames, summary.frames_with_distance, summary.mean_fps
        );
        Ok(summary)
    }

    /// 取一帧; 连续失败超过上限或输入结束时返回 None
    fn acquire(&self, source: &mut impl FrameSource) -> Option<Frame> {
        let mut retry_count = 0;
        loop {
            match source.next_frame() {
                Ok(Some(frame)) => return Some(frame),
                Ok(None) => {
                    info!("📭 输入结束");
                    return None;
                }
                Err(e) => {
                    retry_count += 1;
                    warn!("⚠️ 取帧失败: {}", e);
                    if retry_count >= self.max_retries {
                        warn!("❌ 取帧连续失败 {} 次, 停止计测", retry_count);
                        return None;
                    }
                    warn!(
                        "⚠️ {:.1}秒后重试... ({}/{})",
                        self.retry_delay.as_secs_f64(),
                        retry_count,
                        self.max_retries
                    );
                    thread::sleep(self.retry_delay);
                }
            }
        }
    }

    fn process(&mut self, frame: &Frame, detector: &mut impl ObjectDetector) -> FrameReport {
        let detections = detector.detect(frame).unwrap_or_else(|e| {
            warn!("⚠️ 帧 {} 检测失败: {}", frame.index, e);
            Vec::new()
        });
        debug!("帧 {}: {} 个检测框", frame.index, detections.len());
        self.fusion
            .process(&frame.image, &frame.depth, &detections, Instant::now())
    }
}

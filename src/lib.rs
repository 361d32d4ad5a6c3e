// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 计测配置参数
pub mod detection; // 估计系统
pub mod error; // 错误类型
pub mod input; // 帧输入系统
pub mod logging; // 控制台 + 文件日志
pub mod pipeline; // 计测流水线
pub mod record; // CSV 记录

use chrono::{FixedOffset, Offset, Utc};

pub use crate::config::AppConfig;
pub use crate::detection::{
    BBox, Detection, FrameReport, FusionStep, HsvProfile, Intrinsics, KalmanFilter3D,
    ObjectReport, TrackedObject,
};
pub use crate::error::{Result, TrackerError};
pub use crate::input::{Frame, FrameSource, ObjectDetector, RecordedDetector, ReplaySource};
pub use crate::pipeline::{Pipeline, RunSummary};
pub use crate::record::MeasurementRecorder;

/// 固定时区; 超出范围时退回 UTC
pub fn utc_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 60 * 60).unwrap_or_else(|| Utc.fix())
}

/// 会话时间字符串, 例如 `gen_time_string("", 9)` → `20240506_070809`
pub fn gen_time_string(delimiter: &str, utc_offset_hours: i32) -> String {
    let t_now = Utc::now().with_timezone(&utc_offset(utc_offset_hours));
    let fmt = format!(
        "%Y{}%m{}%d_%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

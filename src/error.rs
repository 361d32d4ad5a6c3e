//! 错误类型 (Error types)
//!
//! 核心估计流程不会失败; 只有配置、回放输入、CSV记录和日志文件这些外围环节返回错误。

use thiserror::Error;

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// 配置非法 (校验失败)
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("npy read error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    /// 日志文件或全局订阅器初始化失败
    #[error("logging setup error: {0}")]
    Logging(String),

    /// 帧数据不一致 (例如 RGB 与深度尺寸不匹配)
    #[error("invalid frame {index}: {reason}")]
    InvalidFrame { index: u64, reason: String },
}

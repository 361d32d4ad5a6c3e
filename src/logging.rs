//! 日志初始化: 控制台 + `{dir}/app_{session}.log`

use std::fs;
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::{Result, TrackerError};

pub fn log_file_path(dir: &Path, session: &str) -> PathBuf {
    dir.join(format!("app_{}.log", session))
}

/// 后台线程写文件; guard 被丢弃时刷盘
pub fn file_writer(dir: &Path, session: &str) -> Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(format!("app_{}", session))
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| TrackerError::Logging(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// 安装全局订阅器, 返回的 guard 需保持到进程结束
pub fn init(level: Level, dir: &Path, session: &str) -> Result<WorkerGuard> {
    let (writer, guard) = file_writer(dir, session)?;
    tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| TrackerError::Logging(e.to_string()))?;
    Ok(guard)
}

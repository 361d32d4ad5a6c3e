/// 帧输入系统 (Frame Input System)
///
/// 计测循环每个 tick 取一帧 RGB + 深度, 再交给检测器
/// - FrameSource:    帧来源 (回放目录 / 实时相机)
/// - ObjectDetector: 检测器 (录制的检测结果 / 在线模型)
/// - Replay:         采集目录回放 + 录制检测结果
pub mod replay;

use image::RgbImage;

use crate::detection::{DepthFrame, Detection};
use crate::error::Result;

pub use replay::{RecordedDetector, ReplaySource};

/// 一帧对齐后的彩色图 + 深度图
#[derive(Clone, Debug)]
pub struct Frame {
    /// 帧序号
    pub index: u64,
    /// 帧名 (例如 `frame_007`), 用于查找同名附属文件
    pub name: String,
    pub image: RgbImage,
    pub depth: DepthFrame,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 帧来源
pub trait FrameSource {
    /// 取下一帧; `Ok(None)` 表示输入结束
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// 检测器: 一帧 → 检测框列表
pub trait ObjectDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

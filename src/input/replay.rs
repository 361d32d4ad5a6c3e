//! 采集目录回放
//!
//! 目录结构:
//! - `{prefix}_{NNN}_rgb.png`   8位 RGB
//! - `{prefix}_{NNN}_depth.npy` 深度 (uint16, 原始 z16 单位); 没有时读 `_depth.png` (16位灰度)
//! - `{prefix}_{NNN}_det.json`  检测结果 (可选)

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use ndarray_npy::ReadNpyExt;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{Frame, FrameSource, ObjectDetector};
use crate::detection::{DepthFrame, Detection};
use crate::error::{Result, TrackerError};

/// 帧名 = `{prefix}_{digits}`
#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    index: u64,
    name: String,
}

pub struct ReplaySource {
    dir: PathBuf,
    entries: Vec<Entry>,
    cursor: usize,
    depth_scale: f32,
}

impl ReplaySource {
    /// 扫描目录, 按序号升序建立帧索引
    pub fn open(dir: &Path, prefix: &str, depth_scale: f32) -> Result<Self> {
        let pattern = format!(r"^({}_(\d+))_rgb\.png$", regex::escape(prefix));
        let re = Regex::new(&pattern).map_err(|e| TrackerError::Config(e.to_string()))?;

        let mut entries = Vec::new();
        for item in fs::read_dir(dir)? {
            let file_name = item?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(caps) = re.captures(file_name) else {
                continue;
            };
            let Ok(index) = caps[2].parse::<u64>() else {
                continue;
            };
            entries.push(Entry {
                index,
                name: caps[1].to_string(),
            });
        }
        entries.sort_by_key(|e| e.index);

        if entries.is_empty() {
            warn!("⚠️ 回放目录中没有 {}_*_rgb.png: {}", prefix, dir.display());
        } else {
            info!("📂 回放目录 {}: {} 帧", dir.display(), entries.len());
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
            cursor: 0,
            depth_scale,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 已索引的帧序号
    pub fn indices(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|e| e.index)
    }

    fn load(&self, entry: &Entry) -> Result<Frame> {
        let rgb_path = self.dir.join(format!("{}_rgb.png", entry.name));
        let image = image::open(&rgb_path)?.to_rgb8();
        let depth = self.load_depth(&entry.name)?;

        let depth_size = (depth.width(), depth.height());
        if image.dimensions() != depth_size {
            return Err(TrackerError::InvalidFrame {
                index: entry.index,
                reason: format!(
                    "rgb {:?} and depth {:?} differ in size",
                    image.dimensions(),
                    depth_size
                ),
            });
        }

        Ok(Frame {
            index: entry.index,
            name: entry.name.clone(),
            image,
            depth,
        })
    }

    /// 优先 `.npy`, 否则 16 位 PNG
    fn load_depth(&self, name: &str) -> Result<DepthFrame> {
        let npy_path = self.dir.join(format!("{}_depth.npy", name));
        if npy_path.exists() {
            let data = Array2::<u16>::read_npy(File::open(&npy_path)?)?;
            return Ok(DepthFrame::new(data, self.depth_scale));
        }

        let png_path = self.dir.join(format!("{}_depth.png", name));
        let depth_image = image::open(&png_path)?.into_luma16();
        Ok(DepthFrame::from_image(&depth_image, self.depth_scale))
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(entry) = self.entries.get(self.cursor).cloned() else {
            return Ok(None);
        };
        // 读取失败也前进, 重试时取下一帧
        self.cursor += 1;
        debug!("读取帧 {}", entry.name);
        self.load(&entry).map(Some)
    }
}

/// 读取帧同名的 `_det.json` 作为检测结果
pub struct RecordedDetector {
    dir: PathBuf,
}

impl RecordedDetector {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

impl ObjectDetector for RecordedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let path = self.dir.join(format!("{}_det.json", frame.name));
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

//! 计测记录 - 每帧一行 CSV
//!
//! 列: `timestamp, distance_mm, {a}_x, {a}_y, {a}_z, {b}_x, {b}_y, {b}_z, {a}_conf, {b}_conf`,
//! 列名前缀取自目标类别的第一段 (`red_finger` → `red`)。

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use tracing::info;

use crate::detection::FrameReport;
use crate::error::Result;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub struct MeasurementRecorder {
    writer: csv::Writer<File>,
    path: PathBuf,
    labels: Vec<String>,
    offset: FixedOffset,
    rows: u64,
}

impl MeasurementRecorder {
    /// 创建 `{dir}/measurement_{session}.csv` 并写入表头
    pub fn create(
        dir: &Path,
        session: &str,
        labels: &[String],
        utc_offset_hours: i32,
    ) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("measurement_{}.csv", session));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(header(labels))?;
        writer.flush()?;
        info!("📝 计测记录: {}", path.display());

        Ok(Self {
            writer,
            path,
            labels: labels.to_vec(),
            offset: crate::utc_offset(utc_offset_hours),
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// 以当前时间写一行
    pub fn record(&mut self, report: &FrameReport) -> Result<()> {
        let now = Utc::now().with_timezone(&self.offset);
        self.writer
            .write_record(format_row(report, &self.labels, &now))?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        info!("💾 计测记录已保存: {} ({} 行)", self.path.display(), self.rows);
        Ok(self.rows)
    }
}

fn column_prefix(label: &str) -> &str {
    label.split('_').next().unwrap_or(label)
}

pub fn header(labels: &[String]) -> Vec<String> {
    let mut columns = vec!["timestamp".to_string(), "distance_mm".to_string()];
    for label in labels {
        let p = column_prefix(label);
        columns.extend(["x", "y", "z"].iter().map(|axis| format!("{}_{}", p, axis)));
    }
    for label in labels {
        columns.push(format!("{}_conf", column_prefix(label)));
    }
    columns
}

/// 一帧 → 一行; 缺失的值写空字符串
pub fn format_row(
    report: &FrameReport,
    labels: &[String],
    timestamp: &DateTime<FixedOffset>,
) -> Vec<String> {
    let mut row = vec![
        timestamp.format(TIMESTAMP_FORMAT).to_string(),
        report
            .distance_mm
            .map_or_else(String::new, |d| format!("{:.1}", d)),
    ];

    for label in labels {
        match report.object(label).and_then(|o| o.position) {
            Some(p) => row.extend(p.iter().map(|v| format!("{:.4}", v))),
            None => row.extend(std::iter::repeat(String::new()).take(3)),
        }
    }
    for label in labels {
        row.push(
            report
                .object(label)
                .and_then(|o| o.confidence)
                .map_or_else(String::new, |c| format!("{:.2}", c)),
        );
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::ObjectReport;
    use chrono::TimeZone;
    use nalgebra::Vector3;

    fn labels() -> Vec<String> {
        vec!["red_finger".to_string(), "blue_finger".to_string()]
    }

    fn report() -> FrameReport {
        FrameReport {
            frame_index: 3,
            objects: vec![
                ObjectReport {
                    label: "red_finger".into(),
                    position: Some(Vector3::new(0.01, -0.02, 0.5)),
                    confidence: Some(0.876),
                    centroid: None,
                },
                ObjectReport {
                    label: "blue_finger".into(),
                    position: None,
                    confidence: None,
                    centroid: None,
                },
            ],
            distance_mm: None,
        }
    }

    #[test]
    fn test_header() {
        assert_eq!(
            header(&labels()),
            [
                "timestamp",
                "distance_mm",
                "red_x",
                "red_y",
                "red_z",
                "blue_x",
                "blue_y",
                "blue_z",
                "red_conf",
                "blue_conf"
            ]
        );
    }

    #[test]
    fn test_format_row() {
        let tz = crate::utc_offset(9);
        let ts = tz.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let row = format_row(&report(), &labels(), &ts);
        assert_eq!(
            row,
            [
                "2024-05-06T07:08:09.000",
                "",
                "0.0100",
                "-0.0200",
                "0.5000",
                "",
                "",
                "",
                "0.88",
                ""
            ]
        );
    }

    #[test]
    fn test_distance_column() {
        let mut report = report();
        report.distance_mm = Some(10.04);
        let ts = crate::utc_offset(0).with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_row(&report, &labels(), &ts)[1], "10.0");
    }

    #[test]
    fn test_recorder_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder =
            MeasurementRecorder::create(&dir.path().join("logs"), "test", &labels(), 9).unwrap();
        recorder.record(&report()).unwrap();
        recorder.record(&report()).unwrap();
        let path = recorder.path().to_path_buf();
        assert_eq!(recorder.finish().unwrap(), 2);

        assert!(path.ends_with("logs/measurement_test.csv"));
        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), 10);
        let rows: Vec<_> = reader.records().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][4], "0.5000");
    }
}

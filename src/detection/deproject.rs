//! 像素 + 深度 → 相机坐标系 3D 点
//!
//! 与 RealSense SDK 的 rs2_deproject_pixel_to_point / rs2_project_point_to_pixel
//! 保持一致的畸变模型处理。

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::types::Pixel;

/// 畸变模型
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    /// 无畸变 (纯针孔)
    None,
    BrownConrady,
    /// D400 系列彩色流的默认模型
    #[default]
    InverseBrownConrady,
    KannalaBrandt4,
    #[serde(rename = "ftheta")]
    FTheta,
}

/// 相机内参 (启动时给定, 之后不变)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    /// 焦距 (像素)
    pub fx: f32,
    pub fy: f32,
    /// 主点 (像素)
    pub ppx: f32,
    pub ppy: f32,
    pub model: DistortionModel,
    pub coeffs: [f32; 5],
}

impl Default for Intrinsics {
    /// D435i 彩色流 1280x720 的典型内参
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fx: 910.0,
            fy: 910.0,
            ppx: 640.0,
            ppy: 360.0,
            model: DistortionModel::InverseBrownConrady,
            coeffs: [0.0; 5],
        }
    }
}

/// 畸变迭代次数 (经验值)
const UNDISTORT_ITERATIONS: usize = 10;
const KANNALA_BRANDT_ITERATIONS: usize = 4;

/// 整数像素反投影
pub fn deproject(intrin: &Intrinsics, pixel: Pixel, depth: f32) -> Vector3<f64> {
    deproject_point(intrin, [pixel.x as f32, pixel.y as f32], depth)
}

/// 亚像素反投影
pub fn deproject_point(intrin: &Intrinsics, pixel: [f32; 2], depth: f32) -> Vector3<f64> {
    let c = &intrin.coeffs;
    let mut x = (pixel[0] - intrin.ppx) / intrin.fx;
    let mut y = (pixel[1] - intrin.ppy) / intrin.fy;
    let (xo, yo) = (x, y);

    match intrin.model {
        DistortionModel::None => {}
        DistortionModel::InverseBrownConrady => {
            for _ in 0..UNDISTORT_ITERATIONS {
                let r2 = x * x + y * y;
                let icdist = 1.0 / (1.0 + ((c[4] * r2 + c[1]) * r2 + c[0]) * r2);
                let xq = x / icdist;
                let yq = y / icdist;
                let delta_x = 2.0 * c[2] * xq * yq + c[3] * (r2 + 2.0 * xq * xq);
                let delta_y = 2.0 * c[3] * xq * yq + c[2] * (r2 + 2.0 * yq * yq);
                x = (xo - delta_x) * icdist;
                y = (yo - delta_y) * icdist;
            }
        }
        DistortionModel::BrownConrady => {
            for _ in 0..UNDISTORT_ITERATIONS {
                let r2 = x * x + y * y;
                let icdist = 1.0 / (1.0 + ((c[4] * r2 + c[1]) * r2 + c[0]) * r2);
                let delta_x = 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
                let delta_y = 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
                x = (xo - delta_x) * icdist;
                y = (yo - delta_y) * icdist;
            }
        }
        DistortionModel::KannalaBrandt4 => {
            let rd = (x * x + y * y).sqrt().max(f32::EPSILON);
            let mut theta = rd;
            let mut theta2 = rd * rd;
            for _ in 0..KANNALA_BRANDT_ITERATIONS {
                let f = theta
                    * (1.0 + theta2 * (c[0] + theta2 * (c[1] + theta2 * (c[2] + theta2 * c[3]))))
                    - rd;
                if f.abs() < f32::EPSILON {
                    break;
                }
                let df = 1.0
                    + theta2
                        * (3.0 * c[0]
                            + theta2 * (5.0 * c[1] + theta2 * (7.0 * c[2] + 9.0 * theta2 * c[3])));
                theta -= f / df;
                theta2 = theta * theta;
            }
            let r = theta.tan();
            x *= r / rd;
            y *= r / rd;
        }
        DistortionModel::FTheta => {
            let rd = (x * x + y * y).sqrt().max(f32::EPSILON);
            let r = (c[0] * rd).tan() / (2.0 * (c[0] / 2.0).tan()).atan();
            x *= r / rd;
            y *= r / rd;
        }
    }

    Vector3::new(
        (depth * x) as f64,
        (depth * y) as f64,
        depth as f64,
    )
}

/// 3D 点 → 亚像素坐标 (反投影的逆运算)
pub fn project(intrin: &Intrinsics, point: &Vector3<f64>) -> [f32; 2] {
    let c = &intrin.coeffs;
    let mut x = (point.x / point.z) as f32;
    let mut y = (point.y / point.z) as f32;

    match intrin.model {
        DistortionModel::None => {}
        DistortionModel::InverseBrownConrady => {
            let r2 = x * x + y * y;
            let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
            x *= f;
            y *= f;
            let dx = x + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
            let dy = y + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
            x = dx;
            y = dy;
        }
        DistortionModel::BrownConrady => {
            let r2 = x * x + y * y;
            let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
            let dx = x * f + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
            let dy = y * f + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
            x = dx;
            y = dy;
        }
        DistortionModel::KannalaBrandt4 => {
            let r = (x * x + y * y).sqrt().max(f32::EPSILON);
            let theta = r.atan();
            let theta2 = theta * theta;
            let series =
                1.0 + theta2 * (c[0] + theta2 * (c[1] + theta2 * (c[2] + theta2 * c[3])));
            let rd = theta * series;
            x *= rd / r;
            y *= rd / r;
        }
        DistortionModel::FTheta => {
            let r = (x * x + y * y).sqrt().max(f32::EPSILON);
            let rd = 1.0 / c[0] * (2.0 * r * (c[0] / 2.0).tan()).atan();
            x *= rd / r;
            y *= rd / r;
        }
    }

    [x * intrin.fx + intrin.ppx, y * intrin.fy + intrin.ppy]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pinhole() -> Intrinsics {
        Intrinsics {
            width: 640,
            height: 480,
            fx: 600.0,
            fy: 500.0,
            ppx: 320.0,
            ppy: 240.0,
            model: DistortionModel::None,
            coeffs: [0.0; 5],
        }
    }

    #[test]
    fn test_principal_point_on_axis() {
        let p = deproject(&pinhole(), Pixel::new(320, 240), 1.5);
        assert_relative_eq!(p, Vector3::new(0.0, 0.0, 1.5), epsilon = 1e-9);
    }

    #[test]
    fn test_pinhole_scaling() {
        let p = deproject(&pinhole(), Pixel::new(920, 740), 2.0);
        assert_relative_eq!(p, Vector3::new(2.0, 2.0, 2.0), epsilon = 1e-6);
    }

    #[test]
    fn test_zero_coeffs_match_pinhole() {
        let intrin = Intrinsics {
            model: DistortionModel::InverseBrownConrady,
            ..pinhole()
        };
        let a = deproject(&intrin, Pixel::new(100, 50), 0.8);
        let b = deproject(&pinhole(), Pixel::new(100, 50), 0.8);
        assert_relative_eq!(a, b, epsilon = 1e-6);
    }

    #[test]
    fn test_brown_conrady_round_trip() {
        let intrin = Intrinsics {
            model: DistortionModel::BrownConrady,
            coeffs: [0.05, -0.02, 0.001, -0.001, 0.0],
            ..pinhole()
        };
        let point = Vector3::new(0.12, -0.08, 0.9);
        let pixel = project(&intrin, &point);
        let back = deproject_point(&intrin, pixel, 0.9);
        assert_relative_eq!(back, point, epsilon = 1e-4);
    }

    #[test]
    fn test_kannala_brandt_round_trip() {
        let intrin = Intrinsics {
            model: DistortionModel::KannalaBrandt4,
            coeffs: [0.01, -0.002, 0.0, 0.0, 0.0],
            ..pinhole()
        };
        let point = Vector3::new(-0.2, 0.1, 1.2);
        let pixel = project(&intrin, &point);
        let back = deproject_point(&intrin, pixel, 1.2);
        assert_relative_eq!(back, point, epsilon = 1e-4);
    }

    #[test]
    fn test_distortion_model_json() {
        let m: DistortionModel = serde_json::from_str("\"inverse_brown_conrady\"").unwrap();
        assert_eq!(m, DistortionModel::InverseBrownConrady);
        let m: DistortionModel = serde_json::from_str("\"ftheta\"").unwrap();
        assert_eq!(m, DistortionModel::FTheta);
    }
}

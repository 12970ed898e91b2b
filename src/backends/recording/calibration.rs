// SPDX-License-Identifier: GPL-3.0-only

//! Sensor calibration
//!
//! Recordings carry a `calibration.json` attachment describing every
//! camera on the device at full sensor resolution, with normalized
//! intrinsics. The recording's depth and color modes then decide which
//! binned and cropped part of the sensor ended up in the frames; this
//! module turns both into pixel-space intrinsics for the recorded frames
//! and the depth-to-color rigid transform.

use super::types::Resolution;
use crate::errors::RecordingError;
use serde::Deserialize;
use tracing::debug;

const DEPTH_LOCATION: &str = "CALIBRATION_CameraLocationD0";
const COLOR_LOCATION: &str = "CALIBRATION_CameraLocationPV0";

/// Iterations for the inverse distortion solve
const UNDISTORT_ITERATIONS: usize = 20;

/// Brown-Conrady intrinsics in pixel units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Intrinsics {
    pub cx: f32,
    pub cy: f32,
    pub fx: f32,
    pub fy: f32,
    pub k1: f32,
    pub k2: f32,
    pub k3: f32,
    pub k4: f32,
    pub k5: f32,
    pub k6: f32,
    pub codx: f32,
    pub cody: f32,
    pub p1: f32,
    pub p2: f32,
    /// Normalized radius beyond which the model is invalid (0 = unlimited)
    pub metric_radius: f32,
}

impl Intrinsics {
    /// Pinhole intrinsics without distortion
    pub fn pinhole(cx: f32, cy: f32, fx: f32, fy: f32) -> Self {
        Self {
            cx,
            cy,
            fx,
            fy,
            ..Default::default()
        }
    }

    fn distort(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let xp = x - self.codx;
        let yp = y - self.cody;
        let xp2 = xp * xp;
        let yp2 = yp * yp;
        let xyp = xp * yp;
        let rs = xp2 + yp2;
        if self.metric_radius > 0.0 && rs > self.metric_radius * self.metric_radius {
            return None;
        }
        let rss = rs * rs;
        let rsc = rss * rs;
        let a = 1.0 + self.k1 * rs + self.k2 * rss + self.k3 * rsc;
        let b = 1.0 + self.k4 * rs + self.k5 * rss + self.k6 * rsc;
        let d = if b != 0.0 { a / b } else { 1.0 };

        let xd = xp * d + 2.0 * xyp * self.p1 + (rs + 2.0 * xp2) * self.p2;
        let yd = yp * d + (rs + 2.0 * yp2) * self.p1 + 2.0 * xyp * self.p2;
        Some((xd + self.codx, yd + self.cody))
    }

    /// Project a normalized image point `(x/z, y/z)` to pixel coordinates
    pub fn project(&self, x: f32, y: f32) -> Option<[f32; 2]> {
        let (xd, yd) = self.distort(x, y)?;
        Some([xd * self.fx + self.cx, yd * self.fy + self.cy])
    }

    /// Inverse of [`Intrinsics::project`]: pixel to normalized image point
    pub fn unproject(&self, u: f32, v: f32) -> Option<[f32; 2]> {
        if self.fx == 0.0 || self.fy == 0.0 {
            return None;
        }
        let mut x = (u - self.cx) / self.fx;
        let mut y = (v - self.cy) / self.fy;
        for _ in 0..UNDISTORT_ITERATIONS {
            let [pu, pv] = self.project(x, y)?;
            let dx = (u - pu) / self.fx;
            let dy = (v - pv) / self.fy;
            x += dx;
            y += dy;
            if dx.abs() < 1e-7 && dy.abs() < 1e-7 {
                break;
            }
        }
        Some([x, y])
    }
}

/// Rigid transform, translation in millimeters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrinsics {
    /// Row-major 3x3 rotation
    pub rotation: [f32; 9],
    pub translation: [f32; 3],
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self::identity()
    }
}

impl Extrinsics {
    pub fn identity() -> Self {
        Self {
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            translation: [0.0; 3],
        }
    }

    pub fn apply(&self, p: [f32; 3]) -> [f32; 3] {
        let r = &self.rotation;
        [
            r[0] * p[0] + r[1] * p[1] + r[2] * p[2] + self.translation[0],
            r[3] * p[0] + r[4] * p[1] + r[5] * p[2] + self.translation[1],
            r[6] * p[0] + r[7] * p[1] + r[8] * p[2] + self.translation[2],
        ]
    }

    pub fn inverse(&self) -> Self {
        let r = &self.rotation;
        let rt = [r[0], r[3], r[6], r[1], r[4], r[7], r[2], r[5], r[8]];
        let t = &self.translation;
        Self {
            rotation: rt,
            translation: [
                -(rt[0] * t[0] + rt[1] * t[1] + rt[2] * t[2]),
                -(rt[3] * t[0] + rt[4] * t[1] + rt[5] * t[2]),
                -(rt[6] * t[0] + rt[7] * t[1] + rt[8] * t[2]),
            ],
        }
    }

    /// `self` applied after `first`
    pub fn compose(&self, first: &Extrinsics) -> Self {
        let a = &self.rotation;
        let b = &first.rotation;
        let mut rotation = [0.0f32; 9];
        for row in 0..3 {
            for col in 0..3 {
                rotation[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
            }
        }
        Self {
            rotation,
            translation: self.apply(first.translation),
        }
    }
}

/// One camera's calibration in the recorded frame geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraCalibration {
    pub resolution: Resolution,
    pub intrinsics: Intrinsics,
    /// Reference frame to this camera
    pub extrinsics: Extrinsics,
}

/// Depth and color camera calibration for one recording
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub depth_camera: CameraCalibration,
    pub color_camera: CameraCalibration,
}

impl Calibration {
    /// Transform taking depth camera points to color camera points
    pub fn depth_to_color(&self) -> Extrinsics {
        self.color_camera
            .extrinsics
            .compose(&self.depth_camera.extrinsics.inverse())
    }

    /// Parse the calibration attachment for the recorded modes
    pub fn from_json(
        json: &[u8],
        depth: ModeGeometry,
        color: ModeGeometry,
    ) -> Result<Self, RecordingError> {
        let document: CalibrationDocument = serde_json::from_slice(json)?;
        let cameras = &document.calibration_information.cameras;

        let find = |location: &str| {
            cameras
                .iter()
                .find(|c| c.location == location)
                .ok_or_else(|| RecordingError::Calibration(format!("no camera at {}", location)))
        };

        let calibration = Self {
            depth_camera: find(DEPTH_LOCATION)?.to_camera(depth)?,
            color_camera: find(COLOR_LOCATION)?.to_camera(color)?,
        };
        debug!(
            depth = %calibration.depth_camera.resolution,
            color = %calibration.color_camera.resolution,
            "Loaded calibration"
        );
        Ok(calibration)
    }
}

/// How a recorded mode maps onto the full sensor
///
/// The sensor is first binned to `binned`, then `crop` pixels are removed
/// from the top-left, leaving `output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeGeometry {
    pub binned: Resolution,
    pub crop: (u32, u32),
    pub output: Resolution,
}

impl ModeGeometry {
    /// Mode covering the whole (binned) sensor with no crop
    pub fn uncropped(output: Resolution) -> Self {
        Self {
            binned: output,
            crop: (0, 0),
            output,
        }
    }

    /// Depth mode geometry from its tag name
    pub fn for_depth_mode(mode: &str) -> Option<Self> {
        let (binned, crop, output) = match mode {
            "NFOV_2X2BINNED" => ((512, 512), (96, 90), (320, 288)),
            "NFOV_UNBINNED" => ((1024, 1024), (192, 180), (640, 576)),
            "WFOV_2X2BINNED" => ((512, 512), (0, 0), (512, 512)),
            "WFOV_UNBINNED" | "PASSIVE_IR" => ((1024, 1024), (0, 0), (1024, 1024)),
            _ => return None,
        };
        Some(Self::from_tuples(binned, crop, output))
    }

    /// Color mode geometry from its tag name, e.g. `MJPG_1080P`
    pub fn for_color_mode(mode: &str) -> Option<Self> {
        let resolution = mode.rsplit('_').next()?;
        let (binned, crop, output) = match resolution {
            "720P" => ((1280, 960), (0, 120), (1280, 720)),
            "1080P" => ((1920, 1440), (0, 180), (1920, 1080)),
            "1440P" => ((2560, 1920), (0, 240), (2560, 1440)),
            "1536P" => ((2048, 1536), (0, 0), (2048, 1536)),
            "2160P" => ((3840, 2880), (0, 360), (3840, 2160)),
            "3072P" => ((4096, 3072), (0, 0), (4096, 3072)),
            _ => return None,
        };
        Some(Self::from_tuples(binned, crop, output))
    }

    /// Use the tagged mode if it matches the recorded resolution
    pub fn resolve(mode: Option<Self>, recorded: Resolution) -> Self {
        match mode {
            Some(mode) if mode.output == recorded => mode,
            _ => Self::uncropped(recorded),
        }
    }

    fn from_tuples(binned: (u32, u32), crop: (u32, u32), output: (u32, u32)) -> Self {
        Self {
            binned: Resolution::new(binned.0, binned.1),
            crop,
            output: Resolution::new(output.0, output.1),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CalibrationDocument {
    calibration_information: CalibrationInformation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CalibrationInformation {
    cameras: Vec<CameraEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CameraEntry {
    location: String,
    intrinsics: IntrinsicsEntry,
    rt: RtEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IntrinsicsEntry {
    model_parameters: Vec<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RtEntry {
    rotation: Vec<f32>,
    translation: Vec<f32>,
}

impl CameraEntry {
    fn to_camera(&self, mode: ModeGeometry) -> Result<CameraCalibration, RecordingError> {
        let p = &self.intrinsics.model_parameters;
        if p.len() < 4 {
            return Err(RecordingError::Calibration(format!(
                "{} has {} intrinsic parameters",
                self.location,
                p.len()
            )));
        }
        let param = |i: usize| p.get(i).copied().unwrap_or(0.0);
        let bw = mode.binned.width as f32;
        let bh = mode.binned.height as f32;

        let intrinsics = Intrinsics {
            cx: param(0) * bw - 0.5 - mode.crop.0 as f32,
            cy: param(1) * bh - 0.5 - mode.crop.1 as f32,
            fx: param(2) * bw,
            fy: param(3) * bh,
            k1: param(4),
            k2: param(5),
            k3: param(6),
            k4: param(7),
            k5: param(8),
            k6: param(9),
            codx: param(10),
            cody: param(11),
            p2: param(12),
            p1: param(13),
            metric_radius: param(14),
        };

        let rotation: [f32; 9] = self.rt.rotation.as_slice().try_into().map_err(|_| {
            RecordingError::Calibration(format!("{} rotation is not 3x3", self.location))
        })?;
        let translation: [f32; 3] = self.rt.translation.as_slice().try_into().map_err(|_| {
            RecordingError::Calibration(format!("{} translation is not 3D", self.location))
        })?;

        Ok(CameraCalibration {
            resolution: mode.output,
            intrinsics,
            extrinsics: Extrinsics {
                rotation,
                translation: translation.map(|meters| meters * 1000.0),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "CalibrationInformation": {
            "Cameras": [
                {
                    "Intrinsics": {
                        "ModelParameterCount": 14,
                        "ModelParameters": [0.5, 0.5, 0.5, 0.5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                        "ModelType": "CALIBRATION_LensDistortionModelBrownConrady"
                    },
                    "Location": "CALIBRATION_CameraLocationD0",
                    "Purpose": "CALIBRATION_CameraPurposeDepth",
                    "Rt": {
                        "Rotation": [1, 0, 0, 0, 1, 0, 0, 0, 1],
                        "Translation": [0, 0, 0]
                    },
                    "SensorHeight": 1024,
                    "SensorWidth": 1024
                },
                {
                    "Intrinsics": {
                        "ModelParameterCount": 14,
                        "ModelParameters": [0.5, 0.5, 0.5, 0.5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                        "ModelType": "CALIBRATION_LensDistortionModelBrownConrady"
                    },
                    "Location": "CALIBRATION_CameraLocationPV0",
                    "Purpose": "CALIBRATION_CameraPurposePhotoVideo",
                    "Rt": {
                        "Rotation": [1, 0, 0, 0, 1, 0, 0, 0, 1],
                        "Translation": [-0.032, 0, 0.004]
                    },
                    "SensorHeight": 3072,
                    "SensorWidth": 4096
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_and_mode_intrinsics() {
        let depth = ModeGeometry::for_depth_mode("NFOV_UNBINNED").unwrap();
        let color = ModeGeometry::for_color_mode("MJPG_720P").unwrap();
        let calibration = Calibration::from_json(SAMPLE.as_bytes(), depth, color).unwrap();

        let d = calibration.depth_camera;
        assert_eq!(d.resolution, Resolution::new(640, 576));
        assert_eq!(d.intrinsics.cx, 512.0 - 0.5 - 192.0);
        assert_eq!(d.intrinsics.fx, 512.0);

        let c = calibration.color_camera;
        assert_eq!(c.resolution, Resolution::new(1280, 720));
        assert_eq!(c.intrinsics.cy, 480.0 - 0.5 - 120.0);
        assert_eq!(c.extrinsics.translation, [-32.0, 0.0, 4.0]);
    }

    #[test]
    fn test_missing_camera_is_an_error() {
        let json = r#"{"CalibrationInformation": {"Cameras": []}}"#;
        let mode = ModeGeometry::uncropped(Resolution::new(4, 4));
        assert!(matches!(
            Calibration::from_json(json.as_bytes(), mode, mode),
            Err(RecordingError::Calibration(_))
        ));
    }

    #[test]
    fn test_resolve_falls_back_when_mode_disagrees() {
        let tagged = ModeGeometry::for_depth_mode("WFOV_2X2BINNED");
        let recorded = Resolution::new(8, 6);
        assert_eq!(
            ModeGeometry::resolve(tagged, recorded),
            ModeGeometry::uncropped(recorded)
        );
    }

    #[test]
    fn test_unproject_inverts_project_with_distortion() {
        let intrinsics = Intrinsics {
            k1: 0.1,
            k2: -0.02,
            p1: 0.001,
            p2: -0.001,
            ..Intrinsics::pinhole(320.0, 288.0, 500.0, 500.0)
        };
        let [x, y] = intrinsics.unproject(100.0, 420.0).unwrap();
        let [u, v] = intrinsics.project(x, y).unwrap();
        assert!((u - 100.0).abs() < 1e-2);
        assert!((v - 420.0).abs() < 1e-2);
    }

    #[test]
    fn test_extrinsics_inverse_and_compose() {
        let rt = Extrinsics {
            rotation: [0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            translation: [10.0, 20.0, 30.0],
        };
        let round_trip = rt.compose(&rt.inverse());
        let p = round_trip.apply([1.0, 2.0, 3.0]);
        for (a, b) in p.iter().zip([1.0, 2.0, 3.0]) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}

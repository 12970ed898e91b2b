// SPDX-License-Identifier: GPL-3.0-only

//! Depth to color registration
//!
//! Reprojects a depth frame from the depth sensor's pixel grid into the
//! color camera's pixel grid. Each valid depth pixel is lifted to 3D at its
//! four corners, moved into the color camera and projected; the color pixels
//! whose centers fall inside the projected footprint receive its depth, with
//! the nearest surface winning where footprints overlap.
//!
//! Output samples are millimeters along the color camera's optical axis,
//! 0 where no depth pixel lands.

use super::constants::{DEPTH_INVALID_MM, MAX_SPLAT_EXTENT};
use crate::backends::recording::calibration::{Calibration, CameraCalibration, Extrinsics};
use crate::backends::recording::types::Resolution;
use tracing::debug;

/// Precomputed depth-to-color reprojection for one calibration
#[derive(Debug, Clone)]
pub struct DepthRemapper {
    depth: Resolution,
    color: CameraCalibration,
    depth_to_color: Extrinsics,
    /// Normalized rays through depth pixel corners, `(w + 1) * (h + 1)`
    corners: Vec<Option<[f32; 2]>>,
}

impl DepthRemapper {
    pub fn new(calibration: &Calibration) -> Self {
        Self::from_cameras(
            &calibration.depth_camera,
            &calibration.color_camera,
            calibration.depth_to_color(),
        )
    }

    pub fn from_cameras(
        depth: &CameraCalibration,
        color: &CameraCalibration,
        depth_to_color: Extrinsics,
    ) -> Self {
        let Resolution { width, height } = depth.resolution;
        let mut corners = Vec::with_capacity((width as usize + 1) * (height as usize + 1));
        for y in 0..=height {
            for x in 0..=width {
                corners.push(
                    depth
                        .intrinsics
                        .unproject(x as f32 - 0.5, y as f32 - 0.5),
                );
            }
        }
        let invalid = corners.iter().filter(|c| c.is_none()).count();
        debug!(
            depth = %depth.resolution,
            color = %color.resolution,
            invalid_corners = invalid,
            "Built depth remapper"
        );

        Self {
            depth: depth.resolution,
            color: *color,
            depth_to_color,
            corners,
        }
    }

    /// Geometry of frames accepted by [`DepthRemapper::remap`]
    pub fn depth_resolution(&self) -> Resolution {
        self.depth
    }

    /// Geometry of frames produced by [`DepthRemapper::remap`]
    pub fn color_resolution(&self) -> Resolution {
        self.color.resolution
    }

    fn corner(&self, x: u32, y: u32) -> Option<[f32; 2]> {
        let stride = self.depth.width as usize + 1;
        self.corners[y as usize * stride + x as usize]
    }

    /// Project a depth pixel corner at `depth_mm` into the color image
    fn project_corner(&self, x: u32, y: u32, depth_mm: f32) -> Option<([f32; 2], f32)> {
        let [nx, ny] = self.corner(x, y)?;
        let [cx, cy, cz] = self
            .depth_to_color
            .apply([nx * depth_mm, ny * depth_mm, depth_mm]);
        if cz <= 0.0 {
            return None;
        }
        let pixel = self.color.intrinsics.project(cx / cz, cy / cz)?;
        Some((pixel, cz))
    }

    /// Reproject a depth frame, `None` if its length does not match the depth geometry
    pub fn remap(&self, depth_mm: &[u16]) -> Option<Vec<u16>> {
        if depth_mm.len() != self.depth.pixel_count() {
            return None;
        }
        let Resolution {
            width: out_w,
            height: out_h,
        } = self.color.resolution;
        let mut out = vec![DEPTH_INVALID_MM; self.color.resolution.pixel_count()];

        for y in 0..self.depth.height {
            for x in 0..self.depth.width {
                let d = depth_mm[(y * self.depth.width + x) as usize];
                if d == DEPTH_INVALID_MM {
                    continue;
                }
                let d = d as f32;

                let mut min = [f32::MAX; 2];
                let mut max = [f32::MIN; 2];
                let mut z_sum = 0.0;
                let mut complete = true;
                for (cx, cy) in [(x, y), (x + 1, y), (x, y + 1), (x + 1, y + 1)] {
                    let Some((pixel, z)) = self.project_corner(cx, cy, d) else {
                        complete = false;
                        break;
                    };
                    for axis in 0..2 {
                        min[axis] = min[axis].min(pixel[axis]);
                        max[axis] = max[axis].max(pixel[axis]);
                    }
                    z_sum += z;
                }
                if !complete
                    || max[0] - min[0] > MAX_SPLAT_EXTENT
                    || max[1] - min[1] > MAX_SPLAT_EXTENT
                {
                    continue;
                }

                let z = (z_sum / 4.0).round().clamp(1.0, u16::MAX as f32) as u16;
                let u_start = min[0].ceil().max(0.0) as u32;
                let u_end = (max[0].ceil().max(0.0) as u32).min(out_w);
                let v_start = min[1].ceil().max(0.0) as u32;
                let v_end = (max[1].ceil().max(0.0) as u32).min(out_h);

                for v in v_start..v_end {
                    let row = (v * out_w) as usize;
                    for u in u_start..u_end {
                        let slot = &mut out[row + u as usize];
                        if *slot == DEPTH_INVALID_MM || z < *slot {
                            *slot = z;
                        }
                    }
                }
            }
        }

        Some(out)
    }
}

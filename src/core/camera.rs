//! Camera state shared between linked viewports.
//!
//! The coordinator only copies, compares and forwards a `CameraState`.
//! The zoom/pan helpers below model the viewer tools that produce
//! camera changes in the first place (headless engine, scenario runner).

use glam::Vec2;
use log::debug;
use serde::{Deserialize, Serialize};

/// Default near-equality tolerance for camera comparison.
pub const DEFAULT_TOLERANCE: f32 = 0.005;

// Zoom constants
const ZOOM_STEP: f32 = 0.025;
const ZOOM_IN_FACTOR: f32 = 1.0 + ZOOM_STEP;
const ZOOM_OUT_FACTOR: f32 = 1.0 / ZOOM_IN_FACTOR;

/// Allowed zoom range for interactive zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: 0.01, max: 100.0 }
    }
}

impl ZoomLimits {
    /// Never panics, even for inverted or NaN limits (`max` wins).
    pub fn clamp(&self, zoom: f32) -> f32 {
        zoom.max(self.min).min(self.max)
    }
}

/// Camera transform of one viewport: zoom factor, pan offset (pixels), rotation (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraState {
    pub zoom: f32,
    pub pan: Vec2,
    pub rotation: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Vec2::ZERO,
            rotation: 0.0,
        }
    }
}

/// True when `a` and `b` are equal within `tolerance`.
///
/// Bitwise-equal values (including infinities) always match; NaN never does.
#[inline]
fn within(a: f32, b: f32, tolerance: f32) -> bool {
    a == b || (a - b).abs() <= tolerance
}

impl CameraState {
    pub fn new(zoom: f32) -> Self {
        Self {
            zoom,
            ..Self::default()
        }
    }

    pub fn with_pan(mut self, pan: Vec2) -> Self {
        self.pan = pan;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    /// Near-equality: every component within `tolerance`.
    pub fn approx_eq(&self, other: &CameraState, tolerance: f32) -> bool {
        within(self.zoom, other.zoom, tolerance)
            && within(self.pan.x, other.pan.x, tolerance)
            && within(self.pan.y, other.pan.y, tolerance)
            && within(self.rotation, other.rotation, tolerance)
    }

    /// Inverse of [`approx_eq`](Self::approx_eq).
    pub fn differs(&self, other: &CameraState, tolerance: f32) -> bool {
        !self.approx_eq(other, tolerance)
    }

    /// Reset to 100% zoom, centered, unrotated
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fit `image_size` into `viewport_size`, centered.
    /// Degenerate image sizes leave the camera untouched.
    pub fn fit(&mut self, image_size: Vec2, viewport_size: Vec2) {
        if image_size.x <= 0.0 || image_size.y <= 0.0 {
            return;
        }
        let scale_x = viewport_size.x / image_size.x;
        let scale_y = viewport_size.y / image_size.y;
        self.zoom = scale_x.min(scale_y);
        self.pan = Vec2::ZERO;
    }

    /// One zoom step centered on the cursor.
    ///
    /// `cursor_pos` is in screen space (origin top-left of the viewport).
    /// Returns false when `zoom_delta` is too small to count as a step, or
    /// when the current zoom is not a finite positive factor.
    pub fn zoom_step(
        &mut self,
        zoom_delta: f32,
        cursor_pos: Vec2,
        viewport_size: Vec2,
        limits: ZoomLimits,
    ) -> bool {
        if zoom_delta.abs() < 0.001 {
            return false;
        }

        let old_zoom = self.zoom;
        if !old_zoom.is_finite() || old_zoom <= 0.0 {
            debug!("Zoom step ignored, degenerate zoom {}", old_zoom);
            return false;
        }
        let zoom_factor = if zoom_delta > 0.0 {
            ZOOM_IN_FACTOR
        } else {
            ZOOM_OUT_FACTOR
        };
        self.zoom = limits.clamp(self.zoom * zoom_factor);

        // Keep the point under the cursor stationary
        let zoom_ratio = self.zoom / old_zoom;
        let mut cursor_to_center = cursor_pos - viewport_size * 0.5;
        cursor_to_center.y = -cursor_to_center.y;
        self.pan = cursor_to_center - (cursor_to_center - self.pan) * zoom_ratio;

        debug!(
            "Zoom: {:.2}x, Pan: ({:.1}, {:.1})",
            self.zoom, self.pan.x, self.pan.y
        );
        true
    }

    /// Pan by a screen-space delta (y grows downwards on screen, upwards in view space)
    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += Vec2::new(delta.x, -delta.y);
        debug!("Pan: ({:.1}, {:.1})", self.pan.x, self.pan.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_eq_within_tolerance() {
        let a = CameraState::new(2.0);
        let b = CameraState::new(2.004);
        assert!(a.approx_eq(&b, DEFAULT_TOLERANCE));
        assert!(!a.differs(&b, DEFAULT_TOLERANCE));

        let c = CameraState::new(2.01);
        assert!(a.differs(&c, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_approx_eq_checks_pan_and_rotation() {
        let a = CameraState::new(1.0);
        assert!(a.differs(&a.with_pan(Vec2::new(0.0, 3.0)), DEFAULT_TOLERANCE));
        assert!(a.differs(&a.with_rotation(90.0), DEFAULT_TOLERANCE));
        assert!(a.approx_eq(&a.with_pan(Vec2::new(0.001, -0.001)), DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_nan_never_matches() {
        let a = CameraState::new(f32::NAN);
        assert!(a.differs(&a, DEFAULT_TOLERANCE));
        assert!(a.differs(&CameraState::new(1.0), DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_zoom_step_clamps_and_ignores_tiny_delta() {
        let limits = ZoomLimits { min: 0.5, max: 1.02 };
        let size = Vec2::new(400.0, 400.0);
        let mut cam = CameraState::default();

        assert!(!cam.zoom_step(0.0001, size * 0.5, size, limits));
        assert_eq!(cam.zoom, 1.0);

        assert!(cam.zoom_step(1.0, size * 0.5, size, limits));
        assert_eq!(cam.zoom, 1.02);
    }

    #[test]
    fn test_zoom_step_rejects_degenerate_zoom() {
        let size = Vec2::new(400.0, 400.0);
        for zoom in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let mut cam = CameraState::new(zoom).with_pan(Vec2::new(3.0, 4.0));
            assert!(!cam.zoom_step(1.0, Vec2::ZERO, size, ZoomLimits::default()));
            assert_eq!(cam.pan, Vec2::new(3.0, 4.0));
        }
    }

    #[test]
    fn test_inverted_limits_do_not_panic() {
        let limits = ZoomLimits { min: 2.0, max: 1.0 };
        assert_eq!(limits.clamp(1.5), 1.0);
        assert_eq!(limits.clamp(f32::NAN), 1.0);
    }

    #[test]
    fn test_reset() {
        let mut cam = CameraState::new(3.0)
            .with_pan(Vec2::new(5.0, -2.0))
            .with_rotation(90.0);
        cam.reset();
        assert_eq!(cam, CameraState::default());
    }

    #[test]
    fn test_zoom_step_at_center_keeps_pan() {
        let size = Vec2::new(400.0, 300.0);
        let mut cam = CameraState::default();
        cam.zoom_step(1.0, size * 0.5, size, ZoomLimits::default());
        assert!((cam.zoom - ZOOM_IN_FACTOR).abs() < 1e-6);
        assert!(cam.pan.length() < 1e-4);

        cam.zoom_step(-1.0, size * 0.5, size, ZoomLimits::default());
        assert!((cam.zoom - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pan_flips_y() {
        let mut cam = CameraState::default();
        cam.pan_by(Vec2::new(10.0, 5.0));
        assert_eq!(cam.pan, Vec2::new(10.0, -5.0));
    }

    #[test]
    fn test_fit() {
        let mut cam = CameraState::new(3.0).with_pan(Vec2::new(5.0, 5.0));
        cam.fit(Vec2::new(1920.0, 1080.0), Vec2::new(960.0, 960.0));
        assert!((cam.zoom - 0.5).abs() < 1e-6);
        assert_eq!(cam.pan, Vec2::ZERO);

        let before = cam;
        cam.fit(Vec2::ZERO, Vec2::new(960.0, 960.0));
        assert_eq!(cam, before);
    }

    #[test]
    fn test_serde_defaults() {
        let cam: CameraState = serde_json::from_str(r#"{"zoom": 1.5}"#).unwrap();
        assert_eq!(cam, CameraState::new(1.5));
    }
}

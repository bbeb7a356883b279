//! Orthographic globe projection and the pointer behaviours that drive it.
//!
//! Screen coordinates have y pointing down. The far hemisphere is clipped at
//! 90 degrees from the view centre.

use nalgebra::{Matrix3, Vector3};

use crate::config::{AutoRotateConfig, GlobeConfig};
use crate::math::{cartesian, geo_distance, spherical, view_rotation};
use crate::orbit::GeoPoint;

/// Markers further than this from the view centre (radians) are hidden.
pub const VISIBILITY_ANGLE: f64 = 1.57;

#[derive(Clone, Debug)]
pub struct Orthographic {
    rotation: [f64; 3],
    matrix: Matrix3<f64>,
    scale: f64,
    translate: [f64; 2],
}

impl Orthographic {
    pub fn new(scale: f64, translate: [f64; 2]) -> Self {
        Self {
            rotation: [0.0; 3],
            matrix: Matrix3::identity(),
            scale,
            translate,
        }
    }

    pub fn rotation(&self) -> [f64; 3] {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: [f64; 3]) {
        self.rotation = rotation;
        self.matrix = view_rotation(rotation);
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    pub fn set_translate(&mut self, translate: [f64; 2]) {
        self.translate = translate;
    }

    fn to_screen(&self, v: &Vector3<f64>) -> [f64; 2] {
        [
            self.translate[0] + self.scale * v.y,
            self.translate[1] - self.scale * v.z,
        ]
    }

    /// Screen position and whether the point faces the viewer.
    pub fn project_unclipped(&self, p: GeoPoint) -> ([f64; 2], bool) {
        let v = self.matrix * cartesian(p);
        (self.to_screen(&v), v.x >= 0.0)
    }

    pub fn project(&self, p: GeoPoint) -> Option<[f64; 2]> {
        match self.project_unclipped(p) {
            (xy, true) => Some(xy),
            _ => None,
        }
    }

    pub fn invert(&self, xy: [f64; 2]) -> Option<GeoPoint> {
        let x = (xy[0] - self.translate[0]) / self.scale;
        let y = (self.translate[1] - xy[1]) / self.scale;
        let rho_sq = x * x + y * y;
        if rho_sq > 1.0 {
            return None;
        }
        let v = Vector3::new((1.0 - rho_sq).sqrt(), x, y);
        Some(spherical(&(self.matrix.transpose() * v)))
    }

    /// The geographic point under the centre of the view.
    pub fn center(&self) -> GeoPoint {
        spherical(&(self.matrix.transpose() * Vector3::x()))
    }

    /// Turns the globe so `p` sits at the centre of the view, keeping the
    /// current roll.
    pub fn look_at(&mut self, p: GeoPoint) {
        let gamma = self.rotation[2];
        self.set_rotation([-p.lng, -p.lat.clamp(-90.0, 90.0), gamma]);
    }

    pub fn is_visible(&self, p: GeoPoint) -> bool {
        geo_distance(p, self.center()) <= VISIBILITY_ANGLE
    }

    /// Rotates by a pointer drag of `(dx, dy)` pixels. Latitude tilt is
    /// kept within the poles so the globe never turns upside down.
    pub fn drag(&mut self, dx: f64, dy: f64, sensitivity: f64) {
        let k = sensitivity / self.scale;
        let [lambda, phi, gamma] = self.rotation;
        self.set_rotation([
            lambda + dx * k,
            (phi - dy * k).clamp(-90.0, 90.0),
            gamma,
        ]);
    }
}

/// Zoom factor `k` clamped to an extent; the projection scale is the base
/// scale times `k` and markers are drawn with radius `k`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomBehavior {
    k: f64,
    min: f64,
    max: f64,
}

impl ZoomBehavior {
    pub fn new(min: f64, max: f64) -> Self {
        Self { k: 1.0_f64.clamp(min, max), min, max }
    }

    pub fn from_config(config: &GlobeConfig) -> Self {
        Self::new(config.zoom_min, config.zoom_max)
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn extent(&self) -> [f64; 2] {
        [self.min, self.max]
    }

    pub fn set(&mut self, k: f64) {
        if k.is_finite() {
            self.k = k.clamp(self.min, self.max);
        }
    }

    pub fn scale_by(&mut self, factor: f64) {
        self.set(self.k * factor);
    }

    pub fn marker_radius(&self) -> f64 {
        self.k
    }

    pub fn projection_scale(&self, base_scale: f64) -> f64 {
        base_scale * self.k
    }
}

#[derive(Clone, Debug)]
pub struct AutoRotate {
    pub config: AutoRotateConfig,
    elapsed_ms: f64,
}

impl AutoRotate {
    pub fn new(config: AutoRotateConfig) -> Self {
        Self { config, elapsed_ms: 0.0 }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Advances the spin clock and returns the rotation to apply, if enabled.
    pub fn advance(&mut self, dt_ms: f64) -> Option<[f64; 3]> {
        if !self.config.enabled {
            return None;
        }
        self.elapsed_ms += dt_ms;
        Some(self.rotation_at(self.elapsed_ms))
    }

    /// Continues spinning from `rotation` instead of jumping back to the
    /// configured offset and tilts.
    pub fn resume_from(&mut self, rotation: [f64; 3]) {
        self.config.offset = rotation[0] - self.config.speed * self.elapsed_ms;
        self.config.vertical_tilt = rotation[1];
        self.config.horizontal_tilt = rotation[2];
    }

    pub fn rotation_at(&self, elapsed_ms: f64) -> [f64; 3] {
        [
            self.config.speed * elapsed_ms + self.config.offset,
            self.config.vertical_tilt,
            self.config.horizontal_tilt,
        ]
    }
}

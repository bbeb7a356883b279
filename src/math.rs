//! Spherical coordinate helpers and the three-axis view rotation.
//!
//! Unit vectors use x toward (0°, 0°), y toward (0°, 90°E) and z toward the
//! north pole.

use nalgebra::{Matrix3, Vector3};

use crate::orbit::GeoPoint;
use crate::time::normalize_longitude_deg;

pub fn cartesian(p: GeoPoint) -> Vector3<f64> {
    let (lat, lng) = (p.lat.to_radians(), p.lng.to_radians());
    let cos_lat = lat.cos();
    Vector3::new(cos_lat * lng.cos(), cos_lat * lng.sin(), lat.sin())
}

pub fn spherical(v: &Vector3<f64>) -> GeoPoint {
    let n = v.norm();
    if n == 0.0 {
        return GeoPoint::new(0.0, 0.0);
    }
    let lat = (v.z / n).clamp(-1.0, 1.0).asin().to_degrees();
    let lng = normalize_longitude_deg(v.y.atan2(v.x).to_degrees());
    GeoPoint::new(lat, lng)
}

/// Rotation applying `[lambda, phi, gamma]` (degrees): a spin about the polar
/// axis by lambda, then a tilt about the y axis by phi, then a roll about the
/// viewing axis by gamma.
pub fn view_rotation(rotate: [f64; 3]) -> Matrix3<f64> {
    let [l, p, g] = rotate.map(f64::to_radians);
    let (sl, cl) = l.sin_cos();
    let (sp, cp) = p.sin_cos();
    let (sg, cg) = g.sin_cos();
    let rot_z = Matrix3::new(
        cl, -sl, 0.0,
        sl, cl, 0.0,
        0.0, 0.0, 1.0,
    );
    let rot_y = Matrix3::new(
        cp, 0.0, -sp,
        0.0, 1.0, 0.0,
        sp, 0.0, cp,
    );
    let rot_x = Matrix3::new(
        1.0, 0.0, 0.0,
        0.0, cg, -sg,
        0.0, sg, cg,
    );
    rot_x * rot_y * rot_z
}

/// Great-circle angle between two points in radians.
pub fn geo_distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * h.sqrt().clamp(0.0, 1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn cartesian_spherical_agree() {
        let p = GeoPoint::new(37.5, -122.25);
        let q = spherical(&cartesian(p));
        assert_relative_eq!(p.lat, q.lat, epsilon = 1e-9);
        assert_relative_eq!(p.lng, q.lng, epsilon = 1e-9);
    }

    #[test]
    fn lambda_adds_to_longitude() {
        let m = view_rotation([30.0, 0.0, 0.0]);
        let q = spherical(&(m * cartesian(GeoPoint::new(10.0, 20.0))));
        assert_relative_eq!(q.lat, 10.0, epsilon = 1e-9);
        assert_relative_eq!(q.lng, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn phi_tilts_pole_toward_viewer() {
        // A negative phi brings the northern hemisphere toward the x axis.
        let m = view_rotation([0.0, -30.0, 0.0]);
        let q = spherical(&(m * cartesian(GeoPoint::new(30.0, 0.0))));
        assert_relative_eq!(q.lat, 0.0, epsilon = 1e-9);
        assert_relative_eq!(q.lng, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn rotation_is_orthonormal() {
        let m = view_rotation([-120.0, -30.0, 12.0]);
        assert_relative_eq!(m * m.transpose(), Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn distances() {
        let a = GeoPoint::new(0.0, 0.0);
        assert_relative_eq!(geo_distance(a, GeoPoint::new(0.0, 90.0)), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(geo_distance(a, GeoPoint::new(0.0, 180.0)), PI, epsilon = 1e-12);
        assert_relative_eq!(geo_distance(GeoPoint::new(90.0, 0.0), GeoPoint::new(-90.0, 45.0)), PI, epsilon = 1e-12);
        assert_relative_eq!(geo_distance(a, a), 0.0);
    }
}

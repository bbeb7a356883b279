//! Earth orientation and frame conversion.
//!
//! Greenwich Mean Sidereal Time and the TEME to geodetic conversion used to
//! turn SGP4 output into latitude/longitude.

use std::f64::consts::PI;
use chrono::{DateTime, Utc};
use crate::tle::SECONDS_PER_DAY;

pub const DAYS_PER_JULIAN_CENTURY: f64 = 36525.0;
pub const GMST_BASE_DEG: f64 = 280.46061837;
pub const GMST_ROTATION_PER_DAY: f64 = 360.98564736629;
pub const GMST_CORRECTION: f64 = 0.000387933;
/// 2000-01-01T12:00:00Z.
pub const J2000_UNIX_MILLIS: i64 = 946_728_000_000;

pub const WGS84_EQUATORIAL_RADIUS_KM: f64 = 6378.137;
pub const WGS84_POLAR_RADIUS_KM: f64 = 6356.7523142;

const GEODETIC_MAX_ITERATIONS: usize = 20;
const GEODETIC_TOLERANCE_RAD: f64 = 1e-10;

pub fn greenwich_mean_sidereal_time(timestamp: DateTime<Utc>) -> f64 {
    let days_since_j2000 =
        (timestamp.timestamp_millis() - J2000_UNIX_MILLIS) as f64 / (1000.0 * SECONDS_PER_DAY);
    let centuries = days_since_j2000 / DAYS_PER_JULIAN_CENTURY;
    let gmst_degrees = GMST_BASE_DEG
        + GMST_ROTATION_PER_DAY * days_since_j2000
        + GMST_CORRECTION * centuries * centuries
        - centuries * centuries * centuries / 38710000.0;
    gmst_degrees.rem_euclid(360.0).to_radians()
}

/// Wraps degrees into `[-180, 180)`.
pub fn normalize_longitude_deg(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geodetic {
    pub lat_deg: f64,
    pub lng_deg: f64,
    pub height_km: f64,
}

/// Converts a TEME position (km) to WGS-84 geodetic coordinates, rotating by
/// `gmst` (radians) into the Earth-fixed frame.
pub fn teme_to_geodetic(position_km: [f64; 3], gmst: f64) -> Geodetic {
    let a = WGS84_EQUATORIAL_RADIUS_KM;
    let f = (a - WGS84_POLAR_RADIUS_KM) / a;
    let e2 = 2.0 * f - f * f;
    let [x, y, z] = position_km;
    let r = (x * x + y * y).sqrt();

    let lon = normalize_longitude_deg((y.atan2(x) - gmst).to_degrees());

    let mut lat = z.atan2(r);
    let mut c = 1.0;
    for _ in 0..GEODETIC_MAX_ITERATIONS {
        let sin_lat = lat.sin();
        c = 1.0 / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let next = (z + a * c * e2 * sin_lat).atan2(r);
        let delta = (next - lat).abs();
        lat = next;
        if delta < GEODETIC_TOLERANCE_RAD {
            break;
        }
    }

    let height_km = if lat.abs() < PI / 2.0 - 1e-9 {
        r / lat.cos() - a * c
    } else {
        z.abs() - WGS84_POLAR_RADIUS_KM
    };

    Geodetic {
        lat_deg: lat.to_degrees(),
        lng_deg: lon,
        height_km,
    }
}

//! Sub-satellite points and ground tracks from SGP4.
//!
//! Produces the two sample layouts the viewer works with: frames (every
//! satellite at one instant) and per-satellite series, plus orbit-by-orbit
//! ground tracks split at antimeridian crossings.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::time::{greenwich_mean_sidereal_time, teme_to_geodetic};
use crate::tle::TleSatellite;

/// Latitude and longitude in degrees, longitude in `[-180, 180)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Clone, Debug)]
pub struct SatelliteFix {
    pub norad_id: u64,
    pub name: Arc<str>,
    pub point: GeoPoint,
    pub height_km: f64,
}

/// Every satellite that propagated successfully at one instant.
#[derive(Clone, Debug)]
pub struct Frame {
    pub at: DateTime<Utc>,
    pub fixes: Vec<SatelliteFix>,
}

/// Previous, current and next orbit, each running from one antimeridian
/// crossing to the next.
#[derive(Clone, Debug, Default)]
pub struct GroundTrack {
    pub orbits: [Vec<GeoPoint>; 3],
}

impl GroundTrack {
    pub fn previous(&self) -> &[GeoPoint] {
        &self.orbits[0]
    }

    pub fn current(&self) -> &[GeoPoint] {
        &self.orbits[1]
    }

    pub fn next(&self) -> &[GeoPoint] {
        &self.orbits[2]
    }

    /// Whether `p` lies on the current orbit, within `tolerance_deg` of one
    /// of its samples. Goes false once the satellite starts its next orbit.
    pub fn covers(&self, p: GeoPoint, tolerance_deg: f64) -> bool {
        self.current()
            .iter()
            .any(|q| (q.lat - p.lat).abs() <= tolerance_deg && (q.lng - p.lng).abs() <= tolerance_deg)
    }
}

fn minutes_since_epoch(sat: &TleSatellite, at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 60_000.0 - sat.epoch_minutes
}

fn propagate_point(sat: &TleSatellite, at: DateTime<Utc>, gmst: f64) -> Result<(GeoPoint, f64)> {
    let prediction = sat
        .constants
        .propagate(sgp4::MinutesSinceEpoch(minutes_since_epoch(sat, at)))
        .map_err(|e| Error::Propagation {
            name: sat.name.clone(),
            reason: e.to_string(),
        })?;
    let g = teme_to_geodetic(prediction.position, gmst);
    Ok((GeoPoint::new(g.lat_deg, g.lng_deg), g.height_km))
}

pub fn sub_satellite_point(sat: &TleSatellite, at: DateTime<Utc>) -> Result<SatelliteFix> {
    let (point, height_km) = propagate_point(sat, at, greenwich_mean_sidereal_time(at))?;
    Ok(SatelliteFix {
        norad_id: sat.norad_id,
        name: Arc::from(sat.name.as_str()),
        point,
        height_km,
    })
}

/// `count` frames, frame `i` at `start + i * step`. Satellites whose
/// propagation fails at an instant are absent from that frame.
pub fn positions_by_time(
    satellites: &[TleSatellite],
    start: DateTime<Utc>,
    count: usize,
    step: Duration,
) -> Vec<Frame> {
    let started = Utc::now();
    let names: Vec<Arc<str>> = satellites.iter().map(|s| Arc::from(s.name.as_str())).collect();
    let mut failures = 0usize;

    let frames: Vec<Frame> = (0..count)
        .map(|i| {
            let at = start + step * i as i32;
            let gmst = greenwich_mean_sidereal_time(at);
            let fixes = satellites
                .iter()
                .zip(&names)
                .filter_map(|(sat, name)| match propagate_point(sat, at, gmst) {
                    Ok((point, height_km)) => Some(SatelliteFix {
                        norad_id: sat.norad_id,
                        name: name.clone(),
                        point,
                        height_km,
                    }),
                    Err(_) => {
                        failures += 1;
                        None
                    }
                })
                .collect();
            Frame { at, fixes }
        })
        .collect();

    log::info!(
        "Propagated {} satellites x {} frames in {:.3}s ({} failures)",
        satellites.len(),
        count,
        (Utc::now() - started).num_milliseconds() as f64 / 1000.0,
        failures
    );
    frames
}

/// NORAD id to `count` consecutive points. A satellite that fails to
/// propagate at any instant is left out entirely.
pub fn positions_by_satellite(
    satellites: &[TleSatellite],
    start: DateTime<Utc>,
    count: usize,
    step: Duration,
) -> BTreeMap<u64, Vec<GeoPoint>> {
    let instants: Vec<(DateTime<Utc>, f64)> = (0..count)
        .map(|i| {
            let at = start + step * i as i32;
            (at, greenwich_mean_sidereal_time(at))
        })
        .collect();

    satellites
        .iter()
        .filter_map(|sat| {
            let points = instants
                .iter()
                .map(|&(at, gmst)| propagate_point(sat, at, gmst).map(|(p, _)| p))
                .collect::<Result<Vec<_>>>()
                .ok()?;
            Some((sat.norad_id, points))
        })
        .collect()
}

/// Names repeat across a feed's history; the catalogue number does not.
pub fn find_satellite(satellites: &[TleSatellite], norad_id: u64) -> Option<&TleSatellite> {
    satellites.iter().find(|s| s.norad_id == norad_id)
}

fn crosses_antimeridian(a: &GeoPoint, b: &GeoPoint) -> bool {
    (a.lng - b.lng).abs() > 180.0
}

fn search_limit(sat: &TleSatellite) -> Duration {
    Duration::milliseconds((sat.period_minutes() * 1.5 * 60_000.0) as i64)
}

fn point_at(sat: &TleSatellite, at: DateTime<Utc>) -> Result<GeoPoint> {
    propagate_point(sat, at, greenwich_mean_sidereal_time(at)).map(|(p, _)| p)
}

/// First sample time after the last antimeridian crossing at or before `at`.
fn orbit_start(sat: &TleSatellite, at: DateTime<Utc>, step: Duration) -> Result<DateTime<Utc>> {
    let limit = search_limit(sat);
    let mut t = at;
    let mut later = point_at(sat, t)?;
    while at - t < limit {
        let earlier_t = t - step;
        let earlier = point_at(sat, earlier_t)?;
        if crosses_antimeridian(&earlier, &later) {
            return Ok(t);
        }
        t = earlier_t;
        later = earlier;
    }
    Ok(at - Duration::milliseconds((sat.period_minutes() * 30_000.0) as i64))
}

/// Samples from `start` until the next antimeridian crossing. Returns the
/// points and the time of the first sample past the crossing.
fn orbit_from(
    sat: &TleSatellite,
    start: DateTime<Utc>,
    step: Duration,
) -> Result<(Vec<GeoPoint>, DateTime<Utc>)> {
    let limit = search_limit(sat);
    let mut points = vec![point_at(sat, start)?];
    let mut t = start;
    while t - start < limit {
        t += step;
        let p = point_at(sat, t)?;
        if let Some(last) = points.last() {
            if crosses_antimeridian(last, &p) {
                return Ok((points, t));
            }
        }
        points.push(p);
    }
    Ok((points, t))
}

pub fn ground_track(sat: &TleSatellite, at: DateTime<Utc>, step: Duration) -> Result<GroundTrack> {
    if step <= Duration::zero() {
        return Err(Error::Config("ground track step must be positive".into()));
    }
    let current_start = orbit_start(sat, at, step)?;
    let (current, next_start) = orbit_from(sat, current_start, step)?;
    let (next, _) = orbit_from(sat, next_start, step)?;
    let previous_start = orbit_start(sat, current_start - step, step)?;
    let (previous, _) = orbit_from(sat, previous_start, step)?;

    Ok(GroundTrack {
        orbits: [previous, current, next],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tle::fixtures::starlink_satellites;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 7, 12, 12, 0, 0).unwrap()
    }

    #[test]
    fn sub_satellite_point_stays_under_inclination() {
        let sats = starlink_satellites();
        for minutes in [0, 17, 45, 90, 600] {
            let fix = sub_satellite_point(&sats[0], epoch() + Duration::minutes(minutes)).unwrap();
            assert!(fix.point.lat.abs() <= sats[0].inclination_deg + 0.5, "lat {}", fix.point.lat);
            assert!((-180.0..180.0).contains(&fix.point.lng));
            assert!((450.0..650.0).contains(&fix.height_km), "height {}", fix.height_km);
            assert_eq!(&*fix.name, "STARLINK-1007");
            assert_eq!(fix.norad_id, 44713);
        }
    }

    #[test]
    fn frames_are_evenly_spaced_and_complete() {
        let sats = starlink_satellites();
        let frames = positions_by_time(&sats, epoch(), 5, Duration::seconds(2));
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.at, epoch() + Duration::seconds(2 * i as i64));
            assert_eq!(frame.fixes.len(), sats.len());
        }
        // A LEO satellite covers roughly 7 km/s, well under a degree per step.
        let a = frames[0].fixes[0].point;
        let b = frames[1].fixes[0].point;
        let moved = ((a.lat - b.lat).powi(2) + (a.lng - b.lng).powi(2)).sqrt();
        assert!(moved > 0.01 && moved < 1.0, "moved {}", moved);
    }

    #[test]
    fn by_satellite_matches_by_time() {
        let sats = starlink_satellites();
        let by_time = positions_by_time(&sats, epoch(), 3, Duration::seconds(1));
        let by_sat = positions_by_satellite(&sats, epoch(), 3, Duration::seconds(1));
        assert_eq!(by_sat.len(), 2);
        let series = &by_sat[&44714];
        assert_eq!(series.len(), 3);
        for (i, p) in series.iter().enumerate() {
            assert_eq!(*p, by_time[i].fixes[1].point);
        }
    }

    #[test]
    fn find_satellite_by_catalogue_number() {
        let sats = starlink_satellites();
        assert_eq!(find_satellite(&sats, 44714).map(|s| s.name.as_str()), Some("STARLINK-1008"));
        assert!(find_satellite(&sats, 44240).is_none());
    }

    #[test]
    fn ground_track_orbits_do_not_cross_antimeridian() {
        let sats = starlink_satellites();
        let step = Duration::seconds(6);
        let track = ground_track(&sats[0], epoch(), step).unwrap();
        let expected = sats[0].period_minutes() * 60.0 / 6.0;
        for orbit in &track.orbits {
            assert!(!orbit.is_empty());
            assert!(orbit.windows(2).all(|w| !crosses_antimeridian(&w[0], &w[1])));
            assert!((orbit.len() as f64) < expected * 1.2, "len {} vs {}", orbit.len(), expected);
        }
        // The current orbit is a full revolution and contains the present point.
        let len = track.current().len() as f64;
        assert!(len > expected * 0.8, "len {} vs {}", len, expected);
        let now = sub_satellite_point(&sats[0], epoch()).unwrap().point;
        let nearest = track
            .current()
            .iter()
            .map(|p| (p.lat - now.lat).abs() + (p.lng - now.lng).abs())
            .fold(f64::MAX, f64::min);
        assert!(nearest < 1e-9, "nearest {}", nearest);
        assert!(track.covers(now, 0.5));

        let later = sub_satellite_point(&sats[0], epoch() + Duration::minutes(200)).unwrap().point;
        assert!(!track.covers(later, 0.01));
    }
}

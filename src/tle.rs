//! Two-Line Element (TLE) feed handling.
//!
//! Splits the CelesTrak plaintext feed into three-line records, keeps the
//! objects whose name matches the constellation pattern (dropping rocket
//! bodies and debris that share the group) and builds SGP4 constants.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use sgp4::Constants;

use crate::error::{Error, Result};

pub const SECONDS_PER_DAY: f64 = 86400.0;
pub const EARTH_MU_KM3_S2: f64 = 398600.4418;

/// Keeps records whose name contains a match of the pattern, renaming them
/// to the matched text (`"STARLINK-1007 [DTC]"` becomes `"STARLINK-1007"`).
#[derive(Clone, Debug)]
pub struct NameFilter(Regex);

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| Error::Config(format!("name pattern {:?}: {}", pattern, e)))
    }

    pub fn matched<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.0.find(name).map(|m| m.as_str())
    }
}

/// Where the constellation's element sets come from and which names to keep.
#[derive(Clone, Debug)]
pub struct TleFeed {
    url: String,
    filter: NameFilter,
}

impl TleFeed {
    pub fn new(url: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            filter: NameFilter::new(pattern)?,
        })
    }

    pub fn from_config(config: &crate::config::GlobeConfig) -> Result<Self> {
        Self::new(config.tle_url.clone(), &config.name_pattern)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn fetch(&self) -> Result<Vec<TleSatellite>> {
        fetch_tle_data(&self.url, &self.filter)
    }

    #[cfg(target_arch = "wasm32")]
    pub(crate) async fn fetch_async(&self) -> Result<Vec<TleSatellite>> {
        fetch_tle_data_async(&self.url, &self.filter).await
    }
}

#[derive(Clone)]
pub struct TleSatellite {
    pub name: String,
    pub norad_id: u64,
    pub constants: Constants,
    pub epoch_minutes: f64,
    pub inclination_deg: f64,
    pub mean_motion: f64,
}

impl TleSatellite {
    /// Orbital period in minutes from the mean motion (revolutions per day).
    pub fn period_minutes(&self) -> f64 {
        SECONDS_PER_DAY / 60.0 / self.mean_motion
    }

    pub fn altitude_km(&self) -> f64 {
        mean_motion_to_altitude_km(self.mean_motion)
    }
}

#[derive(Clone)]
pub enum TleLoadState {
    NotLoaded,
    Loading,
    Loaded {
        satellites: Arc<Vec<TleSatellite>>,
        fetched_at: DateTime<Utc>,
    },
    Failed(String),
}

impl TleLoadState {
    pub fn satellites(&self) -> Option<&Arc<Vec<TleSatellite>>> {
        match self {
            Self::Loaded { satellites, .. } => Some(satellites),
            _ => None,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match self {
            Self::Loaded { fetched_at, .. } => now - *fetched_at > max_age,
            Self::Loading => false,
            Self::NotLoaded | Self::Failed(_) => true,
        }
    }
}

pub fn mean_motion_to_altitude_km(n_revs_per_day: f64) -> f64 {
    let n_rad_s = n_revs_per_day * 2.0 * std::f64::consts::PI / SECONDS_PER_DAY;
    let a = (EARTH_MU_KM3_S2 / (n_rad_s * n_rad_s)).powf(1.0 / 3.0);
    a - crate::time::WGS84_EQUATORIAL_RADIUS_KM
}

pub fn datetime_to_minutes(dt: &sgp4::chrono::NaiveDateTime) -> f64 {
    dt.and_utc().timestamp_millis() as f64 / 60_000.0
}

/// Builds SGP4 constants for one element set, named as given.
pub fn parse_record(name: &str, line1: &str, line2: &str) -> Result<TleSatellite> {
    let invalid = |reason: String| Error::Tle {
        name: name.to_string(),
        reason,
    };
    let elements = sgp4::Elements::from_tle(Some(name.to_string()), line1.as_bytes(), line2.as_bytes())
        .map_err(|e| invalid(e.to_string()))?;
    let constants = Constants::from_elements(&elements).map_err(|e| invalid(e.to_string()))?;
    Ok(TleSatellite {
        name: name.to_string(),
        norad_id: elements.norad_id,
        epoch_minutes: datetime_to_minutes(&elements.datetime),
        inclination_deg: elements.inclination,
        mean_motion: elements.mean_motion,
        constants,
    })
}

fn filtered_record(name_line: &str, line1: &str, line2: &str, filter: &NameFilter) -> Option<TleSatellite> {
    let name = filter.matched(name_line)?;
    parse_record(name, line1, line2)
        .map_err(|e| log::debug!("Dropping {:?}: {}", name_line, e))
        .ok()
}

/// Walks the feed three lines at a time. A window that does not look like
/// `name / 1 ... / 2 ...` is shifted by a single line so one stray line does
/// not misalign the rest of the feed.
fn records(data: &str) -> Vec<(&str, &str, &str)> {
    let lines: Vec<&str> = data.lines().map(str::trim).collect();
    let mut out = Vec::with_capacity(lines.len() / 3);
    let mut i = 0;
    while i + 2 < lines.len() {
        let (name_line, line1, line2) = (lines[i], lines[i + 1], lines[i + 2]);
        if !line1.starts_with('1') || !line2.starts_with('2') {
            i += 1;
            continue;
        }
        out.push((name_line, line1, line2));
        i += 3;
    }
    out
}

pub fn parse_tle_data(data: &str, filter: &NameFilter) -> Result<Vec<TleSatellite>> {
    let satellites: Vec<TleSatellite> = records(data)
        .into_iter()
        .filter_map(|(name, l1, l2)| filtered_record(name, l1, l2, filter))
        .collect();

    if satellites.is_empty() {
        Err(Error::NoSatellites)
    } else {
        Ok(satellites)
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn fetch_tle_data(url: &str, filter: &NameFilter) -> Result<Vec<TleSatellite>> {
    let started = std::time::Instant::now();
    let body = crate::fetch::fetch_text(url)?;
    let satellites = parse_tle_data(&body, filter)?;
    log::info!(
        "Loaded {} satellites from {} in {:.2}s",
        satellites.len(),
        url,
        started.elapsed().as_secs_f64()
    );
    Ok(satellites)
}

#[cfg(target_arch = "wasm32")]
thread_local! {
    pub(crate) static TLE_FETCH_RESULT: std::cell::RefCell<Option<Result<Vec<TleSatellite>>>> = const { std::cell::RefCell::new(None) };
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn fetch_tle_data_async(url: &str, filter: &NameFilter) -> Result<Vec<TleSatellite>> {
    let body = crate::fetch::fetch_text(url).await?;
    let mut satellites = Vec::new();
    for (batch, (name, l1, l2)) in records(&body).into_iter().enumerate() {
        if let Some(sat) = filtered_record(name, l1, l2, filter) {
            satellites.push(sat);
        }
        if batch % 100 == 99 {
            crate::fetch::yield_now().await;
        }
    }
    log::info!("Loaded {} satellites from {}", satellites.len(), url);
    if satellites.is_empty() {
        Err(Error::NoSatellites)
    } else {
        Ok(satellites)
    }
}

//! Runtime configuration and shareable view state.
//!
//! `GlobeConfig` carries every tunable of the feed, the rolling position
//! window and the globe interaction. Native builds read an optional JSON file
//! named by `STARLINK_GLOBE_CONFIG`; wasm builds use the defaults and restore
//! the camera from the URL hash via `ViewHash`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV_VAR: &str = "STARLINK_GLOBE_CONFIG";

pub const DEFAULT_TLE_URL: &str =
    "https://celestrak.org/NORAD/elements/gp.php?GROUP=starlink&FORMAT=tle";
pub const DEFAULT_ATLAS_URL: &str =
    "https://gist.githubusercontent.com/mbostock/4090846/raw/d534aba169207548a8a3d670c9c2cc719ff05c47/world-110m.json";
pub const DEFAULT_NAME_PATTERN: &str = "STARLINK-[0-9]+";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRotateConfig {
    pub enabled: bool,
    /// Degrees of longitude per millisecond.
    pub speed: f64,
    pub vertical_tilt: f64,
    pub horizontal_tilt: f64,
    pub offset: f64,
}

impl Default for AutoRotateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            speed: 0.005,
            vertical_tilt: -30.0,
            horizontal_tilt: 0.0,
            offset: -120.0,
        }
    }
}

impl AutoRotateConfig {
    /// View rotation before any spin or drag.
    pub fn initial_rotation(&self) -> [f64; 3] {
        [self.offset, self.vertical_tilt, self.horizontal_tilt]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobeConfig {
    pub tle_url: String,
    pub atlas_url: String,
    pub name_pattern: String,
    pub tick_interval_ms: u64,
    pub frames_per_batch: usize,
    pub lead_seconds: i64,
    pub step_seconds: i64,
    pub refill_threshold: usize,
    pub track_step_seconds: i64,
    pub tle_max_age_minutes: i64,
    pub drag_sensitivity: f64,
    pub base_scale: f64,
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub graticule_step: f64,
    pub auto_rotate: AutoRotateConfig,
}

impl Default for GlobeConfig {
    fn default() -> Self {
        Self {
            tle_url: DEFAULT_TLE_URL.to_string(),
            atlas_url: DEFAULT_ATLAS_URL.to_string(),
            name_pattern: DEFAULT_NAME_PATTERN.to_string(),
            tick_interval_ms: 1000,
            frames_per_batch: 60,
            lead_seconds: 1,
            step_seconds: 1,
            refill_threshold: 15,
            track_step_seconds: 6,
            tle_max_age_minutes: 120,
            drag_sensitivity: 75.0,
            base_scale: 249.5,
            zoom_min: 0.5,
            zoom_max: 10.0,
            graticule_step: 10.0,
            auto_rotate: AutoRotateConfig::default(),
        }
    }
}

impl GlobeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be positive".into()));
        }
        if self.frames_per_batch == 0 {
            return Err(Error::Config("frames_per_batch must be positive".into()));
        }
        if self.step_seconds <= 0 || self.track_step_seconds <= 0 {
            return Err(Error::Config("step sizes must be positive".into()));
        }
        if self.lead_seconds < 0 {
            return Err(Error::Config("lead_seconds must not be negative".into()));
        }
        if self.refill_threshold == 0 {
            return Err(Error::Config("refill_threshold must be positive".into()));
        }
        if !(self.zoom_min > 0.0 && self.zoom_min <= self.zoom_max) {
            return Err(Error::Config(format!(
                "zoom extent [{}, {}] is empty",
                self.zoom_min, self.zoom_max
            )));
        }
        if self.base_scale <= 0.0 || self.drag_sensitivity <= 0.0 {
            return Err(Error::Config("scale and sensitivity must be positive".into()));
        }
        if !(self.graticule_step > 0.0 && self.graticule_step <= 90.0) {
            return Err(Error::Config("graticule_step must be in (0, 90]".into()));
        }
        regex::Regex::new(&self.name_pattern)
            .map_err(|e| Error::Config(format!("name_pattern: {}", e)))?;
        Ok(())
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }

    pub fn step(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.step_seconds)
    }

    pub fn lead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lead_seconds)
    }

    pub fn track_step(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.track_step_seconds)
    }

    pub fn tle_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.tle_max_age_minutes)
    }

    /// Defaults, overridden by the JSON file named in `STARLINK_GLOBE_CONFIG`.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                let json = std::fs::read_to_string(&path)?;
                let config = Self::from_json(&json)?;
                log::info!("Loaded configuration from {:?}", path);
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }
}

/// Camera and selection encoded in the page URL, e.g.
/// `#rot=-120,-30,0&k=1.5&sat=44713`, the satellite by NORAD id.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewHash {
    pub rotation: [f64; 3],
    pub zoom: f64,
    pub satellite: Option<u64>,
}

impl ViewHash {
    pub fn to_url_hash(&self) -> String {
        let mut hash = format!(
            "#rot={:.2},{:.2},{:.2}&k={:.3}",
            self.rotation[0], self.rotation[1], self.rotation[2], self.zoom
        );
        if let Some(norad_id) = self.satellite {
            hash.push_str(&format!("&sat={}", norad_id));
        }
        hash
    }

    pub fn from_url_hash(hash: &str) -> Option<Self> {
        let body = hash.strip_prefix('#').unwrap_or(hash);
        if body.is_empty() {
            return None;
        }
        let mut view = ViewHash {
            rotation: [0.0; 3],
            zoom: 1.0,
            satellite: None,
        };
        for pair in body.split('&') {
            let (key, value) = pair.split_once('=')?;
            match key {
                "rot" => {
                    let parts: Vec<f64> = value
                        .split(',')
                        .map(|p| p.parse::<f64>().ok())
                        .collect::<Option<_>>()?;
                    if parts.len() != 3 || parts.iter().any(|p| !p.is_finite()) {
                        return None;
                    }
                    view.rotation = [parts[0], parts[1], parts[2]];
                }
                "k" => {
                    let k: f64 = value.parse().ok()?;
                    if !(k.is_finite() && k > 0.0) {
                        return None;
                    }
                    view.zoom = k;
                }
                "sat" => view.satellite = Some(value.parse().ok()?),
                _ => {}
            }
        }
        Some(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        GlobeConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GlobeConfig::from_json(r#"{ "frames_per_batch": 120, "auto_rotate": { "enabled": true } }"#).unwrap();
        assert_eq!(config.frames_per_batch, 120);
        assert_eq!(config.refill_threshold, 15);
        assert!(config.auto_rotate.enabled);
        assert_eq!(config.auto_rotate.vertical_tilt, -30.0);
    }

    #[test]
    fn rejects_inverted_zoom_extent() {
        let config = GlobeConfig {
            zoom_min: 4.0,
            zoom_max: 2.0,
            ..GlobeConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn default_pattern_keeps_whole_catalogue_name() {
        let re = regex::Regex::new(DEFAULT_NAME_PATTERN).unwrap();
        assert_eq!(re.find("STARLINK-11001 [DTC]").map(|m| m.as_str()), Some("STARLINK-11001"));
    }

    #[test]
    fn rejects_bad_name_pattern() {
        let err = GlobeConfig::from_json(r#"{ "name_pattern": "STARLINK-[" }"#).unwrap_err();
        assert!(err.to_string().contains("name_pattern"));
    }

    #[test]
    fn view_hash_parses_all_fields() {
        let view = ViewHash::from_url_hash("#rot=-120,-30,0&k=2.5&sat=44713").unwrap();
        assert_eq!(view.rotation, [-120.0, -30.0, 0.0]);
        assert_eq!(view.zoom, 2.5);
        assert_eq!(view.satellite, Some(44713));

        let again = ViewHash::from_url_hash(&view.to_url_hash()).unwrap();
        assert_eq!(again, view);
    }

    #[test]
    fn view_hash_rejects_garbage() {
        assert!(ViewHash::from_url_hash("").is_none());
        assert!(ViewHash::from_url_hash("#rot=1,2").is_none());
        assert!(ViewHash::from_url_hash("#k=-1").is_none());
        assert!(ViewHash::from_url_hash("#nonsense").is_none());
        assert!(ViewHash::from_url_hash("#sat=STARLINK-1007").is_none());
    }
}

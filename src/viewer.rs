//! Viewer state, background jobs and the dock tabs.
//!
//! Owns the camera, the rolling position window and the load states of the
//! TLE set, the world atlas and the selected satellite's ground track. Each
//! kind of background job has at most one instance in flight. Native builds
//! run jobs on worker threads reporting through channels; the wasm build
//! runs them as local futures that park results in thread-local slots.

use std::sync::Arc;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::mpsc;

use chrono::{DateTime, Duration, Utc};
use eframe::egui;
use egui_dock::tab_viewer::OnCloseResponse;
use egui_dock::TabViewer;

use crate::atlas::{graticule, Atlas, AtlasLoadState, Country};
use crate::config::{GlobeConfig, ViewHash};
use crate::drawing::{draw_globe, draw_ground_track, GlobeLayers};
use crate::error::{Error, Result};
use crate::orbit::{
    find_satellite, ground_track, positions_by_satellite, positions_by_time, sub_satellite_point, Frame, GeoPoint,
    GroundTrack, SatelliteFix,
};
use crate::projection::{AutoRotate, Orthographic, ZoomBehavior};
use crate::timeline::PositionWindow;
use crate::tle::{TleFeed, TleLoadState, TleSatellite};

#[cfg(not(target_arch = "wasm32"))]
use crate::atlas::load_atlas;
#[cfg(target_arch = "wasm32")]
use crate::atlas::{load_atlas_async, ATLAS_FETCH_RESULT};
#[cfg(target_arch = "wasm32")]
use crate::tle::TLE_FETCH_RESULT;

/// A shown track is recomputed once the satellite is this far (degrees)
/// from every sample of its current orbit.
const TRACK_TOLERANCE_DEG: f64 = 1.0;

const FORECAST_STEPS: usize = 7;
pub(crate) const FORECAST_STEP_MINUTES: i64 = 5;

#[cfg(target_arch = "wasm32")]
const FRAMES_PER_SLICE: usize = 10;

#[cfg(target_arch = "wasm32")]
thread_local! {
    static BATCH_RESULT: std::cell::RefCell<Option<(u64, Vec<Frame>)>> = const { std::cell::RefCell::new(None) };
    static TRACK_RESULT: std::cell::RefCell<Option<(u64, Result<GroundTrack>)>> = const { std::cell::RefCell::new(None) };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tab {
    Globe,
    GroundTrack,
}

impl Tab {
    fn label(&self) -> &'static str {
        match self {
            Tab::Globe => "Globe",
            Tab::GroundTrack => "Ground Track",
        }
    }
}

/// Ground-track job state, keyed by NORAD id.
pub(crate) enum TrackState {
    Idle,
    Loading(u64),
    Ready { norad_id: u64, track: GroundTrack },
    Failed { norad_id: u64, reason: String },
}

/// The computed track, if it belongs to the selected satellite.
fn visible_track(state: &TrackState, selected: Option<u64>) -> Option<&GroundTrack> {
    match state {
        TrackState::Ready { norad_id, track } if Some(*norad_id) == selected => Some(track),
        _ => None,
    }
}

fn countries(state: &AtlasLoadState) -> &[Country] {
    match state {
        AtlasLoadState::Loaded(atlas) => &atlas.countries,
        _ => &[],
    }
}

pub(crate) struct ViewerState {
    pub(crate) config: GlobeConfig,
    feed: TleFeed,
    pub(crate) projection: Orthographic,
    pub(crate) zoom: ZoomBehavior,
    pub(crate) auto_rotate: AutoRotate,
    pub(crate) window: PositionWindow,
    pub(crate) tle_state: TleLoadState,
    pub(crate) tle_refreshing: bool,
    pub(crate) tle_refresh_error: Option<String>,
    pub(crate) atlas_state: AtlasLoadState,
    graticule: Vec<Vec<GeoPoint>>,
    /// NORAD id of the satellite whose details and track are shown.
    pub(crate) selected: Option<u64>,
    pub(crate) track_state: TrackState,
    pub(crate) show_graticule: bool,
    pub(crate) show_countries: bool,
    pub(crate) dark_mode: bool,
    pub(crate) show_side_panel: bool,
    pub(crate) search: String,
    #[cfg(not(target_arch = "wasm32"))]
    tle_tx: mpsc::Sender<Result<Vec<TleSatellite>>>,
    #[cfg(not(target_arch = "wasm32"))]
    tle_rx: mpsc::Receiver<Result<Vec<TleSatellite>>>,
    #[cfg(not(target_arch = "wasm32"))]
    atlas_tx: mpsc::Sender<Result<Atlas>>,
    #[cfg(not(target_arch = "wasm32"))]
    atlas_rx: mpsc::Receiver<Result<Atlas>>,
    #[cfg(not(target_arch = "wasm32"))]
    batch_tx: mpsc::Sender<(u64, Vec<Frame>)>,
    #[cfg(not(target_arch = "wasm32"))]
    batch_rx: mpsc::Receiver<(u64, Vec<Frame>)>,
    #[cfg(not(target_arch = "wasm32"))]
    track_tx: mpsc::Sender<(u64, Result<GroundTrack>)>,
    #[cfg(not(target_arch = "wasm32"))]
    track_rx: mpsc::Receiver<(u64, Result<GroundTrack>)>,
    #[cfg(target_arch = "wasm32")]
    pub(crate) last_url_hash: String,
}

impl TabViewer for ViewerState {
    type Tab = Tab;

    fn title(&mut self, tab: &mut Self::Tab) -> egui::WidgetText {
        tab.label().into()
    }

    fn ui(&mut self, ui: &mut egui::Ui, tab: &mut Self::Tab) {
        match tab {
            Tab::Globe => self.globe_ui(ui),
            Tab::GroundTrack => self.ground_track_ui(ui),
        }
    }

    fn scroll_bars(&self, _tab: &Self::Tab) -> [bool; 2] {
        [false, false]
    }

    fn closeable(&mut self, _tab: &mut Self::Tab) -> bool {
        false
    }

    fn on_close(&mut self, _tab: &mut Self::Tab) -> OnCloseResponse {
        OnCloseResponse::Ignore
    }
}

impl ViewerState {
    pub(crate) fn new(config: GlobeConfig) -> Result<Self> {
        config.validate()?;
        let feed = TleFeed::from_config(&config)?;
        let mut projection = Orthographic::new(config.base_scale, [0.0, 0.0]);
        projection.set_rotation(config.auto_rotate.initial_rotation());
        #[cfg(not(target_arch = "wasm32"))]
        let (tle_tx, tle_rx) = mpsc::channel();
        #[cfg(not(target_arch = "wasm32"))]
        let (atlas_tx, atlas_rx) = mpsc::channel();
        #[cfg(not(target_arch = "wasm32"))]
        let (batch_tx, batch_rx) = mpsc::channel();
        #[cfg(not(target_arch = "wasm32"))]
        let (track_tx, track_rx) = mpsc::channel();

        Ok(Self {
            feed,
            projection,
            zoom: ZoomBehavior::from_config(&config),
            auto_rotate: AutoRotate::new(config.auto_rotate.clone()),
            window: PositionWindow::new(&config),
            tle_state: TleLoadState::NotLoaded,
            tle_refreshing: false,
            tle_refresh_error: None,
            atlas_state: AtlasLoadState::NotLoaded,
            graticule: graticule(config.graticule_step),
            selected: None,
            track_state: TrackState::Idle,
            show_graticule: true,
            show_countries: true,
            dark_mode: false,
            show_side_panel: true,
            search: String::new(),
            #[cfg(not(target_arch = "wasm32"))]
            tle_tx,
            #[cfg(not(target_arch = "wasm32"))]
            tle_rx,
            #[cfg(not(target_arch = "wasm32"))]
            atlas_tx,
            #[cfg(not(target_arch = "wasm32"))]
            atlas_rx,
            #[cfg(not(target_arch = "wasm32"))]
            batch_tx,
            #[cfg(not(target_arch = "wasm32"))]
            batch_rx,
            #[cfg(not(target_arch = "wasm32"))]
            track_tx,
            #[cfg(not(target_arch = "wasm32"))]
            track_rx,
            #[cfg(target_arch = "wasm32")]
            last_url_hash: String::new(),
            config,
        })
    }

    pub(crate) fn satellites(&self) -> Option<&Arc<Vec<TleSatellite>>> {
        self.tle_state.satellites()
    }

    /// Fix of the selected satellite in the displayed frame.
    pub(crate) fn selected_fix(&self) -> Option<&SatelliteFix> {
        let norad_id = self.selected?;
        self.window.current()?.fixes.iter().find(|f| f.norad_id == norad_id)
    }

    /// Where the selected satellite will be over the next half hour,
    /// starting from the displayed frame.
    pub(crate) fn forecast(&self, now: DateTime<Utc>) -> Option<Vec<GeoPoint>> {
        let norad_id = self.selected?;
        let sat = find_satellite(self.satellites()?, norad_id)?;
        let start = self.window.current().map_or(now, |f| f.at);
        positions_by_satellite(
            std::slice::from_ref(sat),
            start,
            FORECAST_STEPS,
            Duration::minutes(FORECAST_STEP_MINUTES),
        )
        .remove(&norad_id)
    }

    /// Stops the spin and turns the globe to the selected satellite, as
    /// shown or, with nothing buffered yet, as of `now`.
    pub(crate) fn center_on_selected(&mut self, now: DateTime<Utc>) {
        let point = self.selected_fix().map(|fix| fix.point).or_else(|| {
            let sat = find_satellite(self.satellites()?, self.selected?)?;
            sub_satellite_point(sat, now).ok().map(|fix| fix.point)
        });
        if let Some(point) = point {
            self.set_auto_rotate(false);
            self.projection.look_at(point);
        }
    }

    /// Starts the atlas and TLE downloads side by side.
    pub(crate) fn start_loading(&mut self, ctx: &egui::Context) {
        self.load_atlas(ctx);
        self.load_tles(ctx);
    }

    /// Retries whatever failed. A loaded TLE set is refreshed in place.
    pub(crate) fn reload(&mut self, ctx: &egui::Context) {
        if matches!(self.atlas_state, AtlasLoadState::NotLoaded | AtlasLoadState::Failed(_)) {
            self.load_atlas(ctx);
        }
        self.tle_refresh_error = None;
        match self.tle_state {
            TleLoadState::Loading => {}
            TleLoadState::Loaded { .. } if !self.tle_refreshing => self.refresh_tles(ctx),
            TleLoadState::Loaded { .. } => {}
            TleLoadState::NotLoaded | TleLoadState::Failed(_) => self.load_tles(ctx),
        }
    }

    fn load_tles(&mut self, ctx: &egui::Context) {
        self.tle_state = TleLoadState::Loading;
        self.spawn_tle_fetch(ctx);
    }

    fn refresh_tles(&mut self, ctx: &egui::Context) {
        self.tle_refreshing = true;
        self.spawn_tle_fetch(ctx);
    }

    fn spawn_tle_fetch(&self, ctx: &egui::Context) {
        let feed = self.feed.clone();
        let ctx = ctx.clone();
        log::info!("Fetching TLE set from {}", feed.url());

        #[cfg(not(target_arch = "wasm32"))]
        {
            let tx = self.tle_tx.clone();
            std::thread::spawn(move || {
                let _ = tx.send(feed.fetch());
                ctx.request_repaint();
            });
        }

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            let result = feed.fetch_async().await;
            TLE_FETCH_RESULT.with(|cell| *cell.borrow_mut() = Some(result));
            ctx.request_repaint();
        });
    }

    fn load_atlas(&mut self, ctx: &egui::Context) {
        self.atlas_state = AtlasLoadState::Loading;
        let url = self.config.atlas_url.clone();
        let ctx = ctx.clone();

        #[cfg(not(target_arch = "wasm32"))]
        {
            let tx = self.atlas_tx.clone();
            std::thread::spawn(move || {
                let _ = tx.send(load_atlas(&url));
                ctx.request_repaint();
            });
        }

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            let result = load_atlas_async(&url).await;
            ATLAS_FETCH_RESULT.with(|cell| *cell.borrow_mut() = Some(result));
            ctx.request_repaint();
        });
    }

    fn start_refill(&mut self, ctx: &egui::Context, now: DateTime<Utc>) {
        let Some(satellites) = self.satellites().cloned() else {
            return;
        };
        let request = self.window.begin_refill(now);
        let ctx = ctx.clone();
        log::debug!(
            "Requesting {} frames from {} (generation {})",
            request.count,
            request.start,
            request.generation
        );

        #[cfg(not(target_arch = "wasm32"))]
        {
            let tx = self.batch_tx.clone();
            std::thread::spawn(move || {
                let frames = positions_by_time(&satellites, request.start, request.count, request.step);
                let _ = tx.send((request.generation, frames));
                ctx.request_repaint();
            });
        }

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            let mut frames = Vec::with_capacity(request.count);
            let mut offset = 0;
            while offset < request.count {
                let n = FRAMES_PER_SLICE.min(request.count - offset);
                let start = request.start + request.step * offset as i32;
                frames.extend(positions_by_time(&satellites, start, n, request.step));
                offset += n;
                crate::fetch::yield_now().await;
            }
            BATCH_RESULT.with(|cell| *cell.borrow_mut() = Some((request.generation, frames)));
            ctx.request_repaint();
        });
    }

    fn start_track_job(&mut self, ctx: &egui::Context, norad_id: u64, at: DateTime<Utc>) {
        let Some(satellites) = self.satellites().cloned() else {
            return;
        };
        let step = self.config.track_step();
        self.track_state = TrackState::Loading(norad_id);
        let ctx = ctx.clone();
        let job = move || {
            let result = find_satellite(&satellites, norad_id)
                .ok_or_else(|| Error::Propagation {
                    name: format!("NORAD {}", norad_id),
                    reason: "not in the current TLE set".into(),
                })
                .and_then(|sat| ground_track(sat, at, step));
            (norad_id, result)
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            let tx = self.track_tx.clone();
            std::thread::spawn(move || {
                let _ = tx.send(job());
                ctx.request_repaint();
            });
        }

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            crate::fetch::yield_now().await;
            let result = job();
            TRACK_RESULT.with(|cell| *cell.borrow_mut() = Some(result));
            ctx.request_repaint();
        });
    }

    /// Drains finished background jobs into the load states.
    pub(crate) fn poll_jobs(&mut self) {
        let now = Utc::now();

        #[cfg(not(target_arch = "wasm32"))]
        {
            while let Ok(result) = self.tle_rx.try_recv() {
                self.on_tle_result(result, now);
            }
            while let Ok(result) = self.atlas_rx.try_recv() {
                self.on_atlas_result(result);
            }
            while let Ok((generation, frames)) = self.batch_rx.try_recv() {
                self.on_batch_result(generation, frames);
            }
            while let Ok((norad_id, result)) = self.track_rx.try_recv() {
                self.on_track_result(norad_id, result);
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            if let Some(result) = TLE_FETCH_RESULT.with(|cell| cell.borrow_mut().take()) {
                self.on_tle_result(result, now);
            }
            if let Some(result) = ATLAS_FETCH_RESULT.with(|cell| cell.borrow_mut().take()) {
                self.on_atlas_result(result);
            }
            if let Some((generation, frames)) = BATCH_RESULT.with(|cell| cell.borrow_mut().take()) {
                self.on_batch_result(generation, frames);
            }
            if let Some((norad_id, result)) = TRACK_RESULT.with(|cell| cell.borrow_mut().take()) {
                self.on_track_result(norad_id, result);
            }
        }
    }

    pub(crate) fn on_tle_result(&mut self, result: Result<Vec<TleSatellite>>, now: DateTime<Utc>) {
        self.tle_refreshing = false;
        match result {
            Ok(satellites) => {
                log::info!("TLE set replaced: {} satellites", satellites.len());
                self.tle_state = TleLoadState::Loaded {
                    satellites: Arc::new(satellites),
                    fetched_at: now,
                };
                self.tle_refresh_error = None;
                self.window.reset();
                if !matches!(self.track_state, TrackState::Loading(_)) {
                    self.track_state = TrackState::Idle;
                }
            }
            Err(e) => {
                log::warn!("TLE fetch failed: {}", e);
                if self.satellites().is_some() {
                    self.tle_refresh_error = Some(e.to_string());
                } else {
                    self.tle_state = TleLoadState::Failed(e.to_string());
                }
            }
        }
    }

    fn on_atlas_result(&mut self, result: Result<Atlas>) {
        self.atlas_state = match result {
            Ok(atlas) => AtlasLoadState::Loaded(Arc::new(atlas)),
            Err(e) => {
                log::warn!("World atlas failed to load: {}", e);
                AtlasLoadState::Failed(e.to_string())
            }
        };
    }

    fn on_batch_result(&mut self, generation: u64, frames: Vec<Frame>) {
        let kept = self.window.complete_refill(generation, frames);
        log::debug!("Buffered {} frames, {} queued", kept, self.window.len());
    }

    pub(crate) fn on_track_result(&mut self, norad_id: u64, result: Result<GroundTrack>) {
        let in_flight = matches!(self.track_state, TrackState::Loading(id) if id == norad_id);
        if !in_flight {
            return;
        }
        if self.selected != Some(norad_id) {
            self.track_state = TrackState::Idle;
            return;
        }
        self.track_state = match result {
            Ok(track) => TrackState::Ready { norad_id, track },
            Err(e) => {
                log::warn!("Ground track for NORAD {} failed: {}", norad_id, e);
                TrackState::Failed {
                    norad_id,
                    reason: e.to_string(),
                }
            }
        };
    }

    /// A loaded set past its maximum age, with no refresh running or
    /// already failed.
    pub(crate) fn tle_due_for_refresh(&self, now: DateTime<Utc>) -> bool {
        !self.tle_refreshing
            && self.tle_refresh_error.is_none()
            && self.satellites().is_some()
            && self.tle_state.is_stale(now, self.config.tle_max_age())
    }

    /// One data tick: advance the window, top it up and keep the selected
    /// satellite's track current.
    pub(crate) fn tick(&mut self, ctx: &egui::Context, now: DateTime<Utc>) {
        self.window.tick(now);
        if self.window.needs_refill() && self.satellites().is_some() {
            if self.tle_due_for_refresh(now) {
                log::info!("TLE set older than {} minutes, refreshing", self.config.tle_max_age_minutes);
                self.refresh_tles(ctx);
            }
            self.start_refill(ctx, now);
        }
        self.schedule_track(ctx, now);
    }

    pub(crate) fn track_outdated(&self) -> bool {
        let Some(selected) = self.selected else {
            return false;
        };
        match &self.track_state {
            TrackState::Idle => true,
            TrackState::Loading(_) => false,
            TrackState::Failed { norad_id, .. } => *norad_id != selected,
            TrackState::Ready { norad_id, track } => {
                *norad_id != selected
                    || self
                        .selected_fix()
                        .map_or(false, |fix| !track.covers(fix.point, TRACK_TOLERANCE_DEG))
            }
        }
    }

    fn schedule_track(&mut self, ctx: &egui::Context, now: DateTime<Utc>) {
        if !self.track_outdated() {
            return;
        }
        if let Some(norad_id) = self.selected {
            let at = self.window.current().map(|f| f.at).unwrap_or(now);
            self.start_track_job(ctx, norad_id, at);
        }
    }

    /// Clicking the shown satellite hides its track; any other shows it.
    pub(crate) fn toggle_selection(&mut self, norad_id: u64) {
        if self.selected == Some(norad_id) {
            self.selected = None;
        } else {
            self.selected = Some(norad_id);
        }
        if !matches!(self.track_state, TrackState::Loading(_)) {
            self.track_state = TrackState::Idle;
        }
    }

    pub(crate) fn set_auto_rotate(&mut self, enabled: bool) {
        if enabled && !self.auto_rotate.enabled() {
            self.auto_rotate.resume_from(self.projection.rotation());
        }
        self.auto_rotate.set_enabled(enabled);
    }

    pub(crate) fn reset_view(&mut self) {
        let enabled = self.auto_rotate.enabled();
        self.auto_rotate = AutoRotate::new(self.config.auto_rotate.clone());
        self.auto_rotate.set_enabled(enabled);
        self.projection.set_rotation(self.config.auto_rotate.initial_rotation());
        self.zoom.set(1.0);
    }

    pub(crate) fn view_hash(&self) -> ViewHash {
        ViewHash {
            rotation: self.projection.rotation(),
            zoom: self.zoom.k(),
            satellite: self.selected,
        }
    }

    pub(crate) fn apply_view_hash(&mut self, view: ViewHash) {
        self.projection.set_rotation(view.rotation);
        self.zoom.set(view.zoom);
        self.selected = view.satellite;
        self.track_state = TrackState::Idle;
    }

    /// Mirrors the camera into the page URL so a reload or a shared link
    /// restores it.
    #[cfg(target_arch = "wasm32")]
    pub(crate) fn publish_view_hash(&mut self) {
        let hash = self.view_hash().to_url_hash();
        if hash == self.last_url_hash {
            return;
        }
        if let Some(window) = web_sys::window() {
            if let Ok(history) = window.history() {
                let _ = history.replace_state_with_url(&wasm_bindgen::JsValue::NULL, "", Some(&hash));
            }
        }
        self.last_url_hash = hash;
    }

    /// NORAD ids and names of satellites whose name contains `query`,
    /// case-insensitively.
    pub(crate) fn search_matches(&self, query: &str, limit: usize) -> Vec<(u64, String)> {
        let query = query.trim().to_uppercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.satellites()
            .map(|sats| {
                sats.iter()
                    .filter(|s| s.name.to_uppercase().contains(&query))
                    .take(limit)
                    .map(|s| (s.norad_id, s.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn globe_ui(&mut self, ui: &mut egui::Ui) {
        let layers = GlobeLayers {
            frame: self.window.current(),
            countries: countries(&self.atlas_state),
            graticule: &self.graticule,
            track: visible_track(&self.track_state, self.selected).map(GroundTrack::current),
            show_graticule: self.show_graticule,
            show_countries: self.show_countries,
            dark_mode: self.dark_mode,
        };
        let response = draw_globe(ui, "globe", &layers, &mut self.projection, &mut self.zoom, &self.config);

        if response.dragged && self.auto_rotate.enabled() {
            self.auto_rotate.set_enabled(false);
        }
        if let Some(norad_id) = response.clicked {
            self.toggle_selection(norad_id);
            self.schedule_track(ui.ctx(), Utc::now());
        }
    }

    fn ground_track_ui(&mut self, ui: &mut egui::Ui) {
        draw_ground_track(
            ui,
            "ground_track",
            self.window.current(),
            countries(&self.atlas_state),
            visible_track(&self.track_state, self.selected),
            self.selected,
            self.dark_mode,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tle::fixtures::starlink_satellites;
    use chrono::TimeZone;

    const STARLINK_1007: u64 = 44713;
    const STARLINK_1008: u64 = 44714;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 7, 12, 12, 0, 0).unwrap()
    }

    fn viewer() -> ViewerState {
        ViewerState::new(GlobeConfig::default()).unwrap()
    }

    fn loaded_viewer() -> ViewerState {
        let mut v = viewer();
        v.on_tle_result(Ok(starlink_satellites()), t0());
        v
    }

    #[test]
    fn starts_at_configured_rotation() {
        let v = viewer();
        assert_eq!(v.projection.rotation(), [-120.0, -30.0, 0.0]);
        assert_eq!(v.zoom.k(), 1.0);
        assert!(!v.auto_rotate.enabled());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = GlobeConfig {
            frames_per_batch: 0,
            ..GlobeConfig::default()
        };
        assert!(ViewerState::new(config).is_err());
    }

    #[test]
    fn tle_result_replaces_set_and_resets_window() {
        let mut v = viewer();
        let generation = v.window.generation();
        v.on_tle_result(Ok(starlink_satellites()), t0());
        assert_eq!(v.satellites().map(|s| s.len()), Some(2));
        assert_ne!(v.window.generation(), generation);
    }

    #[test]
    fn failed_refresh_keeps_current_set() {
        let mut v = loaded_viewer();
        v.tle_refreshing = true;
        v.on_tle_result(Err(Error::NoSatellites), t0());
        assert!(v.satellites().is_some());
        assert!(v.tle_refresh_error.is_some());
        assert!(!v.tle_due_for_refresh(t0() + Duration::hours(5)));

        let mut fresh = viewer();
        fresh.on_tle_result(Err(Error::NoSatellites), t0());
        assert!(matches!(fresh.tle_state, TleLoadState::Failed(_)));
    }

    #[test]
    fn refresh_due_after_max_age() {
        let v = loaded_viewer();
        assert!(!v.tle_due_for_refresh(t0() + Duration::minutes(119)));
        assert!(v.tle_due_for_refresh(t0() + Duration::minutes(121)));
        assert!(!viewer().tle_due_for_refresh(t0()));
    }

    #[test]
    fn clicking_toggles_selection() {
        let mut v = loaded_viewer();
        v.toggle_selection(STARLINK_1007);
        assert_eq!(v.selected, Some(STARLINK_1007));
        assert!(v.track_outdated());
        v.toggle_selection(STARLINK_1008);
        assert_eq!(v.selected, Some(STARLINK_1008));
        v.toggle_selection(STARLINK_1008);
        assert!(v.selected.is_none());
        assert!(!v.track_outdated());
    }

    #[test]
    fn track_result_only_lands_for_current_selection() {
        let mut v = loaded_viewer();
        v.toggle_selection(STARLINK_1007);
        v.track_state = TrackState::Loading(STARLINK_1007);
        v.on_track_result(STARLINK_1007, Ok(GroundTrack::default()));
        assert!(visible_track(&v.track_state, v.selected).is_some());

        v.track_state = TrackState::Loading(STARLINK_1007);
        v.toggle_selection(STARLINK_1008);
        v.on_track_result(STARLINK_1007, Ok(GroundTrack::default()));
        assert!(matches!(v.track_state, TrackState::Idle));
        assert!(v.track_outdated());
    }

    #[test]
    fn stray_track_result_is_ignored() {
        let mut v = loaded_viewer();
        v.toggle_selection(STARLINK_1007);
        v.on_track_result(STARLINK_1007, Ok(GroundTrack::default()));
        assert!(matches!(v.track_state, TrackState::Idle));
    }

    #[test]
    fn view_hash_restores_camera_and_selection() {
        let mut v = viewer();
        v.apply_view_hash(ViewHash {
            rotation: [10.0, -20.0, 0.0],
            zoom: 50.0,
            satellite: Some(STARLINK_1007),
        });
        let hash = v.view_hash();
        assert_eq!(hash.rotation, [10.0, -20.0, 0.0]);
        assert_eq!(hash.zoom, 10.0);
        assert_eq!(hash.satellite, Some(STARLINK_1007));
    }

    #[test]
    fn reset_view_restores_defaults() {
        let mut v = viewer();
        v.projection.drag(100.0, 50.0, 75.0);
        v.zoom.set(4.0);
        v.reset_view();
        assert_eq!(v.projection.rotation(), [-120.0, -30.0, 0.0]);
        assert_eq!(v.zoom.k(), 1.0);
    }

    #[test]
    fn enabling_auto_rotate_keeps_current_view() {
        let mut v = viewer();
        v.projection.set_rotation([15.0, 5.0, 0.0]);
        v.set_auto_rotate(true);
        let r = v.auto_rotate.advance(0.0).unwrap();
        assert_eq!(r, [15.0, 5.0, 0.0]);
    }

    #[test]
    fn forecast_follows_selection() {
        let mut v = loaded_viewer();
        assert!(v.forecast(t0()).is_none());
        v.toggle_selection(STARLINK_1007);
        let points = v.forecast(t0()).unwrap();
        assert_eq!(points.len(), FORECAST_STEPS);
        assert!(points.iter().all(|p| p.lat.abs() <= 54.0));
    }

    #[test]
    fn center_on_selected_stops_spin() {
        let mut v = loaded_viewer();
        buffer_frames(&mut v, 3);
        v.set_auto_rotate(true);
        v.toggle_selection(STARLINK_1008);
        let target = v.selected_fix().unwrap().point;
        v.center_on_selected(t0());
        assert!(!v.auto_rotate.enabled());
        let c = v.projection.center();
        assert!((c.lat - target.lat).abs() < 1e-6);
        assert!((c.lng - target.lng).abs() < 1e-6);

        let mut empty = loaded_viewer();
        empty.toggle_selection(STARLINK_1007);
        empty.center_on_selected(t0());
        assert_ne!(empty.projection.rotation(), [-120.0, -30.0, 0.0]);
    }

    fn buffer_frames(v: &mut ViewerState, count: usize) {
        let satellites = v.satellites().unwrap().clone();
        let generation = v.window.generation();
        v.window
            .complete_refill(generation, positions_by_time(&satellites, t0(), count, Duration::seconds(1)));
    }

    #[test]
    fn refreshed_set_keeps_frames_on_screen() {
        let mut v = loaded_viewer();
        buffer_frames(&mut v, 60);
        v.tle_refreshing = true;
        v.on_tle_result(Ok(starlink_satellites()), t0() + Duration::hours(2));
        assert!(!v.tle_refreshing);
        assert_eq!(v.window.len(), 60);
        assert!(v.window.current().is_some());
        assert!(!v.window.needs_refill());
    }

    #[test]
    fn tick_refills_low_buffer_and_refreshes_stale_set_with_it() {
        let config = GlobeConfig {
            tle_url: "http://127.0.0.1:9/starlink.txt".into(),
            ..GlobeConfig::default()
        };
        let mut v = ViewerState::new(config).unwrap();
        let ctx = egui::Context::default();

        v.tick(&ctx, t0());
        assert!(!v.window.is_refilling());

        v.on_tle_result(Ok(starlink_satellites()), t0());
        v.tick(&ctx, t0());
        assert!(v.window.is_refilling());
        assert!(!v.tle_refreshing);

        // Three hours on, the set is stale but a full buffer schedules nothing.
        let later = t0() + Duration::hours(3);
        let generation = v.window.generation();
        v.on_batch_result(generation, positions_by_time(&starlink_satellites(), later, 60, Duration::seconds(1)));
        v.tick(&ctx, later);
        assert!(!v.window.is_refilling());
        assert!(!v.tle_refreshing);

        v.tick(&ctx, later + Duration::seconds(50));
        assert_eq!(v.window.len(), 10);
        assert!(v.window.is_refilling());
        assert!(v.tle_refreshing);
    }

    #[test]
    fn selection_tells_apart_names_sharing_a_prefix() {
        let feed = crate::tle::fixtures::STARLINK_FEED
            .replace("STARLINK-1007", "STARLINK-1100")
            .replace("STARLINK-1008 [DTC]", "STARLINK-11001 [DTC]");
        let filter = crate::tle::NameFilter::new(crate::config::DEFAULT_NAME_PATTERN).unwrap();
        let mut v = viewer();
        v.on_tle_result(Ok(crate::tle::parse_tle_data(&feed, &filter).unwrap()), t0());
        buffer_frames(&mut v, 3);

        v.toggle_selection(STARLINK_1008);
        assert_eq!(v.selected_fix().map(|f| &*f.name), Some("STARLINK-11001"));
        let matches = v.search_matches("STARLINK-1100", 10);
        assert_eq!(matches.len(), 2);
        assert_ne!(matches[0], matches[1]);
    }

    #[test]
    fn search_is_case_insensitive() {
        let v = loaded_viewer();
        assert_eq!(v.search_matches("starlink-100", 10).len(), 2);
        assert_eq!(v.search_matches("1008", 10), vec![(STARLINK_1008, "STARLINK-1008".to_string())]);
        assert!(v.search_matches("  ", 10).is_empty());
        assert_eq!(v.search_matches("STAR", 1).len(), 1);
    }
}

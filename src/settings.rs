//! Side-panel status and display settings.

use chrono::Utc;
use eframe::egui;

use crate::atlas::AtlasLoadState;
use crate::orbit::find_satellite;
use crate::tle::TleLoadState;
use crate::viewer::{TrackState, ViewerState, FORECAST_STEP_MINUTES};

const SEARCH_RESULTS: usize = 12;

fn error_text(ui: &mut egui::Ui, text: String) {
    ui.label(egui::RichText::new(text).color(ui.visuals().error_fg_color));
}

impl ViewerState {
    pub(crate) fn show_settings(&mut self, ui: &mut egui::Ui) {
        ui.label(egui::RichText::new("Data").strong());
        match &self.tle_state {
            TleLoadState::NotLoaded => {
                ui.label("TLE: not loaded");
            }
            TleLoadState::Loading => {
                ui.horizontal(|ui| {
                    ui.label("TLE: loading");
                    ui.spinner();
                });
            }
            TleLoadState::Loaded { satellites, fetched_at } => {
                ui.horizontal(|ui| {
                    ui.label(format!("{} satellites", satellites.len()));
                    if self.tle_refreshing {
                        ui.spinner();
                    }
                });
                ui.label(format!("Fetched {}", fetched_at.format("%H:%M:%S UTC")));
            }
            TleLoadState::Failed(e) => error_text(ui, format!("TLE: {}", e)),
        }
        if let Some(e) = &self.tle_refresh_error {
            error_text(ui, format!("Refresh failed: {}", e));
        }
        match &self.atlas_state {
            AtlasLoadState::NotLoaded => {
                ui.label("Map: not loaded");
            }
            AtlasLoadState::Loading => {
                ui.horizontal(|ui| {
                    ui.label("Map: loading");
                    ui.spinner();
                });
            }
            AtlasLoadState::Loaded(atlas) => {
                ui.label(format!("Map: {} countries", atlas.countries.len()));
            }
            AtlasLoadState::Failed(e) => error_text(ui, format!("Map: {}", e)),
        }
        ui.horizontal(|ui| {
            ui.label(format!("{} frames buffered", self.window.len()));
            if self.window.is_refilling() {
                ui.spinner();
            }
        });
        if let Some(frame) = self.window.current() {
            ui.label(format!("Showing {}", frame.at.format("%H:%M:%S UTC")));
        }
        if ui.button("Reload").clicked() {
            self.reload(ui.ctx());
        }

        ui.separator();
        ui.label(egui::RichText::new("View").strong());
        let mut spin = self.auto_rotate.enabled();
        if ui.checkbox(&mut spin, "Auto-rotate").changed() {
            self.set_auto_rotate(spin);
        }
        let [min, max] = self.zoom.extent();
        let mut k = self.zoom.k();
        if ui
            .add(egui::Slider::new(&mut k, min..=max).logarithmic(true).text("Zoom"))
            .changed()
        {
            self.zoom.set(k);
        }
        if ui.button("Reset view").clicked() {
            self.reset_view();
        }
        ui.checkbox(&mut self.show_graticule, "Graticule");
        ui.checkbox(&mut self.show_countries, "Countries");
        ui.checkbox(&mut self.dark_mode, "Dark mode");

        ui.separator();
        ui.label(egui::RichText::new("Satellite").strong());
        if let Some(norad_id) = self.selected {
            let elements = self.satellites().and_then(|sats| find_satellite(sats, norad_id)).map(|sat| {
                (
                    sat.name.clone(),
                    format!(
                        "NORAD {}  {:.1}°  {:.0} min  ~{:.0} km",
                        sat.norad_id,
                        sat.inclination_deg,
                        sat.period_minutes(),
                        sat.altitude_km()
                    ),
                )
            });
            let (name, details) = elements.unwrap_or_else(|| (format!("NORAD {}", norad_id), String::new()));
            ui.horizontal(|ui| {
                ui.label(&name);
                if ui.small_button("x").clicked() {
                    self.toggle_selection(norad_id);
                }
            });
            let position = self
                .selected_fix()
                .map(|fix| format!("{:.2}° {:.2}°  {:.0} km", fix.point.lat, fix.point.lng, fix.height_km));
            if let Some(text) = position {
                ui.label(text);
            }
            if ui.button("Center").clicked() {
                self.center_on_selected(Utc::now());
            }
            if !details.is_empty() {
                ui.label(details);
            }
            if let Some(points) = self.forecast(Utc::now()) {
                egui::CollapsingHeader::new("Next 30 minutes").show(ui, |ui| {
                    for (i, p) in points.iter().enumerate() {
                        ui.label(format!("+{:>2} min  {:.1}° {:.1}°", i as i64 * FORECAST_STEP_MINUTES, p.lat, p.lng));
                    }
                });
            }
            match &self.track_state {
                TrackState::Loading(_) => {
                    ui.horizontal(|ui| {
                        ui.label("Computing track");
                        ui.spinner();
                    });
                }
                TrackState::Failed { reason, .. } => error_text(ui, reason.clone()),
                TrackState::Idle | TrackState::Ready { .. } => {}
            }
        }
        ui.add(egui::TextEdit::singleline(&mut self.search).hint_text("Search by name"));
        for (norad_id, name) in self.search_matches(&self.search, SEARCH_RESULTS) {
            let selected = self.selected == Some(norad_id);
            if ui.selectable_label(selected, &name).clicked() {
                self.toggle_selection(norad_id);
            }
        }

        ui.separator();
        ui.label(
            egui::RichText::new(concat!("starlink-globe ", env!("CARGO_PKG_VERSION")))
                .small()
                .weak(),
        );
    }
}

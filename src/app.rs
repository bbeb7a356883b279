//! Application shell and eframe integration.
//!
//! Defines the App struct, startup, and the per-frame update that drains
//! background jobs, runs the data tick and lays out the side panel and the
//! dock tabs.

use chrono::Utc;
use eframe::egui;
use egui_dock::{DockArea, DockState, NodeIndex};

use crate::config::GlobeConfig;
use crate::error::Result;
use crate::viewer::{Tab, ViewerState};

pub(crate) struct App {
    pub(crate) dock_state: DockState<Tab>,
    pub(crate) viewer: ViewerState,
    /// `egui` input time of the last data tick.
    last_tick: Option<f64>,
}

impl App {
    pub(crate) fn new(cc: &eframe::CreationContext<'_>, config: GlobeConfig) -> Result<Self> {
        let mut dock_state = DockState::new(vec![Tab::Globe]);
        dock_state
            .main_surface_mut()
            .split_below(NodeIndex::root(), 0.7, vec![Tab::GroundTrack]);

        #[allow(unused_mut)]
        let mut viewer = ViewerState::new(config)?;

        #[cfg(target_arch = "wasm32")]
        {
            use crate::config::ViewHash;
            let hash = web_sys::window()
                .and_then(|w| w.location().hash().ok())
                .unwrap_or_default();
            if let Some(view) = ViewHash::from_url_hash(&hash) {
                log::info!("Restoring view from URL");
                viewer.apply_view_hash(view);
            }
        }

        viewer.start_loading(&cc.egui_ctx);
        Ok(Self {
            dock_state,
            viewer,
            last_tick: None,
        })
    }

    fn tick_due(&self, now: f64) -> bool {
        let interval = self.viewer.config.tick_interval().as_secs_f64();
        self.last_tick.map_or(true, |last| now - last >= interval)
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let v = &mut self.viewer;

        ctx.set_visuals(if v.dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        });

        v.poll_jobs();

        let dt_ms = ctx.input(|i| i.stable_dt) as f64 * 1000.0;
        if let Some(rotation) = v.auto_rotate.advance(dt_ms) {
            v.projection.set_rotation(rotation);
        }

        let now = ctx.input(|i| i.time);
        if self.tick_due(now) {
            self.last_tick = Some(now);
            self.viewer.tick(ctx, Utc::now());
            #[cfg(target_arch = "wasm32")]
            self.viewer.publish_view_hash();
        }

        ctx.request_repaint();

        if self.viewer.show_side_panel {
            egui::SidePanel::left("settings_panel")
                .resizable(true)
                .default_width(200.0)
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        ui.strong("Starlink");
                        if ui.small_button("<").clicked() {
                            self.viewer.show_side_panel = false;
                        }
                    });
                    ui.separator();
                    egui::ScrollArea::vertical()
                        .id_salt("settings_scroll")
                        .show(ui, |ui| {
                            self.viewer.show_settings(ui);
                        });
                });
        }

        let mut dock_style = egui_dock::Style::from_egui(ctx.style().as_ref());
        dock_style.main_surface_border_stroke = egui::Stroke::NONE;
        DockArea::new(&mut self.dock_state)
            .style(dock_style)
            .show(ctx, &mut self.viewer);

        if !self.viewer.show_side_panel {
            egui::Area::new(egui::Id::new("settings_btn"))
                .fixed_pos(egui::pos2(4.0, 4.0))
                .order(egui::Order::Foreground)
                .show(ctx, |ui| {
                    if ui.small_button(">").clicked() {
                        self.viewer.show_side_panel = true;
                    }
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App {
            dock_state: DockState::new(vec![Tab::Globe]),
            viewer: ViewerState::new(GlobeConfig::default()).unwrap(),
            last_tick: None,
        }
    }

    #[test]
    fn ticks_once_per_interval() {
        let mut app = app();
        assert!(app.tick_due(0.0));
        app.last_tick = Some(10.0);
        assert!(!app.tick_due(10.5));
        assert!(app.tick_due(11.0));
    }
}

//! Globe and ground-track rendering.
//!
//! The globe is drawn into an `egui_plot` canvas whose units are screen
//! pixels centred on the plot origin, so the orthographic projection can be
//! used with a zero translate. Plot y points up; projected y points down.

use eframe::egui;
use egui_plot::{Line, Plot, PlotPoint, PlotPoints, Points, Polygon};

use crate::atlas::Country;
use crate::config::GlobeConfig;
use crate::orbit::{Frame, GeoPoint, GroundTrack, SatelliteFix};
use crate::projection::{Orthographic, ZoomBehavior};

/// Canvas size the base scale was tuned for.
const REFERENCE_SIZE: [f64; 2] = [960.0, 500.0];
const SPHERE_SEGMENTS: usize = 128;
const MIN_HIT_RADIUS: f64 = 4.0;

pub const STEELBLUE: egui::Color32 = egui::Color32::from_rgb(70, 130, 180);

struct Palette {
    sphere: egui::Color32,
    graticule: egui::Color32,
    land: egui::Color32,
    border: egui::Color32,
    marker: egui::Color32,
    track: egui::Color32,
}

fn palette(dark_mode: bool) -> Palette {
    if dark_mode {
        Palette {
            sphere: egui::Color32::from_gray(18),
            graticule: egui::Color32::from_gray(60),
            land: egui::Color32::from_rgba_unmultiplied(90, 90, 90, 153),
            border: egui::Color32::from_gray(140),
            marker: STEELBLUE,
            track: egui::Color32::WHITE,
        }
    } else {
        Palette {
            sphere: egui::Color32::from_gray(250),
            graticule: egui::Color32::from_rgb(0xcc, 0xcc, 0xcc),
            land: egui::Color32::from_rgba_unmultiplied(0xe5, 0xe5, 0xe5, 153),
            border: egui::Color32::from_rgb(0x88, 0x88, 0x88),
            marker: STEELBLUE,
            track: egui::Color32::BLACK,
        }
    }
}

fn dim_color(color: egui::Color32) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), 90)
}

fn to_plot(xy: [f64; 2]) -> [f64; 2] {
    [xy[0], -xy[1]]
}

fn from_plot(p: PlotPoint) -> [f64; 2] {
    [p.x, -p.y]
}

/// Base scale grown or shrunk with the canvas so the globe keeps its
/// proportion of the view.
pub fn fit_scale(base_scale: f64, width: f64, height: f64) -> f64 {
    let factor = (width / REFERENCE_SIZE[0]).min(height / REFERENCE_SIZE[1]);
    if factor.is_finite() && factor > 0.0 {
        base_scale * factor
    } else {
        base_scale
    }
}

/// Runs of consecutive front-facing points, in plot coordinates.
pub fn visible_segments(projection: &Orthographic, points: &[GeoPoint]) -> Vec<Vec<[f64; 2]>> {
    let mut segments = Vec::new();
    let mut current: Vec<[f64; 2]> = Vec::new();
    for p in points {
        match projection.project_unclipped(*p) {
            (xy, true) => current.push(to_plot(xy)),
            (_, false) => {
                if current.len() > 1 {
                    segments.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
        }
    }
    if current.len() > 1 {
        segments.push(current);
    }
    segments
}

/// Splits a `[lng, lat]` polyline wherever it wraps around the map edge.
pub fn split_at_antimeridian(points: &[GeoPoint]) -> Vec<Vec<[f64; 2]>> {
    let mut segments: Vec<Vec<[f64; 2]>> = Vec::new();
    let mut current: Vec<[f64; 2]> = Vec::new();
    for p in points {
        if let Some(last) = current.last() {
            if (last[0] - p.lng).abs() > 180.0 {
                segments.push(std::mem::take(&mut current));
            }
        }
        current.push([p.lng, p.lat]);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// The visible marker nearest to `xy` (projected coordinates) within
/// `radius` pixels.
pub fn marker_at<'a>(
    projection: &Orthographic,
    frame: &'a Frame,
    xy: [f64; 2],
    radius: f64,
) -> Option<&'a SatelliteFix> {
    let r_sq = radius * radius;
    frame
        .fixes
        .iter()
        .filter(|fix| projection.is_visible(fix.point))
        .filter_map(|fix| {
            let p = projection.project(fix.point)?;
            let d_sq = (p[0] - xy[0]).powi(2) + (p[1] - xy[1]).powi(2);
            (d_sq <= r_sq).then_some((fix, d_sq))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(fix, _)| fix)
}

pub struct GlobeLayers<'a> {
    pub frame: Option<&'a Frame>,
    pub countries: &'a [Country],
    pub graticule: &'a [Vec<GeoPoint>],
    pub track: Option<&'a [GeoPoint]>,
    pub show_graticule: bool,
    pub show_countries: bool,
    pub dark_mode: bool,
}

#[derive(Default)]
pub struct GlobeResponse {
    /// NORAD id of the satellite under a click, if any.
    pub clicked: Option<u64>,
    /// The user rotated the globe by hand this frame.
    pub dragged: bool,
}

fn tooltip(ui: &egui::Ui, pos: egui::Pos2, text: String) {
    let font = egui::FontId::proportional(12.0);
    let text_pos = pos + egui::Vec2::new(12.0, -12.0);
    let galley = ui.painter().layout_no_wrap(text, font, egui::Color32::WHITE);
    let top_left = text_pos - egui::Vec2::new(0.0, galley.size().y);
    let rect = egui::Rect::from_min_size(top_left, galley.size()).expand(3.0);
    ui.painter().rect_filled(rect, 3.0, egui::Color32::from_rgba_unmultiplied(0, 0, 0, 180));
    ui.painter().galley(top_left, galley, egui::Color32::WHITE);
}

pub fn draw_globe(
    ui: &mut egui::Ui,
    id: &str,
    layers: &GlobeLayers<'_>,
    projection: &mut Orthographic,
    zoom: &mut ZoomBehavior,
    config: &GlobeConfig,
) -> GlobeResponse {
    let size = ui.available_size();
    let (width, height) = (size.x as f64, size.y as f64);
    let base = fit_scale(config.base_scale, width, height);
    projection.set_translate([0.0, 0.0]);
    projection.set_scale(zoom.projection_scale(base));
    let colors = palette(layers.dark_mode);
    let k = zoom.marker_radius();

    let plot = Plot::new(id)
        .data_aspect(1.0)
        .width(size.x)
        .height(size.y)
        .show_axes(false)
        .show_grid(false)
        .show_x(false)
        .show_y(false)
        .show_background(false)
        .allow_drag(false)
        .allow_zoom(false)
        .allow_scroll(false)
        .allow_boxed_zoom(false)
        .allow_double_click_reset(false)
        .cursor_color(egui::Color32::TRANSPARENT);

    let proj = &*projection;
    let response = plot.show(ui, |plot_ui| {
        plot_ui.set_plot_bounds(egui_plot::PlotBounds::from_min_max(
            [-width / 2.0, -height / 2.0],
            [width / 2.0, height / 2.0],
        ));

        let r = proj.scale();
        let disc: PlotPoints = (0..SPHERE_SEGMENTS)
            .map(|i| {
                let a = i as f64 / SPHERE_SEGMENTS as f64 * std::f64::consts::TAU;
                [r * a.cos(), r * a.sin()]
            })
            .collect();
        plot_ui.polygon(
            Polygon::new("", disc)
                .fill_color(colors.sphere)
                .stroke(egui::Stroke::new(1.0, colors.graticule)),
        );

        if layers.show_graticule {
            for line in layers.graticule {
                for seg in visible_segments(proj, line) {
                    plot_ui.line(Line::new("", PlotPoints::new(seg)).color(colors.graticule).width(0.5));
                }
            }
        }

        if layers.show_countries {
            for country in layers.countries {
                for ring in &country.rings {
                    for seg in visible_segments(proj, ring) {
                        plot_ui.line(Line::new("", PlotPoints::new(seg.clone())).color(colors.land).width(2.5));
                        plot_ui.line(Line::new("", PlotPoints::new(seg)).color(colors.border).width(0.5));
                    }
                }
            }
        }

        if let Some(frame) = layers.frame {
            let pts: PlotPoints = frame
                .fixes
                .iter()
                .filter(|fix| proj.is_visible(fix.point))
                .filter_map(|fix| proj.project(fix.point).map(to_plot))
                .collect();
            plot_ui.points(Points::new("", pts).color(colors.marker).radius(k as f32).filled(true));
        }

        if let Some(track) = layers.track {
            let pts: PlotPoints = track
                .iter()
                .filter_map(|p| proj.project(*p).map(to_plot))
                .collect();
            plot_ui.points(Points::new("", pts).color(colors.track).radius((k / 2.0) as f32).filled(true));
        }
    });

    let mut out = GlobeResponse::default();
    let hit_radius = k.max(MIN_HIT_RADIUS);

    if let Some(hover_pos) = response.response.hover_pos() {
        let xy = from_plot(response.transform.value_from_position(hover_pos));
        match layers.frame.and_then(|frame| marker_at(projection, frame, xy, hit_radius)) {
            Some(fix) => {
                tooltip(ui, hover_pos, fix.name.to_string());
                ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
            }
            None => {
                if let Some(p) = projection.invert(xy) {
                    tooltip(ui, hover_pos, format!("{:.1}° {:.1}°", p.lat, p.lng));
                }
            }
        }
    }

    if response.response.clicked() {
        if let (Some(frame), Some(pos)) = (layers.frame, response.response.interact_pointer_pos()) {
            let xy = from_plot(response.transform.value_from_position(pos));
            out.clicked = marker_at(projection, frame, xy, hit_radius).map(|fix| fix.norad_id);
        }
    }

    if response.response.dragged() && !response.response.drag_started() {
        let drag = response.response.drag_delta();
        projection.drag(drag.x as f64, drag.y as f64, config.drag_sensitivity);
        out.dragged = true;
    }

    if response.response.hovered() {
        let scroll = ui.input(|i| i.raw_scroll_delta.y);
        if scroll != 0.0 {
            zoom.scale_by(1.0 + scroll as f64 * 0.001);
        }
        if let Some(touch) = ui.input(|i| i.multi_touch()) {
            zoom.scale_by(touch.zoom_delta as f64);
        }
    }

    if response.response.is_pointer_button_down_on() {
        ui.ctx().set_cursor_icon(egui::CursorIcon::Grabbing);
    }
    out
}

/// Equirectangular map of the current frame and the selected satellite's
/// previous, current and next orbits.
pub fn draw_ground_track(
    ui: &mut egui::Ui,
    id: &str,
    frame: Option<&Frame>,
    countries: &[Country],
    track: Option<&GroundTrack>,
    selected: Option<u64>,
    dark_mode: bool,
) {
    let colors = palette(dark_mode);
    let size = ui.available_size();
    let plot = Plot::new(id)
        .width(size.x)
        .height(size.y)
        .data_aspect(1.0)
        .include_x(-180.0)
        .include_x(180.0)
        .include_y(-90.0)
        .include_y(90.0)
        .show_axes([true, true]);

    plot.show(ui, |plot_ui| {
        for country in countries {
            for ring in &country.rings {
                for seg in split_at_antimeridian(ring) {
                    plot_ui.line(Line::new("", PlotPoints::new(seg)).color(colors.border).width(0.5));
                }
            }
        }

        plot_ui.line(
            Line::new("", PlotPoints::new(vec![[-180.0, 0.0], [180.0, 0.0]]))
                .color(egui::Color32::DARK_GRAY)
                .width(0.5),
        );
        plot_ui.line(
            Line::new("", PlotPoints::new(vec![[0.0, -90.0], [0.0, 90.0]]))
                .color(egui::Color32::DARK_GRAY)
                .width(0.5),
        );

        if let Some(frame) = frame {
            let pts: PlotPoints = frame.fixes.iter().map(|f| [f.point.lng, f.point.lat]).collect();
            plot_ui.points(Points::new("", pts).color(colors.marker).radius(1.5).filled(true));

            if let Some(fix) = selected.and_then(|id| frame.fixes.iter().find(|f| f.norad_id == id)) {
                plot_ui.points(
                    Points::new("", PlotPoints::new(vec![[fix.point.lng, fix.point.lat]]))
                        .color(colors.track)
                        .radius(4.0)
                        .filled(true),
                );
            }
        }

        if let Some(track) = track {
            let dimmed = dim_color(colors.track);
            let orbits = [(track.previous(), dimmed), (track.current(), colors.track), (track.next(), dimmed)];
            for (orbit, color) in orbits {
                for seg in split_at_antimeridian(orbit) {
                    plot_ui.line(Line::new("", PlotPoints::new(seg)).color(color).width(1.0));
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn fix(name: &str, lat: f64, lng: f64) -> SatelliteFix {
        SatelliteFix {
            norad_id: 0,
            name: Arc::from(name),
            point: GeoPoint::new(lat, lng),
            height_km: 550.0,
        }
    }

    #[test]
    fn fit_scale_tracks_smaller_dimension() {
        assert_relative_eq!(fit_scale(249.5, 960.0, 500.0), 249.5);
        assert_relative_eq!(fit_scale(249.5, 960.0, 250.0), 124.75);
        assert_relative_eq!(fit_scale(249.5, 480.0, 1000.0), 124.75);
        assert_relative_eq!(fit_scale(249.5, 0.0, 0.0), 249.5);
    }

    #[test]
    fn far_side_breaks_lines() {
        let p = Orthographic::new(100.0, [0.0, 0.0]);
        let equator: Vec<GeoPoint> = (-180..=180).step_by(10).map(|l| GeoPoint::new(0.0, l as f64)).collect();
        let segments = visible_segments(&p, &equator);
        assert_eq!(segments.len(), 1);
        // -90..=90 faces the viewer.
        assert_eq!(segments[0].len(), 19);
        assert!(segments[0].iter().all(|xy| xy[0].abs() <= 100.0 + 1e-9));

        let hidden = [GeoPoint::new(0.0, 170.0), GeoPoint::new(0.0, 180.0)];
        assert!(visible_segments(&p, &hidden).is_empty());
    }

    #[test]
    fn plot_y_points_north() {
        let p = Orthographic::new(100.0, [0.0, 0.0]);
        let north = visible_segments(&p, &[GeoPoint::new(0.0, 0.0), GeoPoint::new(30.0, 0.0)]);
        assert!(north[0][1][1] > 0.0);
    }

    #[test]
    fn antimeridian_split() {
        let orbit = [
            GeoPoint::new(0.0, 170.0),
            GeoPoint::new(2.0, 178.0),
            GeoPoint::new(4.0, -175.0),
            GeoPoint::new(6.0, -168.0),
        ];
        let segments = split_at_antimeridian(&orbit);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], vec![[170.0, 0.0], [178.0, 2.0]]);
        assert_eq!(segments[1][0], [-175.0, 4.0]);
        assert!(split_at_antimeridian(&[]).is_empty());
    }

    #[test]
    fn marker_hit_test_prefers_nearest_visible() {
        let p = Orthographic::new(100.0, [0.0, 0.0]);
        let frame = Frame {
            at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            fixes: vec![
                fix("STARLINK-1", 0.0, 0.0),
                fix("STARLINK-2", 0.0, 1.0),
                fix("STARLINK-3", 0.0, 180.0),
            ],
        };
        // (0, 1) projects to about (1.75, 0).
        let hit = marker_at(&p, &frame, [1.6, 0.0], 4.0).unwrap();
        assert_eq!(&*hit.name, "STARLINK-2");
        let hit = marker_at(&p, &frame, [0.2, 0.1], 4.0).unwrap();
        assert_eq!(&*hit.name, "STARLINK-1");
        assert!(marker_at(&p, &frame, [50.0, 50.0], 4.0).is_none());
        // The far-side satellite projects to the origin too but is hidden.
        let only_far = Frame { at: frame.at, fixes: vec![fix("STARLINK-3", 0.0, 180.0)] };
        assert!(marker_at(&p, &only_far, [0.0, 0.0], 4.0).is_none());
    }
}

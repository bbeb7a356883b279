mod app;
mod atlas;
mod config;
mod drawing;
mod error;
mod fetch;
mod math;
mod orbit;
mod projection;
mod settings;
mod time;
mod timeline;
mod tle;
mod viewer;

use app::App;
use config::GlobeConfig;
#[cfg(not(target_arch = "wasm32"))]
use eframe::egui;

#[cfg(target_arch = "wasm32")]
use eframe::wasm_bindgen::JsCast;

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GlobeConfig::load().unwrap_or_else(|e| {
        log::warn!("Ignoring configuration: {}", e);
        GlobeConfig::default()
    });

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Starlink Globe",
        options,
        Box::new(|cc| Ok(Box::new(App::new(cc, config)?))),
    )
}

#[cfg(target_arch = "wasm32")]
fn main() {
    eframe::WebLogger::init(log::LevelFilter::Debug).ok();

    wasm_bindgen_futures::spawn_local(async {
        let document = web_sys::window()
            .expect("No window")
            .document()
            .expect("No document");

        let canvas = document
            .get_element_by_id("canvas")
            .expect("No canvas element")
            .dyn_into::<web_sys::HtmlCanvasElement>()
            .expect("Not a canvas");

        let web_options = eframe::WebOptions::default();
        eframe::WebRunner::new()
            .start(
                canvas,
                web_options,
                Box::new(|cc| Ok(Box::new(App::new(cc, GlobeConfig::default())?))),
            )
            .await
            .expect("Failed to start eframe");
    });
}

mod app;

use ad2_scope::{load_config, AppConfig};
use app::ScopeApp;
use log::{info, warn, LevelFilter};
use std::path::PathBuf;

fn main() -> eframe::Result<()> {
    // Optional config path as the only argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let (config, load_error) = match load_config(config_path.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    let level = config
        .logging
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);
    let log_receiver = app::init_logging(level);
    match load_error {
        Some(e) => warn!("Failed to load config ({}), using defaults", e),
        None => info!("Configuration loaded successfully"),
    }

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([900.0, 620.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "AD2 Scope",
        options,
        Box::new(move |cc| {
            let mut app = ScopeApp::new(cc, config);
            app.set_log_receiver(log_receiver);
            Ok(Box::new(app))
        }),
    )
}

mod app;
mod color;
mod state;
mod ui;

use anyhow::Context;
use app::SegmentDashApp;
use eframe::egui;
use segment_dash::config::DashboardConfig;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = DashboardConfig::discover().context("loading configuration")?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Segment Dash – Customer Segmentation",
        options,
        Box::new(|_cc| Ok(Box::new(SegmentDashApp::new(config)))),
    )
    .map_err(|e| anyhow::anyhow!("running the dashboard: {e}"))
}

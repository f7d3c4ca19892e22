use eframe::egui;
use segment_dash::config::DashboardConfig;

use crate::state::AppState;
use crate::ui::{panels, plot, table};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct SegmentDashApp {
    pub state: AppState,
}

impl SegmentDashApp {
    pub fn new(config: DashboardConfig) -> Self {
        let mut state = AppState::new(config);
        state.load();
        Self { state }
    }
}

impl eframe::App for SegmentDashApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: filters ----
        egui::SidePanel::left("filter_panel")
            .default_width(280.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Bottom panel: export ----
        egui::TopBottomPanel::bottom("export_panel").show(ctx, |ui| {
            panels::export_panel(ui, &mut self.state);
        });

        // ---- Central panel: metrics, charts, tables ----
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(view) = &self.state.view else {
                ui.centered_and_justified(|ui| {
                    ui.heading("No data to show. Check the status bar or reload (File → Reload).");
                });
                return;
            };
            egui::ScrollArea::vertical().show(ui, |ui| {
                panels::metrics(ui, view);
                ui.separator();
                ui.columns(2, |cols| {
                    plot::top_sectors_chart(&mut cols[0], view, &self.state.sector_colors);
                    plot::recency_chart(&mut cols[1], view);
                });
                ui.separator();
                if let Some(buyers) = &view.top_buyers {
                    ui.strong("Largest buyers");
                    table::row_table(ui, "top_buyers", buyers, 240.0);
                    ui.separator();
                }
                ui.strong(format!("Sample ({} of {} rows)", view.sample.len(), view.matching));
                table::row_table(ui, "sample", &view.sample, 360.0);
            });
        });

        panels::error_window(ctx, &mut self.state);
    }
}

use eframe::egui::{Color32, Ui};
use egui_plot::{Bar, BarChart, Legend, Plot};
use segment_dash::session::DashboardView;

use crate::color::{ColorMap, sequential_palette};

const CHART_HEIGHT: f32 = 220.0;

// ---------------------------------------------------------------------------
// Top sectors (bar chart)
// ---------------------------------------------------------------------------

/// Matching customers per sector, largest first.
pub fn top_sectors_chart(ui: &mut Ui, view: &DashboardView, colors: &ColorMap) {
    ui.strong("Customers by sector");
    if view.top_sectors.is_empty() {
        ui.label("No sector data.");
        return;
    }

    let bars: Vec<Bar> = view
        .top_sectors
        .iter()
        .enumerate()
        .map(|(i, (sector, count))| {
            Bar::new(i as f64, *count as f64)
                .name(sector.to_string())
                .fill(colors.color_for(sector))
                .width(0.7)
        })
        .collect();

    Plot::new("top_sectors")
        .height(CHART_HEIGHT)
        .legend(Legend::default())
        .y_axis_label("Customers")
        .show_x(false)
        .allow_drag(false)
        .allow_scroll(false)
        .allow_zoom(false)
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(BarChart::new(bars).name("Sector"));
        });
}

// ---------------------------------------------------------------------------
// Engagement recency (bar chart)
// ---------------------------------------------------------------------------

/// Matching customers bucketed by days since their last purchase.
pub fn recency_chart(ui: &mut Ui, view: &DashboardView) {
    ui.strong("Days since last purchase");
    if view.recency.is_empty() {
        ui.label("No purchase date column.");
        return;
    }

    let mut palette = sequential_palette(view.recency.len().saturating_sub(1), 210.0);
    // The undated bucket stands apart from the ordered ones.
    palette.push(Color32::GRAY);

    let bars: Vec<Bar> = view
        .recency
        .iter()
        .zip(palette)
        .enumerate()
        .map(|(i, (bucket, color))| {
            Bar::new(i as f64, bucket.count as f64)
                .name(bucket.label)
                .fill(color)
                .width(0.7)
        })
        .collect();

    Plot::new("recency")
        .height(CHART_HEIGHT)
        .legend(Legend::default())
        .y_axis_label("Customers")
        .show_x(false)
        .allow_drag(false)
        .allow_scroll(false)
        .allow_zoom(false)
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(BarChart::new(bars).name("Recency"));
        });
}

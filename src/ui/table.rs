use eframe::egui::Ui;
use egui_extras::{Column, TableBuilder};
use segment_dash::data::model::RowSet;

// ---------------------------------------------------------------------------
// Row tables (sample, largest buyers)
// ---------------------------------------------------------------------------

const ROW_HEIGHT: f32 = 18.0;

/// Render a `RowSet` as a striped, scrollable table.
pub fn row_table(ui: &mut Ui, id: &str, rows: &RowSet, max_height: f32) {
    if rows.is_empty() {
        ui.label("No rows match the current filters.");
        return;
    }
    ui.push_id(id, |ui: &mut Ui| {
        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .max_scroll_height(max_height)
            .columns(Column::auto().at_least(60.0).clip(true), rows.columns.len())
            .header(ROW_HEIGHT + 2.0, |mut header| {
                for name in &rows.columns {
                    header.col(|ui: &mut Ui| {
                        ui.strong(name);
                    });
                }
            })
            .body(|body| {
                body.rows(ROW_HEIGHT, rows.len(), |mut row| {
                    let record = &rows.rows[row.index()];
                    for cell in record {
                        row.col(|ui: &mut Ui| {
                            ui.label(cell.to_string());
                        });
                    }
                });
            });
    });
}

use std::collections::BTreeSet;

use chrono::{Local, NaiveDate};
use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::DatePickerButton;
use segment_dash::data::model::CellValue;
use segment_dash::export::{ExportFormat, ExportState, artifact_file_name};
use segment_dash::session::{DashboardView, ExportColumns};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – filter widgets
// ---------------------------------------------------------------------------

/// Render the left filter panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Filters");
    ui.separator();

    let Some(ds) = state.session.loaded() else {
        ui.label("No dataset loaded.");
        return;
    };
    let cols = &ds.columns;
    let form = &mut state.form;

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            ui.strong("Customer identifiers");
            ui.add(
                egui::TextEdit::multiline(&mut form.identifiers)
                    .hint_text("one per line or comma separated")
                    .desired_rows(3),
            );

            if cols.name.is_some() {
                ui.strong("Name contains");
                ui.text_edit_singleline(&mut form.name_contains);
            }
            ui.separator();

            if let Some(col) = &cols.category {
                value_checklist(ui, "Category", ds.handle.distinct_values(col), &mut form.categories);
            }
            if let Some(col) = &cols.sector {
                value_checklist(ui, "Sector", ds.handle.distinct_values(col), &mut form.sectors);
            }
            ui.separator();

            if cols.purchase_date.is_some() {
                ui.add_enabled_ui(!form.only_missing_purchase, |ui: &mut Ui| {
                    date_range(
                        ui,
                        "purchase",
                        "Last purchase between",
                        &mut form.purchase_enabled,
                        &mut form.purchase_start,
                        &mut form.purchase_end,
                    );
                });
                ui.add_enabled_ui(!form.purchase_enabled, |ui: &mut Ui| {
                    ui.checkbox(&mut form.only_missing_purchase, "Only customers without a purchase");
                });
            }
            if cols.signup_date.is_some() {
                date_range(
                    ui,
                    "signup",
                    "Signed up between",
                    &mut form.signup_enabled,
                    &mut form.signup_start,
                    &mut form.signup_end,
                );
            }

            if let Some(col) = &cols.flag {
                ui.separator();
                ui.strong("Exclude status");
                let selected = form.excluded_flag.clone().unwrap_or_else(|| "(none)".into());
                egui::ComboBox::from_id_salt("excluded_flag")
                    .selected_text(selected)
                    .show_ui(ui, |ui: &mut Ui| {
                        ui.selectable_value(&mut form.excluded_flag, None, "(none)");
                        for value in ds.handle.distinct_values(col) {
                            let text = value.to_field();
                            ui.selectable_value(&mut form.excluded_flag, Some(text.clone()), text);
                        }
                    });
            }
        });

    ui.separator();
    ui.horizontal(|ui: &mut Ui| {
        if ui.button("Apply filters").clicked() {
            state.apply();
        }
        if ui.button("Reset").clicked() {
            state.reset_filters();
        }
    });
}

/// Collapsible checklist over a column's distinct values.
fn value_checklist(ui: &mut Ui, label: &str, values: &[CellValue], selected: &mut BTreeSet<String>) {
    let header_text = format!("{label}  ({}/{})", selected.len(), values.len());
    egui::CollapsingHeader::new(RichText::new(header_text).strong())
        .id_salt(label)
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            ui.horizontal(|ui: &mut Ui| {
                if ui.small_button("All").clicked() {
                    selected.extend(values.iter().map(CellValue::to_field));
                }
                if ui.small_button("None").clicked() {
                    selected.clear();
                }
            });
            for value in values {
                let key = value.to_field();
                let mut checked = selected.contains(&key);
                if ui.checkbox(&mut checked, &key).changed() {
                    if checked {
                        selected.insert(key);
                    } else {
                        selected.remove(&key);
                    }
                }
            }
        });
}

fn date_range(
    ui: &mut Ui,
    id: &str,
    label: &str,
    enabled: &mut bool,
    start: &mut NaiveDate,
    end: &mut NaiveDate,
) {
    ui.checkbox(enabled, label);
    ui.add_enabled_ui(*enabled, |ui: &mut Ui| {
        ui.horizontal(|ui: &mut Ui| {
            ui.add(DatePickerButton::new(start).id_salt(&format!("{id}_start")));
            ui.label("to");
            ui.add(DatePickerButton::new(end).id_salt(&format!("{id}_end")));
        });
        if *start > *end {
            ui.label(RichText::new("Start is after end").color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Reload dataset").clicked() {
                state.reload();
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(ds) = state.session.loaded() {
            ui.label(format!(
                "{} customers, {} columns",
                ds.handle.row_count,
                ds.handle.columns.len()
            ));
        }

        ui.separator();

        if let Some(msg) = &state.status_message {
            ui.label(msg);
        }
    });
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

pub fn metrics(ui: &mut Ui, view: &DashboardView) {
    ui.horizontal(|ui: &mut Ui| {
        metric(ui, "Matching rows", view.matching.to_string());
        ui.separator();
        metric(ui, "Distinct customers", view.distinct_customers.to_string());
        if let Some(total) = view.total_spend {
            ui.separator();
            metric(ui, "Total spend", format!("{total:.2}"));
        }
    });
    egui::CollapsingHeader::new("Active filters")
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            ui.monospace(view.predicate.diagnostics());
        });
}

fn metric(ui: &mut Ui, label: &str, value: String) {
    ui.vertical(|ui: &mut Ui| {
        ui.label(label);
        ui.label(RichText::new(value).heading().strong());
    });
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Format choice, column choice, save dialog and last progress.
pub fn export_panel(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui: &mut Ui| {
        ui.strong("Export");

        let csv = state.csv_format();
        egui::ComboBox::from_id_salt("export_format")
            .selected_text(state.export_format.label())
            .show_ui(ui, |ui: &mut Ui| {
                ui.selectable_value(&mut state.export_format, csv, "CSV");
                ui.selectable_value(&mut state.export_format, ExportFormat::Parquet, "Parquet");
                ui.selectable_value(&mut state.export_format, ExportFormat::Xlsx, "XLSX");
            });
        if let ExportFormat::Csv { gzip } = state.export_format {
            let mut compressed = gzip;
            if ui.checkbox(&mut compressed, "gzip").changed() {
                state.set_gzip(compressed);
            }
        }

        ui.separator();
        ui.radio_value(&mut state.export_columns, ExportColumns::All, "All columns");
        ui.radio_value(
            &mut state.export_columns,
            ExportColumns::IdentifierOnly,
            "Identifiers only",
        );
        ui.separator();

        let idle = state.session.loaded().is_some() && !state.session.export_running();
        if ui.add_enabled(idle, egui::Button::new("Export…")).clicked() {
            let prefix = &state.session.config().export.file_prefix;
            let name = artifact_file_name(prefix, state.export_format, Local::now().naive_local());
            let ext = state.export_format.extension();
            let destination = rfd::FileDialog::new()
                .set_title("Save export")
                .set_file_name(&name)
                .add_filter(state.export_format.label(), &[ext])
                .save_file();
            if let Some(path) = destination {
                state.export(path);
            }
        }

        if let Some(progress) = &state.export_progress {
            let text = match progress.state {
                ExportState::Completed => format!("{} rows", progress.processed),
                ExportState::Failed => "failed".to_string(),
                _ => format!("{}/{}", progress.processed, progress.total),
            };
            ui.add(
                egui::ProgressBar::new(progress.fraction())
                    .desired_width(160.0)
                    .text(text),
            );
        }
        if let Some(outcome) = &state.last_export {
            ui.label(
                RichText::new(format!("{} ({})", outcome.path.display(), outcome.mime_type()))
                    .small(),
            );
        }
    });
}

// ---------------------------------------------------------------------------
// Error window
// ---------------------------------------------------------------------------

/// Modal-style window for the last error, with its suggested next step.
pub fn error_window(ctx: &egui::Context, state: &mut AppState) {
    let Some(err) = &state.error else {
        return;
    };
    let mut dismissed = false;
    egui::Window::new(&err.title)
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui: &mut Ui| {
            ui.label(&err.message);
            if let Some(action) = &err.action {
                ui.add_space(4.0);
                ui.label(RichText::new(action).italics());
            }
            ui.add_space(8.0);
            if ui.button("OK").clicked() {
                dismissed = true;
            }
        });
    if dismissed {
        state.error = None;
    }
}

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use segment_dash::config::DashboardConfig;
use segment_dash::data::filter::{DateRange, FilterSpec};
use segment_dash::error::{DashError, ErrorPresentation};
use segment_dash::export::{CancelToken, ExportFormat, ExportOutcome, ExportProgress};
use segment_dash::hub;
use segment_dash::session::{DashboardView, ExportColumns, Session};

use crate::color::ColorMap;

// ---------------------------------------------------------------------------
// Filter form – raw widget values
// ---------------------------------------------------------------------------

/// What the filter widgets hold. Turned into a fresh `FilterSpec` on every
/// apply, so nothing from a previous selection leaks into the next one.
#[derive(Debug, Clone)]
pub struct FilterForm {
    /// Identifiers separated by commas or newlines.
    pub identifiers: String,
    pub name_contains: String,
    pub categories: BTreeSet<String>,
    pub sectors: BTreeSet<String>,
    pub purchase_enabled: bool,
    pub purchase_start: NaiveDate,
    pub purchase_end: NaiveDate,
    pub signup_enabled: bool,
    pub signup_start: NaiveDate,
    pub signup_end: NaiveDate,
    pub only_missing_purchase: bool,
    pub excluded_flag: Option<String>,
}

impl FilterForm {
    pub fn new(today: NaiveDate) -> Self {
        let year_ago = today - chrono::Duration::days(365);
        Self {
            identifiers: String::new(),
            name_contains: String::new(),
            categories: BTreeSet::new(),
            sectors: BTreeSet::new(),
            purchase_enabled: false,
            purchase_start: year_ago,
            purchase_end: today,
            signup_enabled: false,
            signup_start: year_ago,
            signup_end: today,
            only_missing_purchase: false,
            excluded_flag: None,
        }
    }

    pub fn to_spec(&self) -> FilterSpec {
        let range = |enabled: bool, start: NaiveDate, end: NaiveDate| DateRange {
            enabled,
            start: Some(start),
            end: Some(end),
        };
        let name = self.name_contains.trim();
        FilterSpec {
            identifiers: parse_identifiers(&self.identifiers),
            name_contains: (!name.is_empty()).then(|| name.to_string()),
            categories: self.categories.clone(),
            sectors: self.sectors.clone(),
            purchase_date: range(self.purchase_enabled, self.purchase_start, self.purchase_end),
            signup_date: range(self.signup_enabled, self.signup_start, self.signup_end),
            only_missing_purchase: self.only_missing_purchase,
            excluded_flag: self.excluded_flag.clone(),
        }
    }
}

/// Split pasted identifiers on commas and newlines. Empty lines are skipped;
/// blanks between commas are kept so validation can point at them.
pub fn parse_identifiers(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| line.split(','))
        .map(|id| id.trim().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    pub session: Session,

    /// Widget values being edited.
    pub form: FilterForm,

    /// Last successfully applied selection and its figures.
    pub applied: FilterSpec,
    pub view: Option<DashboardView>,

    /// Stable sector colours, rebuilt when the dataset is (re)loaded.
    pub sector_colors: ColorMap,

    /// Status line shown in the top bar.
    pub status_message: Option<String>,

    /// Error shown in a modal window until dismissed.
    pub error: Option<ErrorPresentation>,

    pub export_format: ExportFormat,
    pub export_columns: ExportColumns,
    pub export_progress: Option<ExportProgress>,
    pub last_export: Option<ExportOutcome>,
}

impl AppState {
    pub fn new(config: DashboardConfig) -> Self {
        let source = hub::from_config(&config);
        let gzip = config.export.gzip_csv;
        Self {
            session: Session::new(config, source),
            form: FilterForm::new(today()),
            applied: FilterSpec::default(),
            view: None,
            sector_colors: ColorMap::new(&[]),
            status_message: None,
            error: None,
            export_format: ExportFormat::Csv { gzip },
            export_columns: ExportColumns::All,
            export_progress: None,
            last_export: None,
        }
    }

    /// Open the dataset (first call) and show the unfiltered dashboard.
    pub fn load(&mut self) {
        match self.session.dataset() {
            Ok(_) => {
                self.status_message = Some(format!("Source: {}", self.session.source_description()));
                self.rebuild_colors();
                self.apply();
            }
            Err(e) => self.report(e),
        }
    }

    /// Re-fetch the dataset and reapply the current selection.
    pub fn reload(&mut self) {
        match self.session.refresh() {
            Ok(_) => {
                self.status_message = Some("Dataset reloaded".into());
                self.rebuild_colors();
                self.apply();
            }
            Err(e) => self.report(e),
        }
    }

    fn rebuild_colors(&mut self) {
        if let Some(ds) = self.session.loaded() {
            self.sector_colors = match &ds.columns.sector {
                Some(col) => ColorMap::new(ds.handle.distinct_values(col)),
                None => ColorMap::new(&[]),
            };
        }
    }

    /// Build a `FilterSpec` from the form and recompute every figure.
    pub fn apply(&mut self) {
        let spec = self.form.to_spec();
        match self.session.dashboard(&spec, today()) {
            Ok(view) => {
                log::info!("applied filters: {} rows match", view.matching);
                self.applied = spec;
                self.view = Some(view);
            }
            Err(e) => self.report(e),
        }
    }

    /// Restore every filter widget to its default and reapply.
    pub fn reset_filters(&mut self) {
        self.form = FilterForm::new(today());
        self.apply();
    }

    /// Export the last applied selection to `destination`.
    pub fn export(&mut self, destination: PathBuf) {
        let cancel = CancelToken::new();
        let mut last = None;
        let result = self.session.export(
            &self.applied,
            self.export_format,
            self.export_columns,
            destination,
            &cancel,
            &mut |p: &ExportProgress| last = Some(*p),
        );
        self.export_progress = last;
        match result {
            Ok(outcome) => {
                self.status_message = Some(format!(
                    "Exported {} rows to {}",
                    outcome.rows,
                    outcome.path.display()
                ));
                self.last_export = Some(outcome);
            }
            Err(e) => self.report(e),
        }
    }

    /// CSV choice for the format picker: the current gzip setting when CSV
    /// is already selected, else the configured default.
    pub fn csv_format(&self) -> ExportFormat {
        match self.export_format {
            ExportFormat::Csv { gzip } => ExportFormat::Csv { gzip },
            _ => ExportFormat::Csv {
                gzip: self.session.config().export.gzip_csv,
            },
        }
    }

    pub fn set_gzip(&mut self, gzip: bool) {
        if let ExportFormat::Csv { .. } = self.export_format {
            self.export_format = ExportFormat::Csv { gzip };
        }
    }

    fn report(&mut self, err: DashError) {
        log::error!("{err}");
        self.error = Some(err.presentation());
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

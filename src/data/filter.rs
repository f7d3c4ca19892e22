use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::model::DatasetHandle;
use super::predicate::{Cast, Condition, Literal, Operator, Predicate, contains_pattern};
use crate::config::ColumnsConfig;
use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// FilterSpec – the user's structured filter selection
// ---------------------------------------------------------------------------

/// A date range on one temporal column. When `enabled` is false the range
/// contributes nothing, whatever `start`/`end` still hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub enabled: bool,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            enabled: true,
            start: Some(start),
            end: Some(end),
        }
    }
}

/// Every field is optional; `FilterSpec::default()` matches all records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub identifiers: Vec<String>,
    pub name_contains: Option<String>,
    pub categories: BTreeSet<String>,
    pub sectors: BTreeSet<String>,
    pub purchase_date: DateRange,
    pub signup_date: DateRange,
    /// Only records lacking a purchase date.
    pub only_missing_purchase: bool,
    /// Drop records whose flag column equals this value.
    pub excluded_flag: Option<String>,
}

// ---------------------------------------------------------------------------
// ColumnMap – filter roles resolved against the dataset schema
// ---------------------------------------------------------------------------

/// Column names per filter role. Only names present in the dataset survive
/// [`ColumnMap::resolve`], so this is also the SQL column allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub identifier: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub sector: Option<String>,
    pub spend: Option<String>,
    pub purchase_date: Option<String>,
    pub signup_date: Option<String>,
    pub flag: Option<String>,
}

impl ColumnMap {
    pub fn resolve(config: &ColumnsConfig, handle: &DatasetHandle) -> Self {
        let keep = |role: &str, column: &Option<String>| -> Option<String> {
            let column = column.as_ref()?;
            if handle.has_column(column) {
                Some(column.clone())
            } else {
                log::warn!("{role} column '{column}' not found in dataset, filter disabled");
                None
            }
        };

        let identifier = if handle.has_column(&config.identifier) {
            config.identifier.clone()
        } else {
            let fallback = handle
                .columns
                .first()
                .map(|c| c.name.clone())
                .unwrap_or_default();
            log::warn!(
                "identifier column '{}' not found, using '{fallback}'",
                config.identifier
            );
            fallback
        };

        // Date ranges cast the column to DATE, which numbers and times reject.
        let keep_date = |role: &str, column: &Option<String>| -> Option<String> {
            let column = keep(role, column)?;
            match handle.column_kind(&column) {
                Some(kind) if !kind.is_temporal() => {
                    log::warn!("{role} column '{column}' holds {kind:?} values, filter disabled");
                    None
                }
                _ => Some(column),
            }
        };

        ColumnMap {
            identifier,
            name: keep("name", &config.name),
            category: keep("category", &config.category),
            sector: keep("sector", &config.sector),
            spend: keep("spend", &config.spend),
            purchase_date: keep_date("purchase date", &config.purchase_date),
            signup_date: keep_date("signup date", &config.signup_date),
            flag: keep("flag", &config.flag),
        }
    }

    /// Columns whose distinct values feed selection widgets.
    pub fn low_cardinality(&self) -> Vec<&str> {
        [&self.category, &self.sector, &self.flag]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PredicateBuilder
// ---------------------------------------------------------------------------

const MISSING_PURCHASE: &str = "only missing purchase date";
const PURCHASE_RANGE: &str = "purchase date range";

/// Maps a [`FilterSpec`] to a [`Predicate`]. Conditions come out in a fixed
/// field order, so equal specs always render to identical SQL.
pub struct PredicateBuilder<'a> {
    columns: &'a ColumnMap,
}

impl<'a> PredicateBuilder<'a> {
    pub fn new(columns: &'a ColumnMap) -> Self {
        Self { columns }
    }

    pub fn build(&self, spec: &FilterSpec) -> Result<Predicate, ValidationError> {
        if spec.only_missing_purchase && spec.purchase_date.enabled {
            return Err(ValidationError::ContradictoryFilter {
                first: MISSING_PURCHASE,
                second: PURCHASE_RANGE,
            });
        }
        check_range("purchase_date", &spec.purchase_date)?;
        check_range("signup_date", &spec.signup_date)?;

        let mut predicate = Predicate::match_all();

        if !spec.identifiers.is_empty() {
            let mut ids = BTreeSet::new();
            for (i, raw) in spec.identifiers.iter().enumerate() {
                let id = raw.trim();
                if id.is_empty() {
                    return Err(ValidationError::InvalidIdentifier { position: i + 1 });
                }
                ids.insert(id.to_string());
            }
            predicate.push(membership(&self.columns.identifier, ids));
        }

        if let Some(needle) = spec.name_contains.as_deref().map(str::trim) {
            if !needle.is_empty() {
                let column = self.require(&self.columns.name, "name")?;
                predicate.push(Condition::new(
                    column,
                    Cast::Text,
                    Operator::Contains,
                    vec![Literal::Text(contains_pattern(needle))],
                ));
            }
        }

        if !spec.categories.is_empty() {
            let column = self.require(&self.columns.category, "category")?;
            predicate.push(membership(column, spec.categories.clone()));
        }

        if !spec.sectors.is_empty() {
            let column = self.require(&self.columns.sector, "sector")?;
            predicate.push(membership(column, spec.sectors.clone()));
        }

        if spec.purchase_date.enabled {
            let column = self.require(&self.columns.purchase_date, "purchase_date")?;
            push_range(&mut predicate, column, &spec.purchase_date);
        }

        if spec.only_missing_purchase {
            let column = self.require(&self.columns.purchase_date, "purchase_date")?;
            predicate.push(Condition::new(column, Cast::None, Operator::IsNull, Vec::new()));
        }

        if spec.signup_date.enabled {
            let column = self.require(&self.columns.signup_date, "signup_date")?;
            push_range(&mut predicate, column, &spec.signup_date);
        }

        if let Some(flag) = &spec.excluded_flag {
            let column = self.require(&self.columns.flag, "flag")?;
            predicate.push(Condition::new(
                column,
                Cast::Text,
                Operator::IsDistinctFrom,
                vec![Literal::Text(flag.clone())],
            ));
        }

        log::debug!(
            "built predicate with {} conditions",
            predicate.conditions().len()
        );
        Ok(predicate)
    }

    fn require<'c>(
        &self,
        column: &'c Option<String>,
        role: &str,
    ) -> Result<&'c str, ValidationError> {
        column
            .as_deref()
            .ok_or_else(|| ValidationError::UnknownColumn {
                column: role.to_string(),
            })
    }
}

fn check_range(field: &'static str, range: &DateRange) -> Result<(), ValidationError> {
    if let (true, Some(start), Some(end)) = (range.enabled, range.start, range.end) {
        if start > end {
            return Err(ValidationError::InvalidRange { field });
        }
    }
    Ok(())
}

fn membership(column: &str, values: BTreeSet<String>) -> Condition {
    let literals: Vec<Literal> = values.into_iter().map(Literal::Text).collect();
    if literals.len() == 1 {
        Condition::new(column, Cast::Text, Operator::Eq, literals)
    } else {
        Condition::new(column, Cast::Text, Operator::In, literals)
    }
}

fn push_range(predicate: &mut Predicate, column: &str, range: &DateRange) {
    if let Some(start) = range.start {
        predicate.push(Condition::new(
            column,
            Cast::Date,
            Operator::AtLeast,
            vec![Literal::Date(start)],
        ));
    }
    if let Some(end) = range.end {
        predicate.push(Condition::new(
            column,
            Cast::Date,
            Operator::AtMost,
            vec![Literal::Date(end)],
        ));
    }
}

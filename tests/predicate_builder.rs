mod common;

use common::date;
use pretty_assertions::assert_eq;
use segment_dash::data::filter::{ColumnMap, DateRange, FilterSpec, PredicateBuilder};
use segment_dash::data::predicate::Literal;
use segment_dash::error::ValidationError;

fn columns() -> ColumnMap {
    ColumnMap {
        identifier: "id_cliente".into(),
        name: Some("nome".into()),
        category: Some("categoria".into()),
        sector: Some("setor".into()),
        spend: Some("valor_gasto".into()),
        purchase_date: Some("data_ultima_compra".into()),
        signup_date: Some("data_cadastro".into()),
        flag: Some("status".into()),
    }
}

#[test]
fn empty_spec_matches_everything() {
    let cols = columns();
    let p = PredicateBuilder::new(&cols).build(&FilterSpec::default()).unwrap();
    assert!(p.is_empty());
    assert_eq!(p.to_sql().sql, "TRUE");
    assert!(p.to_sql().params.is_empty());
}

#[test]
fn valid_range_emits_both_bounds() {
    let cols = columns();
    let spec = FilterSpec {
        purchase_date: DateRange::between(date(2025, 1, 1), date(2025, 6, 30)),
        ..Default::default()
    };
    let bound = PredicateBuilder::new(&cols).build(&spec).unwrap().to_sql();
    assert_eq!(
        bound.sql,
        "TRY_CAST(\"data_ultima_compra\" AS DATE) >= CAST(? AS DATE) \
         AND TRY_CAST(\"data_ultima_compra\" AS DATE) <= CAST(? AS DATE)"
    );
    assert_eq!(
        bound.params,
        vec![Literal::Date(date(2025, 1, 1)), Literal::Date(date(2025, 6, 30))]
    );
}

#[test]
fn single_day_range_is_valid() {
    let cols = columns();
    let spec = FilterSpec {
        signup_date: DateRange::between(date(2024, 3, 5), date(2024, 3, 5)),
        ..Default::default()
    };
    assert!(PredicateBuilder::new(&cols).build(&spec).is_ok());
}

#[test]
fn inverted_range_is_rejected() {
    let cols = columns();
    let spec = FilterSpec {
        signup_date: DateRange::between(date(2025, 1, 2), date(2025, 1, 1)),
        ..Default::default()
    };
    assert_eq!(
        PredicateBuilder::new(&cols).build(&spec),
        Err(ValidationError::InvalidRange {
            field: "signup_date"
        })
    );
}

#[test]
fn missing_purchase_contradicts_purchase_range() {
    let cols = columns();
    let range = DateRange::between(date(2025, 1, 1), date(2025, 6, 30));

    // Same conflict whichever option the user set last.
    let mut first = FilterSpec {
        purchase_date: range.clone(),
        ..Default::default()
    };
    first.only_missing_purchase = true;

    let mut second = FilterSpec {
        only_missing_purchase: true,
        ..Default::default()
    };
    second.purchase_date = range;

    for spec in [first, second] {
        assert!(matches!(
            PredicateBuilder::new(&cols).build(&spec),
            Err(ValidationError::ContradictoryFilter { .. })
        ));
    }
}

#[test]
fn contradiction_is_reported_before_range_errors() {
    let cols = columns();
    let spec = FilterSpec {
        only_missing_purchase: true,
        purchase_date: DateRange::between(date(2025, 2, 1), date(2025, 1, 1)),
        ..Default::default()
    };
    assert!(matches!(
        PredicateBuilder::new(&cols).build(&spec),
        Err(ValidationError::ContradictoryFilter { .. })
    ));
}

#[test]
fn equal_specs_render_identically() {
    let cols = columns();
    let a = FilterSpec {
        identifiers: vec!["9".into(), "3".into()],
        name_contains: Some("lima".into()),
        categories: ["C".to_string(), "A".to_string()].into(),
        signup_date: DateRange::between(date(2022, 1, 1), date(2023, 12, 31)),
        excluded_flag: Some("inativo".into()),
        ..Default::default()
    };
    let mut b = FilterSpec {
        excluded_flag: Some("inativo".into()),
        signup_date: DateRange::between(date(2022, 1, 1), date(2023, 12, 31)),
        name_contains: Some("lima".into()),
        identifiers: vec!["3".into(), "9".into()],
        ..Default::default()
    };
    b.categories.insert("A".into());
    b.categories.insert("C".into());

    let builder = PredicateBuilder::new(&cols);
    assert_eq!(builder.build(&a).unwrap().to_sql(), builder.build(&b).unwrap().to_sql());
    assert_eq!(
        builder.build(&a).unwrap().to_inline_sql(),
        builder.build(&a).unwrap().to_inline_sql()
    );
}

#[test]
fn conditions_follow_field_order() {
    let cols = columns();
    let spec = FilterSpec {
        excluded_flag: Some("inativo".into()),
        sectors: ["Varejo".to_string()].into(),
        identifiers: vec!["1".into()],
        ..Default::default()
    };
    let p = PredicateBuilder::new(&cols).build(&spec).unwrap();
    let order: Vec<&str> = p.conditions().iter().map(|c| c.column.as_str()).collect();
    assert_eq!(order, vec!["id_cliente", "setor", "status"]);
}

#[test]
fn name_filter_escapes_wildcards() {
    let cols = columns();
    let spec = FilterSpec {
        name_contains: Some(" 50%_off ".into()),
        ..Default::default()
    };
    let bound = PredicateBuilder::new(&cols).build(&spec).unwrap().to_sql();
    assert_eq!(bound.sql, "CAST(\"nome\" AS VARCHAR) ILIKE ? ESCAPE '\\'");
    assert_eq!(bound.params, vec![Literal::Text("%50\\%\\_off%".into())]);
}

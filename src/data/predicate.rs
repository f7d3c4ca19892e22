use chrono::NaiveDate;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Literal – a value bound into a condition
// ---------------------------------------------------------------------------

/// A literal compared against a column. Never spliced into SQL text when
/// rendered with [`Predicate::to_sql`]; bound as a parameter instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Literal {
    Text(String),
    Date(NaiveDate),
}

impl Literal {
    /// SQL placeholder for this literal.
    fn placeholder(&self) -> &'static str {
        match self {
            Literal::Date(_) => "CAST(? AS DATE)",
            Literal::Text(_) => "?",
        }
    }

    /// Escaped inline form, used where the engine cannot bind parameters.
    fn inline(&self) -> String {
        match self {
            Literal::Text(s) => quote_string(s),
            Literal::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
        }
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    Eq,
    In,
    AtLeast,
    AtMost,
    IsNull,
    IsDistinctFrom,
    /// Case-insensitive substring match. The literal is an already escaped
    /// `ILIKE` pattern.
    Contains,
}

/// How the column is read before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cast {
    /// Compare as-is.
    None,
    /// Compare the column's text rendering, so string input matches integer ids.
    Text,
    /// Best-effort date; unparsable cells read as null.
    Date,
}

/// One conjunct: (column, operator, literal values).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Condition {
    pub column: String,
    pub cast: Cast,
    pub op: Operator,
    pub values: Vec<Literal>,
}

impl Condition {
    pub fn new(column: &str, cast: Cast, op: Operator, values: Vec<Literal>) -> Self {
        Self {
            column: column.to_string(),
            cast,
            op,
            values,
        }
    }

    fn column_expr(&self) -> String {
        let ident = quote_ident(&self.column);
        match self.cast {
            Cast::None => ident,
            Cast::Text => format!("CAST({ident} AS VARCHAR)"),
            Cast::Date => format!("TRY_CAST({ident} AS DATE)"),
        }
    }

    fn render(&self, mut value: impl FnMut(&Literal) -> String) -> String {
        let col = self.column_expr();
        match self.op {
            Operator::IsNull => format!("{col} IS NULL"),
            Operator::In => {
                let list: Vec<String> = self.values.iter().map(&mut value).collect();
                format!("{col} IN ({})", list.join(", "))
            }
            Operator::Contains => format!("{col} ILIKE {} ESCAPE '\\'", self.first(&mut value)),
            Operator::Eq => format!("{col} = {}", self.first(&mut value)),
            Operator::AtLeast => format!("{col} >= {}", self.first(&mut value)),
            Operator::AtMost => format!("{col} <= {}", self.first(&mut value)),
            Operator::IsDistinctFrom => {
                format!("{col} IS DISTINCT FROM {}", self.first(&mut value))
            }
        }
    }

    fn first(&self, value: &mut impl FnMut(&Literal) -> String) -> String {
        self.values
            .first()
            .map(|v| value(v))
            .unwrap_or_else(|| "NULL".to_string())
    }
}

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// SQL text with `?` placeholders plus the values to bind, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundSql {
    pub sql: String,
    pub params: Vec<Literal>,
}

/// An ordered conjunction of conditions. Empty means "match all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Parameterized rendering of the conjunction (`TRUE` when empty).
    pub fn to_sql(&self) -> BoundSql {
        if self.conditions.is_empty() {
            return BoundSql {
                sql: "TRUE".into(),
                params: Vec::new(),
            };
        }
        let mut params = Vec::new();
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| {
                c.render(|lit| {
                    params.push(lit.clone());
                    lit.placeholder().to_string()
                })
            })
            .collect();
        BoundSql {
            sql: parts.join(" AND "),
            params,
        }
    }

    /// Rendering with escaped inline literals, for statements such as
    /// `COPY` that do not accept bound parameters.
    pub fn to_inline_sql(&self) -> String {
        if self.conditions.is_empty() {
            return "TRUE".into();
        }
        self.conditions
            .iter()
            .map(|c| c.render(Literal::inline))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Compact description for logs and error diagnostics.
    pub fn diagnostics(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

// ---------------------------------------------------------------------------
// Quoting helpers
// ---------------------------------------------------------------------------

/// Quote a column name as a SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string as a SQL string literal.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Build an `ILIKE ... ESCAPE '\'` pattern matching `needle` anywhere.
pub fn contains_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_predicate_matches_everything() {
        let p = Predicate::match_all();
        assert_eq!(p.to_sql().sql, "TRUE");
        assert!(p.to_sql().params.is_empty());
        assert_eq!(p.to_inline_sql(), "TRUE");
    }

    #[test]
    fn renders_placeholders_in_condition_order() {
        let mut p = Predicate::match_all();
        p.push(Condition::new(
            "categoria",
            Cast::Text,
            Operator::In,
            vec![Literal::Text("A".into()), Literal::Text("B".into())],
        ));
        p.push(Condition::new(
            "data",
            Cast::Date,
            Operator::AtLeast,
            vec![Literal::Date(date(2024, 1, 1))],
        ));
        let bound = p.to_sql();
        assert_eq!(
            bound.sql,
            "CAST(\"categoria\" AS VARCHAR) IN (?, ?) AND TRY_CAST(\"data\" AS DATE) >= CAST(? AS DATE)"
        );
        assert_eq!(
            bound.params,
            vec![
                Literal::Text("A".into()),
                Literal::Text("B".into()),
                Literal::Date(date(2024, 1, 1)),
            ]
        );
    }

    #[test]
    fn hostile_text_never_reaches_sql() {
        let mut p = Predicate::match_all();
        p.push(Condition::new(
            "nome",
            Cast::None,
            Operator::Eq,
            vec![Literal::Text("x'; DROP TABLE t; --".into())],
        ));
        assert_eq!(p.to_sql().sql, "\"nome\" = ?");
        assert_eq!(p.to_inline_sql(), "\"nome\" = 'x''; DROP TABLE t; --'");
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }

    #[test]
    fn inline_dates_use_typed_literals() {
        let mut p = Predicate::match_all();
        p.push(Condition::new(
            "d",
            Cast::Date,
            Operator::AtMost,
            vec![Literal::Date(date(2023, 12, 31))],
        ));
        assert_eq!(p.to_inline_sql(), "TRY_CAST(\"d\" AS DATE) <= DATE '2023-12-31'");
    }
}

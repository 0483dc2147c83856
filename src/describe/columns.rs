//! Column extraction and sorting for list projections.
//!
//! Columns are an ordered config; each carries a template evaluated per
//! row against the row's full context, never at config-load time. The
//! sort pipeline runs after extraction and compares numerically when both
//! cells parse as numbers.

use serde_json::Value as Json;

use crate::core::AtmosError;
use crate::template::{TemplateContext, TemplateEngine};

/// One column declaration.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Header text.
    pub name: String,
    /// Template producing the cell (`{{ vars.stage }}`).
    pub template: String,
}

impl ColumnSpec {
    /// Parse a `--columns NAME=TEMPLATE` entry; a bare `NAME` is shorthand
    /// for `{{ NAME }}`.
    pub fn parse(expr: &str) -> Self {
        match expr.split_once('=') {
            Some((name, template)) => {
                Self { name: name.trim().to_string(), template: template.trim().to_string() }
            }
            None => {
                let name = expr.trim().to_string();
                Self { template: format!("{{{{ {name} }}}}"), name }
            }
        }
    }
}

/// One sort key.
#[derive(Debug, Clone)]
pub struct SortSpec {
    /// Column name to sort by.
    pub column: String,
    /// Descending order.
    pub descending: bool,
}

impl SortSpec {
    /// Parse a `--sort NAME` / `--sort NAME:desc` entry.
    pub fn parse(expr: &str) -> Self {
        match expr.split_once(':') {
            Some((name, order)) => Self {
                column: name.trim().to_string(),
                descending: order.trim().eq_ignore_ascii_case("desc"),
            },
            None => Self { column: expr.trim().to_string(), descending: false },
        }
    }
}

/// Extract cells for one row.
pub fn extract_row(
    engine: &TemplateEngine,
    columns: &[ColumnSpec],
    row: &Json,
) -> Result<Vec<String>, AtmosError> {
    let mut ctx = TemplateContext::new();
    if let Some(map) = row.as_object() {
        for (key, value) in map {
            ctx.insert(key, value);
        }
    }
    columns
        .iter()
        .map(|col| engine.render_if_template(&format!("columns.{}", col.name), &col.template, &ctx))
        .collect()
}

/// Sort extracted rows by the pipeline, type-aware per column.
pub fn sort_rows(
    headers: &[String],
    rows: &mut [(Vec<String>, usize)],
    sorts: &[SortSpec],
) {
    rows.sort_by(|(a, _), (b, _)| {
        for sort in sorts {
            let Some(idx) = headers.iter().position(|h| h == &sort.column) else { continue };
            let (left, right) = (a.get(idx), b.get(idx));
            let ordering = compare_cells(
                left.map(String::as_str).unwrap_or(""),
                right.map(String::as_str).unwrap_or(""),
            );
            let ordering = if sort.descending { ordering.reverse() } else { ordering };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Numeric comparison when both sides parse; lexicographic otherwise.
fn compare_cells(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_column_is_template_shorthand() {
        let col = ColumnSpec::parse("name");
        assert_eq!(col.template, "{{ name }}");
        let col = ColumnSpec::parse("Stage={{ vars.stage }}");
        assert_eq!(col.name, "Stage");
        assert_eq!(col.template, "{{ vars.stage }}");
    }

    #[test]
    fn templates_evaluate_per_row() {
        let engine = TemplateEngine::new();
        let columns =
            vec![ColumnSpec::parse("name"), ColumnSpec::parse("Stage={{ vars.stage }}")];
        let row = serde_json::json!({"name": "vpc", "vars": {"stage": "dev"}});
        let cells = extract_row(&engine, &columns, &row).unwrap();
        assert_eq!(cells, ["vpc", "dev"]);

        let other = serde_json::json!({"name": "eks", "vars": {"stage": "prod"}});
        let cells = extract_row(&engine, &columns, &other).unwrap();
        assert_eq!(cells, ["eks", "prod"]);
    }

    #[test]
    fn numeric_sort_is_type_aware() {
        let headers = vec!["name".to_string(), "count".to_string()];
        let mut rows = vec![
            (vec!["a".to_string(), "10".to_string()], 0),
            (vec!["b".to_string(), "9".to_string()], 1),
            (vec!["c".to_string(), "100".to_string()], 2),
        ];
        sort_rows(&headers, &mut rows, &[SortSpec::parse("count")]);
        let order: Vec<&str> = rows.iter().map(|(r, _)| r[1].as_str()).collect();
        assert_eq!(order, ["9", "10", "100"]);
    }

    #[test]
    fn descending_sort_reverses() {
        let headers = vec!["name".to_string()];
        let mut rows = vec![
            (vec!["alpha".to_string()], 0),
            (vec!["zulu".to_string()], 1),
        ];
        sort_rows(&headers, &mut rows, &[SortSpec::parse("name:desc")]);
        assert_eq!(rows[0].0[0], "zulu");
    }
}

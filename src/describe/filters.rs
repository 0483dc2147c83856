//! Chainable row filters for list projections.
//!
//! Filters apply before column extraction, against each row's full JSON
//! context. The pipeline is a conjunction: a row survives only if every
//! filter accepts it.

use glob::Pattern;
use serde_json::Value as Json;

use crate::core::AtmosError;

/// One filter in the pipeline.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Glob over the row's `name` field.
    NameGlob(Pattern),
    /// Equality on a dotted path (`vars.stage=prod`).
    ValueEquals {
        /// Dotted path into the row context.
        path: String,
        /// Expected rendering of the value.
        expected: String,
    },
    /// Inequality on a dotted path (`vars.stage!=prod`).
    ValueDiffers {
        /// Dotted path into the row context.
        path: String,
        /// Rejected rendering of the value.
        rejected: String,
    },
    /// A boolean field that must be truthy (`settings.enabled`).
    Truthy {
        /// Dotted path into the row context.
        path: String,
    },
}

impl Filter {
    /// Parse one `--filter` expression.
    ///
    /// Grammar: `name-glob:PATTERN`, `PATH!=VALUE`, `PATH=VALUE`, or a
    /// bare `PATH` (truthy check).
    pub fn parse(expr: &str) -> Result<Self, AtmosError> {
        if let Some(pattern) = expr.strip_prefix("name-glob:") {
            let pattern = Pattern::new(pattern).map_err(|e| AtmosError::InvalidConfiguration {
                message: format!("bad glob in filter '{expr}': {e}"),
            })?;
            return Ok(Self::NameGlob(pattern));
        }
        if let Some((path, value)) = expr.split_once("!=") {
            return Ok(Self::ValueDiffers {
                path: path.trim().to_string(),
                rejected: value.trim().to_string(),
            });
        }
        if let Some((path, value)) = expr.split_once('=') {
            return Ok(Self::ValueEquals {
                path: path.trim().to_string(),
                expected: value.trim().to_string(),
            });
        }
        Ok(Self::Truthy { path: expr.trim().to_string() })
    }

    /// Whether `row` passes this filter.
    pub fn accepts(&self, row: &Json) -> bool {
        match self {
            Self::NameGlob(pattern) => row
                .get("name")
                .and_then(Json::as_str)
                .is_some_and(|name| pattern.matches(name)),
            Self::ValueEquals { path, expected } => {
                lookup(row, path).is_some_and(|v| render(v) == *expected)
            }
            Self::ValueDiffers { path, rejected } => {
                lookup(row, path).is_none_or(|v| render(v) != *rejected)
            }
            Self::Truthy { path } => lookup(row, path).is_some_and(is_truthy),
        }
    }
}

/// Apply a pipeline; rows must pass every filter.
pub fn apply_filters<'a>(rows: impl Iterator<Item = &'a Json>, filters: &[Filter]) -> Vec<&'a Json> {
    rows.filter(|row| filters.iter().all(|f| f.accepts(row))).collect()
}

/// Parse a repeated `--filter` flag into a pipeline.
pub fn parse_filters(exprs: &[String]) -> Result<Vec<Filter>, AtmosError> {
    exprs.iter().map(|e| Filter::parse(e)).collect()
}

fn lookup<'a>(row: &'a Json, path: &str) -> Option<&'a Json> {
    let mut node = row;
    for segment in path.split('.') {
        node = match node {
            Json::Object(map) => map.get(segment)?,
            Json::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

fn render(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Json) -> bool {
    match value {
        Json::Bool(b) => *b,
        Json::Null => false,
        Json::String(s) => !s.is_empty() && s != "false",
        Json::Number(n) => n.as_f64() != Some(0.0),
        Json::Array(a) => !a.is_empty(),
        Json::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Json> {
        vec![
            serde_json::json!({"name": "vpc", "vars": {"stage": "dev"}, "settings": {"enabled": true}}),
            serde_json::json!({"name": "vpc-flow-logs", "vars": {"stage": "prod"}, "settings": {"enabled": false}}),
            serde_json::json!({"name": "eks", "vars": {"stage": "prod"}, "settings": {}}),
        ]
    }

    #[test]
    fn name_glob_filters_by_pattern() {
        let rows = rows();
        let filters = vec![Filter::parse("name-glob:vpc*").unwrap()];
        let kept = apply_filters(rows.iter(), &filters);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn value_equality_and_inequality() {
        let rows = rows();
        let eq = vec![Filter::parse("vars.stage=prod").unwrap()];
        assert_eq!(apply_filters(rows.iter(), &eq).len(), 2);

        let ne = vec![Filter::parse("vars.stage!=prod").unwrap()];
        assert_eq!(apply_filters(rows.iter(), &ne).len(), 1);
    }

    #[test]
    fn truthy_checks_boolean_fields() {
        let rows = rows();
        let filters = vec![Filter::parse("settings.enabled").unwrap()];
        let kept = apply_filters(rows.iter(), &filters);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["name"], "vpc");
    }

    #[test]
    fn filters_chain_conjunctively() {
        let rows = rows();
        let filters =
            parse_filters(&["name-glob:*".to_string(), "vars.stage=prod".to_string()]).unwrap();
        assert_eq!(apply_filters(rows.iter(), &filters).len(), 2);
    }

    #[test]
    fn missing_path_fails_equality_but_passes_inequality() {
        let rows = rows();
        let eq = vec![Filter::parse("vars.missing=x").unwrap()];
        assert!(apply_filters(rows.iter(), &eq).is_empty());
        let ne = vec![Filter::parse("vars.missing!=x").unwrap()];
        assert_eq!(apply_filters(rows.iter(), &ne).len(), 3);
    }
}

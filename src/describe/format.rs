//! Output formats for describe/list projections.
//!
//! Structured formats (`json`, `yaml`, `csv`, `tsv`) write to stdout so
//! they pipe cleanly; the human-readable `table` goes to stderr with
//! TTY-aware styling. Rows are plain string matrices by the time they
//! reach a writer; extraction and sorting happen upstream.

use anyhow::Result;
use colored::Colorize;
use serde_json::Value as Json;
use std::io::{IsTerminal, Write};
use std::str::FromStr;

use crate::core::AtmosError;

/// Supported projection formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned columns for humans (stderr).
    #[default]
    Table,
    /// Pretty JSON (stdout).
    Json,
    /// YAML (stdout).
    Yaml,
    /// Comma-separated (stdout).
    Csv,
    /// Tab-separated (stdout).
    Tsv,
}

impl OutputFormat {
    /// Whether this format targets stdout.
    pub fn is_structured(self) -> bool {
        !matches!(self, Self::Table)
    }
}

impl FromStr for OutputFormat {
    type Err = AtmosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            other => Err(AtmosError::InvalidConfiguration {
                message: format!(
                    "unknown format '{other}' (expected table, json, yaml, csv, or tsv)"
                ),
            }),
        }
    }
}

/// Visual treatment for one row, decided by a styling hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowStyle {
    /// Normal rendering.
    #[default]
    Plain,
    /// Dimmed (e.g. a disabled component).
    Muted,
}

/// A row matrix ready for rendering.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    /// Column headers, in display order.
    pub headers: Vec<String>,
    /// Row cells, one `Vec<String>` per row.
    pub rows: Vec<Vec<String>>,
    /// Per-row styling, parallel to `rows`.
    pub styles: Vec<RowStyle>,
}

impl RowSet {
    /// A row set with headers only.
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers, rows: Vec::new(), styles: Vec::new() }
    }

    /// Append a row with the default style.
    pub fn push(&mut self, row: Vec<String>) {
        self.push_styled(row, RowStyle::Plain);
    }

    /// Append a styled row.
    pub fn push_styled(&mut self, row: Vec<String>, style: RowStyle) {
        self.rows.push(row);
        self.styles.push(style);
    }
}

/// Emit a structured value (describe output).
pub fn emit_value(format: OutputFormat, value: &Json) -> Result<()> {
    match format {
        OutputFormat::Json | OutputFormat::Table => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
        OutputFormat::Csv | OutputFormat::Tsv => {
            return Err(AtmosError::InvalidConfiguration {
                message: "csv/tsv apply to list output, not describe documents".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Emit a row set (list output).
pub fn emit_rows(format: OutputFormat, rows: &RowSet) -> Result<()> {
    match format {
        OutputFormat::Table => emit_table(rows),
        OutputFormat::Json => {
            let objects: Vec<Json> = rows
                .rows
                .iter()
                .map(|row| {
                    Json::Object(
                        rows.headers
                            .iter()
                            .zip(row)
                            .map(|(h, c)| (h.clone(), Json::String(c.clone())))
                            .collect(),
                    )
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects)?);
            Ok(())
        }
        OutputFormat::Yaml => {
            let objects: Vec<Json> = rows
                .rows
                .iter()
                .map(|row| {
                    Json::Object(
                        rows.headers
                            .iter()
                            .zip(row)
                            .map(|(h, c)| (h.clone(), Json::String(c.clone())))
                            .collect(),
                    )
                })
                .collect();
            print!("{}", serde_yaml::to_string(&objects)?);
            Ok(())
        }
        OutputFormat::Csv => emit_separated(rows, ','),
        OutputFormat::Tsv => emit_separated(rows, '\t'),
    }
}

fn emit_separated(rows: &RowSet, sep: char) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", join_escaped(&rows.headers, sep))?;
    for row in &rows.rows {
        writeln!(out, "{}", join_escaped(row, sep))?;
    }
    Ok(())
}

/// Quote cells containing the separator, quotes, or newlines.
fn join_escaped(cells: &[String], sep: char) -> String {
    cells
        .iter()
        .map(|cell| {
            if cell.contains(sep) || cell.contains('"') || cell.contains('\n') {
                format!("\"{}\"", cell.replace('"', "\"\""))
            } else {
                cell.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(&sep.to_string())
}

/// Aligned table on stderr, styled only when attached to a terminal.
fn emit_table(rows: &RowSet) -> Result<()> {
    let tty = std::io::stderr().is_terminal();
    let mut widths: Vec<usize> = rows.headers.iter().map(String::len).collect();
    for row in &rows.rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let stderr = std::io::stderr();
    let mut out = stderr.lock();

    let header_line = rows
        .headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<width$}", h, width = widths[i]))
        .collect::<Vec<_>>()
        .join("  ");
    if tty {
        writeln!(out, "{}", header_line.bold())?;
    } else {
        writeln!(out, "{header_line}")?;
    }

    for (row, style) in rows.rows.iter().zip(&rows.styles) {
        let line = row
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<width$}", c, width = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ");
        match style {
            RowStyle::Muted if tty => writeln!(out, "{}", line.dimmed())?,
            _ => writeln!(out, "{line}")?,
        }
    }
    Ok(())
}

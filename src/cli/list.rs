//! `atmos list` subcommands.
//!
//! Each listing composes the same pipeline: build row contexts, apply the
//! filter chain, extract columns (templates evaluated per row), sort, and
//! hand the matrix to a format writer.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::Value as Json;

use crate::describe::columns::{ColumnSpec, SortSpec, extract_row, sort_rows};
use crate::describe::filters::{apply_filters, parse_filters};
use crate::describe::format::{OutputFormat, RowSet, RowStyle, emit_rows};
use crate::template::EvalOptions;

use super::common::{GlobalArgs, Invocation};

/// List stacks, components, workflows, and configuration slices.
#[derive(Debug, Subcommand)]
pub enum ListCommand {
    /// All indexed stacks.
    Stacks(ListArgs),
    /// Components across stacks.
    Components(ListComponentsArgs),
    /// Declared workflows.
    Workflows(ListWorkflowsArgs),
    /// Section leaves for one component across stacks.
    Values(ListValuesArgs),
    /// Component metadata across stacks.
    Metadata(ListComponentsArgs),
    /// Component settings across stacks.
    Settings(ListComponentsArgs),
    /// Vendored component declarations.
    Vendor(ListArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Filter expressions (repeatable): `name-glob:PAT`, `PATH=V`,
    /// `PATH!=V`, or a truthy `PATH`.
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Column specs (repeatable): `NAME` or `NAME=TEMPLATE`.
    #[arg(long = "columns")]
    pub columns: Vec<String>,

    /// Sort keys (repeatable): `NAME` or `NAME:desc`.
    #[arg(long = "sort")]
    pub sort: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ListComponentsArgs {
    /// Restrict to one stack.
    #[arg(short, long)]
    pub stack: Option<String>,

    #[command(flatten)]
    pub list: ListArgs,
}

#[derive(Debug, Args)]
pub struct ListWorkflowsArgs {
    /// Workflow manifest file under the workflows directory.
    #[arg(short, long)]
    pub file: Option<String>,

    #[command(flatten)]
    pub list: ListArgs,
}

#[derive(Debug, Args)]
pub struct ListValuesArgs {
    /// Component name.
    pub component: String,

    /// Section to project (`vars`, `settings`, `env`).
    #[arg(long, default_value = "vars")]
    pub section: String,

    #[command(flatten)]
    pub list: ListArgs,
}

impl ListCommand {
    /// Execute the subcommand.
    pub async fn run(self, globals: &GlobalArgs) -> Result<()> {
        // Listings never actuate tagged functions.
        let options = EvalOptions { process_functions: false, ..EvalOptions::default() };

        match self {
            Self::Stacks(args) => {
                let invocation = Invocation::prepare(globals, options).await?;
                let rows = crate::describe::list_stacks(&invocation.resolver).await?;
                render(&args, rows, &["name", "file", "imports", "components"])
            }
            Self::Components(args) => {
                let invocation = Invocation::prepare(globals, options).await?;
                let rows =
                    crate::describe::list_components(&invocation.resolver, args.stack.as_deref())
                        .await?;
                render(&args.list, rows, &["name", "type", "stack", "enabled"])
            }
            Self::Metadata(args) => {
                let invocation = Invocation::prepare(globals, options).await?;
                let rows =
                    crate::describe::list_components(&invocation.resolver, args.stack.as_deref())
                        .await?;
                render(&args.list, rows, &["name", "stack", "abstract", "metadata"])
            }
            Self::Settings(args) => {
                let invocation = Invocation::prepare(globals, options).await?;
                let rows =
                    crate::describe::list_components(&invocation.resolver, args.stack.as_deref())
                        .await?;
                render(&args.list, rows, &["name", "stack", "settings"])
            }
            Self::Values(args) => {
                let invocation = Invocation::prepare(globals, options).await?;
                let rows = crate::describe::list_values(
                    &invocation.resolver,
                    &args.component,
                    &args.section,
                )
                .await?;
                render(&args.list, rows, &["stack", "key", "value"])
            }
            Self::Workflows(args) => {
                let invocation = Invocation::prepare(globals, options).await?;
                let manifest = crate::workflow::load_workflow_manifest(
                    &invocation.config,
                    args.file.as_deref(),
                )?;
                let rows = crate::describe::list_workflows(&manifest);
                render(&args.list, rows, &["name", "description", "steps"])
            }
            Self::Vendor(args) => {
                let invocation = Invocation::prepare(globals, options).await?;
                let rows = vendor_rows(&invocation)?;
                render(&args, rows, &["component", "source", "version"])
            }
        }
    }
}

/// The shared filter → columns → sort → emit pipeline.
fn render(args: &ListArgs, rows: Vec<Json>, default_columns: &[&str]) -> Result<()> {
    let engine = crate::template::TemplateEngine::new();
    let filters = parse_filters(&args.filters)?;
    let kept = apply_filters(rows.iter(), &filters);

    let columns: Vec<ColumnSpec> = if args.columns.is_empty() {
        default_columns.iter().map(|c| ColumnSpec::parse(c)).collect()
    } else {
        args.columns.iter().map(|c| ColumnSpec::parse(c)).collect()
    };
    let headers: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let mut extracted: Vec<(Vec<String>, usize)> = kept
        .iter()
        .enumerate()
        .map(|(i, row)| Ok((extract_row(&engine, &columns, row)?, i)))
        .collect::<Result<_>>()?;

    let sorts: Vec<SortSpec> = args.sort.iter().map(|s| SortSpec::parse(s)).collect();
    if !sorts.is_empty() {
        sort_rows(&headers, &mut extracted, &sorts);
    }

    let mut set = RowSet::new(headers);
    for (cells, original) in extracted {
        let muted = kept[original]
            .get("enabled")
            .and_then(Json::as_bool)
            .is_some_and(|enabled| !enabled);
        set.push_styled(cells, if muted { RowStyle::Muted } else { RowStyle::Plain });
    }
    emit_rows(args.format.parse::<OutputFormat>()?, &set)
}

/// Rows from a `vendor.yaml` at the repository root, when present.
fn vendor_rows(invocation: &Invocation) -> Result<Vec<Json>> {
    let path = invocation.config.base_path.join("vendor.yaml");
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let source = std::fs::read_to_string(&path)?;
    let doc: Json = crate::merge::value::yaml_to_json(&serde_yaml::from_str(&source)?);
    let imports = doc
        .get("spec")
        .and_then(|s| s.get("sources"))
        .or_else(|| doc.get("imports"))
        .and_then(Json::as_array)
        .cloned()
        .unwrap_or_default();
    Ok(imports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_columns_apply_when_none_given() {
        let args = ListArgs {
            format: "json".into(),
            filters: vec![],
            columns: vec![],
            sort: vec![],
        };
        let rows = vec![serde_json::json!({"name": "dev", "file": "dev", "imports": 0, "components": 2})];
        render(&args, rows, &["name", "file"]).unwrap();
    }
}

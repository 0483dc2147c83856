//! Declared tool dependencies and version constraints.
//!
//! Custom commands and workflows may declare `dependencies.tools` as a map
//! of tool name → semver constraint. Before execution, each tool is
//! located on PATH and its reported version checked against the
//! constraint. A missing or out-of-constraint tool is offered to the
//! registered installer; without one, the check fails with
//! `ConstraintConflict`. The installer itself (registry download,
//! checksum, unpack) is an external collaborator.

use anyhow::Result;
use futures::future::BoxFuture;
use semver::{Version, VersionReq};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ToolchainConfig;
use crate::core::AtmosError;
use crate::utils::ProcessCommand;

/// Installs a tool version from a registry. External collaborator.
pub trait ToolInstaller: Send + Sync {
    /// Install a version of `tool` satisfying `constraint`.
    fn install<'a>(
        &'a self,
        tool: &'a str,
        constraint: &'a str,
        toolchain: &'a ToolchainConfig,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Default installer: nothing is installed, conflicts surface.
pub struct NoInstaller;

impl ToolInstaller for NoInstaller {
    fn install<'a>(
        &'a self,
        tool: &'a str,
        constraint: &'a str,
        _toolchain: &'a ToolchainConfig,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Err(AtmosError::ConstraintConflict {
                tool: tool.to_string(),
                constraint: constraint.to_string(),
                found: None,
            }
            .into())
        })
    }
}

/// Verify every declared tool, installing through `installer` on miss.
pub async fn check_tools(
    tools: &BTreeMap<String, String>,
    toolchain: &ToolchainConfig,
    installer: &dyn ToolInstaller,
) -> Result<()> {
    for (tool, constraint) in tools {
        let requirement =
            VersionReq::parse(constraint).map_err(|e| AtmosError::ConstraintConflict {
                tool: tool.clone(),
                constraint: format!("{constraint} (unparseable: {e})"),
                found: None,
            })?;

        match installed_version(tool).await {
            Some(version) if requirement.matches(&version) => {
                debug!(tool, %version, constraint, "tool constraint satisfied");
            }
            Some(version) => {
                debug!(tool, %version, constraint, "tool out of constraint");
                installer.install(tool, constraint, toolchain).await.map_err(|_| {
                    AtmosError::ConstraintConflict {
                        tool: tool.clone(),
                        constraint: constraint.clone(),
                        found: Some(version.to_string()),
                    }
                })?;
            }
            None => {
                installer.install(tool, constraint, toolchain).await.map_err(|_| {
                    AtmosError::ConstraintConflict {
                        tool: tool.clone(),
                        constraint: constraint.clone(),
                        found: None,
                    }
                })?;
            }
        }
    }
    Ok(())
}

/// Locate `tool` and parse its `--version` output.
async fn installed_version(tool: &str) -> Option<Version> {
    which::which(tool).ok()?;
    let output = ProcessCommand::new(tool).arg("--version").execute().await.ok()?;
    parse_version_output(&output.stdout)
}

/// Pull the first semver-looking token out of version output.
///
/// Handles `terraform v1.9.0`, `Terraform v1.5.7 on linux_amd64`, and
/// plain `1.2.3` forms.
pub fn parse_version_output(output: &str) -> Option<Version> {
    for token in output.split_whitespace() {
        let cleaned = token.trim_start_matches('v').trim_end_matches(',');
        if let Ok(version) = Version::parse(cleaned) {
            return Some(version);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing_handles_common_shapes() {
        assert_eq!(
            parse_version_output("Terraform v1.5.7\non linux_amd64"),
            Some(Version::new(1, 5, 7))
        );
        assert_eq!(parse_version_output("tofu 1.9.0"), Some(Version::new(1, 9, 0)));
        assert_eq!(parse_version_output("no version here"), None);
    }

    #[tokio::test]
    async fn missing_tool_without_installer_is_a_conflict() {
        let mut tools = BTreeMap::new();
        tools.insert("definitely-not-a-real-tool-xyz".to_string(), ">=1.0".to_string());
        let err = check_tools(&tools, &ToolchainConfig::default(), &NoInstaller)
            .await
            .unwrap_err();
        match err.downcast::<AtmosError>().unwrap() {
            AtmosError::ConstraintConflict { found, .. } => assert_eq!(found, None),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn present_tool_satisfying_constraint_passes() {
        // `sh` has no --version on every platform; use a tool guaranteed
        // in the test environment instead: git.
        if which::which("git").is_err() {
            return;
        }
        let mut tools = BTreeMap::new();
        tools.insert("git".to_string(), ">=1.0".to_string());
        check_tools(&tools, &ToolchainConfig::default(), &NoInstaller).await.unwrap();
    }

    #[tokio::test]
    async fn unparseable_constraint_is_a_conflict() {
        let mut tools = BTreeMap::new();
        tools.insert("git".to_string(), "not-a-range".to_string());
        assert!(check_tools(&tools, &ToolchainConfig::default(), &NoInstaller).await.is_err());
    }
}

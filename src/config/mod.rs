//! Root configuration (`atmos.yaml`).
//!
//! Discovery order: `--config` flag, `ATMOS_CLI_CONFIG_PATH`, `./atmos.yaml`,
//! then `~/.atmos/atmos.yaml`. A missing file yields built-in defaults; a
//! malformed file is fatal. A handful of environment variables override
//! individual settings after the file loads.

pub mod load;

pub use load::{discover_config, load_config};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::auth::IdentityConfig;
use crate::core::{AtmosError, ComponentType};
use crate::merge::{ListMergePolicy, ListStrategy};
use crate::store::StoreConfig;
use crate::utils::paths::absolutize;

/// The fully-loaded root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosConfig {
    /// Repository root all relative paths resolve against. Set during
    /// load, not read from the file.
    #[serde(skip)]
    pub base_path: PathBuf,
    /// Path of the loaded config file; empty for built-in defaults.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Stack discovery and naming.
    pub stacks: StacksConfig,
    /// Component source roots per tool family.
    pub components: ComponentsConfig,
    /// Identity and provider declarations plus namespace override.
    pub auth: AuthConfig,
    /// Named stores for `!store` functions.
    pub stores: BTreeMap<String, StoreConfig>,
    /// Engine-level settings.
    pub settings: SettingsConfig,
    /// Tool name → owner/repo mappings and registry list.
    pub toolchain: ToolchainConfig,
    /// CI output formatting.
    pub ci: CiConfig,
    /// Custom commands.
    pub commands: Vec<crate::workflow::CommandConfig>,
    /// Workflow manifest location.
    pub workflows: WorkflowsConfig,
}

/// `stacks.*` options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StacksConfig {
    /// Root directory for stack manifests.
    pub base_path: String,
    /// Globs selecting stack manifests under the base path.
    pub included_paths: Vec<String>,
    /// Globs excluded from discovery.
    pub excluded_paths: Vec<String>,
    /// Token-based derivation of the logical stack name,
    /// e.g. `{tenant}-{environment}-{stage}`.
    pub name_pattern: Option<String>,
    /// Template alternative to `name_pattern`; wins when both are set.
    pub name_template: Option<String>,
}

impl Default for StacksConfig {
    fn default() -> Self {
        Self {
            base_path: "stacks".to_string(),
            included_paths: vec!["**/*.yaml".to_string(), "**/*.yml".to_string()],
            excluded_paths: vec!["**/_defaults.yaml".to_string()],
            name_pattern: None,
            name_template: None,
        }
    }
}

/// `components.<type>.*` options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentsConfig {
    /// Terraform component root.
    pub terraform: ComponentTypeConfig,
    /// Helmfile component root plus EKS options.
    pub helmfile: HelmfileConfig,
    /// Packer component root.
    pub packer: ComponentTypeConfig,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            terraform: ComponentTypeConfig { base_path: "components/terraform".to_string() },
            helmfile: HelmfileConfig {
                base_path: "components/helmfile".to_string(),
                use_eks: false,
                cluster_name_template: None,
                cluster_name_pattern: None,
            },
            packer: ComponentTypeConfig { base_path: "components/packer".to_string() },
        }
    }
}

/// Base path for one component family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentTypeConfig {
    /// Source root for this family.
    pub base_path: String,
}

impl Default for ComponentTypeConfig {
    fn default() -> Self {
        Self { base_path: String::new() }
    }
}

/// Helmfile options; EKS kubeconfig update is opt-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HelmfileConfig {
    /// Source root for helmfile components.
    pub base_path: String,
    /// Update kubeconfig against EKS before dispatch.
    pub use_eks: bool,
    /// Preferred template for cluster-name derivation.
    pub cluster_name_template: Option<String>,
    /// Deprecated tokenized form; honored with a warning.
    pub cluster_name_pattern: Option<String>,
}

/// `auth.*` options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Credential-directory namespace override.
    pub namespace: Option<String>,
    /// Identity declarations, opaque to the core.
    pub identities: BTreeMap<String, IdentityConfig>,
    /// Provider declarations, opaque to the core.
    pub providers: BTreeMap<String, serde_yaml::Value>,
}

/// Engine-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Per-path list merge strategies (path → replace|append|merge).
    pub list_merge_strategy: BTreeMap<String, String>,
}

/// `toolchain.*` options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Tool name → `owner/repo` mappings.
    pub aliases: BTreeMap<String, String>,
    /// Registry base URLs consulted for tool installs.
    pub registries: Vec<String>,
}

/// `ci.*` options (template layer is an external collaborator).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CiConfig {
    /// Emit CI summaries.
    pub enabled: bool,
    /// Named templates, passed through to the CI formatter.
    pub templates: BTreeMap<String, String>,
}

/// `workflows.*` options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    /// Directory of workflow manifests.
    pub base_path: String,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self { base_path: "stacks/workflows".to_string() }
    }
}

impl AtmosConfig {
    /// Absolute stacks root.
    pub fn stacks_dir(&self) -> PathBuf {
        absolutize(&self.base_path, &self.stacks.base_path)
    }

    /// Absolute component root for a family.
    pub fn components_dir(&self, ty: ComponentType) -> PathBuf {
        let raw = match ty {
            ComponentType::Terraform => &self.components.terraform.base_path,
            ComponentType::Helmfile => &self.components.helmfile.base_path,
            ComponentType::Packer => &self.components.packer.base_path,
        };
        absolutize(&self.base_path, raw)
    }

    /// Absolute workflows root.
    pub fn workflows_dir(&self) -> PathBuf {
        absolutize(&self.base_path, &self.workflows.base_path)
    }

    /// The list-merge policy declared under settings.
    pub fn list_merge_policy(&self) -> Result<ListMergePolicy, AtmosError> {
        let mut policy = ListMergePolicy::default();
        for (path, name) in &self.settings.list_merge_strategy {
            policy.overrides.insert(path.clone(), name.parse::<ListStrategy>()?);
        }
        Ok(policy)
    }

    /// Fatal-on-misconfiguration checks run after load.
    pub fn validate(&self) -> Result<(), AtmosError> {
        if self.stacks.base_path.is_empty() {
            return Err(AtmosError::InvalidConfiguration {
                message: "stacks.base_path must not be empty".to_string(),
            });
        }
        if let Some(pattern) = &self.stacks.name_pattern {
            if !pattern.contains('{') || !pattern.contains('}') {
                return Err(AtmosError::InvalidConfiguration {
                    message: format!(
                        "stacks.name_pattern '{pattern}' contains no {{token}} placeholders"
                    ),
                });
            }
        }
        self.list_merge_policy()?;
        Ok(())
    }

    /// Emit deprecation warnings once per invocation.
    pub fn warn_deprecations(&self) {
        if self.components.helmfile.cluster_name_pattern.is_some() {
            tracing::warn!(
                "components.helmfile.cluster_name_pattern is deprecated; use cluster_name_template"
            );
        }
        if self.stacks.name_pattern.is_some() && self.stacks.name_template.is_some() {
            tracing::warn!("stacks.name_pattern is ignored because name_template is set");
        }
    }
}

/// Parse a config document rooted at `base_path`.
pub fn parse_config(source: &str, path: &Path, base_path: &Path) -> Result<AtmosConfig, AtmosError> {
    let mut config: AtmosConfig =
        serde_yaml::from_str(source).map_err(|e| AtmosError::InvalidManifest {
            file: path.to_path_buf(),
            path: e.location().map(|l| format!("line {}", l.line())),
            message: e.to_string(),
        })?;
    config.base_path = base_path.to_path_buf();
    config.config_path = path.to_path_buf();
    Ok(config)
}

//! Core types shared by every subsystem.
//!
//! Home of the error taxonomy ([`AtmosError`], [`ErrorKind`],
//! [`ErrorContext`]) and the component-type enumeration. Everything here is
//! invocation-scoped; no state survives process exit.

pub mod error;

pub use error::{AtmosError, ErrorContext, ErrorKind, did_you_mean, user_friendly_error};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The tool families a component can belong to.
///
/// Each family has its own `components.<type>` section in stack manifests
/// and its own base path in the root configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    /// Terraform root modules (also used by OpenTofu via `command` override).
    Terraform,
    /// Helmfile release sets.
    Helmfile,
    /// Packer templates.
    Packer,
}

impl ComponentType {
    /// All component types, in manifest section order.
    pub const ALL: [Self; 3] = [Self::Terraform, Self::Helmfile, Self::Packer];

    /// Manifest section name for this type.
    pub const fn section(self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Helmfile => "helmfile",
            Self::Packer => "packer",
        }
    }

    /// Default binary dispatched for this type.
    pub const fn default_command(self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Helmfile => "helmfile",
            Self::Packer => "packer",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

impl FromStr for ComponentType {
    type Err = AtmosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terraform" => Ok(Self::Terraform),
            "helmfile" => Ok(Self::Helmfile),
            "packer" => Ok(Self::Packer),
            other => Err(AtmosError::Other {
                message: format!(
                    "unknown component type '{other}' (expected terraform, helmfile, or packer)"
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_type_round_trips_section_names() {
        for ty in ComponentType::ALL {
            assert_eq!(ty.section().parse::<ComponentType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_component_type_is_rejected() {
        assert!("ansible".parse::<ComponentType>().is_err());
    }
}

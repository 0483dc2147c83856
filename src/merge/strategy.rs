//! List merge strategies.
//!
//! Deep merge recurses through mappings unconditionally; what happens at a
//! list is a named policy, declared per list key or defaulted globally.
//! The policy is never inferred from value shapes: renaming a key must not
//! silently change how its list merges.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::core::AtmosError;

/// How two lists at the same path combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStrategy {
    /// Higher precedence replaces the list wholesale. The global default.
    #[default]
    Replace,
    /// Lower precedence entries first, higher appended after.
    Append,
    /// Element-wise: mappings at the same index deep-merge, scalars take
    /// the higher-precedence side, excess entries carry over.
    Merge,
}

impl FromStr for ListStrategy {
    type Err = AtmosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            "merge" => Ok(Self::Merge),
            other => Err(AtmosError::InvalidConfiguration {
                message: format!(
                    "unknown list merge strategy '{other}' (expected replace, append, or merge)"
                ),
            }),
        }
    }
}

/// Per-path list strategy overrides over a global default.
///
/// Paths are JSONPaths as recorded by the merge engine
/// (`components.terraform.vpc.vars.subnets`); the longest declared prefix
/// wins so a strategy can cover a subtree.
#[derive(Debug, Clone, Default)]
pub struct ListMergePolicy {
    /// Strategy when no path override applies.
    pub default: ListStrategy,
    /// Path-prefix overrides.
    pub overrides: BTreeMap<String, ListStrategy>,
}

impl ListMergePolicy {
    /// The strategy governing the list at `path`.
    pub fn for_path(&self, path: &str) -> ListStrategy {
        self.overrides
            .iter()
            .filter(|(prefix, _)| path == *prefix || path.starts_with(&format!("{prefix}.")))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(self.default, |(_, s)| *s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_replace() {
        assert_eq!(ListStrategy::default(), ListStrategy::Replace);
        assert_eq!(ListMergePolicy::default().for_path("vars.list"), ListStrategy::Replace);
    }

    #[test]
    fn longest_prefix_wins() {
        let mut policy = ListMergePolicy::default();
        policy.overrides.insert("vars".into(), ListStrategy::Append);
        policy.overrides.insert("vars.subnets".into(), ListStrategy::Merge);

        assert_eq!(policy.for_path("vars.tags"), ListStrategy::Append);
        assert_eq!(policy.for_path("vars.subnets"), ListStrategy::Merge);
        assert_eq!(policy.for_path("settings.x"), ListStrategy::Replace);
    }

    #[test]
    fn prefix_match_respects_segment_boundaries() {
        let mut policy = ListMergePolicy::default();
        policy.overrides.insert("vars.sub".into(), ListStrategy::Append);
        // `vars.subnets` is not under the `vars.sub` segment.
        assert_eq!(policy.for_path("vars.subnets"), ListStrategy::Replace);
    }

    #[test]
    fn parses_strategy_names() {
        assert_eq!("append".parse::<ListStrategy>().unwrap(), ListStrategy::Append);
        assert!("zip".parse::<ListStrategy>().is_err());
    }
}

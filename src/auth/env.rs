//! Derived environment variables for spawned processes.
//!
//! From a populated [`AuthContext`], a deterministic set of env vars is
//! computed and appended to a component's env list without overwriting
//! user-supplied entries. Repeated derivation over the same inputs yields
//! the same sorted list.

use std::collections::BTreeMap;

use super::{AuthContext, ProviderCredentials};

/// Env vars a provider entry contributes to spawned processes.
pub fn provider_env(credentials: &ProviderCredentials) -> Vec<(String, String)> {
    match credentials {
        ProviderCredentials::Aws { credentials_file, config_file, profile, region } => {
            let mut vars = vec![
                ("AWS_SHARED_CREDENTIALS_FILE".to_string(), credentials_file.display().to_string()),
                ("AWS_CONFIG_FILE".to_string(), config_file.display().to_string()),
                ("AWS_PROFILE".to_string(), profile.clone()),
            ];
            if let Some(region) = region {
                vars.push(("AWS_REGION".to_string(), region.clone()));
            }
            vars
        }
        ProviderCredentials::Github { token } => {
            vec![("GITHUB_TOKEN".to_string(), token.clone())]
        }
        ProviderCredentials::Azure { token, subscription_id } => vec![
            ("AZURE_ACCESS_TOKEN".to_string(), token.clone()),
            ("AZURE_SUBSCRIPTION_ID".to_string(), subscription_id.clone()),
        ],
        ProviderCredentials::Gcp { credentials_file, project } => {
            let mut vars = vec![(
                "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
                credentials_file.display().to_string(),
            )];
            if let Some(project) = project {
                vars.push(("GOOGLE_CLOUD_PROJECT".to_string(), project.clone()));
            }
            vars
        }
    }
}

/// Compute the auth-derived env, skipping keys the component already set.
///
/// The result is sorted by key; deriving twice over the same context and
/// declared env is byte-identical.
pub fn derived_env(
    ctx: &AuthContext,
    declared: &BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let mut out = BTreeMap::new();
    for (_, credentials) in ctx.providers() {
        for (key, value) in provider_env(credentials) {
            if !declared.contains_key(&key) {
                out.insert(key, value);
            }
        }
    }
    out.into_iter().collect()
}

/// Assemble the final `KEY=VALUE` list for one spawned tool.
///
/// Order of precedence on key collision: inherited invocation env, then
/// component-declared env, then auth-derived env, later wins. The result
/// is sorted.
pub fn assemble_env_list(
    inherited: &BTreeMap<String, String>,
    declared: &BTreeMap<String, String>,
    ctx: &AuthContext,
) -> Vec<String> {
    let mut merged = inherited.clone();
    merged.extend(declared.iter().map(|(k, v)| (k.clone(), v.clone())));
    for (key, value) in derived_env(ctx, declared) {
        merged.insert(key, value);
    }
    merged.into_iter().map(|(k, v)| format!("{k}={v}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws_ctx() -> AuthContext {
        let mut ctx = AuthContext::new();
        ctx.insert(
            "deploy",
            ProviderCredentials::Aws {
                credentials_file: "/ns/aws/credentials".into(),
                config_file: "/ns/aws/config".into(),
                profile: "deploy".into(),
                region: Some("eu-west-1".into()),
            },
        );
        ctx
    }

    #[test]
    fn aws_entry_yields_the_standard_four() {
        let env = derived_env(&aws_ctx(), &BTreeMap::new());
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            ["AWS_CONFIG_FILE", "AWS_PROFILE", "AWS_REGION", "AWS_SHARED_CREDENTIALS_FILE"]
        );
    }

    #[test]
    fn declared_env_is_never_overwritten() {
        let mut declared = BTreeMap::new();
        declared.insert("AWS_PROFILE".to_string(), "user-pinned".to_string());
        let env = derived_env(&aws_ctx(), &declared);
        assert!(env.iter().all(|(k, _)| k != "AWS_PROFILE"));

        let list = assemble_env_list(&BTreeMap::new(), &declared, &aws_ctx());
        assert!(list.contains(&"AWS_PROFILE=user-pinned".to_string()));
    }

    #[test]
    fn derivation_is_idempotent() {
        let declared = BTreeMap::new();
        let first = assemble_env_list(&BTreeMap::new(), &declared, &aws_ctx());
        let second = assemble_env_list(&BTreeMap::new(), &declared, &aws_ctx());
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted);
    }

    #[test]
    fn empty_context_derives_nothing() {
        assert!(derived_env(&AuthContext::new(), &BTreeMap::new()).is_empty());
    }
}

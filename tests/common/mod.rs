//! Shared fixtures for integration tests.

use std::path::{Path, PathBuf};

use atmos_cli::config::{AtmosConfig, parse_config};
use atmos_cli::stack::StackResolver;
use atmos_cli::template::EvalOptions;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A throwaway repository with an `atmos.yaml`, stack manifests, and
/// component directories.
pub struct TestRepo {
    pub dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let repo = Self { dir: TempDir::new().expect("create temp repo") };
        repo.write(
            "atmos.yaml",
            "stacks:\n  base_path: stacks\ncomponents:\n  terraform:\n    base_path: components/terraform\n",
        );
        repo
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the repo root, creating parents.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    /// Write a stack manifest under `stacks/`.
    pub fn stack(&self, rel: &str, content: &str) -> PathBuf {
        self.write(&format!("stacks/{rel}"), content)
    }

    /// Parse the repo's root config.
    pub fn config(&self) -> AtmosConfig {
        let path = self.root().join("atmos.yaml");
        let source = std::fs::read_to_string(&path).expect("read atmos.yaml");
        parse_config(&source, &path, self.root()).expect("parse atmos.yaml")
    }

    /// Build a resolver over the repo with default options.
    pub async fn resolver(&self) -> StackResolver {
        self.resolver_with(EvalOptions::default()).await
    }

    /// Build a resolver with custom options.
    pub async fn resolver_with(&self, options: EvalOptions) -> StackResolver {
        StackResolver::build(self.config(), options, CancellationToken::new())
            .await
            .expect("build resolver")
    }
}

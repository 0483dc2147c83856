//! Atmos - stack configuration and workflow orchestration
//!
//! Atmos reads a hierarchy of YAML stack manifests, merges them into
//! fully-resolved per-component configurations bound to named stacks, and
//! dispatches those configurations to infrastructure tools (Terraform,
//! Helmfile, Packer, and custom commands) with credentials, environment,
//! and working directories supplied.
//!
//! # Architecture
//!
//! The core is the stack-configuration engine, a pipeline over a tree of
//! manifests:
//!
//! 1. [`import`] - recursive manifest loading with scheme dispatch
//!    (filesystem, fetch adapters, transformation adapters) and cycle
//!    detection
//! 2. [`locals`] - file-scoped variables in three scopes, resolved in
//!    dependency order and never leaking across files
//! 3. [`merge`] - deep merge with named list strategies and provenance
//!    per leaf JSONPath
//! 4. [`template`] - unified template and tagged-function evaluation with
//!    cross-component cycle detection
//! 5. [`auth`] - lazy, per-invocation, multi-provider credential context
//! 6. [`dispatch`] - resolved invocations handed to tool runners
//!
//! Everything is invocation-scoped: manifest cache, merged stacks,
//! resolved values, backend clients, and the auth context all start empty
//! and die with the process.
//!
//! # Example
//!
//! ```bash
//! # Fully-resolved view of one component
//! atmos describe component vpc -s tenant-ue1-dev
//!
//! # Dispatch terraform with resolved vars and env
//! atmos terraform plan vpc -s tenant-ue1-dev -- -target aws_vpc.main
//!
//! # Listings never prompt for credentials on static configs
//! atmos list stacks --format json
//! ```

pub mod auth;
pub mod backend;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod describe;
pub mod dispatch;
pub mod import;
pub mod locals;
pub mod manifest;
pub mod merge;
pub mod stack;
pub mod store;
pub mod template;
pub mod utils;
pub mod workflow;

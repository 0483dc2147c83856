//! Global constants used throughout the Atmos codebase.
//!
//! Timeout durations, retry parameters, and graph limits that are shared
//! across multiple modules live here so the numbers stay discoverable.

use std::time::Duration;

/// Maximum depth of the transitive import graph.
///
/// Generous but finite; a chain deeper than this almost always indicates
/// a mis-declared import rather than a legitimate hierarchy.
pub const MAX_IMPORT_DEPTH: u32 = 64;

/// Default timeout for `!exec` subprocess evaluation (30 seconds).
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of `!exec` attempts. Retries are opt-in per call site.
pub const EXEC_DEFAULT_ATTEMPTS: u32 = 1;

/// Timeout for fetch-based import adapters (60 seconds).
///
/// Prevents a hung remote from blocking import resolution indefinitely.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for remote state backend reads (60 seconds).
pub const BACKEND_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum backoff delay for exponential backoff (500ms).
///
/// Exponential backoff delays are capped at this value to prevent
/// excessive wait times during retry operations.
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms), doubling per attempt.
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Number of retries for fetch adapters on transient network failures.
pub const FETCH_RETRY_ATTEMPTS: usize = 3;

/// Bound on the worker pool used for parallel stack-manifest parsing.
pub const STACK_DISCOVERY_CONCURRENCY: usize = 8;

/// Decompressed-size ceiling for archive imports (256 MiB).
///
/// Archives expanding past this are treated as decompression bombs.
pub const MAX_ARCHIVE_EXTRACT_BYTES: u64 = 256 * 1024 * 1024;

/// Length of the namespace hash derived from the root config path.
pub const NAMESPACE_HASH_LEN: usize = 8;

/// File name of the root configuration.
pub const ROOT_CONFIG_FILE: &str = "atmos.yaml";

/// Environment variable overriding root-config discovery.
pub const CONFIG_PATH_ENV: &str = "ATMOS_CLI_CONFIG_PATH";

/// Environment variable overriding the credential namespace.
pub const AUTH_NAMESPACE_ENV: &str = "ATMOS_AUTH_NAMESPACE";

/// Environment variable overriding `stacks.base_path`.
pub const STACKS_BASE_PATH_ENV: &str = "ATMOS_STACKS_BASE_PATH";

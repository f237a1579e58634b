//! Kernel dispatch configuration
//!
//! Controls when bulk device operations (fill, copy, scatter) fan out across
//! worker threads and how much work each task receives.
//!
//! # Environment
//!
//! - `TRUENO_GAMG_PARALLEL_THRESHOLD`: element/cell count below which kernels run sequentially
//! - `TRUENO_GAMG_MIN_CELLS_PER_TASK`: minimum cells folded by one parallel task

use std::sync::OnceLock;

/// Default element count below which kernels stay on the calling thread
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

/// Default minimum number of interface cells handed to one task
pub const DEFAULT_MIN_CELLS_PER_TASK: usize = 64;

const PARALLEL_THRESHOLD_ENV: &str = "TRUENO_GAMG_PARALLEL_THRESHOLD";
const MIN_CELLS_PER_TASK_ENV: &str = "TRUENO_GAMG_MIN_CELLS_PER_TASK";

static GLOBAL: OnceLock<ExecutionConfig> = OnceLock::new();

/// Dispatch parameters for device kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Problem size at which kernels switch to parallel execution
    pub parallel_threshold: usize,

    /// Lower bound on cells per parallel task (rayon `with_min_len`)
    pub min_cells_per_task: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            min_cells_per_task: DEFAULT_MIN_CELLS_PER_TASK,
        }
    }
}

impl ExecutionConfig {
    /// Build configuration from environment variables, falling back to defaults
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            parallel_threshold: parse_or(
                PARALLEL_THRESHOLD_ENV,
                lookup(PARALLEL_THRESHOLD_ENV),
                defaults.parallel_threshold,
            ),
            min_cells_per_task: parse_or(
                MIN_CELLS_PER_TASK_ENV,
                lookup(MIN_CELLS_PER_TASK_ENV),
                defaults.min_cells_per_task,
            )
            .max(1),
        }
    }

    /// Process-wide configuration, read from the environment on first use
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::from_env)
    }

    /// Check whether a kernel over `len` items should run in parallel
    #[must_use]
    pub const fn use_parallel(&self, len: usize) -> bool {
        len >= self.parallel_threshold
    }
}

fn parse_or(key: &str, value: Option<String>, default: usize) -> usize {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring {key}={raw:?}: not an unsigned integer");
            default
        }),
        None => default,
    }
}

//! Page worker pool configuration.

use serde::{Deserialize, Serialize};

/// Controls how many pages are processed concurrently.
///
/// Each worker owns one page for the duration of its five stages; the pool
/// size should track available model-serving capacity rather than CPU count
/// alone when detection or OCR runs remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelPolicy {
    /// Maximum number of concurrent page workers.
    /// If None, rayon picks its default (typically the number of CPU cores).
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Documents with at most this many pages are processed on the calling thread.
    /// Default: 1
    #[serde(default = "ParallelPolicy::default_sequential_threshold")]
    pub sequential_threshold: usize,
}

impl ParallelPolicy {
    /// Create a new ParallelPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of page workers.
    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the page count at or below which no pool is used.
    pub fn with_sequential_threshold(mut self, threshold: usize) -> Self {
        self.sequential_threshold = threshold;
        self
    }

    /// Builds a dedicated rayon pool for page workers.
    ///
    /// Threads are named `layout-page-{n}` so they are identifiable in traces.
    pub fn build_pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("layout-page-{i}"));
        if let Some(num_threads) = self.max_workers {
            builder = builder.num_threads(num_threads);
        }
        builder.build()
    }

    fn default_sequential_threshold() -> usize {
        1
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_workers: None,
            sequential_threshold: Self::default_sequential_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_pool_respects_max_workers() {
        let pool = ParallelPolicy::new()
            .with_max_workers(Some(3))
            .build_pool()
            .unwrap();
        assert_eq!(pool.current_num_threads(), 3);
    }

    #[test]
    fn test_deserialize_uses_defaults() {
        let policy: ParallelPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ParallelPolicy::default());
    }
}

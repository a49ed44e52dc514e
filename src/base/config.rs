use std::time::Duration;

/// Configuration for the intent resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Upper bound on any single network-facing operation the resolver
    /// performs on its own behalf: push batches, background resolve batches
    /// and the post-commit cleanup tasks. A hanging peer can pin a task for
    /// at most this long.
    pub network_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            network_timeout: Duration::from_secs(3),
        }
    }
}

impl ResolverConfig {
    /// A config tuned for fast testing.
    ///
    /// - **network_timeout:** Small enough that deadline tests finish quickly.
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            network_timeout: Duration::from_millis(500),
        }
    }
}

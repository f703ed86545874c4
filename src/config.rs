//! Pool core configuration.

/// Configuration of the job dispatch core.
///
/// Deserializable so role implementations can embed it in their own
/// configuration files; all fields have sensible defaults.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_shard_count")]
    shard_count: u32,
    #[serde(default = "default_superseded_retention")]
    superseded_retention: usize,
}

fn default_shard_count() -> u32 {
    4
}

fn default_superseded_retention() -> usize {
    256
}

impl PoolConfig {
    /// Creates a new instance of the [`PoolConfig`].
    pub fn new(shard_count: u32, superseded_retention: usize) -> Self {
        Self {
            shard_count,
            superseded_retention,
        }
    }

    /// Number of shards. The job slot view holds `shard_count²` entries.
    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// How many superseded jobs stay valid for in-flight submissions
    /// before being pruned from the identifier map.
    pub fn superseded_retention(&self) -> usize {
        self.superseded_retention
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            superseded_retention: default_superseded_retention(),
        }
    }
}

use crate::types::NodeDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_RESUME_TIMEOUT_SECS: u64 = 60;
const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 1;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;

/// Configuration for a [`ConnectionPool`](crate::ConnectionPool)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Nodes to connect to
    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,

    /// User id of the bot, sent as `User-Id`
    pub user_id: String,

    /// Shard count of the bot, sent as `Num-Shards`
    #[serde(default = "default_shards")]
    pub shards: u64,

    /// Session resumption; disabled when absent
    #[serde(default)]
    pub resume: Option<ResumeConfig>,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl PoolConfig {
    /// Create a configuration for the given bot user with no nodes
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            nodes: Vec::new(),
            user_id: user_id.into(),
            shards: default_shards(),
            resume: None,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Add a node
    pub fn node(mut self, node: NodeDescriptor) -> Self {
        self.nodes.push(node);
        self
    }

    /// Set the shard count (values below 1 are treated as 1)
    pub fn shards(mut self, shards: u64) -> Self {
        self.shards = shards;
        self
    }

    /// Enable session resumption
    pub fn resume(mut self, resume: ResumeConfig) -> Self {
        self.resume = Some(resume);
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Shard count actually sent to nodes
    pub fn effective_shards(&self) -> u64 {
        self.shards.max(1)
    }
}

fn default_shards() -> u64 {
    1
}

/// Session resumption settings sent with `configureResuming`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeConfig {
    /// Resume key; generated on first open when absent
    #[serde(default)]
    pub key: Option<String>,

    /// Seconds the node keeps a dropped session alive
    #[serde(default = "default_resume_timeout")]
    pub timeout_secs: u64,
}

impl ResumeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed resume key
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            key: None,
            timeout_secs: DEFAULT_RESUME_TIMEOUT_SECS,
        }
    }
}

fn default_resume_timeout() -> u64 {
    DEFAULT_RESUME_TIMEOUT_SECS
}

/// What a node does after its socket closes
///
/// Disabled by default: a closed node stays closed until the host calls
/// [`ConnectionPool::connect_all`](crate::ConnectionPool::connect_all) again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Give up after this many consecutive failed attempts
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Exponential backoff with the default bounds
    pub fn exponential() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Delay before reconnect attempt number `attempt` (starting at 1)
    ///
    /// 1s, 2s, 4s, 8s ... capped at `max_backoff_secs`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial = Duration::from_secs(self.initial_backoff_secs.max(1));
        let max = Duration::from_secs(self.max_backoff_secs.max(self.initial_backoff_secs));
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);

        initial.saturating_mul(factor).min(max)
    }

    /// Whether another attempt is allowed after `attempt` failures
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_backoff_secs: DEFAULT_INITIAL_BACKOFF_SECS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            max_attempts: None,
        }
    }
}

fn default_initial_backoff() -> u64 {
    DEFAULT_INITIAL_BACKOFF_SECS
}

fn default_max_backoff() -> u64 {
    DEFAULT_MAX_BACKOFF_SECS
}

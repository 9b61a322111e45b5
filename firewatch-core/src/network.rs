//! Externally supplied connectivity classification.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use serde::{Deserialize, Serialize};

/// Coarse network condition reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkCondition {
    /// The wider internet is reachable.
    Online,
    /// Only the local network is reachable.
    LocalOnly,
    /// Nothing is reachable.
    Offline,
}

impl NetworkCondition {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Online => 0,
            Self::LocalOnly => 1,
            Self::Offline => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Online,
            1 => Self::LocalOnly,
            _ => Self::Offline,
        }
    }
}

/// Reports the current network condition.
pub trait NetworkMonitor: Send + Sync {
    /// Current condition.
    fn current(&self) -> NetworkCondition;
}

/// Monitor whose condition is set explicitly by the host.
///
/// Clones share the same condition, so a platform integration can keep one
/// handle and update it while the coordinator reads another.
#[derive(Debug, Clone)]
pub struct StaticNetworkMonitor {
    condition: Arc<AtomicU8>,
}

impl StaticNetworkMonitor {
    /// Start in `condition`.
    #[must_use]
    pub fn new(condition: NetworkCondition) -> Self {
        Self {
            condition: Arc::new(AtomicU8::new(condition.to_u8())),
        }
    }

    /// Replace the reported condition.
    pub fn set(&self, condition: NetworkCondition) {
        self.condition.store(condition.to_u8(), Ordering::Relaxed);
    }
}

impl Default for StaticNetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkCondition::Online)
    }
}

impl NetworkMonitor for StaticNetworkMonitor {
    fn current(&self) -> NetworkCondition {
        NetworkCondition::from_u8(self.condition.load(Ordering::Relaxed))
    }
}

//! What the limiter answers once both the store and the local fallback say no.

use serde::{Deserialize, Serialize};

use super::decision::{Decision, DecisionSource};

/// Fail mode for degraded operation.
///
/// Only consulted after the shared store failed *and* the local fallback
/// bucket is exhausted. A reachable store always decides on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Let the request through
    #[default]
    Open,
    /// Reject the request
    Closed,
}

impl FailMode {
    /// The decision for an exhausted fallback bucket.
    pub fn decide(self) -> Decision {
        match self {
            FailMode::Open => Decision {
                allowed: true,
                remaining: 0,
                source: DecisionSource::LocalOpen,
            },
            FailMode::Closed => Decision {
                allowed: false,
                remaining: 0,
                source: DecisionSource::LocalClosed,
            },
        }
    }
}

impl std::fmt::Display for FailMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailMode::Open => write!(f, "open"),
            FailMode::Closed => write!(f, "closed"),
        }
    }
}
